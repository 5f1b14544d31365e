//! lambdaport - move Lambda functions and their IAM roles between accounts
//!
//! The exporter captures each function's configuration, code package and
//! execution role into a folder of manifests. The importer replays that folder
//! against another account, creating or updating roles and functions without
//! ever deleting anything.

pub mod config;
pub mod describe;
pub mod download;
pub mod exporter;
pub mod importer;
pub mod reconcile;

pub use config::{Overrides, Settings};
pub use describe::describe_function;
pub use download::{HttpFetcher, PackageFetcher};
pub use exporter::{ExportOptions, Exporter, ResourceList};
pub use importer::{ImportOptions, Importer};
pub use reconcile::{ensure_role, AccountMapping, RoleSettings};

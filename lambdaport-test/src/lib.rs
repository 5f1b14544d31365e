//! Test utilities for lambdaport
//!
//! Provides in-memory stand-ins for the cloud APIs so the exporter and
//! importer can be exercised without an account:
//! - [`FakeCompute`] implements `ComputeApi` and records every call
//! - [`FakeIdentity`] implements `IdentityApi` with roles and managed policies
//! - [`PackageServer`] serves code packages over HTTP on a random port
//! - [`fixtures`] builds zip packages and manifests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lambdaport_test::{FakeCompute, PackageServer, SOURCE_ACCOUNT};
//!
//! #[tokio::test]
//! async fn test_export() {
//!     let server = PackageServer::start().await.unwrap();
//!     let compute = FakeCompute::new(SOURCE_ACCOUNT).with_code_base_url(server.url());
//!     // ...
//! }
//! ```

pub mod compute;
pub mod fixtures;
pub mod identity;
pub mod server;

pub use compute::{ComputeCall, FakeCompute, StoredFunction};
pub use identity::{FakeIdentity, IdentityCall};
pub use server::PackageServer;

/// Account the fixtures are exported from
pub const SOURCE_ACCOUNT: &str = "111111111111";

/// Account the fixtures are imported into
pub const DESTINATION_ACCOUNT: &str = "222222222222";

/// Region used in fixture ARNs
pub const TEST_REGION: &str = "us-east-1";

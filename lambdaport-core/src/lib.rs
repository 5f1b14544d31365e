//! Core types for lambdaport
//!
//! This crate provides the types shared by the exporter and the importer:
//! the error taxonomy, ARN handling and the on-disk manifest format.

pub mod arn;
pub mod error;
pub mod manifest;
pub mod summary;

pub use arn::{Arn, AWS_MANAGED_ACCOUNT};
pub use error::{ErrorKind, MigrateError, Result};
pub use manifest::{
    EnvironmentConfig, FunctionConfiguration, FunctionManifest, LayerRef, PolicyAttachment,
    RoleDescriptor,
};
pub use summary::{Outcome, OutcomeAction, OutcomeStatus, RunSummary};

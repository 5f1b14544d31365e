//! Lambda compute API access for lambdaport
//!
//! Defines the [`ComputeApi`] seam used by the exporter and importer, its AWS
//! implementation, and the settle waiter that polls a function until an
//! update has finished.

pub mod client;
pub mod function;
pub mod waiter;

pub use client::{ComputeApi, LambdaClient};
pub use function::{
    CodeLocation, CreateFunctionRequest, FunctionDetails, FunctionInfo, FunctionStatus,
    SettleState, UpdateConfigurationRequest, UpdateStatus,
};
pub use waiter::{wait_for_function, WaitConfig};

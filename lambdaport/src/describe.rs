//! Read-only function description

use lambdaport_core::Result;
use lambdaport_lambda::{ComputeApi, FunctionInfo};

/// Compact description of one function. `NotFound` if it does not exist.
pub async fn describe_function(compute: &dyn ComputeApi, name: &str) -> Result<FunctionInfo> {
    let details = compute.get_function(name).await?;
    Ok(FunctionInfo::from(&details.configuration))
}

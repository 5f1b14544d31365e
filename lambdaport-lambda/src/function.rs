//! Lambda function models

use bytes::Bytes;
use lambdaport_core::FunctionConfiguration;
use serde::Serialize;
use std::collections::BTreeMap;

/// Repository type of archive packages in `GetFunction` responses
pub const REPOSITORY_TYPE_S3: &str = "S3";

/// Outcome of the most recent update to a function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    Successful,
    InProgress,
    Failed,
}

impl UpdateStatus {
    /// Parse the provider's status string. Unknown values count as settled.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        match s {
            "InProgress" => Self::InProgress,
            "Failed" => Self::Failed,
            _ => Self::Successful,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Successful => "Successful",
            Self::InProgress => "InProgress",
            Self::Failed => "Failed",
        }
    }
}

/// Where a function's code can be fetched from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLocation {
    pub repository_type: String,
    /// Pre-signed download URL for archive packages
    pub location: Option<String>,
    /// Container image for image packages
    pub image_uri: Option<String>,
}

/// `GetFunction` result
#[derive(Debug, Clone)]
pub struct FunctionDetails {
    pub configuration: FunctionConfiguration,
    pub code: CodeLocation,
}

/// Status fields of `GetFunctionConfiguration`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionStatus {
    pub last_update_status: UpdateStatus,
    pub last_update_status_reason: Option<String>,
    /// Lifecycle state (`Pending`, `Active`, `Inactive`, `Failed`)
    pub state: Option<String>,
    pub state_reason: Option<String>,
}

/// Whether a function can accept the next mutating call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleState {
    Pending,
    Ready,
    Failed(String),
}

impl FunctionStatus {
    pub fn settled() -> Self {
        Self {
            last_update_status: UpdateStatus::Successful,
            last_update_status_reason: None,
            state: Some("Active".to_string()),
            state_reason: None,
        }
    }

    pub fn with_update_status(status: UpdateStatus, reason: Option<&str>) -> Self {
        Self {
            last_update_status: status,
            last_update_status_reason: reason.map(str::to_string),
            ..Self::settled()
        }
    }

    pub fn settle_state(&self) -> SettleState {
        let unknown = || "no reason given".to_string();
        match (self.last_update_status, self.state.as_deref()) {
            (UpdateStatus::Failed, _) => SettleState::Failed(
                self.last_update_status_reason.clone().unwrap_or_else(unknown),
            ),
            (_, Some("Failed")) => {
                SettleState::Failed(self.state_reason.clone().unwrap_or_else(unknown))
            }
            (UpdateStatus::InProgress, _) | (_, Some("Pending")) => SettleState::Pending,
            _ => SettleState::Ready,
        }
    }
}

/// Everything `CreateFunction` needs for a first deployment
#[derive(Debug, Clone)]
pub struct CreateFunctionRequest {
    pub function_name: String,
    pub runtime: String,
    pub role: String,
    pub handler: String,
    pub code: Bytes,
    pub description: String,
    pub timeout: i32,
    pub memory_size: i32,
    pub environment: BTreeMap<String, String>,
    pub layers: Vec<String>,
    pub package_type: String,
    pub architectures: Vec<String>,
    pub publish: bool,
}

/// Fields replaced by `UpdateFunctionConfiguration`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateConfigurationRequest {
    pub function_name: String,
    pub role: String,
    pub handler: String,
    pub description: String,
    pub timeout: i32,
    pub memory_size: i32,
    pub environment: BTreeMap<String, String>,
    pub layers: Vec<String>,
    pub runtime: String,
}

/// Compact description printed by `lambdaport describe`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionInfo {
    pub function_name: String,
    pub function_arn: Option<String>,
    pub runtime: Option<String>,
    pub handler: Option<String>,
    pub role: String,
    pub code_size: Option<i64>,
    pub last_modified: Option<String>,
    pub timeout: i32,
    pub memory_size: i32,
    pub description: String,
    pub environment: BTreeMap<String, String>,
    pub layers: Vec<String>,
}

impl From<&FunctionConfiguration> for FunctionInfo {
    fn from(c: &FunctionConfiguration) -> Self {
        Self {
            function_name: c.function_name.clone(),
            function_arn: c.function_arn.clone(),
            runtime: c.runtime.clone(),
            handler: c.handler.clone(),
            role: c.role.clone(),
            code_size: c.code_size,
            last_modified: c.last_modified.clone(),
            timeout: c.timeout,
            memory_size: c.memory_size,
            description: c.description.clone(),
            environment: c.variables(),
            layers: c.layer_arns(),
        }
    }
}

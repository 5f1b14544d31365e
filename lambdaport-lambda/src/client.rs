//! Compute API seam and its AWS Lambda implementation

use crate::function::{
    CodeLocation, CreateFunctionRequest, FunctionDetails, FunctionStatus,
    UpdateConfigurationRequest, UpdateStatus,
};
use async_trait::async_trait;
use aws_sdk_lambda::error::{DisplayErrorContext, SdkError};
use aws_sdk_lambda::operation::get_function::GetFunctionError;
use aws_sdk_lambda::operation::get_function_configuration::GetFunctionConfigurationError;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{
    self as sdk, Architecture, Environment, FunctionCode, PackageType, Runtime,
};
use bytes::Bytes;
use lambdaport_core::manifest::PACKAGE_TYPE_ZIP;
use lambdaport_core::{EnvironmentConfig, FunctionConfiguration, LayerRef, MigrateError, Result};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Operations the exporter and importer need from the compute API
#[async_trait]
pub trait ComputeApi: Send + Sync {
    /// Configuration plus code location. `NotFound` if the function is absent.
    async fn get_function(&self, name: &str) -> Result<FunctionDetails>;

    /// Update and lifecycle status, used while waiting for updates to settle
    async fn get_function_configuration(&self, name: &str) -> Result<FunctionStatus>;

    async fn create_function(&self, request: &CreateFunctionRequest) -> Result<()>;

    /// Replace the code package and publish a new version
    async fn update_function_code(&self, name: &str, code: &Bytes) -> Result<()>;

    async fn update_function_configuration(
        &self,
        request: &UpdateConfigurationRequest,
    ) -> Result<()>;
}

/// [`ComputeApi`] backed by `aws-sdk-lambda`
#[derive(Debug, Clone)]
pub struct LambdaClient {
    client: aws_sdk_lambda::Client,
}

impl LambdaClient {
    pub fn new(client: aws_sdk_lambda::Client) -> Self {
        Self { client }
    }
}

fn remote_error<E, R>(operation: &'static str, err: SdkError<E, R>) -> MigrateError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    MigrateError::remote(operation, DisplayErrorContext(&err).to_string())
}

fn function_not_found(name: &str) -> MigrateError {
    MigrateError::not_found(format!("function {name}"))
}

#[async_trait]
impl ComputeApi for LambdaClient {
    async fn get_function(&self, name: &str) -> Result<FunctionDetails> {
        debug!(function_name = %name, "GetFunction");

        let output = match self.client.get_function().function_name(name).send().await {
            Ok(output) => output,
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(GetFunctionError::is_resource_not_found_exception)
                {
                    return Err(function_not_found(name));
                }
                return Err(remote_error("GetFunction", err));
            }
        };

        let configuration = output
            .configuration()
            .map(configuration_from_sdk)
            .ok_or_else(|| MigrateError::remote("GetFunction", "response has no configuration"))?;

        let code = output
            .code()
            .map(|c| CodeLocation {
                repository_type: c.repository_type().unwrap_or_default().to_string(),
                location: c.location().map(str::to_string),
                image_uri: c.image_uri().map(str::to_string),
            })
            .ok_or_else(|| MigrateError::remote("GetFunction", "response has no code location"))?;

        Ok(FunctionDetails {
            configuration,
            code,
        })
    }

    async fn get_function_configuration(&self, name: &str) -> Result<FunctionStatus> {
        let output = match self
            .client
            .get_function_configuration()
            .function_name(name)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(GetFunctionConfigurationError::is_resource_not_found_exception)
                {
                    return Err(function_not_found(name));
                }
                return Err(remote_error("GetFunctionConfiguration", err));
            }
        };

        Ok(FunctionStatus {
            last_update_status: output
                .last_update_status()
                .map_or(UpdateStatus::Successful, |s| UpdateStatus::from_str(s.as_str())),
            last_update_status_reason: output.last_update_status_reason().map(str::to_string),
            state: output.state().map(|s| s.as_str().to_string()),
            state_reason: output.state_reason().map(str::to_string),
        })
    }

    async fn create_function(&self, request: &CreateFunctionRequest) -> Result<()> {
        debug!(function_name = %request.function_name, "CreateFunction");

        self.client
            .create_function()
            .function_name(&request.function_name)
            .runtime(Runtime::from(request.runtime.as_str()))
            .role(&request.role)
            .handler(&request.handler)
            .code(
                FunctionCode::builder()
                    .zip_file(Blob::new(request.code.to_vec()))
                    .build(),
            )
            .description(&request.description)
            .timeout(request.timeout)
            .memory_size(request.memory_size)
            .publish(request.publish)
            .environment(environment_to_sdk(&request.environment))
            .set_layers(Some(request.layers.clone()))
            .package_type(PackageType::from(request.package_type.as_str()))
            .set_architectures(Some(
                request
                    .architectures
                    .iter()
                    .map(|a| Architecture::from(a.as_str()))
                    .collect(),
            ))
            .send()
            .await
            .map_err(|err| remote_error("CreateFunction", err))?;

        Ok(())
    }

    async fn update_function_code(&self, name: &str, code: &Bytes) -> Result<()> {
        debug!(function_name = %name, code_size = code.len(), "UpdateFunctionCode");

        self.client
            .update_function_code()
            .function_name(name)
            .zip_file(Blob::new(code.to_vec()))
            .publish(true)
            .send()
            .await
            .map_err(|err| remote_error("UpdateFunctionCode", err))?;

        Ok(())
    }

    async fn update_function_configuration(
        &self,
        request: &UpdateConfigurationRequest,
    ) -> Result<()> {
        debug!(function_name = %request.function_name, "UpdateFunctionConfiguration");

        self.client
            .update_function_configuration()
            .function_name(&request.function_name)
            .role(&request.role)
            .handler(&request.handler)
            .description(&request.description)
            .timeout(request.timeout)
            .memory_size(request.memory_size)
            .environment(environment_to_sdk(&request.environment))
            .set_layers(Some(request.layers.clone()))
            .runtime(Runtime::from(request.runtime.as_str()))
            .send()
            .await
            .map_err(|err| remote_error("UpdateFunctionConfiguration", err))?;

        Ok(())
    }
}

fn environment_to_sdk(variables: &BTreeMap<String, String>) -> Environment {
    let variables: HashMap<String, String> = variables
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Environment::builder().set_variables(Some(variables)).build()
}

/// Fields of the SDK configuration that the manifest keeps verbatim in `extra`
fn extra_from_sdk(c: &sdk::FunctionConfiguration) -> Map<String, Value> {
    let mut extra = Map::new();
    let mut put = |key: &str, value: Option<Value>| {
        if let Some(value) = value {
            extra.insert(key.to_string(), value);
        }
    };

    put("State", c.state().map(|s| s.as_str().into()));
    put("StateReason", c.state_reason().map(Into::into));
    put(
        "StateReasonCode",
        c.state_reason_code().map(|s| s.as_str().into()),
    );
    put(
        "LastUpdateStatus",
        c.last_update_status().map(|s| s.as_str().into()),
    );
    put(
        "LastUpdateStatusReason",
        c.last_update_status_reason().map(Into::into),
    );
    put("RevisionId", c.revision_id().map(Into::into));
    put("KMSKeyArn", c.kms_key_arn().map(Into::into));
    put("MasterArn", c.master_arn().map(Into::into));
    put(
        "SigningProfileVersionArn",
        c.signing_profile_version_arn().map(Into::into),
    );
    put("SigningJobArn", c.signing_job_arn().map(Into::into));
    put(
        "TracingConfig",
        c.tracing_config()
            .and_then(|t| t.mode())
            .map(|mode| json!({ "Mode": mode.as_str() })),
    );
    put(
        "EphemeralStorage",
        c.ephemeral_storage()
            .map(|storage| json!({ "Size": storage.size() })),
    );
    put(
        "VpcConfig",
        c.vpc_config().map(|vpc| {
            json!({
                "SubnetIds": vpc.subnet_ids(),
                "SecurityGroupIds": vpc.security_group_ids(),
                "VpcId": vpc.vpc_id(),
                "Ipv6AllowedForDualStack": vpc.ipv6_allowed_for_dual_stack(),
            })
        }),
    );
    put(
        "DeadLetterConfig",
        c.dead_letter_config()
            .map(|dlq| json!({ "TargetArn": dlq.target_arn() })),
    );
    if !c.file_system_configs().is_empty() {
        let configs: Vec<Value> = c
            .file_system_configs()
            .iter()
            .map(|fs| json!({ "Arn": fs.arn(), "LocalMountPath": fs.local_mount_path() }))
            .collect();
        put("FileSystemConfigs", Some(Value::Array(configs)));
    }
    put(
        "SnapStart",
        c.snap_start().map(|snap| {
            json!({
                "ApplyOn": snap.apply_on().map(|a| a.as_str()),
                "OptimizationStatus": snap.optimization_status().map(|o| o.as_str()),
            })
        }),
    );
    put(
        "LoggingConfig",
        c.logging_config().map(|logging| {
            json!({
                "LogFormat": logging.log_format().map(|f| f.as_str()),
                "ApplicationLogLevel": logging.application_log_level().map(|l| l.as_str()),
                "SystemLogLevel": logging.system_log_level().map(|l| l.as_str()),
                "LogGroup": logging.log_group(),
            })
        }),
    );
    put(
        "RuntimeVersionConfig",
        c.runtime_version_config().map(|runtime| {
            json!({ "RuntimeVersionArn": runtime.runtime_version_arn() })
        }),
    );

    extra
}

/// Convert the SDK's configuration into the manifest representation
fn configuration_from_sdk(c: &sdk::FunctionConfiguration) -> FunctionConfiguration {
    let mut architectures: Vec<String> = c
        .architectures()
        .iter()
        .map(|a| a.as_str().to_string())
        .collect();
    if architectures.is_empty() {
        architectures.push(Architecture::X8664.as_str().to_string());
    }

    FunctionConfiguration {
        function_name: c.function_name().unwrap_or_default().to_string(),
        function_arn: c.function_arn().map(str::to_string),
        runtime: c.runtime().map(|r| r.as_str().to_string()),
        handler: c.handler().map(str::to_string),
        role: c.role().unwrap_or_default().to_string(),
        timeout: c.timeout().unwrap_or(3),
        memory_size: c.memory_size().unwrap_or(128),
        description: c.description().unwrap_or_default().to_string(),
        environment: c
            .environment()
            .and_then(|e| e.variables())
            .map(|vars| EnvironmentConfig {
                variables: vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            }),
        layers: c
            .layers()
            .iter()
            .filter_map(|layer| {
                layer.arn().map(|arn| LayerRef {
                    arn: arn.to_string(),
                    code_size: Some(layer.code_size()),
                })
            })
            .collect(),
        package_type: c
            .package_type()
            .map_or(PACKAGE_TYPE_ZIP, PackageType::as_str)
            .to_string(),
        architectures,
        code_size: Some(c.code_size()),
        code_sha256: c.code_sha256().map(str::to_string),
        last_modified: c.last_modified().map(str::to_string),
        version: c.version().map(str::to_string),
        extra: extra_from_sdk(c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_lambda::types::{
        DeadLetterConfig, FileSystemConfig, LogFormat, LoggingConfig, VpcConfigResponse,
    };

    fn sdk_configuration() -> sdk::FunctionConfiguration {
        sdk::FunctionConfiguration::builder()
            .function_name("orders-api")
            .role("arn:aws:iam::111111111111:role/orders-role")
            .runtime(Runtime::Python312)
            .handler("app.handler")
            .timeout(30)
            .memory_size(256)
            .vpc_config(
                VpcConfigResponse::builder()
                    .subnet_ids("subnet-1")
                    .subnet_ids("subnet-2")
                    .security_group_ids("sg-1")
                    .vpc_id("vpc-1")
                    .build(),
            )
            .dead_letter_config(
                DeadLetterConfig::builder()
                    .target_arn("arn:aws:sqs:us-east-1:111111111111:orders-dlq")
                    .build(),
            )
            .kms_key_arn("arn:aws:kms:us-east-1:111111111111:key/k1")
            .file_system_configs(
                FileSystemConfig::builder()
                    .arn("arn:aws:elasticfilesystem:us-east-1:111111111111:access-point/fsap-1")
                    .local_mount_path("/mnt/data")
                    .build()
                    .unwrap(),
            )
            .logging_config(LoggingConfig::builder().log_format(LogFormat::Json).build())
            .revision_id("rev-1")
            .build()
    }

    #[test]
    fn test_configuration_keeps_unmodelled_fields() {
        let config = configuration_from_sdk(&sdk_configuration());

        assert_eq!(config.function_name, "orders-api");
        assert_eq!(config.timeout, 30);
        assert_eq!(
            config.extra["VpcConfig"]["SubnetIds"],
            json!(["subnet-1", "subnet-2"])
        );
        assert_eq!(config.extra["VpcConfig"]["VpcId"], json!("vpc-1"));
        assert_eq!(
            config.extra["DeadLetterConfig"],
            json!({ "TargetArn": "arn:aws:sqs:us-east-1:111111111111:orders-dlq" })
        );
        assert_eq!(
            config.extra["KMSKeyArn"],
            json!("arn:aws:kms:us-east-1:111111111111:key/k1")
        );
        assert_eq!(
            config.extra["FileSystemConfigs"][0]["LocalMountPath"],
            json!("/mnt/data")
        );
        assert_eq!(config.extra["LoggingConfig"]["LogFormat"], json!("JSON"));
        assert_eq!(config.extra["RevisionId"], json!("rev-1"));
        assert!(!config.extra.contains_key("SnapStart"));
    }

    #[test]
    fn test_missing_architectures_default_to_x86() {
        let config = configuration_from_sdk(&sdk_configuration());
        assert_eq!(config.architectures, vec!["x86_64"]);
    }
}

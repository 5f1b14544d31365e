//! In-memory compute API

use crate::TEST_REGION;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use bytes::Bytes;
use dashmap::DashMap;
use lambdaport_core::{EnvironmentConfig, FunctionConfiguration, LayerRef, MigrateError, Result};
use lambdaport_lambda::function::REPOSITORY_TYPE_S3;
use lambdaport_lambda::{
    CodeLocation, ComputeApi, CreateFunctionRequest, FunctionDetails, FunctionStatus,
    UpdateConfigurationRequest,
};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::info;

/// A call received by [`FakeCompute`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputeCall {
    GetFunction(String),
    GetFunctionConfiguration(String),
    CreateFunction(String),
    UpdateFunctionCode(String),
    UpdateFunctionConfiguration(String),
}

impl ComputeCall {
    /// Whether the call changes destination state
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::CreateFunction(_)
                | Self::UpdateFunctionCode(_)
                | Self::UpdateFunctionConfiguration(_)
        )
    }
}

/// A deployed function
#[derive(Debug, Clone)]
pub struct StoredFunction {
    pub configuration: FunctionConfiguration,
    pub code: Bytes,
}

/// [`ComputeApi`] over an in-memory function table
pub struct FakeCompute {
    account: String,
    functions: DashMap<String, StoredFunction>,
    calls: Mutex<Vec<ComputeCall>>,
    /// Statuses returned by status polls before the function reports settled
    statuses: Mutex<VecDeque<FunctionStatus>>,
    /// Operation name to injected fault message
    faults: Mutex<HashMap<&'static str, String>>,
    code_base_url: Option<String>,
}

impl FakeCompute {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            functions: DashMap::new(),
            calls: Mutex::new(Vec::new()),
            statuses: Mutex::new(VecDeque::new()),
            faults: Mutex::new(HashMap::new()),
            code_base_url: None,
        }
    }

    /// Report code locations as `<base>/<name>.zip`
    pub fn with_code_base_url(mut self, base: impl Into<String>) -> Self {
        self.code_base_url = Some(base.into());
        self
    }

    /// Seed a deployed function
    pub fn insert_function(&self, mut configuration: FunctionConfiguration, code: impl Into<Bytes>) {
        let code = code.into();
        configuration.function_arn = Some(self.function_arn(&configuration.function_name));
        set_code_fields(&mut configuration, &code);
        self.functions.insert(
            configuration.function_name.clone(),
            StoredFunction {
                configuration,
                code,
            },
        );
    }

    pub fn function(&self, name: &str) -> Option<StoredFunction> {
        self.functions.get(name).map(|f| f.clone())
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn calls(&self) -> Vec<ComputeCall> {
        self.calls.lock().clone()
    }

    /// Calls that changed destination state
    pub fn mutating_calls(&self) -> Vec<ComputeCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.is_mutating())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Queue statuses for upcoming status polls
    pub fn script_statuses(&self, statuses: impl IntoIterator<Item = FunctionStatus>) {
        self.statuses.lock().extend(statuses);
    }

    /// Make `operation` fail with a remote fault until cleared
    pub fn fail(&self, operation: &'static str, message: impl Into<String>) {
        self.faults.lock().insert(operation, message.into());
    }

    pub fn clear_fault(&self, operation: &'static str) {
        self.faults.lock().remove(operation);
    }

    fn record(&self, call: ComputeCall) {
        self.calls.lock().push(call);
    }

    fn check_fault(&self, operation: &'static str) -> Result<()> {
        match self.faults.lock().get(operation) {
            Some(message) => Err(MigrateError::remote(operation, message.clone())),
            None => Ok(()),
        }
    }

    fn function_arn(&self, name: &str) -> String {
        format!("arn:aws:lambda:{TEST_REGION}:{}:function:{name}", self.account)
    }
}

fn code_sha256(code: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code);
    general_purpose::STANDARD.encode(hasher.finalize())
}

fn set_code_fields(configuration: &mut FunctionConfiguration, code: &Bytes) {
    configuration.code_size = Some(i64::try_from(code.len()).unwrap_or(i64::MAX));
    configuration.code_sha256 = Some(code_sha256(code));
    configuration.last_modified = Some(chrono::Utc::now().to_rfc3339());
}

/// Function name from a name, a full ARN or a partial ARN
/// (`123456789012:function:name`), with any qualifier dropped
fn function_name_from_identifier(identifier: &str) -> &str {
    match identifier.split_once("function:") {
        Some((_, rest)) => rest.split(':').next().unwrap_or(rest),
        None => identifier,
    }
}

fn not_found(name: &str) -> MigrateError {
    MigrateError::not_found(format!("function {name}"))
}

fn environment(variables: &BTreeMap<String, String>) -> Option<EnvironmentConfig> {
    (!variables.is_empty()).then(|| EnvironmentConfig {
        variables: variables.clone(),
    })
}

fn layers(arns: &[String]) -> Vec<LayerRef> {
    arns.iter()
        .map(|arn| LayerRef {
            arn: arn.clone(),
            code_size: None,
        })
        .collect()
}

#[async_trait]
impl ComputeApi for FakeCompute {
    async fn get_function(&self, name: &str) -> Result<FunctionDetails> {
        self.record(ComputeCall::GetFunction(name.to_string()));
        self.check_fault("GetFunction")?;

        let name = function_name_from_identifier(name);
        let function = self.functions.get(name).ok_or_else(|| not_found(name))?;
        let configuration = function.configuration.clone();

        let code = if configuration.package_type == "Image" {
            CodeLocation {
                repository_type: "ECR".to_string(),
                location: None,
                image_uri: Some(format!(
                    "{}.dkr.ecr.{TEST_REGION}.amazonaws.com/{name}:latest",
                    self.account
                )),
            }
        } else {
            CodeLocation {
                repository_type: REPOSITORY_TYPE_S3.to_string(),
                location: self
                    .code_base_url
                    .as_ref()
                    .map(|base| format!("{base}/{name}.zip")),
                image_uri: None,
            }
        };

        Ok(FunctionDetails {
            configuration,
            code,
        })
    }

    async fn get_function_configuration(&self, name: &str) -> Result<FunctionStatus> {
        self.record(ComputeCall::GetFunctionConfiguration(name.to_string()));
        self.check_fault("GetFunctionConfiguration")?;

        if !self.functions.contains_key(name) {
            return Err(not_found(name));
        }
        Ok(self
            .statuses
            .lock()
            .pop_front()
            .unwrap_or_else(FunctionStatus::settled))
    }

    async fn create_function(&self, request: &CreateFunctionRequest) -> Result<()> {
        let name = &request.function_name;
        self.record(ComputeCall::CreateFunction(name.clone()));
        self.check_fault("CreateFunction")?;

        if self.functions.contains_key(name) {
            return Err(MigrateError::remote(
                "CreateFunction",
                format!("ResourceConflictException: function already exist: {name}"),
            ));
        }

        let mut configuration = FunctionConfiguration::new(
            name.clone(),
            request.runtime.clone(),
            request.handler.clone(),
            request.role.clone(),
        );
        configuration.description = request.description.clone();
        configuration.timeout = request.timeout;
        configuration.memory_size = request.memory_size;
        configuration.environment = environment(&request.environment);
        configuration.layers = layers(&request.layers);
        configuration.package_type = request.package_type.clone();
        configuration.architectures = request.architectures.clone();
        configuration.version = Some(if request.publish { "1" } else { "$LATEST" }.to_string());

        info!(function_name = %name, runtime = %request.runtime, "Created function");
        self.insert_function(configuration, request.code.clone());
        Ok(())
    }

    async fn update_function_code(&self, name: &str, code: &Bytes) -> Result<()> {
        self.record(ComputeCall::UpdateFunctionCode(name.to_string()));
        self.check_fault("UpdateFunctionCode")?;

        let mut function = self.functions.get_mut(name).ok_or_else(|| not_found(name))?;
        function.code = code.clone();
        set_code_fields(&mut function.configuration, code);

        let next = function
            .configuration
            .version
            .as_deref()
            .and_then(|v| v.parse::<u32>().ok())
            .map_or(1, |v| v + 1);
        function.configuration.version = Some(next.to_string());
        Ok(())
    }

    async fn update_function_configuration(
        &self,
        request: &UpdateConfigurationRequest,
    ) -> Result<()> {
        let name = &request.function_name;
        self.record(ComputeCall::UpdateFunctionConfiguration(name.clone()));
        self.check_fault("UpdateFunctionConfiguration")?;

        let mut function = self.functions.get_mut(name).ok_or_else(|| not_found(name))?;
        let configuration = &mut function.configuration;
        configuration.role = request.role.clone();
        configuration.handler = Some(request.handler.clone());
        configuration.description = request.description.clone();
        configuration.timeout = request.timeout;
        configuration.memory_size = request.memory_size;
        configuration.environment = environment(&request.environment);
        configuration.layers = layers(&request.layers);
        configuration.runtime = Some(request.runtime.clone());
        Ok(())
    }
}

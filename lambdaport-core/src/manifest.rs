//! Per-function manifest format
//!
//! One `<name>.json` manifest is written per exported function, next to the
//! `<name>.zip` code package. Field names follow the provider's API casing so
//! that manifests produced by other tooling load as well.

use crate::arn::{is_account_id, Arn};
use crate::error::{MigrateError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Extension of manifest files
pub const MANIFEST_EXTENSION: &str = "json";

/// Extension of code package files
pub const PACKAGE_EXTENSION: &str = "zip";

/// Package type of archive-deployed functions
pub const PACKAGE_TYPE_ZIP: &str = "Zip";

const MAX_FUNCTION_NAME_LEN: usize = 64;
const TIMEOUT_RANGE: std::ops::RangeInclusive<i32> = 1..=900;
const MEMORY_RANGE: std::ops::RangeInclusive<i32> = 128..=10240;

/// Desired state of one exported function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionManifest {
    pub function_name: String,
    pub configuration: FunctionConfiguration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<RoleDescriptor>,
    #[serde(default)]
    pub attached_policies: Vec<PolicyAttachment>,
    /// Inline policy documents keyed by policy name
    #[serde(default)]
    pub inline_policies: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,
}

/// Function configuration as captured from the compute API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionConfiguration {
    pub function_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    pub role: String,
    #[serde(default = "default_timeout")]
    pub timeout: i32,
    #[serde(default = "default_memory_size")]
    pub memory_size: i32,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentConfig>,
    #[serde(default)]
    pub layers: Vec<LayerRef>,
    #[serde(default = "default_package_type")]
    pub package_type: String,
    #[serde(default = "default_architectures")]
    pub architectures: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Fields this tool does not interpret, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_timeout() -> i32 {
    3
}

fn default_memory_size() -> i32 {
    128
}

fn default_package_type() -> String {
    PACKAGE_TYPE_ZIP.to_string()
}

fn default_architectures() -> Vec<String> {
    vec!["x86_64".to_string()]
}

fn default_path() -> String {
    "/".to_string()
}

impl FunctionConfiguration {
    /// Configuration with required fields set and everything else defaulted
    pub fn new(
        function_name: impl Into<String>,
        runtime: impl Into<String>,
        handler: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            function_arn: None,
            runtime: Some(runtime.into()),
            handler: Some(handler.into()),
            role: role.into(),
            timeout: default_timeout(),
            memory_size: default_memory_size(),
            description: String::new(),
            environment: None,
            layers: Vec::new(),
            package_type: default_package_type(),
            architectures: default_architectures(),
            code_size: None,
            code_sha256: None,
            last_modified: None,
            version: None,
            extra: Map::new(),
        }
    }

    /// Environment variables, empty when none are set
    pub fn variables(&self) -> BTreeMap<String, String> {
        self.environment
            .as_ref()
            .map(|e| e.variables.clone())
            .unwrap_or_default()
    }

    pub fn layer_arns(&self) -> Vec<String> {
        self.layers.iter().map(|l| l.arn.clone()).collect()
    }
}

/// Environment block (`{"Variables": {...}}`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

/// A layer reference. Accepts both `{"Arn": ..}` objects and bare ARN strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", from = "LayerEntry")]
pub struct LayerRef {
    pub arn: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_size: Option<i64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LayerEntry {
    Arn(String),
    #[serde(rename_all = "PascalCase")]
    Object {
        arn: String,
        #[serde(default)]
        code_size: Option<i64>,
    },
}

impl From<LayerEntry> for LayerRef {
    fn from(entry: LayerEntry) -> Self {
        match entry {
            LayerEntry::Arn(arn) => Self {
                arn,
                code_size: None,
            },
            LayerEntry::Object { arn, code_size } => Self { arn, code_size },
        }
    }
}

/// The role a function assumes at invocation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoleDescriptor {
    pub role_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    #[serde(default = "default_path")]
    pub path: String,
    /// Trust policy, decoded to JSON
    pub assume_role_policy_document: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A managed policy attached to a role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyAttachment {
    pub policy_name: String,
    pub policy_arn: String,
}

/// Text form of a policy document.
///
/// Documents are normally stored as JSON objects; a document stored as a
/// string is assumed to already be serialized.
pub fn document_text(document: &Value) -> String {
    match document {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

impl FunctionManifest {
    pub fn new(configuration: FunctionConfiguration) -> Self {
        Self {
            function_name: configuration.function_name.clone(),
            configuration,
            role: None,
            attached_policies: Vec::new(),
            inline_policies: BTreeMap::new(),
            exported_at: None,
        }
    }

    /// Name of the manifest file for `function_name`
    pub fn manifest_file_name(function_name: &str) -> String {
        format!("{function_name}.{MANIFEST_EXTENSION}")
    }

    /// Name of the code package file for `function_name`
    pub fn package_file_name(function_name: &str) -> String {
        format!("{function_name}.{PACKAGE_EXTENSION}")
    }

    /// Path of this function's package inside `folder`
    pub fn package_path(&self, folder: &Path) -> PathBuf {
        folder.join(Self::package_file_name(&self.function_name))
    }

    /// Load and validate a manifest file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(path, &text)
    }

    /// Parse and validate manifest JSON. `path` is used for error reporting.
    pub fn from_json(path: &Path, text: &str) -> Result<Self> {
        let manifest: Self =
            serde_json::from_str(text).map_err(|e| MigrateError::malformed(path, e.to_string()))?;
        manifest
            .validate()
            .map_err(|reason| MigrateError::malformed(path, reason))?;
        Ok(manifest)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the invariants the importer relies on
    pub fn validate(&self) -> std::result::Result<(), String> {
        validate_function_name(&self.function_name)?;

        let config = &self.configuration;
        if config.function_name != self.function_name {
            return Err(format!(
                "Configuration.FunctionName '{}' does not match FunctionName '{}'",
                config.function_name, self.function_name
            ));
        }

        if config.package_type != PACKAGE_TYPE_ZIP {
            return Err(format!(
                "package type '{}' is not supported, only {PACKAGE_TYPE_ZIP}",
                config.package_type
            ));
        }

        if config.runtime.as_deref().map_or(true, str::is_empty) {
            return Err("Configuration.Runtime is required for Zip packages".to_string());
        }

        if config.handler.as_deref().map_or(true, str::is_empty) {
            return Err("Configuration.Handler is required for Zip packages".to_string());
        }

        if config.role.is_empty() {
            return Err("Configuration.Role is empty".to_string());
        }

        if !TIMEOUT_RANGE.contains(&config.timeout) {
            return Err(format!(
                "Configuration.Timeout {} is outside {}..={}",
                config.timeout,
                TIMEOUT_RANGE.start(),
                TIMEOUT_RANGE.end()
            ));
        }

        if !MEMORY_RANGE.contains(&config.memory_size) {
            return Err(format!(
                "Configuration.MemorySize {} is outside {}..={}",
                config.memory_size,
                MEMORY_RANGE.start(),
                MEMORY_RANGE.end()
            ));
        }

        if config.architectures.is_empty() {
            return Err("Configuration.Architectures is empty".to_string());
        }

        if let Some(role) = &self.role {
            if role.role_name.is_empty() {
                return Err("Role.RoleName is empty".to_string());
            }
            if role.assume_role_policy_document.is_null() {
                return Err("Role.AssumeRolePolicyDocument is missing".to_string());
            }
        }

        for policy in &self.attached_policies {
            if Arn::parse(&policy.policy_arn).is_none() {
                return Err(format!(
                    "AttachedPolicies entry '{}' has invalid ARN '{}'",
                    policy.policy_name, policy.policy_arn
                ));
            }
        }

        if self.inline_policies.keys().any(String::is_empty) {
            return Err("InlinePolicies contains an empty policy name".to_string());
        }

        Ok(())
    }

    /// Account the function was exported from, if any recorded ARN names one
    pub fn source_account(&self) -> Option<String> {
        let role_arn = self.role.as_ref().and_then(|r| r.arn.as_deref());
        [
            role_arn,
            Some(self.configuration.role.as_str()),
            self.configuration.function_arn.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter_map(Arn::parse)
        .map(|arn| arn.account)
        .find(|account| is_account_id(account))
    }
}

/// Function names double as file names, so only the provider's character
/// set is accepted.
pub fn validate_function_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("FunctionName is empty".to_string());
    }
    if name.len() > MAX_FUNCTION_NAME_LEN {
        return Err(format!(
            "FunctionName '{name}' is longer than {MAX_FUNCTION_NAME_LEN} characters"
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(format!("FunctionName '{name}' contains invalid characters"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn manifest_json() -> Value {
        json!({
            "FunctionName": "orders-api",
            "Configuration": {
                "FunctionName": "orders-api",
                "FunctionArn": "arn:aws:lambda:us-east-1:111111111111:function:orders-api",
                "Runtime": "python3.11",
                "Role": "arn:aws:iam::111111111111:role/orders-role",
                "Handler": "app.handler",
                "CodeSize": 2048,
                "Timeout": 30,
                "MemorySize": 256,
                "Environment": {"Variables": {"STAGE": "dev"}},
                "Layers": [{"Arn": "arn:aws:lambda:us-east-1:111111111111:layer:deps:4", "CodeSize": 10}],
                "TracingConfig": {"Mode": "PassThrough"},
                "Architectures": ["arm64"]
            },
            "Role": {
                "RoleName": "orders-role",
                "Arn": "arn:aws:iam::111111111111:role/orders-role",
                "AssumeRolePolicyDocument": {"Version": "2012-10-17", "Statement": []},
                "RoleId": "AROAEXAMPLE"
            },
            "AttachedPolicies": [
                {"PolicyName": "orders-access", "PolicyArn": "arn:aws:iam::111111111111:policy/orders-access"}
            ],
            "InlinePolicies": {"logs": {"Version": "2012-10-17", "Statement": []}}
        })
    }

    fn parse(value: &Value) -> Result<FunctionManifest> {
        FunctionManifest::from_json(Path::new("orders-api.json"), &value.to_string())
    }

    #[test]
    fn test_parse_full_manifest() {
        let manifest = parse(&manifest_json()).unwrap();
        let config = &manifest.configuration;

        assert_eq!(manifest.function_name, "orders-api");
        assert_eq!(config.timeout, 30);
        assert_eq!(config.memory_size, 256);
        assert_eq!(config.package_type, "Zip");
        assert_eq!(config.architectures, vec!["arm64"]);
        assert_eq!(config.variables().get("STAGE").map(String::as_str), Some("dev"));
        assert_eq!(
            config.layer_arns(),
            vec!["arn:aws:lambda:us-east-1:111111111111:layer:deps:4"]
        );
        assert!(config.extra.contains_key("TracingConfig"));
        assert_eq!(manifest.role.as_ref().unwrap().path, "/");
        assert_eq!(manifest.attached_policies.len(), 1);
        assert_eq!(manifest.inline_policies.len(), 1);
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let manifest = parse(&manifest_json()).unwrap();
        let written: Value = serde_json::from_str(&manifest.to_json_pretty().unwrap()).unwrap();
        assert_eq!(
            written["Configuration"]["TracingConfig"],
            json!({"Mode": "PassThrough"})
        );
        assert_eq!(written["Role"]["RoleId"], json!("AROAEXAMPLE"));
    }

    #[test]
    fn test_bare_layer_arns_accepted() {
        let mut value = manifest_json();
        value["Configuration"]["Layers"] = json!(["arn:aws:lambda:us-east-1:111111111111:layer:x:1"]);
        let manifest = parse(&value).unwrap();
        assert_eq!(manifest.configuration.layers[0].code_size, None);
    }

    #[test]
    fn test_minimal_manifest_defaults() {
        let value = json!({
            "FunctionName": "f1",
            "Configuration": {
                "FunctionName": "f1",
                "Runtime": "nodejs20.x",
                "Handler": "index.handler",
                "Role": "arn:aws:iam::111111111111:role/r"
            }
        });
        let manifest = parse(&value).unwrap();
        assert_eq!(manifest.configuration.timeout, 3);
        assert_eq!(manifest.configuration.memory_size, 128);
        assert_eq!(manifest.configuration.architectures, vec!["x86_64"]);
        assert!(manifest.role.is_none());
        assert!(manifest.inline_policies.is_empty());
    }

    #[test]
    fn test_missing_configuration_is_malformed() {
        let error = parse(&json!({"FunctionName": "f1"})).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::MalformedManifest);
        assert!(error.to_string().contains("Configuration"));
    }

    #[test]
    fn test_name_mismatch_is_malformed() {
        let mut value = manifest_json();
        value["FunctionName"] = json!("other");
        let error = parse(&value).unwrap_err();
        assert!(error.to_string().contains("does not match"));
    }

    #[test]
    fn test_image_package_rejected() {
        let mut value = manifest_json();
        value["Configuration"]["PackageType"] = json!("Image");
        let error = parse(&value).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::MalformedManifest);
    }

    #[test]
    fn test_out_of_range_limits_rejected() {
        let mut value = manifest_json();
        value["Configuration"]["Timeout"] = json!(0);
        assert!(parse(&value).is_err());

        let mut value = manifest_json();
        value["Configuration"]["MemorySize"] = json!(64);
        assert!(parse(&value).is_err());
    }

    #[test]
    fn test_empty_architectures_rejected() {
        let mut value = manifest_json();
        value["Configuration"]["Architectures"] = json!([]);
        let error = parse(&value).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::MalformedManifest);
        assert!(error.to_string().contains("Architectures"));
    }

    #[test]
    fn test_path_like_names_rejected() {
        assert!(validate_function_name("../etc/passwd").is_err());
        assert!(validate_function_name("ok-name_1").is_ok());
    }

    #[test]
    fn test_source_account_prefers_role_block() {
        let manifest = parse(&manifest_json()).unwrap();
        assert_eq!(manifest.source_account().as_deref(), Some("111111111111"));

        let mut manifest = manifest;
        manifest.role = None;
        manifest.configuration.role = "not-an-arn".to_string();
        assert_eq!(manifest.source_account().as_deref(), Some("111111111111"));
    }

    #[test]
    fn test_document_text() {
        assert_eq!(document_text(&json!({"a": 1})), r#"{"a":1}"#);
        assert_eq!(document_text(&json!("{\"b\":2}")), r#"{"b":2}"#);
    }
}

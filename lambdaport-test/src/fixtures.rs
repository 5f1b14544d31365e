//! Fixture builders for packages and manifests

use crate::{SOURCE_ACCOUNT, TEST_REGION};
use lambdaport_core::{
    EnvironmentConfig, FunctionConfiguration, FunctionManifest, LayerRef, PolicyAttachment,
    RoleDescriptor,
};
use serde_json::{json, Map, Value};
use std::io::Write;
use std::path::Path;

/// Customer-managed policy recorded in [`sample_manifest`]
pub fn app_policy_arn(account: &str, function_name: &str) -> String {
    format!("arn:aws:iam::{account}:policy/{function_name}-access")
}

/// Zip archive holding a single Python handler
pub fn package_zip(function_name: &str) -> Vec<u8> {
    let mut buffer = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buffer));
        let options =
            zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);

        zip.start_file("app.py", options).unwrap();
        zip.write_all(
            format!(
                "def handler(event, context):\n    return {{'statusCode': 200, 'function': '{function_name}'}}\n"
            )
            .as_bytes(),
        )
        .unwrap();
        zip.finish().unwrap();
    }
    buffer
}

/// Lambda trust policy
pub fn trust_policy() -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": {"Service": "lambda.amazonaws.com"},
            "Action": "sts:AssumeRole"
        }]
    })
}

/// Inline policy granting access to a queue owned by `account`
pub fn queue_policy(account: &str, function_name: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Action": ["sqs:SendMessage"],
            "Resource": format!("arn:aws:sqs:{TEST_REGION}:{account}:{function_name}-queue")
        }]
    })
}

/// Role name used for `function_name` in the fixtures
pub fn role_name(function_name: &str) -> String {
    format!("{function_name}-role")
}

/// Configuration of a zip function owned by `account`
pub fn sample_configuration(account: &str, function_name: &str) -> FunctionConfiguration {
    let mut config = FunctionConfiguration::new(
        function_name,
        "python3.12",
        "app.handler",
        format!("arn:aws:iam::{account}:role/{}", role_name(function_name)),
    );
    config.function_arn = Some(format!(
        "arn:aws:lambda:{TEST_REGION}:{account}:function:{function_name}"
    ));
    config.description = format!("{function_name} handler");
    config.timeout = 30;
    config.memory_size = 256;
    config.environment = Some(EnvironmentConfig {
        variables: [("STAGE".to_string(), "dev".to_string())].into(),
    });
    config.layers = vec![LayerRef {
        arn: format!("arn:aws:lambda:{TEST_REGION}:{account}:layer:shared-deps:3"),
        code_size: Some(4096),
    }];
    config
}

/// Role block as the exporter records it
pub fn sample_role(account: &str, function_name: &str) -> RoleDescriptor {
    let name = role_name(function_name);
    RoleDescriptor {
        arn: Some(format!("arn:aws:iam::{account}:role/{name}")),
        role_name: name,
        path: "/".to_string(),
        assume_role_policy_document: trust_policy(),
        description: Some(format!("Execution role for {function_name}")),
        extra: Map::new(),
    }
}

/// Manifest exported from [`SOURCE_ACCOUNT`] with a role, one customer
/// policy, one provider-owned policy and one inline policy
pub fn sample_manifest(function_name: &str) -> FunctionManifest {
    let mut manifest =
        FunctionManifest::new(sample_configuration(SOURCE_ACCOUNT, function_name));
    manifest.role = Some(sample_role(SOURCE_ACCOUNT, function_name));
    manifest.attached_policies = vec![
        PolicyAttachment {
            policy_name: format!("{function_name}-access"),
            policy_arn: app_policy_arn(SOURCE_ACCOUNT, function_name),
        },
        PolicyAttachment {
            policy_name: "AWSXRayDaemonWriteAccess".to_string(),
            policy_arn: "arn:aws:iam::aws:policy/AWSXRayDaemonWriteAccess".to_string(),
        },
    ];
    manifest.inline_policies.insert(
        "queue-access".to_string(),
        queue_policy(SOURCE_ACCOUNT, function_name),
    );
    manifest
}

/// Write `<name>.json` and, when given, `<name>.zip` into `folder`
pub fn write_export(folder: &Path, manifest: &FunctionManifest, package: Option<&[u8]>) {
    std::fs::create_dir_all(folder).unwrap();
    std::fs::write(
        folder.join(FunctionManifest::manifest_file_name(&manifest.function_name)),
        manifest.to_json_pretty().unwrap(),
    )
    .unwrap();
    if let Some(package) = package {
        std::fs::write(manifest.package_path(folder), package).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_manifest_is_valid() {
        let manifest = sample_manifest("f1");
        assert!(manifest.validate().is_ok());
        assert_eq!(manifest.source_account().as_deref(), Some(SOURCE_ACCOUNT));
    }

    #[test]
    fn test_package_zip_is_archive() {
        let zip = package_zip("f1");
        assert_eq!(&zip[..2], b"PK");
    }
}

//! Identity API seam and its AWS IAM implementation

use crate::policy::decode_document;
use async_trait::async_trait;
use aws_sdk_iam::error::{DisplayErrorContext, SdkError};
use aws_sdk_iam::operation::attach_role_policy::AttachRolePolicyError;
use aws_sdk_iam::operation::get_role::GetRoleError;
use aws_sdk_iam::operation::get_role_policy::GetRolePolicyError;
use aws_sdk_iam::primitives::DateTimeFormat;
use aws_sdk_iam::types::Role;
use lambdaport_core::{MigrateError, PolicyAttachment, Result, RoleDescriptor};
use serde_json::{Map, Value};
use tracing::debug;

/// Parameters of a `CreateRole` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRoleRequest {
    pub role_name: String,
    pub path: String,
    /// Trust policy as serialized JSON
    pub assume_role_policy_document: String,
    pub description: String,
}

/// Operations on roles and their policies
#[async_trait]
pub trait IdentityApi: Send + Sync {
    /// `NotFound` if the role does not exist
    async fn get_role(&self, role_name: &str) -> Result<RoleDescriptor>;

    async fn create_role(&self, request: &CreateRoleRequest) -> Result<RoleDescriptor>;

    /// Managed policies attached to the role, all pages
    async fn list_attached_policies(&self, role_name: &str) -> Result<Vec<PolicyAttachment>>;

    /// `NotFound` if the policy does not exist in this account
    async fn attach_policy(&self, role_name: &str, policy_arn: &str) -> Result<()>;

    /// Names of inline policies embedded in the role, all pages
    async fn list_inline_policy_names(&self, role_name: &str) -> Result<Vec<String>>;

    /// Decoded inline policy document
    async fn get_inline_policy(&self, role_name: &str, policy_name: &str) -> Result<Value>;

    /// Create or overwrite an inline policy
    async fn put_inline_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &str,
    ) -> Result<()>;
}

/// [`IdentityApi`] backed by `aws-sdk-iam`
#[derive(Debug, Clone)]
pub struct IamClient {
    client: aws_sdk_iam::Client,
}

impl IamClient {
    pub fn new(client: aws_sdk_iam::Client) -> Self {
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

fn role_from_sdk(role: &Role) -> RoleDescriptor {
    let mut extra = Map::new();
    extra.insert("RoleId".to_string(), role.role_id().into());
    if let Ok(created) = role.create_date().fmt(DateTimeFormat::DateTime) {
        extra.insert("CreateDate".to_string(), created.into());
    }

    RoleDescriptor {
        role_name: role.role_name().to_string(),
        arn: Some(role.arn().to_string()),
        path: role.path().to_string(),
        assume_role_policy_document: role
            .assume_role_policy_document()
            .map_or(Value::Null, decode_document),
        description: role.description().map(str::to_string),
        extra,
    }
}

#[async_trait]
impl IdentityApi for IamClient {
    async fn get_role(&self, role_name: &str) -> Result<RoleDescriptor> {
        debug!(role_name = %role_name, "GetRole");

        let output = match self.client.get_role().role_name(role_name).send().await {
            Ok(output) => output,
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(GetRoleError::is_no_such_entity_exception)
                {
                    return Err(MigrateError::not_found(format!("role {role_name}")));
                }
                return Err(remote_error("GetRole", err));
            }
        };

        output
            .role()
            .map(role_from_sdk)
            .ok_or_else(|| MigrateError::remote("GetRole", "response has no role"))
    }

    async fn create_role(&self, request: &CreateRoleRequest) -> Result<RoleDescriptor> {
        debug!(role_name = %request.role_name, path = %request.path, "CreateRole");

        let output = self
            .client
            .create_role()
            .role_name(&request.role_name)
            .path(&request.path)
            .assume_role_policy_document(&request.assume_role_policy_document)
            .description(&request.description)
            .send()
            .await
            .map_err(|err| remote_error("CreateRole", err))?;

        output
            .role()
            .map(role_from_sdk)
            .ok_or_else(|| MigrateError::remote("CreateRole", "response has no role"))
    }

    async fn list_attached_policies(&self, role_name: &str) -> Result<Vec<PolicyAttachment>> {
        let mut policies = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let output = self
                .client
                .list_attached_role_policies()
                .role_name(role_name)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|err| remote_error("ListAttachedRolePolicies", err))?;

            policies.extend(output.attached_policies().iter().filter_map(|p| {
                Some(PolicyAttachment {
                    policy_name: p.policy_name()?.to_string(),
                    policy_arn: p.policy_arn()?.to_string(),
                })
            }));

            match output.marker() {
                Some(next) if output.is_truncated() => marker = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(policies)
    }

    async fn attach_policy(&self, role_name: &str, policy_arn: &str) -> Result<()> {
        debug!(role_name = %role_name, policy_arn = %policy_arn, "AttachRolePolicy");

        match self
            .client
            .attach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(AttachRolePolicyError::is_no_such_entity_exception) =>
            {
                Err(MigrateError::not_found(format!("policy {policy_arn}")))
            }
            Err(err) => Err(remote_error("AttachRolePolicy", err)),
        }
    }

    async fn list_inline_policy_names(&self, role_name: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let output = self
                .client
                .list_role_policies()
                .role_name(role_name)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|err| remote_error("ListRolePolicies", err))?;

            names.extend(output.policy_names().iter().cloned());

            match output.marker() {
                Some(next) if output.is_truncated() => marker = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(names)
    }

    async fn get_inline_policy(&self, role_name: &str, policy_name: &str) -> Result<Value> {
        let output = match self
            .client
            .get_role_policy()
            .role_name(role_name)
            .policy_name(policy_name)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(GetRolePolicyError::is_no_such_entity_exception)
                {
                    return Err(MigrateError::not_found(format!(
                        "inline policy {policy_name} of role {role_name}"
                    )));
                }
                return Err(remote_error("GetRolePolicy", err));
            }
        };

        Ok(decode_document(output.policy_document()))
    }

    async fn put_inline_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &str,
    ) -> Result<()> {
        debug!(role_name = %role_name, policy_name = %policy_name, "PutRolePolicy");

        self.client
            .put_role_policy()
            .role_name(role_name)
            .policy_name(policy_name)
            .policy_document(document)
            .send()
            .await
            .map_err(|err| remote_error("PutRolePolicy", err))?;

        Ok(())
    }
}

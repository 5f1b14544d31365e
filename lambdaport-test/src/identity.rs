//! In-memory identity API

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use lambdaport_core::arn::Arn;
use lambdaport_core::{MigrateError, PolicyAttachment, Result, RoleDescriptor};
use lambdaport_iam::{decode_document, CreateRoleRequest, IdentityApi};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// A call received by [`FakeIdentity`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityCall {
    GetRole(String),
    CreateRole(String),
    ListAttachedPolicies(String),
    /// Role name, policy ARN
    AttachPolicy(String, String),
    ListInlinePolicyNames(String),
    GetInlinePolicy(String, String),
    PutInlinePolicy(String, String),
}

impl IdentityCall {
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::CreateRole(_) | Self::AttachPolicy(..) | Self::PutInlinePolicy(..)
        )
    }
}

#[derive(Debug, Clone)]
struct StoredRole {
    descriptor: RoleDescriptor,
    attached: Vec<String>,
    /// Inline policy name to document text
    inline: BTreeMap<String, String>,
}

/// [`IdentityApi`] over in-memory roles and managed policies.
///
/// Provider-owned policies (`arn:aws:iam::aws:policy/...`) always exist;
/// customer-managed policies exist only once registered with
/// [`FakeIdentity::add_policy`].
pub struct FakeIdentity {
    account: String,
    roles: DashMap<String, StoredRole>,
    policies: DashSet<String>,
    calls: Mutex<Vec<IdentityCall>>,
    /// Policy ARN to injected attach fault
    attach_faults: Mutex<HashMap<String, String>>,
    /// Inline policy name to injected put fault
    put_faults: Mutex<HashMap<String, String>>,
}

impl FakeIdentity {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            roles: DashMap::new(),
            policies: DashSet::new(),
            calls: Mutex::new(Vec::new()),
            attach_faults: Mutex::new(HashMap::new()),
            put_faults: Mutex::new(HashMap::new()),
        }
    }

    /// Register a customer-managed policy
    pub fn add_policy(&self, policy_arn: impl Into<String>) {
        self.policies.insert(policy_arn.into());
    }

    /// Seed a role with attachments and inline policies
    pub fn insert_role(
        &self,
        descriptor: RoleDescriptor,
        attached: &[&str],
        inline: &[(&str, Value)],
    ) {
        self.roles.insert(
            descriptor.role_name.clone(),
            StoredRole {
                descriptor,
                attached: attached.iter().map(ToString::to_string).collect(),
                inline: inline
                    .iter()
                    .map(|(name, doc)| ((*name).to_string(), doc.to_string()))
                    .collect(),
            },
        );
    }

    /// Make attaching `policy_arn` fail with a remote fault
    pub fn fail_attach(&self, policy_arn: impl Into<String>, message: impl Into<String>) {
        self.attach_faults
            .lock()
            .insert(policy_arn.into(), message.into());
    }

    /// Make writes of the inline policy `policy_name` fail with a remote fault
    pub fn fail_put_inline(&self, policy_name: impl Into<String>, message: impl Into<String>) {
        self.put_faults
            .lock()
            .insert(policy_name.into(), message.into());
    }

    pub fn role(&self, role_name: &str) -> Option<RoleDescriptor> {
        self.roles.get(role_name).map(|r| r.descriptor.clone())
    }

    pub fn role_count(&self) -> usize {
        self.roles.len()
    }

    pub fn attached_policies(&self, role_name: &str) -> Vec<String> {
        self.roles
            .get(role_name)
            .map(|r| r.attached.clone())
            .unwrap_or_default()
    }

    /// Parsed inline policy document
    pub fn inline_policy(&self, role_name: &str, policy_name: &str) -> Option<Value> {
        self.roles
            .get(role_name)
            .and_then(|r| r.inline.get(policy_name).map(|text| decode_document(text)))
    }

    pub fn calls(&self) -> Vec<IdentityCall> {
        self.calls.lock().clone()
    }

    pub fn mutating_calls(&self) -> Vec<IdentityCall> {
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

    fn record(&self, call: IdentityCall) {
        self.calls.lock().push(call);
    }

    fn policy_exists(&self, policy_arn: &str) -> bool {
        Arn::parse(policy_arn).is_some_and(|arn| arn.is_aws_managed())
            || self.policies.contains(policy_arn)
    }
}

fn role_not_found(role_name: &str) -> MigrateError {
    MigrateError::not_found(format!("role {role_name}"))
}

#[async_trait]
impl IdentityApi for FakeIdentity {
    async fn get_role(&self, role_name: &str) -> Result<RoleDescriptor> {
        self.record(IdentityCall::GetRole(role_name.to_string()));
        self.role(role_name).ok_or_else(|| role_not_found(role_name))
    }

    async fn create_role(&self, request: &CreateRoleRequest) -> Result<RoleDescriptor> {
        let name = &request.role_name;
        self.record(IdentityCall::CreateRole(name.clone()));

        if self.roles.contains_key(name) {
            return Err(MigrateError::remote(
                "CreateRole",
                format!("EntityAlreadyExists: Role with name {name} already exists."),
            ));
        }

        let mut extra = Map::new();
        extra.insert(
            "RoleId".to_string(),
            format!("AROA{:0>17}", self.roles.len() + 1).into(),
        );

        let descriptor = RoleDescriptor {
            role_name: name.clone(),
            arn: Some(format!(
                "arn:aws:iam::{}:role{}{name}",
                self.account, request.path
            )),
            path: request.path.clone(),
            assume_role_policy_document: decode_document(&request.assume_role_policy_document),
            description: Some(request.description.clone()),
            extra,
        };
        self.insert_role(descriptor.clone(), &[], &[]);
        Ok(descriptor)
    }

    async fn list_attached_policies(&self, role_name: &str) -> Result<Vec<PolicyAttachment>> {
        self.record(IdentityCall::ListAttachedPolicies(role_name.to_string()));
        let role = self
            .roles
            .get(role_name)
            .ok_or_else(|| role_not_found(role_name))?;

        Ok(role
            .attached
            .iter()
            .map(|arn| PolicyAttachment {
                policy_name: Arn::parse(arn)
                    .map_or_else(|| arn.clone(), |a| a.resource_name().to_string()),
                policy_arn: arn.clone(),
            })
            .collect())
    }

    async fn attach_policy(&self, role_name: &str, policy_arn: &str) -> Result<()> {
        self.record(IdentityCall::AttachPolicy(
            role_name.to_string(),
            policy_arn.to_string(),
        ));

        if let Some(message) = self.attach_faults.lock().get(policy_arn) {
            return Err(MigrateError::remote("AttachRolePolicy", message.clone()));
        }
        if !self.policy_exists(policy_arn) {
            return Err(MigrateError::not_found(format!("policy {policy_arn}")));
        }

        let mut role = self
            .roles
            .get_mut(role_name)
            .ok_or_else(|| role_not_found(role_name))?;
        if !role.attached.iter().any(|a| a == policy_arn) {
            role.attached.push(policy_arn.to_string());
        }
        Ok(())
    }

    async fn list_inline_policy_names(&self, role_name: &str) -> Result<Vec<String>> {
        self.record(IdentityCall::ListInlinePolicyNames(role_name.to_string()));
        let role = self
            .roles
            .get(role_name)
            .ok_or_else(|| role_not_found(role_name))?;
        Ok(role.inline.keys().cloned().collect())
    }

    async fn get_inline_policy(&self, role_name: &str, policy_name: &str) -> Result<Value> {
        self.record(IdentityCall::GetInlinePolicy(
            role_name.to_string(),
            policy_name.to_string(),
        ));
        self.inline_policy(role_name, policy_name).ok_or_else(|| {
            MigrateError::not_found(format!("inline policy {policy_name} of role {role_name}"))
        })
    }

    async fn put_inline_policy(
        &self,
        role_name: &str,
        policy_name: &str,
        document: &str,
    ) -> Result<()> {
        self.record(IdentityCall::PutInlinePolicy(
            role_name.to_string(),
            policy_name.to_string(),
        ));
        if let Some(message) = self.put_faults.lock().get(policy_name) {
            return Err(MigrateError::remote("PutRolePolicy", message.clone()));
        }
        let mut role = self
            .roles
            .get_mut(role_name)
            .ok_or_else(|| role_not_found(role_name))?;
        role.inline
            .insert(policy_name.to_string(), document.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DESTINATION_ACCOUNT;
    use lambdaport_iam::BASELINE_EXECUTION_POLICY_ARN;
    use serde_json::json;

    fn create_request(name: &str) -> CreateRoleRequest {
        CreateRoleRequest {
            role_name: name.to_string(),
            path: "/service-role/".to_string(),
            assume_role_policy_document: json!({"Version": "2012-10-17"}).to_string(),
            description: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_role() {
        let identity = FakeIdentity::new(DESTINATION_ACCOUNT);
        assert!(identity.get_role("r1").await.unwrap_err().is_not_found());

        let role = identity.create_role(&create_request("r1")).await.unwrap();
        assert_eq!(
            role.arn.as_deref(),
            Some("arn:aws:iam::222222222222:role/service-role/r1")
        );
        assert_eq!(role.assume_role_policy_document["Version"], "2012-10-17");
        assert_eq!(identity.get_role("r1").await.unwrap(), role);
    }

    #[tokio::test]
    async fn test_attach_requires_existing_policy() {
        let identity = FakeIdentity::new(DESTINATION_ACCOUNT);
        identity.create_role(&create_request("r1")).await.unwrap();

        let missing = "arn:aws:iam::222222222222:policy/missing";
        assert!(identity
            .attach_policy("r1", missing)
            .await
            .unwrap_err()
            .is_not_found());

        identity
            .attach_policy("r1", BASELINE_EXECUTION_POLICY_ARN)
            .await
            .unwrap();
        identity
            .attach_policy("r1", BASELINE_EXECUTION_POLICY_ARN)
            .await
            .unwrap();
        assert_eq!(
            identity.attached_policies("r1"),
            vec![BASELINE_EXECUTION_POLICY_ARN]
        );

        let listed = identity.list_attached_policies("r1").await.unwrap();
        assert_eq!(listed[0].policy_name, "AWSLambdaBasicExecutionRole");
    }

    #[tokio::test]
    async fn test_inline_policies() {
        let identity = FakeIdentity::new(DESTINATION_ACCOUNT);
        identity.create_role(&create_request("r1")).await.unwrap();
        identity
            .put_inline_policy("r1", "logs", r#"{"Statement":[]}"#)
            .await
            .unwrap();

        assert_eq!(
            identity.list_inline_policy_names("r1").await.unwrap(),
            vec!["logs"]
        );
        assert_eq!(
            identity.get_inline_policy("r1", "logs").await.unwrap(),
            json!({"Statement": []})
        );
    }
}

//! Execution role reconciliation at the destination

use lambdaport_core::arn::{rewrite_account, Arn};
use lambdaport_core::manifest::document_text;
use lambdaport_core::{FunctionManifest, Result, RoleDescriptor};
use lambdaport_iam::policy::{destination_policy_arn, rewrite_document_accounts};
use lambdaport_iam::{CreateRoleRequest, IdentityApi};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Description given to roles created without one
pub const DEFAULT_ROLE_DESCRIPTION: &str = "Imported by lambdaport";

/// Source and destination accounts of an import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMapping {
    /// Account the manifest was exported from, when any recorded ARN names one
    pub source: Option<String>,
    pub destination: String,
}

impl AccountMapping {
    /// Move an ARN owned by the source account to the destination account
    pub fn rewrite_arn(&self, arn: &str) -> String {
        match &self.source {
            Some(source) => rewrite_account(arn, source, &self.destination),
            None => arn.to_string(),
        }
    }

    fn rewrite_policy_arn(&self, arn: &str) -> String {
        match &self.source {
            Some(source) => destination_policy_arn(arn, source, &self.destination),
            None => arn.to_string(),
        }
    }

    fn rewrite_document(&self, document: &Value) -> Value {
        match &self.source {
            Some(source) => rewrite_document_accounts(document, source, &self.destination),
            None => document.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoleSettings {
    /// Attached in place of a recorded policy that cannot be attached
    pub baseline_policy_arn: String,
    /// Pause after creating a role so it can be assumed by new functions
    pub propagation_delay: Duration,
}

/// Make sure the function's execution role exists at the destination with
/// the recorded policies, and return the role ARN the function should use.
///
/// Without a role block the configured role ARN is moved to the destination
/// account and used as is. Inline policies that cannot be written are logged
/// and skipped. Nothing is ever detached or deleted.
pub async fn ensure_role(
    identity: &dyn IdentityApi,
    manifest: &FunctionManifest,
    accounts: &AccountMapping,
    settings: &RoleSettings,
) -> Result<String> {
    let Some(role) = &manifest.role else {
        return Ok(accounts.rewrite_arn(&manifest.configuration.role));
    };
    let role_name = role.role_name.as_str();

    match identity.get_role(role_name).await {
        Ok(_) => info!(role_name = %role_name, "Role already exists"),
        Err(e) if e.is_not_found() => {
            info!(role_name = %role_name, "Creating role");
            identity.create_role(&create_request(role)).await?;
            tokio::time::sleep(settings.propagation_delay).await;
        }
        Err(e) => return Err(e),
    }

    let mut attached: HashSet<String> = identity
        .list_attached_policies(role_name)
        .await?
        .into_iter()
        .map(|p| p.policy_arn)
        .collect();

    for policy in &manifest.attached_policies {
        let target = accounts.rewrite_policy_arn(&policy.policy_arn);
        if attached.contains(&target) {
            debug!(role_name = %role_name, policy_arn = %target, "Policy already attached");
            continue;
        }

        match identity.attach_policy(role_name, &target).await {
            Ok(()) => {
                info!(role_name = %role_name, policy_arn = %target, "Attached policy");
                attached.insert(target);
            }
            Err(e) => {
                warn!(
                    role_name = %role_name,
                    policy_arn = %target,
                    baseline = %settings.baseline_policy_arn,
                    error = %e,
                    "Could not attach policy, attaching baseline policy instead"
                );
                if attached.insert(settings.baseline_policy_arn.clone()) {
                    identity
                        .attach_policy(role_name, &settings.baseline_policy_arn)
                        .await?;
                }
            }
        }
    }

    for (policy_name, document) in &manifest.inline_policies {
        let document = accounts.rewrite_document(document);
        match identity
            .put_inline_policy(role_name, policy_name, &document_text(&document))
            .await
        {
            Ok(()) => debug!(role_name = %role_name, policy_name = %policy_name, "Put inline policy"),
            Err(e) => warn!(
                role_name = %role_name,
                policy_name = %policy_name,
                error = %e,
                "Could not put inline policy, continuing without it"
            ),
        }
    }

    Ok(destination_role_arn(role, manifest, &accounts.destination))
}

fn create_request(role: &RoleDescriptor) -> CreateRoleRequest {
    CreateRoleRequest {
        role_name: role.role_name.clone(),
        path: normalize_path(&role.path),
        assume_role_policy_document: document_text(&role.assume_role_policy_document),
        description: role
            .description
            .clone()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| DEFAULT_ROLE_DESCRIPTION.to_string()),
    }
}

/// IAM paths start and end with `/`
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

fn destination_role_arn(role: &RoleDescriptor, manifest: &FunctionManifest, account: &str) -> String {
    let partition = role
        .arn
        .as_deref()
        .and_then(Arn::parse)
        .or_else(|| Arn::parse(&manifest.configuration.role))
        .map_or_else(|| "aws".to_string(), |arn| arn.partition);

    format!(
        "arn:{partition}:iam::{account}:role{}{}",
        normalize_path(&role.path),
        role.role_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("service-role"), "/service-role/");
        assert_eq!(normalize_path("/service-role/"), "/service-role/");
    }

    #[test]
    fn test_account_mapping_without_source_is_identity() {
        let mapping = AccountMapping {
            source: None,
            destination: "222222222222".to_string(),
        };
        let arn = "arn:aws:iam::111111111111:role/r";
        assert_eq!(mapping.rewrite_arn(arn), arn);
    }

    #[test]
    fn test_account_mapping_rewrites_source_only() {
        let mapping = AccountMapping {
            source: Some("111111111111".to_string()),
            destination: "222222222222".to_string(),
        };
        assert_eq!(
            mapping.rewrite_arn("arn:aws:lambda:us-east-1:111111111111:layer:deps:3"),
            "arn:aws:lambda:us-east-1:222222222222:layer:deps:3"
        );
        assert_eq!(
            mapping.rewrite_arn("arn:aws:lambda:us-east-1:580247275435:layer:Insights:38"),
            "arn:aws:lambda:us-east-1:580247275435:layer:Insights:38"
        );
    }
}

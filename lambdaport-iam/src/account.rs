//! Caller account discovery

use async_trait::async_trait;
use aws_sdk_sts::error::DisplayErrorContext;
use lambdaport_core::{MigrateError, Result};

/// Resolves the account id the credentials belong to
#[async_trait]
pub trait AccountResolver: Send + Sync {
    async fn caller_account_id(&self) -> Result<String>;
}

/// [`AccountResolver`] backed by STS `GetCallerIdentity`
#[derive(Debug, Clone)]
pub struct StsAccountResolver {
    client: aws_sdk_sts::Client,
}

impl StsAccountResolver {
    pub fn new(client: aws_sdk_sts::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AccountResolver for StsAccountResolver {
    async fn caller_account_id(&self) -> Result<String> {
        let output = self
            .client
            .get_caller_identity()
            .send()
            .await
            .map_err(|err| {
                MigrateError::remote("GetCallerIdentity", DisplayErrorContext(&err).to_string())
            })?;

        output
            .account()
            .map(str::to_string)
            .ok_or_else(|| MigrateError::remote("GetCallerIdentity", "response has no account"))
    }
}

/// Fixed account id, used when the destination is configured explicitly
#[derive(Debug, Clone)]
pub struct StaticAccount(pub String);

#[async_trait]
impl AccountResolver for StaticAccount {
    async fn caller_account_id(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

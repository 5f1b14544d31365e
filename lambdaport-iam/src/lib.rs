//! IAM access for lambdaport
//!
//! Provides the [`IdentityApi`] seam for roles and their policies, its AWS
//! implementation, policy document helpers, and discovery of the caller's
//! account id.

pub mod account;
pub mod client;
pub mod policy;

pub use account::{AccountResolver, StaticAccount, StsAccountResolver};
pub use client::{CreateRoleRequest, IamClient, IdentityApi};
pub use policy::{decode_document, rewrite_document_accounts, BASELINE_EXECUTION_POLICY_ARN};

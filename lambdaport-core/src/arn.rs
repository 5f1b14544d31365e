//! Account-scoped ARN handling
//!
//! Resources move between accounts by rewriting the account segment of their
//! ARNs. Provider-owned resources (account segment `aws`) are global and are
//! never rewritten.

use std::fmt;

/// Account segment used by provider-owned managed policies
pub const AWS_MANAGED_ACCOUNT: &str = "aws";

/// A parsed ARN: `arn:partition:service:region:account:resource`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Arn {
    pub partition: String,
    pub service: String,
    pub region: String,
    pub account: String,
    /// Everything after the account segment, colons included
    pub resource: String,
}

impl Arn {
    /// Parse an ARN string. Returns `None` if it does not have six segments.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.splitn(6, ':');
        if parts.next()? != "arn" {
            return None;
        }
        let partition = parts.next()?;
        let service = parts.next()?;
        let region = parts.next()?;
        let account = parts.next()?;
        let resource = parts.next()?;

        if partition.is_empty() || service.is_empty() || resource.is_empty() {
            return None;
        }

        Some(Self {
            partition: partition.to_string(),
            service: service.to_string(),
            region: region.to_string(),
            account: account.to_string(),
            resource: resource.to_string(),
        })
    }

    /// Whether this ARN names a provider-owned global resource
    pub fn is_aws_managed(&self) -> bool {
        self.account == AWS_MANAGED_ACCOUNT
    }

    /// Copy of this ARN owned by another account
    pub fn with_account(&self, account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            ..self.clone()
        }
    }

    /// Last `/`-separated segment of the resource, e.g. the role name
    pub fn resource_name(&self) -> &str {
        self.resource.rsplit('/').next().unwrap_or(&self.resource)
    }

    /// IAM path of the resource (`/` when the resource has no path)
    pub fn resource_path(&self) -> String {
        let segments: Vec<&str> = self.resource.split('/').collect();
        if segments.len() <= 2 {
            return "/".to_string();
        }
        format!("/{}/", segments[1..segments.len() - 1].join("/"))
    }
}

impl fmt::Display for Arn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arn:{}:{}:{}:{}:{}",
            self.partition, self.service, self.region, self.account, self.resource
        )
    }
}

/// Rewrite the account segment of `arn` from `from` to `to`.
///
/// Only ARNs owned by `from` change. Provider-owned ARNs, ARNs owned by a
/// third account, and strings that are not ARNs are returned unchanged.
pub fn rewrite_account(arn: &str, from: &str, to: &str) -> String {
    match Arn::parse(arn) {
        Some(parsed) if !parsed.is_aws_managed() && parsed.account == from => {
            parsed.with_account(to).to_string()
        }
        _ => arn.to_string(),
    }
}

/// Replace every standalone occurrence of account id `from` in `text`.
///
/// An occurrence only counts when it is not part of a longer run of digits,
/// so `1234567890123` is left alone when `from` is `234567890123`.
pub fn rewrite_account_in_text(text: &str, from: &str, to: &str) -> String {
    if from.is_empty() || from == to {
        return text.to_string();
    }

    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for (start, _) in text.match_indices(from) {
        if start < last {
            continue;
        }
        let end = start + from.len();
        let digit_before = start > 0 && bytes[start - 1].is_ascii_digit();
        let digit_after = end < bytes.len() && bytes[end].is_ascii_digit();
        if digit_before || digit_after {
            continue;
        }
        out.push_str(&text[last..start]);
        out.push_str(to);
        last = end;
    }

    out.push_str(&text[last..]);
    out
}

/// Whether `value` looks like a 12-digit account id
pub fn is_account_id(value: &str) -> bool {
    value.len() == 12 && value.bytes().all(|b| b.is_ascii_digit())
}

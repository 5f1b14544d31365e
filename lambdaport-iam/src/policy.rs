//! Policy document helpers

use lambdaport_core::arn::{rewrite_account, rewrite_account_in_text, Arn};
use percent_encoding::percent_decode_str;
use serde_json::Value;

/// Managed policy attached when a recorded policy cannot be attached at the
/// destination
pub const BASELINE_EXECUTION_POLICY_ARN: &str =
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";

/// Decode a policy document as returned by IAM.
///
/// IAM returns documents URL-encoded. The decoded text is parsed as JSON;
/// text that does not parse is kept as a JSON string so nothing is lost.
pub fn decode_document(raw: &str) -> Value {
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_or_else(|_| raw.to_string(), |text| text.into_owned());

    serde_json::from_str(&decoded).unwrap_or(Value::String(decoded))
}

/// Copy of `document` with account id `from` replaced by `to` in every
/// string value. Keys are left alone.
pub fn rewrite_document_accounts(document: &Value, from: &str, to: &str) -> Value {
    match document {
        Value::String(text) => Value::String(rewrite_account_in_text(text, from, to)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| rewrite_document_accounts(item, from, to))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), rewrite_document_accounts(v, from, to)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// ARN a recorded managed policy should have at the destination.
///
/// Provider-owned policies are global and keep their ARN.
pub fn destination_policy_arn(policy_arn: &str, source: &str, destination: &str) -> String {
    rewrite_account(policy_arn, source, destination)
}

/// Whether `policy_arn` names a provider-owned global policy
pub fn is_global_policy(policy_arn: &str) -> bool {
    Arn::parse(policy_arn).is_some_and(|arn| arn.is_aws_managed())
}

/// Role name from a role ARN (the last path segment)
pub fn role_name_from_arn(role_arn: &str) -> Option<String> {
    Arn::parse(role_arn)
        .filter(|arn| arn.service == "iam" && arn.resource.starts_with("role/"))
        .map(|arn| arn.resource_name().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_url_encoded_document() {
        let raw = "%7B%22Version%22%3A%222012-10-17%22%2C%22Statement%22%3A%5B%5D%7D";
        assert_eq!(
            decode_document(raw),
            json!({"Version": "2012-10-17", "Statement": []})
        );
    }

    #[test]
    fn test_decode_plain_json() {
        assert_eq!(decode_document(r#"{"a":1}"#), json!({"a": 1}));
    }

    #[test]
    fn test_decode_garbage_kept_as_string() {
        assert_eq!(decode_document("not json"), json!("not json"));
    }

    #[test]
    fn test_rewrite_document_accounts() {
        let document = json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Action": "sqs:SendMessage",
                "Resource": [
                    "arn:aws:sqs:eu-west-1:111111111111:orders",
                    "arn:aws:sqs:eu-west-1:333333333333:audit"
                ],
                "Condition": {"StringEquals": {"aws:SourceAccount": "111111111111"}}
            }]
        });

        let rewritten = rewrite_document_accounts(&document, "111111111111", "222222222222");
        let statement = &rewritten["Statement"][0];
        assert_eq!(
            statement["Resource"],
            json!([
                "arn:aws:sqs:eu-west-1:222222222222:orders",
                "arn:aws:sqs:eu-west-1:333333333333:audit"
            ])
        );
        assert_eq!(
            statement["Condition"]["StringEquals"]["aws:SourceAccount"],
            "222222222222"
        );
        assert_eq!(statement["Effect"], "Allow");
    }

    #[test]
    fn test_destination_policy_arn() {
        assert_eq!(
            destination_policy_arn(
                "arn:aws:iam::111111111111:policy/orders-access",
                "111111111111",
                "222222222222"
            ),
            "arn:aws:iam::222222222222:policy/orders-access"
        );
        assert_eq!(
            destination_policy_arn(BASELINE_EXECUTION_POLICY_ARN, "111111111111", "222222222222"),
            BASELINE_EXECUTION_POLICY_ARN
        );
        assert!(is_global_policy(BASELINE_EXECUTION_POLICY_ARN));
        assert!(!is_global_policy("arn:aws:iam::111111111111:policy/x"));
    }

    #[test]
    fn test_role_name_from_arn() {
        assert_eq!(
            role_name_from_arn("arn:aws:iam::111111111111:role/service-role/orders-role")
                .as_deref(),
            Some("orders-role")
        );
        assert_eq!(role_name_from_arn("arn:aws:iam::111111111111:policy/x"), None);
        assert_eq!(role_name_from_arn("orders-role"), None);
    }
}

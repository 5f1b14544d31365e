//! Code package download

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use bytes::Bytes;
use lambdaport_core::{MigrateError, Result};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;

/// Fetches a code package from the location reported by the compute API
#[async_trait]
pub trait PackageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes>;
}

/// [`PackageFetcher`] over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MigrateError::Download(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PackageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        let redacted = redact_url(url);
        debug!(url = %redacted, "Downloading package");

        // Pre-signed URLs carry credentials in the query, keep them out of errors
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MigrateError::Download(format!("{redacted}: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MigrateError::Download(format!(
                "{redacted}: HTTP {}",
                status.as_u16()
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| MigrateError::Download(format!("{redacted}: {}", e.without_url())))
    }
}

/// `url` without its query string and fragment
pub fn redact_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => "<invalid url>".to_string(),
    }
}

/// Base64 SHA-256 digest, the encoding used by `CodeSha256`
pub fn code_sha256(code: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code);
    general_purpose::STANDARD.encode(hasher.finalize())
}

/// Check downloaded bytes against the digest the compute API reported
pub fn verify_package(code: &[u8], expected: &str) -> Result<()> {
    let actual = code_sha256(code);
    if actual == expected {
        Ok(())
    } else {
        Err(MigrateError::Download(format!(
            "package digest mismatch: expected {expected}, got {actual}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_url_drops_signature() {
        assert_eq!(
            redact_url("https://bucket.s3.amazonaws.com/f1.zip?X-Amz-Signature=abc&X-Amz-Credential=def"),
            "https://bucket.s3.amazonaws.com/f1.zip"
        );
        assert_eq!(redact_url("not a url"), "<invalid url>");
    }

    #[test]
    fn test_verify_package() {
        let code = b"PK\x03\x04 package";
        let digest = code_sha256(code);
        assert!(verify_package(code, &digest).is_ok());

        let err = verify_package(b"other", &digest).unwrap_err();
        assert_eq!(err.kind(), lambdaport_core::ErrorKind::Download);
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            code_sha256(b""),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[tokio::test]
    async fn test_fetch_errors_omit_query_string() {
        let server = lambdaport_test::PackageServer::start().await.unwrap();
        server.add("f1.zip", b"PK package".to_vec());
        let fetcher = HttpFetcher::new(Duration::from_secs(10)).unwrap();

        let signed = format!("{}?X-Amz-Signature=secret", server.package_url("f1.zip"));
        assert_eq!(fetcher.fetch(&signed).await.unwrap().as_ref(), b"PK package");

        let missing = format!("{}?X-Amz-Signature=secret", server.package_url("f2.zip"));
        let message = fetcher.fetch(&missing).await.unwrap_err().to_string();
        assert!(message.contains("HTTP 404"));
        assert!(message.contains("/packages/f2.zip"));
        assert!(!message.contains("secret"));
    }
}

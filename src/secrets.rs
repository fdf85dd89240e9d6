//! Credential decryption
//!
//! Credentials arrive as base64 encoded ciphertext produced by the key
//! management service. They are decrypted on every connection attempt; nothing
//! is cached.

use async_trait::async_trait;
use aws_sdk_kms::primitives::Blob;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

use crate::error::SecretError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretResolver: Send + Sync {
    /// Decrypt a base64 encoded ciphertext into its UTF-8 plaintext
    async fn decrypt(&self, encoded: &str) -> Result<String, SecretError>;
}

/// Decode the base64 envelope around a ciphertext blob
pub fn decode_envelope(encoded: &str) -> Result<Vec<u8>, SecretError> {
    Ok(STANDARD.decode(encoded.trim())?)
}

/// Resolve an optional configured credential, failing when it is absent
pub async fn resolve_credential(
    resolver: &dyn SecretResolver,
    name: &str,
    encoded: Option<&str>,
) -> Result<String, SecretError> {
    let encoded = encoded
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| SecretError::MissingCredential {
            name: name.to_string(),
        })?;
    resolver.decrypt(encoded).await
}

/// AWS KMS backed resolver
pub struct KmsSecretResolver {
    client: aws_sdk_kms::Client,
}

impl KmsSecretResolver {
    pub fn new(client: aws_sdk_kms::Client) -> Self {
        Self { client }
    }

    pub async fn from_env() -> Self {
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(aws_sdk_kms::Client::new(&sdk_config))
    }
}

#[async_trait]
impl SecretResolver for KmsSecretResolver {
    async fn decrypt(&self, encoded: &str) -> Result<String, SecretError> {
        let ciphertext = decode_envelope(encoded)?;
        debug!("Submitting {} byte ciphertext to KMS", ciphertext.len());

        let output = self
            .client
            .decrypt()
            .ciphertext_blob(Blob::new(ciphertext))
            .send()
            .await
            .map_err(|e| SecretError::Service {
                message: aws_sdk_kms::error::DisplayErrorContext(&e).to_string(),
            })?;

        let plaintext = output.plaintext().ok_or(SecretError::MissingPlaintext)?;
        Ok(String::from_utf8(plaintext.as_ref().to_vec())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_envelope_accepts_padded_base64() {
        let bytes = decode_envelope(" c2VjcmV0 ").unwrap();
        assert_eq!(bytes, b"secret");
    }

    #[test]
    fn test_decode_envelope_rejects_malformed_input() {
        let err = decode_envelope("not*base64").unwrap_err();
        assert!(matches!(err, SecretError::Encoding(_)));
    }

    #[tokio::test]
    async fn test_resolve_credential_passes_ciphertext_through() {
        let mut resolver = MockSecretResolver::new();
        resolver
            .expect_decrypt()
            .withf(|encoded: &str| encoded == "Y2lwaGVy")
            .times(1)
            .returning(|_| Ok("db2user".to_string()));

        let value = resolve_credential(&resolver, "database_username", Some("Y2lwaGVy"))
            .await
            .unwrap();
        assert_eq!(value, "db2user");
    }

    #[tokio::test]
    async fn test_resolve_credential_missing_value() {
        let mut resolver = MockSecretResolver::new();
        resolver.expect_decrypt().never();

        let err = resolve_credential(&resolver, "server_password", None)
            .await
            .unwrap_err();
        assert!(matches!(err, SecretError::MissingCredential { ref name } if name == "server_password"));
    }
}

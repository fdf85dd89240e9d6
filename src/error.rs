//! Error taxonomy for the conversion workflow
//!
//! Every failure that can end a conversion attempt maps onto one of these
//! variants. The `Display` output is what lands in the incident work notes,
//! so messages are written for an operator, not for a developer.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Connection not established with {profile}. Error : {message}")]
    Connection { profile: String, message: String },

    #[error("Problem while uploading {local} to the server: {message}")]
    Transfer { local: String, message: String },

    #[error("Error occurred in executing batch: {message}")]
    Execution { message: String },

    #[error("Verification failed for VIN {vin}: {message}")]
    Verification { vin: String, message: String },

    #[error("Problem occurred while creating local file {}: {source}", path.display())]
    ControlFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Unexpected error: {message}")]
    Unexpected { message: String },
}

impl ConversionError {
    pub fn configuration(message: impl Into<String>) -> Self {
        ConversionError::Configuration {
            message: message.into(),
        }
    }

    pub fn connection(profile: &str, message: impl std::fmt::Display) -> Self {
        ConversionError::Connection {
            profile: profile.to_string(),
            message: message.to_string(),
        }
    }

    pub fn unexpected(message: impl std::fmt::Display) -> Self {
        ConversionError::Unexpected {
            message: message.to_string(),
        }
    }

    /// Map a credential failure met while connecting to `profile`.
    ///
    /// Absent or malformed credentials are configuration problems; anything
    /// else came from the key management service and counts as a connection
    /// failure.
    pub fn from_secret(profile: &str, error: SecretError) -> Self {
        match error {
            SecretError::MissingCredential { .. } | SecretError::Encoding(_) => {
                ConversionError::configuration(format!("{profile}: {error}"))
            }
            other => ConversionError::connection(profile, other),
        }
    }

    /// Whether another connection attempt could succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ConversionError::Configuration { .. })
    }
}

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Encoded credential is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("Key management decrypt failed: {message}")]
    Service { message: String },

    #[error("Key management returned no plaintext")]
    MissingPlaintext,

    #[error("Decrypted credential is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Credential {name} is not configured")]
    MissingCredential { name: String },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("No invocation target configured for {purpose}")]
    MissingTarget { purpose: String },

    #[error("Could not serialize notification payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invocation of {target} failed: {message}")]
    Invocation { target: String, message: String },
}

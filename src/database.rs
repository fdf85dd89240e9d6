//! Relational database access
//!
//! Connections are opened per conversion attempt, used for a handful of
//! single-row reads and closed again. There is no pool and no reuse across
//! invocations.

use async_trait::async_trait;
use sqlx::any::AnyRow;
use sqlx::AnyConnection;
use sqlx::{Connection, Row};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use crate::config::{ConverterConfig, DatabaseProfile};
use crate::error::ConversionError;
use crate::retry::RetryPolicy;
use crate::secrets::{resolve_credential, SecretResolver};

/// One result row, columns in select order. `None` is SQL NULL.
pub type QueryRow = Vec<Option<String>>;

#[async_trait]
pub trait DatabaseGateway: Send + Sync {
    /// Open a connection for the named profile
    async fn connect(&self, profile_name: &str) -> Result<Box<dyn DatabaseConnection>, ConversionError>;
}

#[async_trait]
pub trait DatabaseConnection: Send {
    /// Run a read statement and fetch at most one row
    async fn query_one(&mut self, sql: &str) -> Result<Option<QueryRow>, ConversionError>;

    /// Release the connection. The handle is single use.
    async fn close(self: Box<Self>) -> Result<(), ConversionError>;
}

/// Quote a value as an SQL string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Database gateway over sqlx's driver-agnostic connection
pub struct SqlxDatabaseGateway {
    config: Arc<ConverterConfig>,
    secrets: Arc<dyn SecretResolver>,
    retry: RetryPolicy,
}

impl SqlxDatabaseGateway {
    pub fn new(config: Arc<ConverterConfig>, secrets: Arc<dyn SecretResolver>) -> Self {
        sqlx::any::install_default_drivers();
        let retry = RetryPolicy::from_settings(&config.retry);
        Self {
            config,
            secrets,
            retry,
        }
    }

    async fn connect_once(&self, profile_name: &str) -> Result<SqlxConnection, ConversionError> {
        info!("Establishing connection with {} database...", profile_name);
        let profile = self.config.database_profile(profile_name)?;

        let credentials = &self.config.credentials;
        let username = resolve_credential(
            self.secrets.as_ref(),
            "database_username",
            credentials.database_username.as_deref(),
        )
        .await
        .map_err(|e| ConversionError::from_secret(profile_name, e))?;
        let password = resolve_credential(
            self.secrets.as_ref(),
            "database_password",
            credentials.database_password.as_deref(),
        )
        .await
        .map_err(|e| ConversionError::from_secret(profile_name, e))?;

        let url = connection_url(profile, &username, &password)?;

        let connection = AnyConnection::connect(url.as_str())
            .await
            .map_err(|e| ConversionError::connection(profile_name, e))?;

        info!("Connected to {} database", profile_name);
        Ok(SqlxConnection {
            profile: profile_name.to_string(),
            inner: connection,
        })
    }
}

#[async_trait]
impl DatabaseGateway for SqlxDatabaseGateway {
    async fn connect(&self, profile_name: &str) -> Result<Box<dyn DatabaseConnection>, ConversionError> {
        let connection = self
            .retry
            .execute_when("Database connection", ConversionError::is_retryable, || {
                self.connect_once(profile_name)
            })
            .await?;
        Ok(Box::new(connection))
    }
}

/// Build the driver URL for a profile. Contains the password, never log it.
pub fn connection_url(
    profile: &DatabaseProfile,
    username: &str,
    password: &str,
) -> Result<Url, ConversionError> {
    let mut url = Url::parse(&format!(
        "{}://{}:{}/{}",
        profile.protocol, profile.hostname, profile.port, profile.database
    ))
    .map_err(|e| ConversionError::configuration(format!("Invalid database profile: {e}")))?;

    url.set_username(username)
        .and_then(|_| url.set_password(Some(password)))
        .map_err(|_| {
            ConversionError::configuration(format!(
                "Database protocol {} does not accept credentials",
                profile.protocol
            ))
        })?;
    Ok(url)
}

struct SqlxConnection {
    profile: String,
    inner: AnyConnection,
}

#[async_trait]
impl DatabaseConnection for SqlxConnection {
    async fn query_one(&mut self, sql: &str) -> Result<Option<QueryRow>, ConversionError> {
        debug!("Executing query on {}", self.profile);
        let row = sqlx::query(sql)
            .persistent(false)
            .fetch_optional(&mut self.inner)
            .await
            .map_err(|e| ConversionError::Query {
                message: e.to_string(),
            })?;

        row.map(|row| row_to_text(&row)).transpose()
    }

    async fn close(self: Box<Self>) -> Result<(), ConversionError> {
        let profile = self.profile.clone();
        self.inner
            .close()
            .await
            .map_err(|e| ConversionError::unexpected(format!("Closing {profile} connection: {e}")))
    }
}

fn row_to_text(row: &AnyRow) -> Result<QueryRow, ConversionError> {
    (0..row.len())
        .map(|index| {
            if let Ok(text) = row.try_get::<Option<String>, _>(index) {
                return Ok(text);
            }
            if let Ok(number) = row.try_get::<Option<i64>, _>(index) {
                return Ok(number.map(|n| n.to_string()));
            }
            row.try_get::<Option<f64>, _>(index)
                .map(|number| number.map(|n| n.to_string()))
                .map_err(|e| ConversionError::Query {
                    message: format!("Column {index} is not readable as text: {e}"),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> DatabaseProfile {
        DatabaseProfile {
            protocol: "postgres".to_string(),
            hostname: "db.internal".to_string(),
            port: 50000,
            database: "CVPDB".to_string(),
        }
    }

    #[test]
    fn test_quote_literal_escapes_single_quotes() {
        assert_eq!(quote_literal("1A2B3C"), "'1A2B3C'");
        assert_eq!(quote_literal("x' OR '1'='1"), "'x'' OR ''1''=''1'");
    }

    #[test]
    fn test_connection_url_percent_encodes_credentials() {
        let url = connection_url(&profile(), "cvp user", "p@ss/word").unwrap();
        assert_eq!(url.scheme(), "postgres");
        assert_eq!(url.host_str(), Some("db.internal"));
        assert_eq!(url.port(), Some(50000));
        assert_eq!(url.path(), "/CVPDB");
        assert_eq!(url.username(), "cvp%20user");
        assert_eq!(url.password(), Some("p%40ss%2Fword"));
    }

    #[test]
    fn test_connection_url_rejects_bad_protocol() {
        let mut bad = profile();
        bad.protocol = "not a scheme".to_string();
        let err = connection_url(&bad, "u", "p").unwrap_err();
        assert!(matches!(err, ConversionError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_connect_without_profile_fails_with_profile_name() {
        let config = ConverterConfig::from_toml_str(
            r#"
[retry]
max_attempts = 1
"#,
        )
        .unwrap();
        let mut secrets = crate::secrets::MockSecretResolver::new();
        secrets.expect_decrypt().never();

        let gateway = SqlxDatabaseGateway::new(Arc::new(config), Arc::new(secrets));
        let err = match gateway.connect("CVP_MISSING").await {
            Ok(_) => panic!("connect should fail without a profile"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("CVP_MISSING"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_credential_fails_without_retrying() {
        let config = ConverterConfig::from_toml_str(
            r#"
[databases.CVP_TEST]
protocol = "postgres"
hostname = "db.internal"
port = 50000
database = "CVPDB"
"#,
        )
        .unwrap();
        let mut secrets = crate::secrets::MockSecretResolver::new();
        secrets.expect_decrypt().never();
        let start = tokio::time::Instant::now();

        let gateway = SqlxDatabaseGateway::new(Arc::new(config), Arc::new(secrets));
        let err = match gateway.connect("CVP_TEST").await {
            Ok(_) => panic!("connect should fail without credentials"),
            Err(err) => err,
        };

        assert!(matches!(err, ConversionError::Configuration { .. }));
        assert!(err.to_string().contains("database_username"));
        assert_eq!(start.elapsed(), std::time::Duration::ZERO);
    }
}

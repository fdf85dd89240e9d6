use anyhow::Result;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConversionError;

pub const DEFAULT_CONFIG_FILE: &str = "ca-to-us.toml";
const ENV_PREFIX: &str = "CA_TO_US";

/// Runtime configuration for the CA to US conversion workflow
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConverterConfig {
    /// Deployment stage, selects the `CVP_<STAGE>` database and `<STAGE>` server profiles
    pub stage: String,
    /// `INFO` enables informational logging, anything else only errors
    pub log_level: String,
    /// Named database profiles
    #[serde(default)]
    pub databases: HashMap<String, DatabaseProfile>,
    /// Named remote server profiles
    #[serde(default)]
    pub servers: HashMap<String, ServerProfile>,
    /// KMS-encrypted, base64 encoded credentials
    #[serde(default)]
    pub credentials: CredentialConfig,
    pub batch: BatchConfig,
    pub notifications: NotificationConfig,
    pub retry: RetrySettings,
    /// Known hosts file consulted before accepting a server key
    pub known_hosts_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseProfile {
    /// Connection URL scheme, e.g. `postgres` or `mysql`
    pub protocol: String,
    pub hostname: String,
    pub port: u16,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerProfile {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
}

fn default_ssh_port() -> u16 {
    22
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CredentialConfig {
    pub database_username: Option<String>,
    pub database_password: Option<String>,
    pub server_username: Option<String>,
    pub server_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchConfig {
    /// Wait after a successful batch run before re-checking the database
    pub cooldown_seconds: u64,
    /// Local file that receives the VIN
    pub control_file_path: PathBuf,
    /// Where the control file is placed on the server
    pub remote_control_file_path: String,
    /// Batch invocation run on the server
    pub remote_command: String,
    /// Table holding vehicle records
    pub vehicle_table: String,
}

impl BatchConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotificationConfig {
    pub region: String,
    pub incident_update_target: Option<String>,
    pub tbm_factory_feed_target: Option<String>,
    pub vp4r_factory_feed_target: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_seconds: u64,
    pub backoff_multiplier: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_seconds: 3,
            backoff_multiplier: 2,
        }
    }
}

impl ConverterConfig {
    /// Load configuration with precedence:
    /// 1. Default values
    /// 2. Configuration file (ca-to-us.toml unless another path is given)
    /// 3. Environment variables (prefixed with CA_TO_US__)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Self::defaults(Config::builder())?;

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path));
            }
            None => {
                if Path::new(DEFAULT_CONFIG_FILE).exists() {
                    builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: ConverterConfig = builder.build()?.try_deserialize()?;
        Ok(config.normalized())
    }

    /// Build from an inline TOML document on top of the defaults
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let builder =
            Self::defaults(Config::builder())?.add_source(File::from_str(toml, FileFormat::Toml));
        let config: ConverterConfig = builder.build()?.try_deserialize()?;
        Ok(config.normalized())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }

    fn defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let retry = RetrySettings::default();
        Ok(builder
            .set_default("stage", "TEST")?
            .set_default("log_level", "INFO")?
            .set_default("batch.cooldown_seconds", 60_i64)?
            .set_default(
                "batch.control_file_path",
                "/tmp/Destination-CA-US-panaupdate-query.txt",
            )?
            .set_default(
                "batch.remote_control_file_path",
                "Destination-CA-US-panaupdate-query.txt",
            )?
            .set_default("batch.remote_command", "")?
            .set_default("batch.vehicle_table", "CVP.VEHICLE")?
            .set_default("notifications.region", "us-east-1")?
            .set_default("retry.max_attempts", i64::from(retry.max_attempts))?
            .set_default("retry.initial_delay_seconds", retry.initial_delay_seconds as i64)?
            .set_default("retry.backoff_multiplier", i64::from(retry.backoff_multiplier))?)
    }

    fn normalized(mut self) -> Self {
        self.stage = self.stage.trim().to_uppercase();
        self.log_level = self.log_level.trim().to_uppercase();
        self
    }

    /// Database profile used for the current stage
    pub fn database_profile_name(&self) -> String {
        format!("CVP_{}", self.stage)
    }

    /// Server profile used for the current stage
    pub fn server_profile_name(&self) -> String {
        self.stage.clone()
    }

    pub fn database_profile(&self, name: &str) -> Result<&DatabaseProfile, ConversionError> {
        lookup_profile(&self.databases, name, "database")
    }

    pub fn server_profile(&self, name: &str) -> Result<&ServerProfile, ConversionError> {
        lookup_profile(&self.servers, name, "server")
    }

    pub fn known_hosts_file(&self) -> Option<PathBuf> {
        self.known_hosts_path
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(".ssh").join("known_hosts")))
    }
}

// Some config sources fold key case, so profile names are matched without it.
fn lookup_profile<'a, T>(
    profiles: &'a HashMap<String, T>,
    name: &str,
    kind: &str,
) -> Result<&'a T, ConversionError> {
    profiles
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, profile)| profile)
        .ok_or_else(|| ConversionError::configuration(format!("No {kind} profile named {name}")))
}

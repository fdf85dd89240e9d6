// Batch conversion run on the remote server
//
// Linear sequence: write control file -> connect -> upload -> execute -> cooldown.
// The remote session is closed exactly once, whichever step fails.

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::ConverterConfig;
use crate::error::ConversionError;
use crate::external::{RemoteExecutionGateway, RemoteSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStage {
    WriteLocal,
    Connect,
    Upload,
    Execute,
    Cooldown,
}

impl fmt::Display for BatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchStage::WriteLocal => "write_local",
            BatchStage::Connect => "connect",
            BatchStage::Upload => "upload",
            BatchStage::Execute => "execute",
            BatchStage::Cooldown => "cooldown",
        };
        f.write_str(name)
    }
}

#[async_trait]
pub trait BatchRunner: Send + Sync {
    /// Run the remote conversion batch for one VIN
    async fn run(&self, vin: &str) -> Result<(), ConversionError>;
}

pub struct BatchConversionRunner {
    remote: Arc<dyn RemoteExecutionGateway>,
    server_profile: String,
    control_file: PathBuf,
    remote_control_file: String,
    remote_command: String,
    cooldown: Duration,
}

impl BatchConversionRunner {
    pub fn new(remote: Arc<dyn RemoteExecutionGateway>, config: &ConverterConfig) -> Self {
        Self {
            remote,
            server_profile: config.server_profile_name(),
            control_file: config.batch.control_file_path.clone(),
            remote_control_file: config.batch.remote_control_file_path.clone(),
            remote_command: config.batch.remote_command.clone(),
            cooldown: config.batch.cooldown(),
        }
    }

    async fn upload_and_execute(&self, session: &mut dyn RemoteSession) -> Result<(), ConversionError> {
        debug!(stage = %BatchStage::Upload, "Uploading control file");
        session
            .upload_file(&self.control_file, &self.remote_control_file)
            .await?;

        debug!(stage = %BatchStage::Execute, "Executing the script...");
        let output = session
            .execute_command(&format!("({})", self.remote_command))
            .await?;

        info!("Output of execution : {:?}", output.stdout_lines);
        if output.has_errors() {
            error!("Errors while execution : {:?}", output.stderr_lines);
            return Err(ConversionError::Execution {
                message: output.stderr_lines.join("\n"),
            });
        }
        if let Some(status) = output.exit_status.filter(|status| *status != 0) {
            debug!("Remote command exited with status {} and no stderr", status);
        }
        Ok(())
    }
}

#[async_trait]
impl BatchRunner for BatchConversionRunner {
    async fn run(&self, vin: &str) -> Result<(), ConversionError> {
        if vin.trim().is_empty() {
            return Err(ConversionError::configuration("Please provide proper VIN"));
        }
        if self.remote_command.trim().is_empty() {
            return Err(ConversionError::configuration(
                "No remote batch command configured",
            ));
        }

        debug!(stage = %BatchStage::WriteLocal, "Making changes in local file and preparing for upload..");
        tokio::fs::write(&self.control_file, vin)
            .await
            .map_err(|source| ConversionError::ControlFile {
                path: self.control_file.clone(),
                source,
            })?;
        info!("VIN written to local file {}", self.control_file.display());

        debug!(stage = %BatchStage::Connect, "Opening remote session");
        let mut session = self.remote.connect(&self.server_profile).await?;
        let result = self.upload_and_execute(session.as_mut()).await;
        session.close().await;
        result?;

        info!(
            stage = %BatchStage::Cooldown,
            "Batch executed, waiting {} seconds before verification",
            self.cooldown.as_secs()
        );
        tokio::time::sleep(self.cooldown).await;
        Ok(())
    }
}

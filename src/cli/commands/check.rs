use anyhow::Result;
use std::sync::Arc;

use super::{build_service, Command};
use crate::config::ConverterConfig;

pub struct CheckCommand {
    config: Arc<ConverterConfig>,
    vin: String,
}

impl CheckCommand {
    pub fn new(config: Arc<ConverterConfig>, vin: String) -> Self {
        Self { config, vin }
    }
}

impl Command for CheckCommand {
    async fn execute(&self) -> Result<()> {
        let service = build_service(self.config.clone()).await;
        let report = service.check(&self.vin).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }
}

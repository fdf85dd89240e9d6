use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use super::{build_service, Command};
use crate::config::ConverterConfig;

/// Where the trigger event comes from
#[derive(Debug, Clone, PartialEq)]
pub enum EventSource {
    Inline(String),
    File(PathBuf),
    Fields { vin: String, incident: String },
}

pub struct ConvertCommand {
    config: Arc<ConverterConfig>,
    source: EventSource,
}

impl ConvertCommand {
    pub fn new(config: Arc<ConverterConfig>, source: EventSource) -> Self {
        Self { config, source }
    }
}

impl Command for ConvertCommand {
    async fn execute(&self) -> Result<()> {
        let event = read_event(&self.source)?;
        let service = build_service(self.config.clone()).await;
        let report = service.handle(&event).await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }
}

/// Load the trigger event. Text that is not JSON is passed on as a string
/// so that it is rejected and reported like any other malformed trigger.
pub fn read_event(source: &EventSource) -> Result<Value> {
    let text = match source {
        EventSource::Fields { vin, incident } => {
            return Ok(json!({ "vin": vin, "incident": incident }));
        }
        EventSource::Inline(text) => text.clone(),
        EventSource::File(path) if path.as_os_str() == "-" => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read trigger event from stdin")?;
            buffer
        }
        EventSource::File(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read trigger event from {}", path.display()))?,
    };
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

//! Trigger event parsing

use serde_json::Value;
use tracing::info;

use crate::error::ConversionError;

pub const VIN: &str = "vin";
pub const INCIDENT: &str = "incident";

const MISSING_DATA: &str =
    "Required data not passed or does not meet the criteria to execute Factory Feed";

/// A validated conversion request
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub vin: String,
    pub incident: Value,
}

/// A trigger that cannot start a conversion
#[derive(Debug)]
pub struct RejectedRequest {
    /// Incident reference to report against, `null` when it was not supplied
    pub incident: Value,
    pub error: ConversionError,
}

impl ConversionRequest {
    pub fn new(vin: impl Into<String>, incident: Value) -> Self {
        Self {
            vin: vin.into(),
            incident,
        }
    }

    /// Build a request from a trigger event.
    ///
    /// The event is either a JSON object or a string holding one; the string
    /// form is unwrapped exactly once.
    pub fn from_event(event: &Value) -> Result<Self, RejectedRequest> {
        let event = unwrap_event(event);
        let (Some(vin), Some(incident)) = (event.get(VIN), event.get(INCIDENT)) else {
            info!("VIN or Incident id not provided");
            return Err(rejected(Value::Null, &event));
        };

        match vin.as_str().map(str::trim) {
            Some(vin) if !vin.is_empty() => Ok(Self::new(vin, incident.clone())),
            _ => Err(rejected(incident.clone(), &event)),
        }
    }
}

fn unwrap_event(event: &Value) -> Value {
    match event {
        Value::String(text) => serde_json::from_str(text).unwrap_or_else(|_| event.clone()),
        other => other.clone(),
    }
}

fn rejected(incident: Value, event: &Value) -> RejectedRequest {
    RejectedRequest {
        incident,
        error: ConversionError::configuration(format!("{MISSING_DATA}: {event}")),
    }
}

impl RejectedRequest {
    /// Work notes text for the incident update
    pub fn work_notes(&self) -> String {
        match &self.error {
            ConversionError::Configuration { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

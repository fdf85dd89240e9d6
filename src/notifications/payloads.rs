//! Downstream notification payloads

use serde::Serialize;
use serde_json::Value;

use crate::vehicle::VehicleType;

pub const INCIDENT_UPDATE: &str = "incidentUpdate";
pub const FAILED: &str = "Failed";

/// Sent to the factory feed of the converted vehicle's type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactoryFeedPayload {
    pub vin: String,
    pub incident: Value,
    pub vehicle_type: VehicleType,
    pub check_ff_first: bool,
}

/// Sent to the incident update target when a conversion fails
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentUpdatePayload {
    #[serde(rename = "eventType")]
    pub event_type: String,
    pub incident: Value,
    /// JSON-encoded `{"result": {...}}` document
    pub body: String,
}

#[derive(Debug, Serialize)]
struct IncidentUpdateBody<'a> {
    result: IncidentResult<'a>,
}

#[derive(Debug, Serialize)]
struct IncidentResult<'a> {
    vin: Option<&'a str>,
    status: &'static str,
    message: WorkNotes<'a>,
}

#[derive(Debug, Serialize)]
struct WorkNotes<'a> {
    work_notes: &'a str,
}

impl IncidentUpdatePayload {
    pub fn failed(vin: Option<&str>, incident: Value, reason: &str) -> Result<Self, serde_json::Error> {
        let body = IncidentUpdateBody {
            result: IncidentResult {
                vin,
                status: FAILED,
                message: WorkNotes { work_notes: reason },
            },
        };
        Ok(Self {
            event_type: INCIDENT_UPDATE.to_string(),
            incident,
            body: serde_json::to_string(&body)?,
        })
    }
}

/// Payload actually handed to an invocation target
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Notification {
    FactoryFeed(FactoryFeedPayload),
    IncidentUpdate(IncidentUpdatePayload),
}

//! One invocation: parse the trigger, convert, notify

use serde::Serialize;
use serde_json::Value;
use tracing::{info, Instrument};

use crate::error::ConversionError;
use crate::notifications::{Notification, NotificationDispatcher};
use crate::request::ConversionRequest;
use crate::telemetry::{create_conversion_span, generate_correlation_id};
use crate::workflows::{ConversionOrchestrator, ConversionOutcome, EligibilityReport};

/// What one invocation did
#[derive(Debug, Clone, Serialize)]
pub struct InvocationReport {
    pub correlation_id: String,
    pub vin: Option<String>,
    pub outcome: ConversionOutcome,
    /// Payload handed to the dispatcher, if one could be built
    pub notification: Option<Notification>,
}

pub struct ConversionService {
    orchestrator: ConversionOrchestrator,
    dispatcher: NotificationDispatcher,
}

impl ConversionService {
    pub fn new(orchestrator: ConversionOrchestrator, dispatcher: NotificationDispatcher) -> Self {
        Self {
            orchestrator,
            dispatcher,
        }
    }

    /// Handle one trigger event end to end
    pub async fn handle(&self, event: &Value) -> InvocationReport {
        let correlation_id = generate_correlation_id();
        info!(correlation.id = %correlation_id, "Received event {}", event);

        let request = match ConversionRequest::from_event(event) {
            Ok(request) => request,
            Err(rejected) => {
                let outcome = ConversionOutcome::failed(rejected.work_notes());
                info!("Work notes: {}", rejected.work_notes());
                let notification = self
                    .dispatcher
                    .dispatch(None, &rejected.incident, &outcome)
                    .await;
                return InvocationReport {
                    correlation_id,
                    vin: None,
                    outcome,
                    notification,
                };
            }
        };

        let incident = match &request.incident {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        let span = create_conversion_span(
            "convert",
            Some(request.vin.as_str()),
            Some(incident.as_str()),
            &correlation_id,
        );
        async {
            let outcome = self.orchestrator.convert(&request.vin).await;
            let notification = self
                .dispatcher
                .dispatch(Some(&request.vin), &request.incident, &outcome)
                .await;
            InvocationReport {
                correlation_id: correlation_id.clone(),
                vin: Some(request.vin.clone()),
                outcome,
                notification,
            }
        }
        .instrument(span)
        .await
    }

    /// Read-only eligibility lookup for one VIN
    pub async fn check(&self, vin: &str) -> Result<EligibilityReport, ConversionError> {
        let vin = vin.trim();
        if vin.is_empty() {
            return Err(ConversionError::configuration("Please provide proper VIN"));
        }
        let correlation_id = generate_correlation_id();
        self.orchestrator
            .inspect(vin)
            .instrument(create_conversion_span("check", Some(vin), None, &correlation_id))
            .await
    }
}

//! Fire-and-forget notification of conversion outcomes
//!
//! Successful conversions trigger the factory feed for the vehicle's type,
//! failures become an incident update. The dispatcher only hands payloads
//! over for delivery; it neither waits for nor interprets a response, and a
//! failed hand-over is logged, never fed back into the outcome.

pub mod lambda;
pub mod payloads;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::NotificationConfig;
use crate::error::DispatchError;
use crate::vehicle::VehicleType;
use crate::workflows::ConversionOutcome;

pub use lambda::LambdaInvoker;
pub use payloads::{FactoryFeedPayload, IncidentUpdatePayload, Notification};

/// One-way message send to a named downstream function
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FunctionInvoker: Send + Sync {
    /// Accept `payload` for asynchronous delivery to `target`
    async fn invoke_async(&self, target: &str, payload: Vec<u8>) -> Result<(), DispatchError>;
}

pub struct NotificationDispatcher {
    invoker: Arc<dyn FunctionInvoker>,
    targets: NotificationConfig,
}

impl NotificationDispatcher {
    pub fn new(invoker: Arc<dyn FunctionInvoker>, targets: NotificationConfig) -> Self {
        Self { invoker, targets }
    }

    /// Notify downstream systems of `outcome`, returning the payload handed over
    pub async fn dispatch(
        &self,
        vin: Option<&str>,
        incident: &Value,
        outcome: &ConversionOutcome,
    ) -> Option<Notification> {
        let notification = match build_notification(vin, incident, outcome) {
            Ok(notification) => notification,
            Err(e) => {
                error!("Could not build notification: {}", e);
                return None;
            }
        };

        let (purpose, target) = match &notification {
            Notification::FactoryFeed(payload) => match payload.vehicle_type {
                VehicleType::Tbm => ("TBM factory feed", &self.targets.tbm_factory_feed_target),
                VehicleType::Vp4r => ("VP4R factory feed", &self.targets.vp4r_factory_feed_target),
            },
            Notification::IncidentUpdate(_) => {
                ("incident update", &self.targets.incident_update_target)
            }
        };

        if let Err(e) = self.send(purpose, target.as_deref(), &notification).await {
            error!("Dispatch of {} failed: {}", purpose, e);
        }
        Some(notification)
    }

    async fn send<T: Serialize>(
        &self,
        purpose: &str,
        target: Option<&str>,
        payload: &T,
    ) -> Result<(), DispatchError> {
        let target = target
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| DispatchError::MissingTarget {
                purpose: purpose.to_string(),
            })?;
        let bytes = serde_json::to_vec(payload)?;
        info!("Invoking {} target {}", purpose, target);
        self.invoker.invoke_async(target, bytes).await
    }
}

fn build_notification(
    vin: Option<&str>,
    incident: &Value,
    outcome: &ConversionOutcome,
) -> Result<Notification, serde_json::Error> {
    match (outcome, vin) {
        (ConversionOutcome::Succeeded { vehicle_type }, Some(vin)) => {
            Ok(Notification::FactoryFeed(FactoryFeedPayload {
                vin: vin.to_string(),
                incident: incident.clone(),
                vehicle_type: *vehicle_type,
                check_ff_first: false,
            }))
        }
        (ConversionOutcome::Succeeded { .. }, None) => Ok(Notification::IncidentUpdate(
            IncidentUpdatePayload::failed(None, incident.clone(), "Conversion succeeded without a VIN")?,
        )),
        (ConversionOutcome::Failed { reason }, vin) => Ok(Notification::IncidentUpdate(
            IncidentUpdatePayload::failed(vin, incident.clone(), reason)?,
        )),
    }
}

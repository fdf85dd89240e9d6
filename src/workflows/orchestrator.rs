// CA to US conversion workflow
//
// One attempt per invocation. Business outcomes (not found, ineligible,
// already converted) come back as `ConversionOutcome::Failed`; only I/O and
// infrastructure problems travel as errors, and those are folded into a
// failed outcome before `convert` returns.

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::batch::BatchRunner;
use crate::database::{DatabaseConnection, DatabaseGateway};
use crate::error::ConversionError;
use crate::vehicle::{DestinationCountry, VehicleEligibilityCheck, VehicleLookup, VehicleType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status")]
pub enum ConversionOutcome {
    Succeeded { vehicle_type: VehicleType },
    Failed { reason: String },
}

impl ConversionOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        ConversionOutcome::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Succeeded { .. })
    }
}

/// Read-only view of a VIN's eligibility
#[derive(Debug, Clone, Serialize)]
pub struct EligibilityReport {
    pub vin: String,
    pub lookup: VehicleLookup,
    pub destination: Option<DestinationCountry>,
}

pub struct ConversionOrchestrator {
    database: Arc<dyn DatabaseGateway>,
    batch: Arc<dyn BatchRunner>,
    eligibility: VehicleEligibilityCheck,
    database_profile: String,
}

impl ConversionOrchestrator {
    pub fn new(
        database: Arc<dyn DatabaseGateway>,
        batch: Arc<dyn BatchRunner>,
        eligibility: VehicleEligibilityCheck,
        database_profile: impl Into<String>,
    ) -> Self {
        Self {
            database,
            batch,
            eligibility,
            database_profile: database_profile.into(),
        }
    }

    /// Run the full conversion for one VIN. Never returns an error.
    pub async fn convert(&self, vin: &str) -> ConversionOutcome {
        info!("Connecting to database profile {}...", self.database_profile);
        let mut connection = match self.database.connect(&self.database_profile).await {
            Ok(connection) => connection,
            Err(e) => {
                error!("Error Occurred {}", e);
                return ConversionOutcome::failed(e.to_string());
            }
        };

        let result = self.convert_with(connection.as_mut(), vin).await;
        close_connection(connection).await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Error Occurred {}", e);
                ConversionOutcome::failed(e.to_string())
            }
        };
        info!("Final result : {:?}", outcome);
        outcome
    }

    async fn convert_with(
        &self,
        connection: &mut dyn DatabaseConnection,
        vin: &str,
    ) -> Result<ConversionOutcome, ConversionError> {
        let lookup = self.eligibility.lookup_vehicle(connection, vin).await?;
        if !lookup.found() {
            return Ok(ConversionOutcome::failed(format!(
                "The VIN {vin} is not found in the vehicle table. Please check the VIN again."
            )));
        }

        let Some(vehicle_type) = lookup.vehicle_type() else {
            return Ok(ConversionOutcome::failed(format!(
                "The VIN {vin} is neither a TBM nor VP4R. Therefore batch execution will fail."
            )));
        };

        if self.eligibility.current_destination_is_us(connection, vin).await? {
            info!("The VIN {} is already US, skipping batch execution", vin);
            return Ok(ConversionOutcome::failed(format!(
                "The VIN {vin} is already US. Therefore batch execution will not happen."
            )));
        }

        if let Err(e) = self.batch.run(vin).await {
            error!("Batch execution failed for VIN {}: {}", vin, e);
            return Ok(ConversionOutcome::failed(e.to_string()));
        }

        if self.eligibility.current_destination_is_us(connection, vin).await? {
            info!("This VIN {} is a {} vin", vin, vehicle_type);
            Ok(ConversionOutcome::Succeeded { vehicle_type })
        } else {
            info!("Conversion for VIN {} is incomplete even after batch execution", vin);
            Ok(ConversionOutcome::failed(format!(
                "Conversion for VIN {vin} is incomplete even after batch execution"
            )))
        }
    }

    /// Look up eligibility and destination without converting anything
    pub async fn inspect(&self, vin: &str) -> Result<EligibilityReport, ConversionError> {
        let mut connection = self.database.connect(&self.database_profile).await?;
        let result = self.inspect_with(connection.as_mut(), vin).await;
        close_connection(connection).await;
        result
    }

    async fn inspect_with(
        &self,
        connection: &mut dyn DatabaseConnection,
        vin: &str,
    ) -> Result<EligibilityReport, ConversionError> {
        let lookup = self.eligibility.lookup_vehicle(connection, vin).await?;
        let destination = if lookup.found() {
            Some(self.eligibility.destination_country(connection, vin).await?)
        } else {
            None
        };
        Ok(EligibilityReport {
            vin: vin.to_string(),
            lookup,
            destination,
        })
    }
}

async fn close_connection(connection: Box<dyn DatabaseConnection>) {
    info!("Closing Connection");
    match connection.close().await {
        Ok(()) => info!("Connection Closed"),
        Err(e) => warn!("Error while closing connection: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::QueryRow;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Vehicle table with one mutable destination column
    #[derive(Default)]
    struct Table {
        subtype: Option<String>,
        destination: Mutex<String>,
        closes: AtomicUsize,
    }

    struct Gateway(Arc<Table>);
    struct Connection(Arc<Table>);

    #[async_trait]
    impl DatabaseGateway for Gateway {
        async fn connect(&self, _profile: &str) -> Result<Box<dyn DatabaseConnection>, ConversionError> {
            Ok(Box::new(Connection(self.0.clone())))
        }
    }

    #[async_trait]
    impl DatabaseConnection for Connection {
        async fn query_one(&mut self, sql: &str) -> Result<Option<QueryRow>, ConversionError> {
            let Some(subtype) = self.0.subtype.clone() else {
                return Ok(None);
            };
            if sql.contains("C_VHCL_TYP") {
                Ok(Some(vec![Some(subtype)]))
            } else {
                Ok(Some(vec![Some(self.0.destination.lock().unwrap().clone())]))
            }
        }

        async fn close(self: Box<Self>) -> Result<(), ConversionError> {
            self.0.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Batch {
        table: Arc<Table>,
        converts: bool,
        runs: AtomicUsize,
    }

    #[async_trait]
    impl BatchRunner for Batch {
        async fn run(&self, _vin: &str) -> Result<(), ConversionError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.converts {
                *self.table.destination.lock().unwrap() = "US".to_string();
            }
            Ok(())
        }
    }

    fn setup(subtype: Option<&str>, destination: &str, converts: bool) -> (ConversionOrchestrator, Arc<Table>, Arc<Batch>) {
        let table = Arc::new(Table {
            subtype: subtype.map(str::to_string),
            destination: Mutex::new(destination.to_string()),
            closes: AtomicUsize::new(0),
        });
        let batch = Arc::new(Batch {
            table: table.clone(),
            converts,
            runs: AtomicUsize::new(0),
        });
        let orchestrator = ConversionOrchestrator::new(
            Arc::new(Gateway(table.clone())),
            batch.clone(),
            VehicleEligibilityCheck::new("CVP.VEHICLE"),
            "CVP_TEST",
        );
        (orchestrator, table, batch)
    }

    #[tokio::test]
    async fn test_vp4r_conversion_succeeds() {
        let (orchestrator, table, batch) = setup(Some("CVP_SXM"), "CA", true);

        let outcome = orchestrator.convert("VIN123").await;

        assert_eq!(
            outcome,
            ConversionOutcome::Succeeded {
                vehicle_type: VehicleType::Vp4r
            }
        );
        assert_eq!(batch.runs.load(Ordering::SeqCst), 1);
        assert_eq!(table.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_batch_without_effect_is_incomplete() {
        let (orchestrator, table, _batch) = setup(Some("CVP_TBM"), "CA", false);

        let outcome = orchestrator.convert("VIN123").await;

        match outcome {
            ConversionOutcome::Failed { reason } => assert!(reason.contains("incomplete")),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(table.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_destination_fails_without_batch() {
        let (orchestrator, table, batch) = setup(Some("CVP_TBM"), "MX", true);

        let outcome = orchestrator.convert("VIN123").await;

        assert!(!outcome.is_success());
        assert_eq!(batch.runs.load(Ordering::SeqCst), 0);
        assert_eq!(table.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_inspect_reports_destination() {
        let (orchestrator, table, batch) = setup(Some("CVP_TBM"), "CA", true);

        let report = orchestrator.inspect("VIN123").await.unwrap();

        assert!(report.lookup.is_tbm());
        assert_eq!(report.destination, Some(DestinationCountry::Ca));
        assert_eq!(batch.runs.load(Ordering::SeqCst), 0);
        assert_eq!(table.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_inspect_unknown_vin_has_no_destination() {
        let (orchestrator, _table, _batch) = setup(None, "CA", true);

        let report = orchestrator.inspect("NOPE").await.unwrap();

        assert_eq!(report.lookup, VehicleLookup::NotFound);
        assert!(report.destination.is_none());
    }
}

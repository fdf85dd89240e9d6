/// In-memory stand-ins for the database, the remote batch host and the
/// downstream functions, wired into a real `ConversionService`
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ca_to_us::{
    BatchConversionRunner, CommandOutput, ConversionError, ConversionOrchestrator, ConversionService,
    ConverterConfig, DatabaseConnection, DatabaseGateway, DispatchError, FunctionInvoker,
    NotificationDispatcher, QueryRow, RemoteExecutionGateway, RemoteSession, VehicleEligibilityCheck,
};

pub const TBM_TARGET: &str = "tbm-factory-feed";
pub const VP4R_TARGET: &str = "vp4r-factory-feed";
pub const INCIDENT_TARGET: &str = "incident-update";

/// One row of the vehicle table, shared between the database and the batch host
#[derive(Default)]
pub struct VehicleTable {
    pub subtype: Option<String>,
    pub destination: Mutex<String>,
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub queries: AtomicUsize,
    /// 1-based index of the query that fails, if any
    pub failing_query: Option<usize>,
}

impl VehicleTable {
    pub fn with_vehicle(subtype: &str, destination: &str) -> Arc<Self> {
        Arc::new(Self {
            subtype: Some(subtype.to_string()),
            destination: Mutex::new(destination.to_string()),
            ..Self::default()
        })
    }

    pub fn failing_on_query(subtype: &str, destination: &str, query: usize) -> Arc<Self> {
        Arc::new(Self {
            subtype: Some(subtype.to_string()),
            destination: Mutex::new(destination.to_string()),
            failing_query: Some(query),
            ..Self::default()
        })
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn destination(&self) -> String {
        self.destination.lock().unwrap().clone()
    }
}

pub struct FakeDatabase(pub Arc<VehicleTable>);

struct FakeConnection(Arc<VehicleTable>);

#[async_trait]
impl DatabaseGateway for FakeDatabase {
    async fn connect(&self, _profile_name: &str) -> Result<Box<dyn DatabaseConnection>, ConversionError> {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection(self.0.clone())))
    }
}

#[async_trait]
impl DatabaseConnection for FakeConnection {
    async fn query_one(&mut self, sql: &str) -> Result<Option<QueryRow>, ConversionError> {
        let query = self.0.queries.fetch_add(1, Ordering::SeqCst) + 1;
        if self.0.failing_query == Some(query) {
            return Err(ConversionError::Query {
                message: "SQL30081N communication error".to_string(),
            });
        }
        let Some(subtype) = self.0.subtype.clone() else {
            return Ok(None);
        };
        if sql.contains("C_VHCL_TYP") {
            Ok(Some(vec![Some(subtype)]))
        } else {
            Ok(Some(vec![Some(self.0.destination())]))
        }
    }

    async fn close(self: Box<Self>) -> Result<(), ConversionError> {
        self.0.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Batch host that flips the destination to US unless told to write to stderr
pub struct FakeBatchHost {
    pub table: Arc<VehicleTable>,
    pub stderr: Option<String>,
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub commands: Mutex<Vec<String>>,
}

impl FakeBatchHost {
    pub fn converting(table: Arc<VehicleTable>) -> Arc<Self> {
        Arc::new(Self {
            table,
            stderr: None,
            connects: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            commands: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(table: Arc<VehicleTable>, stderr: &str) -> Arc<Self> {
        Arc::new(Self {
            table,
            stderr: Some(stderr.to_string()),
            connects: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            commands: Mutex::new(Vec::new()),
        })
    }
}

struct FakeRemoteSession(Arc<FakeBatchHost>);

pub struct FakeRemoteGateway(pub Arc<FakeBatchHost>);

#[async_trait]
impl RemoteExecutionGateway for FakeRemoteGateway {
    async fn connect(&self, _profile_name: &str) -> Result<Box<dyn RemoteSession>, ConversionError> {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeRemoteSession(self.0.clone())))
    }
}

#[async_trait]
impl RemoteSession for FakeRemoteSession {
    async fn upload_file(&mut self, local_path: &Path, _remote_path: &str) -> Result<(), ConversionError> {
        assert!(local_path.exists(), "control file must be written before upload");
        Ok(())
    }

    async fn execute_command(&mut self, command: &str) -> Result<CommandOutput, ConversionError> {
        self.0.commands.lock().unwrap().push(command.to_string());
        match &self.0.stderr {
            Some(stderr) => Ok(CommandOutput::from_streams(Some(8), "", stderr)),
            None => {
                *self.0.table.destination.lock().unwrap() = "US".to_string();
                Ok(CommandOutput::from_streams(Some(0), "1 record updated\n", ""))
            }
        }
    }

    async fn close(self: Box<Self>) {
        self.0.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Records every invocation as (target, parsed payload)
#[derive(Default)]
pub struct RecordingInvoker {
    pub calls: Mutex<Vec<(String, Value)>>,
}

impl RecordingInvoker {
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FunctionInvoker for RecordingInvoker {
    async fn invoke_async(&self, target: &str, payload: Vec<u8>) -> Result<(), DispatchError> {
        let value: Value = serde_json::from_slice(&payload)?;
        self.calls.lock().unwrap().push((target.to_string(), value));
        Ok(())
    }
}

pub fn test_config(dir: &Path) -> ConverterConfig {
    let mut config = ConverterConfig::from_toml_str(&format!(
        r#"
stage = "test"
log_level = "INFO"

[batch]
remote_command = "/opt/cvp/batch/ca_to_us.sh"
remote_control_file_path = "Destination-CA-US-panaupdate-query.txt"
cooldown_seconds = 60

[notifications]
incident_update_target = "{INCIDENT_TARGET}"
tbm_factory_feed_target = "{TBM_TARGET}"
vp4r_factory_feed_target = "{VP4R_TARGET}"
"#
    ))
    .unwrap();
    config.batch.control_file_path = dir.join("Destination-CA-US-panaupdate-query.txt");
    config
}

pub struct Harness {
    pub service: ConversionService,
    pub table: Arc<VehicleTable>,
    pub host: Arc<FakeBatchHost>,
    pub invoker: Arc<RecordingInvoker>,
    pub dir: tempfile::TempDir,
}

pub fn harness(table: Arc<VehicleTable>, host: Arc<FakeBatchHost>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let invoker = Arc::new(RecordingInvoker::default());

    let batch = Arc::new(BatchConversionRunner::new(
        Arc::new(FakeRemoteGateway(host.clone())),
        &config,
    ));
    let orchestrator = ConversionOrchestrator::new(
        Arc::new(FakeDatabase(table.clone())),
        batch,
        VehicleEligibilityCheck::new(config.batch.vehicle_table.clone()),
        config.database_profile_name(),
    );
    let dispatcher = NotificationDispatcher::new(invoker.clone(), config.notifications.clone());

    Harness {
        service: ConversionService::new(orchestrator, dispatcher),
        table,
        host,
        invoker,
        dir,
    }
}

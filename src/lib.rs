// ca-to-us - Canada to US destination conversion for connected vehicles
// This exposes the core components for testing and integration

pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod external;
pub mod notifications;
pub mod request;
pub mod retry;
pub mod secrets;
pub mod service;
pub mod telemetry;
pub mod vehicle;
pub mod workflows;

// Re-export key types for easy access
pub use config::{ConverterConfig, NotificationConfig};
pub use database::{DatabaseConnection, DatabaseGateway, QueryRow, SqlxDatabaseGateway};
pub use error::{ConversionError, DispatchError, SecretError};
pub use external::{CommandOutput, RemoteExecutionGateway, RemoteSession, SshRemoteGateway};
pub use notifications::{FunctionInvoker, LambdaInvoker, Notification, NotificationDispatcher};
pub use request::ConversionRequest;
pub use retry::RetryPolicy;
pub use secrets::{KmsSecretResolver, SecretResolver};
pub use service::{ConversionService, InvocationReport};
pub use telemetry::{create_conversion_span, generate_correlation_id, init_telemetry};
pub use vehicle::{DestinationCountry, VehicleEligibilityCheck, VehicleLookup, VehicleType};
pub use workflows::{
    BatchConversionRunner, BatchRunner, ConversionOrchestrator, ConversionOutcome, EligibilityReport,
};

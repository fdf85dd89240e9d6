use anyhow::Result;
use std::sync::Arc;

use crate::config::ConverterConfig;
use crate::database::SqlxDatabaseGateway;
use crate::external::SshRemoteGateway;
use crate::notifications::{LambdaInvoker, NotificationDispatcher};
use crate::secrets::{KmsSecretResolver, SecretResolver};
use crate::service::ConversionService;
use crate::vehicle::VehicleEligibilityCheck;
use crate::workflows::{BatchConversionRunner, ConversionOrchestrator};

pub mod check;
pub mod convert;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}

/// Wire the production adapters into a conversion service
pub async fn build_service(config: Arc<ConverterConfig>) -> ConversionService {
    let secrets: Arc<dyn SecretResolver> = Arc::new(KmsSecretResolver::from_env().await);
    let database = Arc::new(SqlxDatabaseGateway::new(config.clone(), secrets.clone()));
    let remote = Arc::new(SshRemoteGateway::new(config.clone(), secrets));
    let batch = Arc::new(BatchConversionRunner::new(remote, &config));

    let orchestrator = ConversionOrchestrator::new(
        database,
        batch,
        VehicleEligibilityCheck::new(config.batch.vehicle_table.clone()),
        config.database_profile_name(),
    );

    let invoker = Arc::new(LambdaInvoker::for_region(&config.notifications.region).await);
    let dispatcher = NotificationDispatcher::new(invoker, config.notifications.clone());

    ConversionService::new(orchestrator, dispatcher)
}

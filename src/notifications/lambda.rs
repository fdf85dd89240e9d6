use async_trait::async_trait;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use tracing::debug;

use super::FunctionInvoker;
use crate::error::DispatchError;

/// Asynchronous (`Event`) invocation of AWS Lambda functions
pub struct LambdaInvoker {
    client: aws_sdk_lambda::Client,
}

impl LambdaInvoker {
    pub fn new(client: aws_sdk_lambda::Client) -> Self {
        Self { client }
    }

    pub async fn for_region(region: &str) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;
        Self::new(aws_sdk_lambda::Client::new(&sdk_config))
    }
}

#[async_trait]
impl FunctionInvoker for LambdaInvoker {
    async fn invoke_async(&self, target: &str, payload: Vec<u8>) -> Result<(), DispatchError> {
        let output = self
            .client
            .invoke()
            .function_name(target)
            .invocation_type(InvocationType::Event)
            .payload(Blob::new(payload))
            .send()
            .await
            .map_err(|e| DispatchError::Invocation {
                target: target.to_string(),
                message: aws_sdk_lambda::error::DisplayErrorContext(&e).to_string(),
            })?;
        debug!("{} accepted event with status {}", target, output.status_code());
        Ok(())
    }
}

// AWS SQS BrokerClient Implementation

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sqs::config::Credentials;
use aws_sdk_sqs::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_sqs::types::{
    DeleteMessageBatchRequestEntry, Message, MessageAttributeValue, MessageSystemAttributeName,
    QueueAttributeName,
};
use aws_sdk_sqs::Client;
use quiver_core::config::Settings;
use quiver_core::domain::{Envelope, ReceivedMessage};
use quiver_core::port::{BrokerClient, BrokerError};
use std::collections::HashMap;
use tracing::{debug, info};

/// Error codes SQS uses for a missing queue (query and JSON protocols)
const MISSING_QUEUE_CODES: &[&str] = &["AWS.SimpleQueueService.NonExistentQueue", "QueueDoesNotExist"];

/// Largest DeleteMessageBatch request
const MAX_DELETE_BATCH: usize = 10;

/// Broker backed by Amazon SQS (or any endpoint speaking its API)
#[derive(Clone, Debug)]
pub struct SqsBroker {
    client: Client,
}

impl SqsBroker {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from settings; unset values fall back to the AWS default chain
    pub async fn from_settings(settings: &Settings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let (Some(key_id), Some(secret)) = (&settings.access_key_id, &settings.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                key_id.clone(),
                secret.clone(),
                None,
                None,
                "quiver-settings",
            ));
        }
        if let Some(endpoint) = &settings.endpoint_url {
            loader = loader.endpoint_url(endpoint.clone());
        }

        let config = loader.load().await;
        info!(
            region = ?config.region().map(|r| r.as_ref().to_string()),
            endpoint = ?settings.endpoint_url,
            "SQS client configured"
        );
        Self::new(Client::new(&config))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

fn is_missing_queue_code(code: Option<&str>) -> bool {
    code.is_some_and(|code| MISSING_QUEUE_CODES.contains(&code))
}

// Helper to convert SDK errors with the queue they concern
fn map_sdk_error<E, R>(queue: &str, err: SdkError<E, R>) -> BrokerError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    if is_missing_queue_code(err.code()) {
        return BrokerError::QueueDoesNotExist(queue.to_string());
    }
    match &err {
        SdkError::ConstructionFailure(_) => {
            BrokerError::InvalidRequest(DisplayErrorContext(&err).to_string())
        }
        _ => BrokerError::Transport(DisplayErrorContext(&err).to_string()),
    }
}

fn to_message_attributes(
    attributes: &HashMap<String, String>,
) -> Result<Option<HashMap<String, MessageAttributeValue>>, BrokerError> {
    if attributes.is_empty() {
        return Ok(None);
    }
    attributes
        .iter()
        .map(|(key, value)| {
            MessageAttributeValue::builder()
                .data_type("String")
                .string_value(value)
                .build()
                .map(|v| (key.clone(), v))
                .map_err(|e| BrokerError::InvalidRequest(e.to_string()))
        })
        .collect::<Result<HashMap<_, _>, _>>()
        .map(Some)
}

fn from_message(message: &Message) -> Option<ReceivedMessage> {
    let receipt_handle = message.receipt_handle()?.to_string();
    let attributes = message
        .message_attributes()
        .map(|attrs| {
            attrs
                .iter()
                .filter_map(|(k, v)| v.string_value().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();
    let receive_count = message
        .attributes()
        .and_then(|attrs| attrs.get(&MessageSystemAttributeName::ApproximateReceiveCount))
        .and_then(|raw| raw.parse().ok());

    Some(ReceivedMessage {
        message_id: message.message_id().unwrap_or_default().to_string(),
        receipt_handle,
        body: message.body().unwrap_or_default().to_string(),
        attributes,
        receive_count,
    })
}

#[async_trait]
impl BrokerClient for SqsBroker {
    async fn send_message(&self, envelope: &Envelope) -> Result<String, BrokerError> {
        let output = self
            .client
            .send_message()
            .queue_url(&envelope.queue_url)
            .message_body(&envelope.body)
            .delay_seconds(envelope.delay_seconds as i32)
            .set_message_attributes(to_message_attributes(&envelope.attributes)?)
            .send()
            .await
            .map_err(|e| map_sdk_error(&envelope.queue_url, e))?;
        Ok(output.message_id().unwrap_or_default().to_string())
    }

    async fn receive_messages(
        &self,
        queue_url: &str,
        max_messages: usize,
        wait_time_secs: u32,
    ) -> Result<Vec<ReceivedMessage>, BrokerError> {
        let output = self
            .client
            .receive_message()
            .queue_url(queue_url)
            .max_number_of_messages(max_messages as i32)
            .wait_time_seconds(wait_time_secs as i32)
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .message_attribute_names("All")
            .send()
            .await
            .map_err(|e| map_sdk_error(queue_url, e))?;

        Ok(output.messages().iter().filter_map(from_message).collect())
    }

    async fn delete_message(
        &self,
        queue_url: &str,
        receipt_handle: &str,
    ) -> Result<(), BrokerError> {
        self.client
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| map_sdk_error(queue_url, e))?;
        Ok(())
    }

    async fn delete_message_batch(
        &self,
        queue_url: &str,
        receipt_handles: &[String],
    ) -> Result<Vec<String>, BrokerError> {
        let mut failed = Vec::new();
        for chunk in receipt_handles.chunks(MAX_DELETE_BATCH) {
            let entries = chunk
                .iter()
                .enumerate()
                .map(|(i, handle)| {
                    DeleteMessageBatchRequestEntry::builder()
                        .id(i.to_string())
                        .receipt_handle(handle)
                        .build()
                        .map_err(|e| BrokerError::InvalidRequest(e.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?;

            let output = self
                .client
                .delete_message_batch()
                .queue_url(queue_url)
                .set_entries(Some(entries))
                .send()
                .await
                .map_err(|e| map_sdk_error(queue_url, e))?;

            failed.extend(
                output
                    .failed()
                    .iter()
                    .filter_map(|entry| entry.id().parse::<usize>().ok())
                    .filter_map(|i| chunk.get(i).cloned()),
            );
        }
        if !failed.is_empty() {
            debug!(queue_url = %queue_url, failed = failed.len(), "Batch delete partially failed");
        }
        Ok(failed)
    }

    async fn get_queue_url(&self, queue_name: &str) -> Result<String, BrokerError> {
        let output = self
            .client
            .get_queue_url()
            .queue_name(queue_name)
            .send()
            .await
            .map_err(|e| map_sdk_error(queue_name, e))?;
        output
            .queue_url()
            .map(str::to_string)
            .ok_or_else(|| BrokerError::Transport(format!("no url returned for {}", queue_name)))
    }

    async fn create_queue(
        &self,
        queue_name: &str,
        attributes: &[(String, String)],
    ) -> Result<String, BrokerError> {
        let attributes: HashMap<QueueAttributeName, String> = attributes
            .iter()
            .map(|(k, v)| (QueueAttributeName::from(k.as_str()), v.clone()))
            .collect();
        let output = self
            .client
            .create_queue()
            .queue_name(queue_name)
            .set_attributes(Some(attributes))
            .send()
            .await
            .map_err(|e| map_sdk_error(queue_name, e))?;
        output
            .queue_url()
            .map(str::to_string)
            .ok_or_else(|| BrokerError::Transport(format!("no url returned for {}", queue_name)))
    }

    async fn get_queue_attributes(
        &self,
        queue_url: &str,
    ) -> Result<HashMap<String, String>, BrokerError> {
        let output = self
            .client
            .get_queue_attributes()
            .queue_url(queue_url)
            .attribute_names(QueueAttributeName::All)
            .send()
            .await
            .map_err(|e| map_sdk_error(queue_url, e))?;
        Ok(output
            .attributes()
            .map(|attrs| {
                attrs
                    .iter()
                    .map(|(k, v)| (k.as_str().to_string(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set_queue_attributes(
        &self,
        queue_url: &str,
        attributes: &HashMap<String, String>,
    ) -> Result<(), BrokerError> {
        let attributes: HashMap<QueueAttributeName, String> = attributes
            .iter()
            .map(|(k, v)| (QueueAttributeName::from(k.as_str()), v.clone()))
            .collect();
        self.client
            .set_queue_attributes()
            .queue_url(queue_url)
            .set_attributes(Some(attributes))
            .send()
            .await
            .map_err(|e| map_sdk_error(queue_url, e))?;
        Ok(())
    }
}

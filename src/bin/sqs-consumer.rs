use anyhow::{Context, Result};
use aws_sdk_sqs::{types::DeleteMessageBatchRequestEntry, types::Message, Client};
use core::time::Duration;
use rds_snapshot_export::app::App;
use rds_snapshot_export::client::{aws_service_config, RdsExportService};
use serde::Deserialize;
use std::env::var;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

/// The minimum time to wait between ticks, in milliseconds.
const BASE_LAPSE_TIME: u64 = 300;

/// The base of the exponential backoff sequence.
const BACKOFF_BASE: u64 = 2;

/// The maximum amount of milliseconds to sleep between ticks. Set to
/// the equivalent of 20 minutes.
const MAX_SLEEP: u64 = 1200000;

/// The SNS notification wrapping a message delivered to SQS, unless
/// the subscription uses raw message delivery.
#[derive(Deserialize)]
struct SnsEnvelope {
    #[serde(rename = "Message")]
    message: String,
}

/// Extract the snapshot notification from an SQS message body.
fn notification_body(body: &str) -> String {
    serde_json::from_str::<SnsEnvelope>(body)
        .map(|envelope| envelope.message)
        .unwrap_or_else(|_| String::from(body))
}

/// Whether a consumption cycle counts as a success for backoff
/// purposes: polling slows down only while every received message
/// fails to be handled.
fn cycle_succeeded(received: usize, handled: usize) -> bool {
    received == 0 || handled > 0
}

/// Wrapper structure that executes successive SQS consumption cycles:
/// receive messages, unwrap their notifications, run the trigger for
/// each one, and finally delete the messages that were handled.
struct SQSConsumer {
    queue_url: String,
    visibility_timeout: i32,
    max_number_of_messages: i32,
    client: Client,
    app: App,
    service: RdsExportService,
    backoff: u32,
}

impl SQSConsumer {
    /// Record a success and wait a little while.
    async fn pass(&mut self) {
        self.backoff = 0;
        sleep(Duration::from_millis(BASE_LAPSE_TIME)).await;
    }

    /// Record a failure and wait a while.
    async fn fail(&mut self) {
        sleep(Duration::from_millis(std::cmp::min(
            BASE_LAPSE_TIME.saturating_mul(BACKOFF_BASE.saturating_pow(self.backoff)),
            MAX_SLEEP,
        )))
        .await;
        self.backoff = self.backoff.saturating_add(1);
    }

    /// Run the trigger for a single message. The message id is the
    /// invocation token. Returns whether the message may be deleted.
    async fn handle(&self, message: &Message) -> bool {
        let (Some(body), Some(message_id)) = (message.body(), message.message_id()) else {
            warn!("SQS message without body or id; it will be deleted");
            return true;
        };
        match self
            .app
            .handle(&notification_body(body), message_id, &self.service)
            .await
        {
            Ok(outcome) => {
                info!("Handled SQS message {:?}: {:?}", message_id, outcome);
                true
            }
            Err(e) => {
                warn!(
                    "Error while handling SQS message {:?}; it won't be deleted: {:?}",
                    message_id, e
                );
                false
            }
        }
    }

    /// Perform a single pass of the SQS consumption cycle.
    #[instrument(skip(self))]
    pub async fn tick(&mut self) {
        let result = match self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .visibility_timeout(self.visibility_timeout)
            .max_number_of_messages(self.max_number_of_messages)
            .wait_time_seconds(20)
            .send()
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!("Error while consuming messages from SQS queue: {:?}", e);
                return self.fail().await;
            }
        };
        let messages = result.messages().unwrap_or_default();

        let mut handled = Vec::with_capacity(messages.len());
        for message in messages {
            if self.handle(message).await {
                handled.push(message);
            }
        }
        if handled.is_empty() {
            return if cycle_succeeded(messages.len(), handled.len()) {
                self.pass().await
            } else {
                self.fail().await
            };
        }

        info!("Deleting {} SQS messages", handled.len());
        let delete_command_result = self
            .client
            .delete_message_batch()
            .queue_url(&self.queue_url)
            .set_entries(Some(
                handled
                    .iter()
                    .map(|message| {
                        DeleteMessageBatchRequestEntry::builder()
                            .set_id(message.message_id().map(String::from))
                            .set_receipt_handle(message.receipt_handle().map(String::from))
                            .build()
                    })
                    .collect(),
            ))
            .send()
            .await;
        match delete_command_result {
            Err(e) => {
                warn!("Couldn't delete SQS messages: {:?}", e);
                return self.fail().await;
            }
            Ok(result) => {
                let failed = result.failed().unwrap_or_default().len();
                if failed > 0 {
                    warn!(
                        "Couldn't delete some SQS messages: {:?} out of {:?} weren't deleted",
                        failed,
                        handled.len()
                    );
                }
            }
        }
        self.pass().await;
    }
}

/// Consume RDS snapshot notifications from an SQS queue subscribed to
/// the snapshot topic, starting an export for each accepted one.
/// Messages whose handling failed are left in the queue for
/// redelivery.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();
    let app = App::from_env().context("Failed to load the trigger configuration")?;

    let queue_url = var("SQS_QUEUE_URL").context("SQS_QUEUE_URL is required")?;
    let visibility_timeout = var("SQS_VISIBILITY_TIMEOUT")
        .unwrap_or(String::from("30"))
        .parse::<i32>()
        .context("SQS_VISIBILITY_TIMEOUT must be a number")?;
    let max_number_of_messages = var("SQS_MAX_NUMBER_OF_MESSAGES")
        .unwrap_or(String::from("1"))
        .parse::<i32>()
        .context("SQS_MAX_NUMBER_OF_MESSAGES must be a number")?;
    let aws_config = aws_service_config().await;

    let mut consumer = SQSConsumer {
        queue_url,
        visibility_timeout,
        max_number_of_messages,
        client: Client::new(&aws_config),
        app,
        service: RdsExportService::new(&aws_config),
        backoff: 0,
    };

    // Listen for abort signals
    let should_stop = tokio::signal::ctrl_c();
    tokio::pin!(should_stop);

    // Continuously receive messages and run the trigger for each one
    loop {
        tokio::select! {
            _ = consumer.tick() => (),
            _ = &mut should_stop => {
                info!("CTRL-C");
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwraps_sns_envelopes() {
        let body = r#"{"Type": "Notification", "MessageId": "m-1",
            "Message": "{\"Event Message\": \"Manual snapshot created\", \"Source ID\": \"db1\"}"}"#;
        assert_eq!(
            notification_body(body),
            r#"{"Event Message": "Manual snapshot created", "Source ID": "db1"}"#
        );
    }

    #[test]
    fn backs_off_only_when_every_message_failed() {
        assert!(cycle_succeeded(0, 0));
        assert!(cycle_succeeded(3, 1));
        assert!(cycle_succeeded(1, 1));
        assert!(!cycle_succeeded(2, 0));
    }

    #[test]
    fn passes_raw_deliveries_through() {
        let body = r#"{"Event Message": "Manual snapshot created", "Source ID": "db1"}"#;
        assert_eq!(notification_body(body), body);
    }
}

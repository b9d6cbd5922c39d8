use anyhow::{anyhow, Context, Result};
use aws_lambda_events::event::sns::SnsEvent;
use lambda_runtime::{run, service_fn, LambdaEvent};
use rds_snapshot_export::app::{App, Outcome};
use rds_snapshot_export::client::{aws_service_config, RdsExportService};
use rds_snapshot_export::error::TriggerError;

/// Handle the snapshot notification carried by an SNS event. The
/// request id is the invocation token.
async fn function_handler(
    event: LambdaEvent<SnsEvent>,
    app: &App,
    service: &RdsExportService,
) -> Result<Outcome, TriggerError> {
    app.handle_first(
        event
            .payload
            .records
            .iter()
            .map(|record| record.sns.message.as_str()),
        &event.context.request_id,
        service,
    )
    .await
}

/// Run an AWS Lambda function that listens to SNS events carrying RDS
/// snapshot notifications, and that starts an export of the snapshot
/// to S3 when the notification is one of the accepted events.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();
    let app = App::from_env().context("Failed to load the trigger configuration")?;
    let service = RdsExportService::new(&aws_service_config().await);

    run(service_fn(|event| function_handler(event, &app, &service)))
        .await
        .map_err(|e| anyhow!("{:?}", e))
}

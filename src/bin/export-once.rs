use anyhow::{Context, Result};
use rds_snapshot_export::app::App;
use rds_snapshot_export::client::{aws_service_config, RdsExportService};
use std::env::var;
use tokio::io::{stdin, AsyncReadExt};

/// Handle a single snapshot notification read from stdin, using
/// `INVOCATION_TOKEN` as the invocation token, and print the outcome
/// as JSON.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
    let app = App::from_env().context("Failed to load the trigger configuration")?;
    let service = RdsExportService::new(&aws_service_config().await);

    let token = var("INVOCATION_TOKEN").context("INVOCATION_TOKEN is required")?;
    let mut body = String::new();
    stdin()
        .read_to_string(&mut body)
        .await
        .context("Failed to read the notification from stdin")?;

    let outcome = app
        .handle(&body, &token, &service)
        .await
        .with_context(|| format!("Failed to handle notification {:?}", body.trim()))?;
    println!("{}", serde_json::to_string(&outcome)?);
    Ok(())
}

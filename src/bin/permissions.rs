use anyhow::{Context, Result};
use rds_snapshot_export::conf::TriggerConfig;
use rds_snapshot_export::policy::PermissionBoundary;

/// Print the IAM policy documents the export and trigger roles need,
/// given the same environment the trigger runs with.
fn main() -> Result<()> {
    let config = TriggerConfig::from_env().context("Failed to load the trigger configuration")?;
    let boundary = PermissionBoundary::new(&config);
    println!("{}", serde_json::to_string_pretty(&boundary.documents())?);
    Ok(())
}

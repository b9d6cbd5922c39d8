//! Defines the AWS configuration and the export service the trigger
//! submits requests to.

use crate::task::ExportTaskRequest;
use anyhow::Result;
use async_trait::async_trait;
use aws_config::{from_env, SdkConfig};
use aws_sdk_rds::error::DisplayErrorContext;
use aws_sdk_rds::operation::start_export_task::StartExportTaskOutput;
use aws_smithy_types_convert::date_time::DateTimeExt;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::env;
use tracing::{instrument, warn};

/// Load the shared AWS configuration. `AWS_ENDPOINT_URL` overrides
/// the service endpoint, e.g. to point at a local emulator.
pub async fn aws_service_config() -> SdkConfig {
    if let Ok(endpoint_url) = env::var("AWS_ENDPOINT_URL") {
        from_env()
            .endpoint_url(
                if endpoint_url.starts_with("http://") || endpoint_url.starts_with("https://") {
                    endpoint_url
                } else {
                    format!("https://{}", endpoint_url)
                },
            )
            .region("us-east-1") // should be OK since the endpoint was overridden
            .load()
            .await
    } else {
        from_env().load().await
    }
}

/// What the export service reports back after a task is started.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExportTaskStatus {
    pub export_task_identifier: Option<String>,
    pub source_arn: Option<String>,
    pub status: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_prefix: Option<String>,
    pub iam_role_arn: Option<String>,
    pub kms_key_id: Option<String>,
    pub snapshot_time: Option<DateTime<Utc>>,
    pub task_start_time: Option<DateTime<Utc>>,
}

impl From<StartExportTaskOutput> for ExportTaskStatus {
    fn from(output: StartExportTaskOutput) -> Self {
        ExportTaskStatus {
            export_task_identifier: output.export_task_identifier().map(String::from),
            source_arn: output.source_arn().map(String::from),
            status: output.status().map(String::from),
            s3_bucket: output.s3_bucket().map(String::from),
            s3_prefix: output.s3_prefix().map(String::from),
            iam_role_arn: output.iam_role_arn().map(String::from),
            kms_key_id: output.kms_key_id().map(String::from),
            snapshot_time: output.snapshot_time().and_then(|t| t.to_chrono_utc().ok()),
            task_start_time: output.task_start_time().and_then(|t| t.to_chrono_utc().ok()),
        }
    }
}

/// A service able to start snapshot export tasks.
#[async_trait]
pub trait ExportService {
    /// Submit a single request. Failures are returned as they came.
    async fn start_export(&self, request: &ExportTaskRequest) -> Result<ExportTaskStatus>;
}

/// The RDS `StartExportTask` API.
pub struct RdsExportService {
    client: aws_sdk_rds::Client,
}

impl RdsExportService {
    pub fn new(config: &SdkConfig) -> Self {
        RdsExportService {
            client: aws_sdk_rds::Client::new(config),
        }
    }
}

#[async_trait]
impl ExportService for RdsExportService {
    #[instrument(skip(self))]
    async fn start_export(&self, request: &ExportTaskRequest) -> Result<ExportTaskStatus> {
        let output = self
            .client
            .start_export_task()
            .export_task_identifier(&request.export_task_identifier)
            .source_arn(&request.source_arn)
            .iam_role_arn(&request.iam_role_arn)
            .kms_key_id(&request.kms_key_id)
            .s3_bucket_name(&request.s3_bucket_name)
            .set_s3_prefix(request.s3_prefix.clone())
            .send()
            .await
            .map_err(|e| {
                warn!(
                    "Export task {:?} was not started: {}",
                    request.export_task_identifier,
                    DisplayErrorContext(&e)
                );
                anyhow::Error::new(e)
            })?;
        Ok(ExportTaskStatus::from(output))
    }
}

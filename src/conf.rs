//! Defines configuration as read from the environment.

use crate::error::TriggerError;
use serde::Deserialize;
use std::collections::BTreeSet;

/// The raw settings, as given through environment variables. Every
/// field is optional here; [`TriggerConfig`] decides which ones are
/// required. Variable names are matched case-insensitively, so
/// `IamRoleArn` and `IAMROLEARN` are the same setting.
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// The role the export service assumes to write to the bucket.
    #[serde(default, rename = "iamrolearn")]
    pub iam_role_arn: Option<String>,

    /// The destination bucket.
    #[serde(default, rename = "s3bucketname")]
    pub s3_bucket_name: Option<String>,

    /// The KMS key used to encrypt the export.
    #[serde(default, rename = "kmskeyarn")]
    pub kms_key_arn: Option<String>,

    /// The ARN prefix of snapshot resources, e.g.
    /// `arn:aws:rds:us-east-1:123456789012:snapshot`. The snapshot
    /// identifier is appended to it after a colon.
    #[serde(default, rename = "snapshotarnprefix")]
    pub snapshot_arn_prefix: Option<String>,

    /// The path within the bucket to export snapshots to.
    #[serde(default, rename = "s3prefix")]
    pub s3_prefix: Option<String>,

    /// Comma-separated event messages that trigger an export, e.g.
    /// `"Manual snapshot created,Automated snapshot created"`.
    #[serde(default, rename = "events")]
    pub events: Option<String>,

    /// Only snapshots whose identifier starts with this are
    /// exported.
    #[serde(default, rename = "prefixfilter")]
    pub prefix_filter: Option<String>,
}

/// The validated trigger configuration. Built once per process and
/// never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerConfig {
    /// The role the export service assumes.
    pub role_arn: String,

    /// The destination bucket.
    pub bucket_name: String,

    /// The key the export is encrypted with.
    pub key_arn: String,

    /// The snapshot ARN prefix, without the trailing colon.
    pub snapshot_arn_prefix: String,

    /// The path within the bucket, without its trailing slash.
    pub bucket_prefix: Option<String>,

    /// Accepted event messages.
    pub accepted_events: BTreeSet<String>,

    /// The prefix snapshot identifiers must start with, if any.
    pub identifier_prefix_filter: Option<String>,
}

/// Keep a setting only if it holds something other than whitespace.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Require a setting, reporting it by its environment name.
fn required(value: Option<String>, field: &'static str) -> Result<String, TriggerError> {
    non_empty(value).ok_or(TriggerError::Configuration { field })
}

/// Remove exactly one trailing slash from a bucket prefix.
pub fn normalize_prefix(prefix: &str) -> &str {
    prefix.strip_suffix('/').unwrap_or(prefix)
}

/// Split a comma-delimited list of event messages into a set.
pub fn parse_events(events: &str) -> BTreeSet<String> {
    events
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(String::from)
        .collect()
}

impl TryFrom<Settings> for TriggerConfig {
    type Error = TriggerError;

    /// Validate settings. Required fields are checked in a fixed
    /// order, and the first one missing is the one reported.
    fn try_from(settings: Settings) -> Result<Self, Self::Error> {
        let role_arn = required(settings.iam_role_arn, "IamRoleArn")?;
        let bucket_name = required(settings.s3_bucket_name, "S3BucketName")?;
        let key_arn = required(settings.kms_key_arn, "KmsKeyArn")?;
        let accepted_events = parse_events(&required(settings.events, "Events")?);
        if accepted_events.is_empty() {
            return Err(TriggerError::Configuration { field: "Events" });
        }
        let snapshot_arn_prefix = required(settings.snapshot_arn_prefix, "SnapshotArnPrefix")?;
        let bucket_prefix = non_empty(settings.s3_prefix)
            .map(|p| String::from(normalize_prefix(&p)))
            .filter(|p| !p.is_empty());
        Ok(TriggerConfig {
            role_arn,
            bucket_name,
            key_arn,
            snapshot_arn_prefix,
            bucket_prefix,
            accepted_events,
            identifier_prefix_filter: non_empty(settings.prefix_filter),
        })
    }
}

impl TriggerConfig {
    /// Load the configuration from arbitrary key/value pairs.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, TriggerError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let settings: Settings =
            envy::from_iter(vars.into_iter().map(|(k, v)| (k.into(), v.into())))?;
        Self::try_from(settings)
    }

    /// Load the configuration from the process environment.
    pub fn from_env() -> Result<Self, TriggerError> {
        let settings: Settings = envy::from_env()?;
        Self::try_from(settings)
    }
}

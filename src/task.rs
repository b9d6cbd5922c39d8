//! Defines the export task request and the derivation of its
//! identifier.

use crate::conf::TriggerConfig;
use serde::Serialize;
use tracing::warn;

/// The export service refuses task identifiers longer than this.
pub const MAX_TASK_IDENTIFIER_LENGTH: usize = 60;

/// Build a task identifier from a snapshot identifier and a token
/// unique to the invocation. The snapshot identifier is kept whole
/// whenever possible; the token is what gets cut when the result
/// would be too long. Trailing dashes are never kept.
pub fn task_identifier(source_identifier: &str, token: &str) -> String {
    let identifier: String = format!("{}-{}", source_identifier, token)
        .chars()
        .take(MAX_TASK_IDENTIFIER_LENGTH)
        .collect();
    String::from(identifier.trim_end_matches('-'))
}

/// A request to start an export task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExportTaskRequest {
    pub iam_role_arn: String,
    pub export_task_identifier: String,
    pub source_arn: String,
    pub kms_key_id: String,
    pub s3_bucket_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_prefix: Option<String>,
}

impl ExportTaskRequest {
    /// Assemble the request for a snapshot.
    pub fn new(config: &TriggerConfig, source_identifier: &str, token: &str) -> Self {
        let export_task_identifier = task_identifier(source_identifier, token);
        if export_task_identifier.chars().count() <= source_identifier.chars().count() {
            warn!(
                "Snapshot identifier {:?} leaves no room for the invocation token; \
                 repeated deliveries will reuse task identifier {:?}",
                source_identifier, export_task_identifier
            );
        }
        ExportTaskRequest {
            iam_role_arn: config.role_arn.clone(),
            export_task_identifier,
            source_arn: format!("{}:{}", config.snapshot_arn_prefix, source_identifier),
            kms_key_id: config.key_arn.clone(),
            s3_bucket_name: config.bucket_name.clone(),
            s3_prefix: config.bucket_prefix.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    #[test]
    fn short_identifiers_are_kept_whole() {
        let identifier = task_identifier("mydb-final-snapshot", "abc123");
        assert_eq!(identifier, "mydb-final-snapshot-abc123");
        assert_eq!(identifier.len(), 26);
    }

    #[test]
    fn long_identifiers_lose_the_token_first() {
        let source = "a".repeat(58);
        assert_eq!(task_identifier(&source, "xyz"), format!("{}-x", source));

        let source = "b".repeat(59);
        let identifier = task_identifier(&source, "xyz");
        assert_eq!(identifier.len(), 59);
        assert_eq!(identifier, source);
    }

    #[test]
    fn overlong_identifiers_drop_the_token_entirely() {
        let source = "c".repeat(70);
        assert_eq!(task_identifier(&source, "token"), "c".repeat(60));
    }

    #[test]
    fn builds_the_request_from_config() {
        let config = TriggerConfig {
            role_arn: String::from("arn:aws:iam::123456789012:role/export"),
            bucket_name: String::from("exports-bucket"),
            key_arn: String::from("arn:aws:kms:us-east-1:123456789012:key/abcd"),
            snapshot_arn_prefix: String::from("arn:aws:rds:us-east-1:123456789012:snapshot"),
            bucket_prefix: Some(String::from("exports")),
            accepted_events: BTreeSet::from([String::from("Manual snapshot created")]),
            identifier_prefix_filter: None,
        };
        let request = ExportTaskRequest::new(&config, "db1", "req-1");
        assert_eq!(
            request.source_arn,
            "arn:aws:rds:us-east-1:123456789012:snapshot:db1"
        );
        assert_eq!(request.export_task_identifier, "db1-req-1");
        assert_eq!(request.s3_prefix.as_deref(), Some("exports"));

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["ExportTaskIdentifier"], "db1-req-1");
        assert_eq!(json["KmsKeyId"], config.key_arn);
        assert_eq!(json["S3Prefix"], "exports");
    }

    proptest! {
        #[test]
        fn identifiers_fit_and_never_end_in_a_dash(
            source in "[a-z0-9-]{1,80}",
            token in "[a-f0-9-]{1,40}",
        ) {
            let identifier = task_identifier(&source, &token);
            let joined = format!("{}-{}", source, token);
            prop_assert!(identifier.len() <= MAX_TASK_IDENTIFIER_LENGTH);
            prop_assert!(!identifier.ends_with('-'));
            let kept = &joined[..joined.len().min(MAX_TASK_IDENTIFIER_LENGTH)];
            prop_assert_eq!(identifier.as_str(), kept.trim_end_matches('-'));
        }
    }
}

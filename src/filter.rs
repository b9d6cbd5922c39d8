//! Decides whether a snapshot lifecycle notification calls for an
//! export.

use crate::conf::TriggerConfig;
use crate::error::TriggerError;
use itertools::Itertools;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use tracing::info;

/// The field holding the event description.
const EVENT_MESSAGE_FIELD: &str = "Event Message";

/// The field holding the identifier of the snapshot.
const SOURCE_ID_FIELD: &str = "Source ID";

/// Read a string field of an RDS event notification by name. A
/// missing or null field is `None`; any other non-string is an error.
fn string_field(message: &Map<String, Value>, name: &str) -> Result<Option<String>, TriggerError> {
    match message.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(other) => Err(TriggerError::MalformedMessage(format!(
            "field {:?} is not a string ({})",
            name, other
        ))),
    }
}

/// An in-scope notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub event_message: String,
    pub source_identifier: String,
    pub invocation_token: String,
}

/// Why a notification was left alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// The event message isn't one of the accepted events.
    EventNotAccepted { event_message: String },
    /// The snapshot identifier doesn't start with the prefix filter.
    IdentifierFiltered {
        source_identifier: String,
        prefix: String,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::EventNotAccepted { event_message } => {
                write!(f, "event {:?} is not an accepted event", event_message)
            }
            SkipReason::IdentifierFiltered {
                source_identifier,
                prefix,
            } => write!(
                f,
                "snapshot {:?} doesn't start with {:?}",
                source_identifier, prefix
            ),
        }
    }
}

/// The filter's verdict on a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Accept(NotificationEvent),
    Skip(SkipReason),
}

/// Parse a notification body and decide what to do with it. A body
/// that isn't JSON, or that names no snapshot, is an error; a
/// notification that is merely out of scope is a skip.
pub fn evaluate(
    config: &TriggerConfig,
    body: &str,
    invocation_token: &str,
) -> Result<Decision, TriggerError> {
    let message: Map<String, Value> = serde_json::from_str(body)?;
    let event_message = string_field(&message, EVENT_MESSAGE_FIELD)?.unwrap_or_default();
    let source_identifier = string_field(&message, SOURCE_ID_FIELD)?
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            TriggerError::MalformedMessage(String::from("message is missing Source ID"))
        })?;

    if !config.accepted_events.contains(&event_message) {
        info!(
            "Wrong event {:?}, waiting for one of [{}]",
            event_message,
            config
                .accepted_events
                .iter()
                .map(|e| format!("{:?}", e))
                .join(", ")
        );
        return Ok(Decision::Skip(SkipReason::EventNotAccepted { event_message }));
    }

    if let Some(prefix) = &config.identifier_prefix_filter {
        if !source_identifier.starts_with(prefix.as_str()) {
            info!(
                "Snapshot {:?} doesn't match prefix filter {:?}",
                source_identifier,
                prefix
            );
            return Ok(Decision::Skip(SkipReason::IdentifierFiltered {
                source_identifier,
                prefix: prefix.clone(),
            }));
        }
    }

    Ok(Decision::Accept(NotificationEvent {
        event_message,
        source_identifier,
        invocation_token: String::from(invocation_token),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn config(prefix_filter: Option<&str>) -> TriggerConfig {
        TriggerConfig {
            role_arn: String::from("arn:aws:iam::123456789012:role/export"),
            bucket_name: String::from("exports-bucket"),
            key_arn: String::from("arn:aws:kms:us-east-1:123456789012:key/abcd"),
            snapshot_arn_prefix: String::from("arn:aws:rds:us-east-1:123456789012:snapshot"),
            bucket_prefix: None,
            accepted_events: BTreeSet::from([String::from("Manual snapshot created")]),
            identifier_prefix_filter: prefix_filter.map(String::from),
        }
    }

    #[test]
    fn accepts_whitelisted_events() {
        let body = r#"{"Event Message": "Manual snapshot created", "Source ID": "db1", "Event ID": "x"}"#;
        assert_eq!(
            evaluate(&config(None), body, "req-1").unwrap(),
            Decision::Accept(NotificationEvent {
                event_message: String::from("Manual snapshot created"),
                source_identifier: String::from("db1"),
                invocation_token: String::from("req-1"),
            })
        );
    }

    #[test]
    fn skips_other_events() {
        let body = r#"{"Event Message": "Backup started", "Source ID": "db1"}"#;
        assert!(matches!(
            evaluate(&config(None), body, "req-1").unwrap(),
            Decision::Skip(SkipReason::EventNotAccepted { .. })
        ));
    }

    #[test]
    fn skips_identifiers_outside_the_prefix_filter() {
        let body = r#"{"Event Message": "Manual snapshot created", "Source ID": "staging-db1"}"#;
        assert_eq!(
            evaluate(&config(Some("prod-")), body, "req-1").unwrap(),
            Decision::Skip(SkipReason::IdentifierFiltered {
                source_identifier: String::from("staging-db1"),
                prefix: String::from("prod-"),
            })
        );
        let body = r#"{"Event Message": "Manual snapshot created", "Source ID": "prod-db1"}"#;
        assert!(matches!(
            evaluate(&config(Some("prod-")), body, "req-1").unwrap(),
            Decision::Accept(_)
        ));
    }

    #[test]
    fn missing_source_id_is_an_error() {
        for body in [
            r#"{"Event Message": "Manual snapshot created", "Source ID": ""}"#,
            r#"{"Event Message": "Manual snapshot created"}"#,
            r#"{"Event Message": "Backup started"}"#,
        ] {
            assert!(matches!(
                evaluate(&config(None), body, "req-1"),
                Err(TriggerError::MalformedMessage(_))
            ));
        }
    }

    #[test]
    fn fields_are_read_by_name_only() {
        let err = evaluate(&config(None), r#"["Manual snapshot created", "db1"]"#, "req-1")
            .unwrap_err();
        assert!(matches!(err, TriggerError::MalformedMessage(_)));
        assert!(err
            .to_string()
            .starts_with("Malformed message: body is not a valid notification"));

        let body = r#"{"Event Message": null, "Source ID": "db1"}"#;
        assert!(matches!(
            evaluate(&config(None), body, "req-1").unwrap(),
            Decision::Skip(SkipReason::EventNotAccepted { .. })
        ));
    }

    #[test]
    fn unparseable_bodies_are_errors() {
        for body in [
            "not json",
            "",
            r#"{"Source ID": 12}"#,
            r#"{"Event Message": 5, "Source ID": "db1"}"#,
            r#"["Manual snapshot created", "db1"]"#,
            r#""Manual snapshot created""#,
        ] {
            assert!(matches!(
                evaluate(&config(None), body, "req-1"),
                Err(TriggerError::MalformedMessage(_))
            ));
        }
    }
}

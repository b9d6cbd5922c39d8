//! Describes the IAM permissions the export needs, as plain policy
//! documents for whatever provisions the roles. Nothing here is used
//! at invocation time.

use crate::conf::TriggerConfig;
use serde::Serialize;
use serde_json::{json, Value};

/// The service principal RDS uses to run export tasks.
pub const EXPORT_SERVICE_PRINCIPAL: &str = "export.rds.amazonaws.com";

/// Statement ids starting with this mark a deliberate wildcard grant.
pub const WILDCARD_EXCEPTION_SID_PREFIX: &str = "WildcardException";

/// An IAM policy document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: &'static str,
    pub statement: Vec<Statement>,
}

/// A single allow statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    pub sid: String,
    pub effect: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<Value>,
    pub action: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resource: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Value>,
}

impl Statement {
    fn allow(sid: &str, actions: &[&str], resources: Vec<String>) -> Self {
        Statement {
            sid: String::from(sid),
            effect: "Allow",
            principal: None,
            action: actions.iter().map(|a| String::from(*a)).collect(),
            resource: resources,
            condition: None,
        }
    }

    fn with_condition(mut self, condition: Value) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Whether the statement grants every action or every resource.
    pub fn is_wildcard(&self) -> bool {
        self.action.iter().any(|a| a == "*") || self.resource.iter().any(|r| r == "*")
    }
}

impl PolicyDocument {
    fn new(statement: Vec<Statement>) -> Self {
        PolicyDocument {
            version: "2012-10-17",
            statement,
        }
    }

    /// Wildcard statements not marked as documented exceptions.
    pub fn undocumented_wildcards(&self) -> Vec<&Statement> {
        self.statement
            .iter()
            .filter(|s| s.is_wildcard() && !s.sid.starts_with(WILDCARD_EXCEPTION_SID_PREFIX))
            .collect()
    }
}

/// The partition segment of an ARN, `aws` unless stated otherwise.
fn partition(arn: &str) -> &str {
    arn.split(':')
        .nth(1)
        .filter(|p| !p.is_empty())
        .unwrap_or("aws")
}

/// The least-privilege grants that let the export service act on
/// behalf of the trigger.
#[derive(Debug, Clone)]
pub struct PermissionBoundary<'a> {
    config: &'a TriggerConfig,
}

impl<'a> PermissionBoundary<'a> {
    pub fn new(config: &'a TriggerConfig) -> Self {
        PermissionBoundary { config }
    }

    fn bucket_arn(&self) -> String {
        format!(
            "arn:{}:s3:::{}",
            partition(&self.config.role_arn),
            self.config.bucket_name
        )
    }

    fn prefix(&self) -> &str {
        self.config.bucket_prefix.as_deref().unwrap_or("")
    }

    /// Lets the export service assume the export role.
    pub fn export_role_trust_policy(&self) -> PolicyDocument {
        let mut statement = Statement::allow("AssumeExportRole", &["sts:AssumeRole"], Vec::new());
        statement.principal = Some(json!({ "Service": EXPORT_SERVICE_PRINCIPAL }));
        PolicyDocument::new(vec![statement])
    }

    /// What the export role may do: read, write and delete objects
    /// under the prefix, and list the bucket only within it.
    pub fn export_role_policy(&self) -> PolicyDocument {
        let bucket_arn = self.bucket_arn();
        let prefix = self.prefix();
        PolicyDocument::new(vec![
            Statement::allow(
                "ExportObjects",
                &["s3:GetObject*", "s3:PutObject*", "s3:DeleteObject*"],
                vec![
                    format!("{}/{}", bucket_arn, prefix),
                    format!("{}/{}*", bucket_arn, prefix),
                ],
            ),
            Statement::allow(
                "ExportBucket",
                &["s3:ListBucket", "s3:GetBucketLocation"],
                vec![bucket_arn],
            )
            .with_condition(json!({
                "StringLike": { "s3:prefix": [prefix, format!("{}*", prefix)] }
            })),
        ])
    }

    /// What the trigger's own identity may do: use the key, hand the
    /// export role to the export service, and start exports of the
    /// snapshots it would accept.
    pub fn trigger_policy(&self) -> PolicyDocument {
        let config = self.config;
        PolicyDocument::new(vec![
            Statement::allow(
                "UseExportKey",
                &["kms:DescribeKey", "kms:CreateGrant"],
                vec![config.key_arn.clone()],
            ),
            Statement::allow(
                "PassExportRole",
                &["iam:PassRole"],
                vec![config.role_arn.clone()],
            )
            .with_condition(json!({
                "StringEquals": { "iam:PassedToService": EXPORT_SERVICE_PRINCIPAL }
            })),
            Statement::allow(
                "StartExport",
                &["rds:StartExportTask"],
                vec![format!(
                    "{}:{}*",
                    config.snapshot_arn_prefix,
                    config.identifier_prefix_filter.as_deref().unwrap_or("")
                )],
            ),
        ])
    }

    /// All documents, keyed by the role they belong to.
    pub fn documents(&self) -> Value {
        json!({
            "ExportRole": {
                "AssumeRolePolicyDocument": self.export_role_trust_policy(),
                "PolicyDocument": self.export_role_policy(),
            },
            "TriggerRole": {
                "PolicyDocument": self.trigger_policy(),
            },
        })
    }
}

//! Defines the read-only application state and the handling of a
//! single notification.

use crate::client::{ExportService, ExportTaskStatus};
use crate::conf::TriggerConfig;
use crate::error::TriggerError;
use crate::filter::{evaluate, Decision, SkipReason};
use crate::task::ExportTaskRequest;
use serde::Serialize;
use tracing::{info, instrument, warn};

/// The result of a handled notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Nothing was done.
    Skipped { reason: SkipReason },
    /// An export task was started.
    Submitted { task: ExportTaskStatus },
}

/// An App is an initialized application state, derived from the
/// validated configuration. It holds nothing that changes between
/// invocations, so it can be shared freely.
pub struct App {
    /// The trigger configuration.
    pub config: TriggerConfig,
}

impl App {
    pub fn new(config: TriggerConfig) -> Self {
        App { config }
    }

    /// Initialize an App from the process environment.
    pub fn from_env() -> Result<Self, TriggerError> {
        Ok(App::new(TriggerConfig::from_env()?))
    }

    /// Handle one notification body. At most one export request is
    /// submitted, and its failure is returned untouched.
    #[instrument(skip(self, body, service))]
    pub async fn handle<S>(
        &self,
        body: &str,
        invocation_token: &str,
        service: &S,
    ) -> Result<Outcome, TriggerError>
    where
        S: ExportService + Sync + ?Sized,
    {
        let event = match evaluate(&self.config, body, invocation_token)? {
            Decision::Skip(reason) => return Ok(Outcome::Skipped { reason }),
            Decision::Accept(event) => event,
        };
        info!(
            "Message received: {:?} for {:?}",
            event.event_message, event.source_identifier
        );

        let request =
            ExportTaskRequest::new(&self.config, &event.source_identifier, &event.invocation_token);
        info!("Going to run export {:?}", request);

        let task = service
            .start_export(&request)
            .await
            .map_err(TriggerError::Submission)?;
        info!(
            "Export task {:?} is {}",
            request.export_task_identifier,
            task.status.as_deref().unwrap_or("submitted")
        );
        Ok(Outcome::Submitted { task })
    }

    /// Handle the notifications delivered in a single invocation. Only
    /// the first one is considered; the trigger never starts more than
    /// one export per invocation.
    pub async fn handle_first<'a, I, S>(
        &self,
        bodies: I,
        invocation_token: &str,
        service: &S,
    ) -> Result<Outcome, TriggerError>
    where
        I: IntoIterator<Item = &'a str>,
        S: ExportService + Sync + ?Sized,
    {
        let mut bodies = bodies.into_iter();
        let body = bodies.next().ok_or_else(|| {
            TriggerError::MalformedMessage(String::from("event carries no records"))
        })?;
        let ignored = bodies.count();
        if ignored > 0 {
            warn!(
                "Event carries more than one record; {} subsequent records are ignored",
                ignored
            );
        }
        self.handle(body, invocation_token, service).await
    }
}

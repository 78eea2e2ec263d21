use std::sync::Arc;

use log::info;

use super::prompt;
use super::result::AnalysisResult;
use super::selector::FileRecord;
use super::service::{CompletionRequest, CompletionService};
use super::task::{AnalysisKind, AnalysisTask};
use crate::error::{ButterflyError, Result};

/// Runs one analysis task against the completion service.
///
/// There is exactly one implementation; the five analysis dimensions are
/// five [`AnalysisTask`] values handed to it.
#[derive(Clone)]
pub struct AnalysisClient {
    task: Arc<AnalysisTask>,
    service: Arc<dyn CompletionService>,
}

impl AnalysisClient {
    /// Create a client for `task` that talks to `service`
    pub fn new(task: AnalysisTask, service: Arc<dyn CompletionService>) -> Self {
        Self {
            task: Arc::new(task),
            service,
        }
    }

    /// The task this client runs
    pub fn task(&self) -> &AnalysisTask {
        &self.task
    }

    /// Shorthand for `self.task().kind`
    pub fn kind(&self) -> AnalysisKind {
        self.task.kind
    }

    /// Builds the prompt, calls the service and validates the answer.
    ///
    /// Transport problems come back as [`ButterflyError::Service`] and
    /// schema problems as [`ButterflyError::SchemaViolation`], both tagged
    /// with this task. A partially valid payload is never returned.
    pub async fn analyze(&self, records: &[FileRecord]) -> Result<AnalysisResult> {
        let kind = self.kind();
        let prompt = prompt::build(&self.task, records);
        info!("Running {} analysis over {} files", kind, records.len());

        let request = CompletionRequest {
            kind,
            system: prompt.system,
            user: prompt.user,
            schema: self.task.schema.clone(),
        };

        let payload = self
            .service
            .complete(&request)
            .await
            .map_err(|e| match e {
                ButterflyError::Service { .. } | ButterflyError::SchemaViolation { .. } => e,
                other => ButterflyError::service(kind, other.to_string()),
            })?;

        AnalysisResult::from_payload(kind, &self.task.schema, payload)
            .map_err(|message| ButterflyError::SchemaViolation { kind, message })
    }
}

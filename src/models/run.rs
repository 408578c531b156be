use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{errors::ErrorInfo, pipeline::SourceKind};

use super::Verdict;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    #[default]
    Idle,
    AcquiringImage,
    Analyzing,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// A run in one of these states owns the pipeline.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, RunStatus::AcquiringImage | RunStatus::Analyzing)
    }

    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

/// The single capture run of the session. Mutated only by the capture pipeline;
/// everyone else sees clones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    pub id: Option<Uuid>,
    pub status: RunStatus,
    pub source: Option<SourceKind>,
    pub started_at: Option<DateTime<Utc>>,
    pub result: Option<Verdict>,
    pub error: Option<ErrorInfo>,
}

impl PipelineRun {
    pub fn idle() -> Self {
        Self::default()
    }

    pub(crate) fn begin(source: SourceKind, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Some(Uuid::new_v4()),
            status: RunStatus::AcquiringImage,
            source: Some(source),
            started_at: Some(started_at),
            result: None,
            error: None,
        }
    }

    pub(crate) fn analyzing(&mut self) {
        self.status = RunStatus::Analyzing;
    }

    pub(crate) fn succeed(&mut self, verdict: Verdict) {
        self.status = RunStatus::Succeeded;
        self.result = Some(verdict);
        self.error = None;
    }

    pub(crate) fn fail(&mut self, error: ErrorInfo) {
        self.status = RunStatus::Failed;
        self.result = None;
        self.error = Some(error);
    }

    pub(crate) fn cancel(&mut self) {
        self.status = RunStatus::Cancelled;
        self.result = None;
        self.error = None;
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::idle();
    }
}

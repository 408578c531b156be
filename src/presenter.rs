use std::time::{Duration, Instant};

use serde::Serialize;

use crate::{
    errors::ErrorAction,
    models::{PipelineRun, RunStatus, TruthLabel},
    overlay::VisibilityAnimation,
};

const ENTER_DURATION: Duration = Duration::from_millis(200);
const EXIT_DURATION: Duration = Duration::from_millis(150);

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Tone {
    Success,
    Warning,
    Error,
}

impl From<TruthLabel> for Tone {
    fn from(label: TruthLabel) -> Self {
        match label {
            TruthLabel::LikelyTrue => Tone::Success,
            TruthLabel::Uncertain => Tone::Warning,
            TruthLabel::LikelyFalse => Tone::Error,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "view", rename_all = "camelCase")]
pub enum ResultView {
    #[serde(rename_all = "camelCase")]
    Loading { title: String, subtitle: String },
    #[serde(rename_all = "camelCase")]
    Error {
        message: String,
        action_label: String,
        opens_settings: bool,
    },
    #[serde(rename_all = "camelCase")]
    Success {
        claim: String,
        truth_score: u8,
        label: TruthLabel,
        /// "Likely True" / "Uncertain" / "Likely False", ready to render.
        label_text: String,
        tone: Tone,
        summary: String,
        sources: Vec<String>,
        action_label: String,
    },
}

/// Maps a run onto what the modal shows. `None` means no modal at all, which
/// covers an idle pipeline and a run the user cancelled.
pub fn project(run: &PipelineRun) -> Option<ResultView> {
    match run.status {
        RunStatus::Idle | RunStatus::Cancelled => None,
        RunStatus::AcquiringImage | RunStatus::Analyzing => Some(ResultView::Loading {
            title: "Analyzing...".to_string(),
            subtitle: "Searching the web for truth".to_string(),
        }),
        RunStatus::Failed => {
            let (message, opens_settings) = match &run.error {
                Some(info) => (info.message.clone(), info.action == ErrorAction::OpenSettings),
                None => ("Something went wrong. Please try again.".to_string(), false),
            };
            Some(ResultView::Error {
                message,
                action_label: if opens_settings { "Open Settings" } else { "OK" }.to_string(),
                opens_settings,
            })
        }
        RunStatus::Succeeded => {
            let verdict = run.result.as_ref()?;
            let label = verdict.label();
            Some(ResultView::Success {
                claim: verdict.claim.clone(),
                truth_score: verdict.truth_score,
                label,
                label_text: label.as_str().to_string(),
                tone: label.into(),
                summary: verdict.summary.clone(),
                sources: verdict.sources.clone(),
                action_label: "Got it!".to_string(),
            })
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ModalPhase {
    Hidden,
    Entering,
    Shown,
    Exiting,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresenterSnapshot {
    pub visible: bool,
    pub phase: ModalPhase,
    pub opacity: f32,
    pub view: Option<ResultView>,
}

/// Result modal. Follows the pipeline run; the last view stays on screen while
/// the exit animation plays.
#[derive(Debug, Clone)]
pub struct ResultPresenter {
    view: Option<ResultView>,
    visible: bool,
    animation: VisibilityAnimation,
}

impl Default for ResultPresenter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultPresenter {
    pub fn new() -> Self {
        Self {
            view: None,
            visible: false,
            animation: VisibilityAnimation::hidden(),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Re-projects `run`. Returns true when visibility flipped.
    ///
    /// The modal does not open while the image is still being acquired: the
    /// host picker is in front, and a cancelled pick must leave no trace.
    pub fn sync(&mut self, run: &PipelineRun, now: Instant) -> bool {
        match project(run) {
            Some(_) if run.status == RunStatus::AcquiringImage && !self.visible => false,
            Some(view) => {
                self.view = Some(view);
                if self.visible {
                    return false;
                }
                self.visible = true;
                self.animation.animate_to(1.0, ENTER_DURATION, now);
                true
            }
            None => {
                if !self.visible {
                    return false;
                }
                self.visible = false;
                self.animation.animate_to(0.0, EXIT_DURATION, now);
                true
            }
        }
    }

    pub fn phase_at(&self, now: Instant) -> ModalPhase {
        let settled = self.animation.is_settled(now);
        match (self.visible, settled) {
            (true, false) => ModalPhase::Entering,
            (true, true) => ModalPhase::Shown,
            (false, false) => ModalPhase::Exiting,
            (false, true) => ModalPhase::Hidden,
        }
    }

    pub fn opacity_at(&self, now: Instant) -> f32 {
        self.animation.value_at(now)
    }

    pub fn snapshot(&self, now: Instant) -> PresenterSnapshot {
        let phase = self.phase_at(now);
        PresenterSnapshot {
            visible: self.visible,
            phase,
            opacity: self.opacity_at(now),
            view: match phase {
                ModalPhase::Hidden => None,
                _ => self.view.clone(),
            },
        }
    }
}

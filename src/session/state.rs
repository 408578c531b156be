use serde::{Deserialize, Serialize};

use crate::{
    models::PipelineRun,
    overlay::{OverlaySnapshot, TriggerGesture},
    permissions::Capability,
    presenter::PresenterSnapshot,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Home,
    Permissions,
    Active,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AppLifecycle {
    Foreground,
    Background,
}

/// When the floating trigger is offered during an active session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TriggerPolicy {
    /// Shown only while the app sits behind other apps.
    #[default]
    BackgroundOverlay,
    /// Always offered in-app while Active, independent of lifecycle.
    InAppButton,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum SessionEvent {
    GetStarted,
    PermissionsAcked,
    LifecycleChanged(AppLifecycle),
    Gesture(TriggerGesture),
    TriggerActivated,
    ResultDismissed,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum Rejection {
    /// Required capabilities still missing; the UI re-prompts.
    #[serde(rename_all = "camelCase")]
    PermissionsMissing { missing: Vec<Capability> },
    /// A capture is in flight. Never surfaced to the user.
    Busy,
}

/// Outcome of one dispatched event.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum Transition {
    Applied,
    /// Not meaningful in the current state; nothing changed.
    Ignored,
    Rejected(Rejection),
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub foreground: bool,
    pub policy: TriggerPolicy,
    pub overlay: OverlaySnapshot,
    pub presenter: PresenterSnapshot,
    pub run: PipelineRun,
}

impl SessionSnapshot {
    pub fn in_flight(&self) -> bool {
        self.run.status.is_in_flight()
    }
}

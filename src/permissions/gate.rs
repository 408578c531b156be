use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use async_trait::async_trait;
use futures::future::join_all;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::errors::{BrokerError, PipelineError};

use super::{Capability, Platform};

/// Answer to an interactive permission prompt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PermissionOutcome {
    Granted,
    /// The user said no, asking again in-app may still succeed.
    DeniedSoft,
    /// The OS will not show the prompt again; only host settings can fix it.
    DeniedHard,
}

impl PermissionOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionOutcome::Granted)
    }
}

/// Host-side permission collaborator.
#[async_trait]
pub trait PermissionBroker: Send + Sync {
    /// Current status without prompting.
    async fn check(&self, capability: Capability) -> Result<bool, BrokerError>;

    /// Interactive prompt; suspends until the user answers or the host gives up.
    async fn request(&self, capability: Capability) -> Result<PermissionOutcome, BrokerError>;

    async fn open_settings(&self) -> Result<(), BrokerError>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRecord {
    pub capability: Capability,
    pub granted: bool,
    pub required: bool,
    /// The OS refused for good; only host settings can grant it now.
    pub hard_denied: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PermissionSummary {
    AllGranted,
    CoreReady,
    Needed,
}

impl PermissionSummary {
    pub fn status_text(&self) -> &'static str {
        match self {
            PermissionSummary::AllGranted => "All Permissions Granted!",
            PermissionSummary::CoreReady => "Core Features Ready",
            PermissionSummary::Needed => "Permissions Needed",
        }
    }

    pub fn continue_label(&self) -> &'static str {
        match self {
            PermissionSummary::AllGranted => "Start Using App",
            PermissionSummary::CoreReady | PermissionSummary::Needed => "Continue",
        }
    }
}

/// One record per capability, keyed by capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionSet {
    records: BTreeMap<Capability, PermissionRecord>,
    unavailable: BTreeSet<Capability>,
}

impl PermissionSet {
    pub fn for_platform(platform: Platform) -> Self {
        let records = Capability::ALL
            .into_iter()
            .map(|capability| {
                let record = PermissionRecord {
                    capability,
                    granted: false,
                    hard_denied: false,
                    required: capability.required_by_default()
                        && capability.applies_to(platform),
                };
                (capability, record)
            })
            .collect();
        let unavailable = Capability::ALL
            .into_iter()
            .filter(|c| !c.applies_to(platform))
            .collect();
        Self {
            records,
            unavailable,
        }
    }

    pub fn get(&self, capability: Capability) -> Option<&PermissionRecord> {
        self.records.get(&capability)
    }

    pub fn is_granted(&self, capability: Capability) -> bool {
        self.get(capability).map(|r| r.granted).unwrap_or(false)
    }

    pub fn set_granted(&mut self, capability: Capability, granted: bool) {
        if let Some(record) = self.records.get_mut(&capability) {
            record.granted = granted;
            if granted {
                record.hard_denied = false;
            }
            if self.unavailable.remove(&capability) {
                record.required = capability.required_by_default();
            }
        }
    }

    /// The broker can't speak for this capability: it counts as not granted
    /// and stops blocking the session.
    pub fn mark_unavailable(&mut self, capability: Capability) {
        if let Some(record) = self.records.get_mut(&capability) {
            record.granted = false;
            record.required = false;
            self.unavailable.insert(capability);
        }
    }

    pub fn mark_hard_denied(&mut self, capability: Capability) {
        if let Some(record) = self.records.get_mut(&capability) {
            record.granted = false;
            record.hard_denied = true;
        }
    }

    pub fn is_hard_denied(&self, capability: Capability) -> bool {
        self.get(capability).is_some_and(|r| r.hard_denied)
    }

    pub fn records(&self) -> Vec<PermissionRecord> {
        self.records.values().copied().collect()
    }

    pub fn missing_required(&self) -> Vec<Capability> {
        self.records
            .values()
            .filter(|r| r.required && !r.granted)
            .map(|r| r.capability)
            .collect()
    }

    pub fn required_satisfied(&self) -> bool {
        self.records.values().filter(|r| r.required).all(|r| r.granted)
    }

    pub fn summary(&self) -> PermissionSummary {
        let all_granted = self
            .records
            .values()
            .all(|r| r.granted || self.unavailable.contains(&r.capability));
        if all_granted {
            return PermissionSummary::AllGranted;
        }
        if self.required_satisfied() {
            PermissionSummary::CoreReady
        } else {
            PermissionSummary::Needed
        }
    }
}

pub fn required_satisfied(records: &PermissionSet) -> bool {
    records.required_satisfied()
}

/// One row of the Permissions screen.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRow {
    #[serde(flatten)]
    pub record: PermissionRecord,
    pub title: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionsView {
    pub platform: Platform,
    pub rows: Vec<PermissionRow>,
    pub status_text: &'static str,
    pub continue_label: &'static str,
    pub required_satisfied: bool,
}

impl PermissionsView {
    /// Capabilities that don't exist on `platform` get no row.
    pub fn new(platform: Platform, set: &PermissionSet) -> Self {
        let summary = set.summary();
        let rows = set
            .records()
            .into_iter()
            .filter(|record| record.capability.applies_to(platform))
            .map(|record| PermissionRow {
                record,
                title: record.capability.display_name(),
                description: record.capability.description(),
            })
            .collect();
        Self {
            platform,
            rows,
            status_text: summary.status_text(),
            continue_label: summary.continue_label(),
            required_satisfied: set.required_satisfied(),
        }
    }
}

/// Tracks grant state per capability and fronts the host broker.
#[derive(Clone)]
pub struct PermissionGate {
    broker: Arc<dyn PermissionBroker>,
    platform: Platform,
    records: Arc<Mutex<PermissionSet>>,
}

impl PermissionGate {
    pub fn new(broker: Arc<dyn PermissionBroker>, platform: Platform) -> Self {
        Self {
            broker,
            platform,
            records: Arc::new(Mutex::new(PermissionSet::for_platform(platform))),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub async fn records(&self) -> PermissionSet {
        self.records.lock().await.clone()
    }

    pub async fn required_satisfied(&self) -> bool {
        self.records.lock().await.required_satisfied()
    }

    /// Refreshes every record from the broker without prompting.
    /// Checks run side by side so one slow answer bounds the whole refresh.
    pub async fn check_all(&self) -> PermissionSet {
        join_all(Capability::ALL.map(|capability| self.check(capability))).await;
        self.records().await
    }

    /// Refreshes one record without prompting and returns whether it is granted.
    pub async fn check(&self, capability: Capability) -> bool {
        if !capability.applies_to(self.platform) {
            self.records.lock().await.mark_unavailable(capability);
            return false;
        }

        match self.broker.check(capability).await {
            Ok(granted) => {
                self.records.lock().await.set_granted(capability, granted);
                granted
            }
            Err(err) => {
                warn!("Permission check for {} unavailable: {}", capability, err);
                self.records.lock().await.mark_unavailable(capability);
                false
            }
        }
    }

    /// Prompts for one capability. Opening host settings after a hard denial
    /// is left to the caller.
    pub async fn request(&self, capability: Capability) -> PermissionOutcome {
        if !capability.applies_to(self.platform) {
            self.records.lock().await.mark_unavailable(capability);
            return PermissionOutcome::DeniedSoft;
        }

        let outcome = match self.broker.request(capability).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("Permission request for {} unavailable: {}", capability, err);
                self.records.lock().await.mark_unavailable(capability);
                return PermissionOutcome::DeniedSoft;
            }
        };

        info!("Permission {} -> {:?}", capability, outcome);
        let mut records = self.records.lock().await;
        match outcome {
            PermissionOutcome::DeniedHard => records.mark_hard_denied(capability),
            _ => records.set_granted(capability, outcome.is_granted()),
        }
        outcome
    }

    /// Checks, then prompts if needed. Used by the pipeline before acquiring.
    /// A capability the OS hard-denied earlier is not prompted for again.
    pub async fn ensure(&self, capability: Capability) -> Result<(), PipelineError> {
        if self.check(capability).await {
            return Ok(());
        }
        if self.records.lock().await.is_hard_denied(capability) {
            return Err(PipelineError::PermissionDenied {
                capability,
                hard: true,
            });
        }

        match self.request(capability).await {
            PermissionOutcome::Granted => Ok(()),
            PermissionOutcome::DeniedSoft => Err(PipelineError::PermissionDenied {
                capability,
                hard: false,
            }),
            PermissionOutcome::DeniedHard => Err(PipelineError::PermissionDenied {
                capability,
                hard: true,
            }),
        }
    }

    pub async fn open_settings(&self) -> Result<(), BrokerError> {
        self.broker.open_settings().await
    }
}

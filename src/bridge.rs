use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::{
    errors::{AcquireError, BridgeError, BrokerError},
    permissions::{Capability, PermissionBroker, PermissionOutcome},
    pipeline::{Acquisition, ImagePayload, ImageSource, SourceKind},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Event name the webview listens on for host calls.
pub const BRIDGE_EVENT: &str = "bridge-request";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "call", rename_all = "camelCase")]
pub enum BridgeCall {
    CheckPermission { capability: Capability },
    RequestPermission { capability: Capability },
    OpenSettings,
    AcquireImage { source: SourceKind },
}

impl BridgeCall {
    fn name(&self) -> &'static str {
        match self {
            BridgeCall::CheckPermission { .. } => "checkPermission",
            BridgeCall::RequestPermission { .. } => "requestPermission",
            BridgeCall::OpenSettings => "openSettings",
            BridgeCall::AcquireImage { .. } => "acquireImage",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BridgeRequest {
    pub id: Uuid,
    #[serde(flatten)]
    pub call: BridgeCall,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BridgeReply {
    Permission { granted: bool },
    Prompt { outcome: PermissionOutcome },
    Done,
    Image { payload: ImagePayload },
    Cancelled,
    Unsupported,
    Failed { message: String },
}

/// Delivers a request to the frontend. The shell implements this on its app
/// handle.
pub trait BridgeEmitter: Send + Sync {
    fn emit_request(&self, request: &BridgeRequest) -> Result<()>;
}

/// Request/reply channel to the webview, which owns the platform camera,
/// pickers and permission prompts.
#[derive(Clone)]
pub struct FrontendBridge {
    emitter: Arc<dyn BridgeEmitter>,
    pending: Arc<Mutex<HashMap<Uuid, oneshot::Sender<BridgeReply>>>>,
    timeout: Duration,
}

impl FrontendBridge {
    pub fn new(emitter: Arc<dyn BridgeEmitter>, timeout: Duration) -> Self {
        Self {
            emitter,
            pending: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// Hands a frontend reply to whoever is waiting on `id`.
    pub fn resolve(&self, id: Uuid, reply: BridgeReply) -> Result<(), BridgeError> {
        let sender = self
            .lock_pending()
            .remove(&id)
            .ok_or(BridgeError::UnknownRequest(id))?;
        log_debug!("Bridge reply for {} delivered", id);
        sender.send(reply).map_err(|_| {
            log_error!("Bridge caller for {} dropped before receiving the reply", id);
            BridgeError::Closed
        })
    }

    /// One image source per kind, all backed by this bridge.
    pub fn image_sources(&self) -> Vec<Arc<dyn ImageSource>> {
        [SourceKind::Camera, SourceKind::Gallery, SourceKind::Screenshot]
            .into_iter()
            .map(|kind| {
                Arc::new(BridgeImageSource {
                    bridge: self.clone(),
                    kind,
                }) as Arc<dyn ImageSource>
            })
            .collect()
    }

    async fn call(&self, call: BridgeCall) -> Result<BridgeReply, BridgeError> {
        let id = Uuid::new_v4();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.lock_pending().insert(id, reply_tx);
        // Clears the entry on every exit, including the caller being dropped.
        let _pending = PendingEntry { bridge: self, id };

        let request = BridgeRequest { id, call };
        if let Err(err) = self.emitter.emit_request(&request) {
            return Err(BridgeError::Emit(err.to_string()));
        }

        match tokio::time::timeout(self.timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(BridgeError::Closed),
            Err(_) => {
                log_warn!(
                    "Bridge call {} ({}) timed out after {:?}",
                    request.call.name(),
                    id,
                    self.timeout
                );
                Err(BridgeError::TimedOut(id))
            }
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, oneshot::Sender<BridgeReply>>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

struct PendingEntry<'a> {
    bridge: &'a FrontendBridge,
    id: Uuid,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        self.bridge.lock_pending().remove(&self.id);
    }
}

#[async_trait]
impl PermissionBroker for FrontendBridge {
    async fn check(&self, capability: Capability) -> Result<bool, BrokerError> {
        match self.call(BridgeCall::CheckPermission { capability }).await {
            Ok(BridgeReply::Permission { granted }) => Ok(granted),
            Ok(BridgeReply::Unsupported) => Err(BrokerError::Unsupported(capability)),
            Ok(BridgeReply::Failed { message }) => Err(BrokerError::Unavailable(message)),
            Ok(_) => Err(BrokerError::Unavailable(
                BridgeError::UnexpectedReply {
                    call: "checkPermission",
                }
                .to_string(),
            )),
            // A slow frontend is not proof the capability is unsupported.
            Err(BridgeError::TimedOut(_)) => Ok(false),
            Err(err) => Err(BrokerError::Unavailable(err.to_string())),
        }
    }

    async fn request(&self, capability: Capability) -> Result<PermissionOutcome, BrokerError> {
        match self.call(BridgeCall::RequestPermission { capability }).await {
            Ok(BridgeReply::Prompt { outcome }) => Ok(outcome),
            Ok(BridgeReply::Permission { granted: true }) => Ok(PermissionOutcome::Granted),
            Ok(BridgeReply::Permission { granted: false }) => Ok(PermissionOutcome::DeniedSoft),
            Ok(BridgeReply::Unsupported) => Err(BrokerError::Unsupported(capability)),
            Ok(BridgeReply::Failed { message }) => Err(BrokerError::Unavailable(message)),
            Ok(_) => Err(BrokerError::Unavailable(
                BridgeError::UnexpectedReply {
                    call: "requestPermission",
                }
                .to_string(),
            )),
            Err(BridgeError::TimedOut(_)) => Ok(PermissionOutcome::DeniedSoft),
            Err(err) => Err(BrokerError::Unavailable(err.to_string())),
        }
    }

    async fn open_settings(&self) -> Result<(), BrokerError> {
        match self.call(BridgeCall::OpenSettings).await {
            Ok(BridgeReply::Done) => Ok(()),
            Ok(BridgeReply::Failed { message }) => Err(BrokerError::Unavailable(message)),
            Ok(_) => Err(BrokerError::Unavailable(
                BridgeError::UnexpectedReply {
                    call: "openSettings",
                }
                .to_string(),
            )),
            Err(err) => Err(BrokerError::Unavailable(err.to_string())),
        }
    }
}

pub struct BridgeImageSource {
    bridge: FrontendBridge,
    kind: SourceKind,
}

#[async_trait]
impl ImageSource for BridgeImageSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn acquire(&self) -> Result<Acquisition, AcquireError> {
        let reply = self
            .bridge
            .call(BridgeCall::AcquireImage { source: self.kind })
            .await
            .map_err(|err| match err {
                BridgeError::TimedOut(_) => AcquireError::TimedOut,
                other => AcquireError::Host(other.to_string()),
            })?;

        match reply {
            BridgeReply::Image { payload } if !payload.is_empty() => {
                log_info!(
                    "Frontend delivered {} base64 bytes from {}",
                    payload.len(),
                    self.kind.as_str()
                );
                Ok(Acquisition::Captured(payload))
            }
            BridgeReply::Image { .. } | BridgeReply::Cancelled => Ok(Acquisition::Cancelled),
            BridgeReply::Unsupported => Err(AcquireError::Unavailable(format!(
                "{} is not available on this device",
                self.kind.as_str()
            ))),
            BridgeReply::Failed { message } => Err(AcquireError::Host(message)),
            _ => Err(AcquireError::Host(
                BridgeError::UnexpectedReply {
                    call: "acquireImage",
                }
                .to_string(),
            )),
        }
    }
}

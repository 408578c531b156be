use std::{path::PathBuf, sync::Arc, time::Instant};

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    errors::{ErrorAction, PipelineError, SessionError},
    models::PipelineRun,
    overlay::{GestureEffect, OverlayTrigger, ScreenSize, TriggerGesture},
    permissions::{required_satisfied, Capability, PermissionGate, PermissionOutcome},
    pipeline::{CapturePipeline, FileImageSource, ImageSource, SourceKind},
    presenter::ResultPresenter,
};

use super::{
    AppLifecycle, LifecycleSignal, Rejection, SessionEvent, SessionSnapshot, SessionState,
    Transition, TriggerPolicy,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionConfig {
    pub policy: TriggerPolicy,
    pub preferred_source: SourceKind,
    pub screen: ScreenSize,
}

struct SessionInner {
    state: SessionState,
    foreground: bool,
    overlay: OverlayTrigger,
    presenter: ResultPresenter,
    run: PipelineRun,
}

/// The part of the session the lifecycle listener needs.
#[derive(Clone)]
struct SessionCore {
    inner: Arc<Mutex<SessionInner>>,
    runs: watch::Receiver<PipelineRun>,
    snapshots: Arc<watch::Sender<SessionSnapshot>>,
    policy: TriggerPolicy,
}

impl SessionCore {
    fn snapshot_of(&self, inner: &SessionInner, now: Instant) -> SessionSnapshot {
        SessionSnapshot {
            state: inner.state,
            foreground: inner.foreground,
            policy: self.policy,
            overlay: inner.overlay.snapshot(now),
            presenter: inner.presenter.snapshot(now),
            run: inner.run.clone(),
        }
    }

    fn publish(&self, inner: &SessionInner) {
        self.snapshots
            .send_replace(self.snapshot_of(inner, Instant::now()));
    }

    /// Reads the latest run while the session lock is held, so concurrent
    /// syncs can never apply an older run over a newer one.
    fn absorb_run(&self, inner: &mut SessionInner, now: Instant) {
        let run = self.runs.borrow().clone();
        inner.presenter.sync(&run, now);
        inner.run = run;
    }

    async fn sync_run(&self) {
        let mut inner = self.inner.lock().await;
        self.absorb_run(&mut inner, Instant::now());
        self.publish(&inner);
    }

    /// Puts the trigger where the policy wants it for an idle Active session.
    fn refresh_trigger(&self, inner: &mut SessionInner, now: Instant) {
        match self.policy {
            TriggerPolicy::BackgroundOverlay if inner.foreground => {
                inner.overlay.hide(now);
            }
            TriggerPolicy::BackgroundOverlay | TriggerPolicy::InAppButton => {
                inner.overlay.show(now);
            }
        }
    }

    async fn apply_lifecycle(&self, lifecycle: AppLifecycle) -> Transition {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        inner.foreground = lifecycle == AppLifecycle::Foreground;

        if inner.state != SessionState::Active || self.policy != TriggerPolicy::BackgroundOverlay
        {
            self.publish(&inner);
            return Transition::Ignored;
        }

        let changed = match lifecycle {
            AppLifecycle::Background => inner.overlay.show(now),
            AppLifecycle::Foreground => inner.overlay.hide(now),
        };
        if changed {
            info!("App moved to {:?}; overlay visible: {}", lifecycle, inner.overlay.is_visible());
        }
        self.publish(&inner);
        Transition::Applied
    }
}

async fn listen(
    core: SessionCore,
    mut lifecycle: broadcast::Receiver<AppLifecycle>,
    mut runs: watch::Receiver<PipelineRun>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            event = lifecycle.recv() => match event {
                Ok(event) => {
                    core.apply_lifecycle(event).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Lifecycle listener lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = runs.changed() => {
                if changed.is_err() {
                    break;
                }
                let _ = runs.borrow_and_update();
                core.sync_run().await;
            }
        }
    }
    info!("Session listener stopped");
}

/// Top-level state machine: which screen is up, where the trigger is, and
/// what the result modal shows.
#[derive(Clone)]
pub struct SessionController {
    core: SessionCore,
    pipeline: CapturePipeline,
    gate: PermissionGate,
    preferred_source: SourceKind,
    cancel_token: CancellationToken,
    listener: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SessionController {
    /// Subscribes to `lifecycle` and the pipeline's run updates. Must be
    /// called from within a tokio runtime.
    pub fn new(
        pipeline: CapturePipeline,
        gate: PermissionGate,
        lifecycle: &LifecycleSignal,
        config: SessionConfig,
    ) -> Self {
        let inner = SessionInner {
            state: SessionState::Home,
            foreground: true,
            overlay: OverlayTrigger::new(config.screen),
            presenter: ResultPresenter::new(),
            run: PipelineRun::idle(),
        };

        let runs = pipeline.subscribe();
        let core = SessionCore {
            inner: Arc::new(Mutex::new(inner)),
            runs: runs.clone(),
            snapshots: Arc::new(watch::channel(initial_snapshot(&config)).0),
            policy: config.policy,
        };

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(listen(
            core.clone(),
            lifecycle.subscribe(),
            runs,
            cancel_token.clone(),
        ));

        Self {
            core,
            pipeline,
            gate,
            preferred_source: config.preferred_source,
            cancel_token,
            listener: Arc::new(Mutex::new(Some(handle))),
        }
    }

    pub fn gate(&self) -> &PermissionGate {
        &self.gate
    }

    pub fn pipeline(&self) -> &CapturePipeline {
        &self.pipeline
    }

    pub fn policy(&self) -> TriggerPolicy {
        self.core.policy
    }

    pub async fn state(&self) -> SessionState {
        self.core.inner.lock().await.state
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.core.inner.lock().await;
        self.core.snapshot_of(&inner, Instant::now())
    }

    /// Wakes on every published snapshot; only the latest is kept.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.core.snapshots.subscribe()
    }

    pub async fn dispatch(&self, event: SessionEvent) -> Transition {
        match event {
            SessionEvent::GetStarted => self.get_started().await,
            SessionEvent::PermissionsAcked => self.permissions_acked().await,
            SessionEvent::LifecycleChanged(lifecycle) => self.core.apply_lifecycle(lifecycle).await,
            SessionEvent::Gesture(gesture) => self.gesture(gesture).await,
            SessionEvent::TriggerActivated => self.activate(self.preferred_source).await,
            SessionEvent::ResultDismissed => self.result_dismissed().await,
        }
    }

    /// Starts a capture from the preferred source and waits for it to settle.
    pub async fn trigger_activated(&self) -> Result<PipelineRun, SessionError> {
        self.capture_from(self.preferred_source).await
    }

    /// Starts a capture from `kind` and waits for it to settle. Used for the
    /// gallery fallback after a camera attempt.
    pub async fn capture_from(&self, kind: SourceKind) -> Result<PipelineRun, SessionError> {
        let handle = self.begin_capture(kind, None).await?;
        self.finish_capture(handle).await
    }

    /// Analyzes an image file the user picked (desktop gallery). The Media
    /// permission still applies.
    pub async fn capture_file(&self, path: PathBuf) -> Result<PipelineRun, SessionError> {
        let source: Arc<dyn ImageSource> =
            Arc::new(FileImageSource::new(SourceKind::Gallery, Some(path)));
        let handle = self.begin_capture(SourceKind::Gallery, Some(source)).await?;
        self.finish_capture(handle).await
    }

    async fn finish_capture(
        &self,
        handle: JoinHandle<PipelineRun>,
    ) -> Result<PipelineRun, SessionError> {
        let run = handle
            .await
            .map_err(|err| SessionError::Interrupted(err.to_string()))?;
        self.core.sync_run().await;
        Ok(run)
    }

    /// Dismisses the result and, when the error asked for it, opens host
    /// settings.
    pub async fn acknowledge_result(&self) -> Transition {
        let opens_settings = self
            .core
            .runs
            .borrow()
            .error
            .as_ref()
            .is_some_and(|error| error.action == ErrorAction::OpenSettings);

        let transition = self.result_dismissed().await;
        if transition.is_applied() && opens_settings {
            if let Err(err) = self.gate.open_settings().await {
                warn!("Failed to open host settings: {}", err);
            }
        }
        transition
    }

    /// Stops listening to lifecycle and pipeline updates.
    pub async fn shutdown(&self) -> Result<()> {
        self.cancel_token.cancel();
        if let Some(handle) = self.listener.lock().await.take() {
            handle
                .await
                .context("session listener task failed to join")?;
        }
        Ok(())
    }

    async fn get_started(&self) -> Transition {
        let mut inner = self.core.inner.lock().await;
        if inner.state != SessionState::Home {
            return Transition::Ignored;
        }
        inner.state = SessionState::Permissions;
        self.core.publish(&inner);
        Transition::Applied
    }

    async fn permissions_acked(&self) -> Transition {
        if self.state().await != SessionState::Permissions {
            return Transition::Ignored;
        }

        let records = self.gate.check_all().await;
        if !required_satisfied(&records) {
            let missing = records.missing_required();
            info!("Permissions acknowledged but still missing {:?}", missing);
            return Transition::Rejected(Rejection::PermissionsMissing { missing });
        }

        {
            let now = Instant::now();
            let mut inner = self.core.inner.lock().await;
            if inner.state != SessionState::Permissions {
                return Transition::Ignored;
            }
            inner.state = SessionState::Active;
            self.core.refresh_trigger(&mut inner, now);
            self.core.publish(&inner);
        }
        info!("Session active ({:?})", self.core.policy);

        if self.core.policy == TriggerPolicy::BackgroundOverlay
            && Capability::Overlay.applies_to(self.gate.platform())
            && !records.is_granted(Capability::Overlay)
        {
            let gate = self.gate.clone();
            tokio::spawn(async move {
                match gate.request(Capability::Overlay).await {
                    PermissionOutcome::Granted => info!("Overlay permission granted"),
                    outcome => warn!("Overlay permission not granted: {:?}", outcome),
                }
            });
        }

        Transition::Applied
    }

    async fn gesture(&self, gesture: TriggerGesture) -> Transition {
        let effect = {
            let mut inner = self.core.inner.lock().await;
            if inner.state != SessionState::Active {
                return Transition::Ignored;
            }
            if gesture == TriggerGesture::Tapped && self.core.runs.borrow().status.is_in_flight()
            {
                return Transition::Rejected(Rejection::Busy);
            }
            let effect = inner.overlay.handle(gesture, Instant::now());
            if effect != GestureEffect::Activated {
                self.core.publish(&inner);
            }
            effect
        };

        match effect {
            GestureEffect::None => Transition::Ignored,
            GestureEffect::Moved(_) => Transition::Applied,
            GestureEffect::Activated => self.activate(self.preferred_source).await,
        }
    }

    async fn activate(&self, kind: SourceKind) -> Transition {
        match self.begin_capture(kind, None).await {
            Ok(_detached) => Transition::Applied,
            Err(SessionError::Pipeline(PipelineError::Busy)) => Transition::Rejected(Rejection::Busy),
            Err(err) => {
                info!("Trigger ignored: {}", err);
                Transition::Ignored
            }
        }
    }

    /// `source` overrides the registered source for `kind`.
    async fn begin_capture(
        &self,
        kind: SourceKind,
        source: Option<Arc<dyn ImageSource>>,
    ) -> Result<JoinHandle<PipelineRun>, SessionError> {
        if self.state().await != SessionState::Active {
            return Err(SessionError::NotActive);
        }

        let started = match source {
            Some(source) => self.pipeline.start_source(source).await,
            None => self.pipeline.start(kind).await,
        };
        let handle = started.inspect_err(|_| {
            info!("Capture ignored: a run is already in flight");
        })?;

        let now = Instant::now();
        let mut inner = self.core.inner.lock().await;
        inner.overlay.hide(now);
        self.core.absorb_run(&mut inner, now);
        self.core.publish(&inner);
        Ok(handle)
    }

    async fn result_dismissed(&self) -> Transition {
        if !self.pipeline.reset().await {
            info!("Dismiss ignored while a capture is in flight");
            return Transition::Ignored;
        }

        let now = Instant::now();
        let mut inner = self.core.inner.lock().await;
        self.core.absorb_run(&mut inner, now);
        if inner.state == SessionState::Active {
            self.core.refresh_trigger(&mut inner, now);
        }
        self.core.publish(&inner);
        Transition::Applied
    }
}

fn initial_snapshot(config: &SessionConfig) -> SessionSnapshot {
    let now = Instant::now();
    SessionSnapshot {
        state: SessionState::Home,
        foreground: true,
        policy: config.policy,
        overlay: OverlayTrigger::new(config.screen).snapshot(now),
        presenter: ResultPresenter::new().snapshot(now),
        run: PipelineRun::idle(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        errors::{AcquireError, BrokerError},
        permissions::{PermissionBroker, Platform},
        pipeline::{Acquisition, ImagePayload, ImageSource, MockAnalysisService},
    };

    struct Broker {
        granted: bool,
    }

    #[async_trait]
    impl PermissionBroker for Broker {
        async fn check(&self, _capability: Capability) -> Result<bool, BrokerError> {
            Ok(self.granted)
        }
        async fn request(&self, _capability: Capability) -> Result<PermissionOutcome, BrokerError> {
            Ok(if self.granted {
                PermissionOutcome::Granted
            } else {
                PermissionOutcome::DeniedSoft
            })
        }
        async fn open_settings(&self) -> Result<(), BrokerError> {
            Ok(())
        }
    }

    struct Camera;

    #[async_trait]
    impl ImageSource for Camera {
        fn kind(&self) -> SourceKind {
            SourceKind::Camera
        }
        async fn acquire(&self) -> Result<Acquisition, AcquireError> {
            Ok(Acquisition::Captured(ImagePayload::from_base64("aGVsbG8=")))
        }
    }

    fn controller(granted: bool, policy: TriggerPolicy) -> (SessionController, LifecycleSignal) {
        let gate = PermissionGate::new(Arc::new(Broker { granted }), Platform::Ios);
        let pipeline = CapturePipeline::new(
            gate.clone(),
            vec![Arc::new(Camera) as Arc<dyn ImageSource>],
            Arc::new(MockAnalysisService::new(Duration::ZERO)),
        );
        let lifecycle = LifecycleSignal::new();
        let config = SessionConfig {
            policy,
            ..Default::default()
        };
        (
            SessionController::new(pipeline, gate, &lifecycle, config),
            lifecycle,
        )
    }

    #[tokio::test]
    async fn illegal_events_are_ignored() {
        let (session, _lifecycle) = controller(true, TriggerPolicy::BackgroundOverlay);
        assert_eq!(
            session.dispatch(SessionEvent::PermissionsAcked).await,
            Transition::Ignored
        );
        assert_eq!(
            session.dispatch(SessionEvent::TriggerActivated).await,
            Transition::Ignored
        );
        assert_eq!(session.state().await, SessionState::Home);
    }

    #[tokio::test]
    async fn missing_permissions_keep_permissions_screen() {
        let (session, _lifecycle) = controller(false, TriggerPolicy::BackgroundOverlay);
        session.dispatch(SessionEvent::GetStarted).await;

        match session.dispatch(SessionEvent::PermissionsAcked).await {
            Transition::Rejected(Rejection::PermissionsMissing { missing }) => {
                assert_eq!(missing, vec![Capability::Camera, Capability::Screenshot]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(session.state().await, SessionState::Permissions);
    }

    #[tokio::test]
    async fn in_app_policy_shows_trigger_while_foregrounded() {
        let (session, _lifecycle) = controller(true, TriggerPolicy::InAppButton);
        session.dispatch(SessionEvent::GetStarted).await;
        session.dispatch(SessionEvent::PermissionsAcked).await;

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, SessionState::Active);
        assert!(snapshot.foreground);
        assert!(snapshot.overlay.visible);

        assert_eq!(
            session
                .dispatch(SessionEvent::LifecycleChanged(AppLifecycle::Foreground))
                .await,
            Transition::Ignored
        );
        assert!(session.snapshot().await.overlay.visible);
    }

    #[tokio::test]
    async fn trigger_reappears_after_dismiss_in_app() {
        let (session, _lifecycle) = controller(true, TriggerPolicy::InAppButton);
        session.dispatch(SessionEvent::GetStarted).await;
        session.dispatch(SessionEvent::PermissionsAcked).await;

        let run = session.trigger_activated().await.unwrap();
        assert!(run.status.is_settled());
        let snapshot = session.snapshot().await;
        assert!(!snapshot.overlay.visible);
        assert!(snapshot.presenter.visible);

        assert!(session
            .dispatch(SessionEvent::ResultDismissed)
            .await
            .is_applied());
        let snapshot = session.snapshot().await;
        assert!(snapshot.overlay.visible);
        assert!(!snapshot.presenter.visible);
        assert_eq!(snapshot.run, PipelineRun::idle());
    }

    #[tokio::test]
    async fn shutdown_unsubscribes_from_lifecycle() {
        let (session, lifecycle) = controller(true, TriggerPolicy::BackgroundOverlay);
        assert_eq!(lifecycle.subscriber_count(), 1);

        session.shutdown().await.unwrap();
        assert_eq!(lifecycle.subscriber_count(), 0);
        session.shutdown().await.unwrap();
    }
}

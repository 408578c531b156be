use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::Utc;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use uuid::Uuid;

use crate::{
    errors::{AcquireError, ErrorInfo, PipelineError},
    models::{PipelineRun, Verdict},
    permissions::PermissionGate,
};

use super::{Acquisition, AnalysisService, ImageSource, SourceKind};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Acquire image → analyze → settle, one run at a time.
#[derive(Clone)]
pub struct CapturePipeline {
    run: Arc<Mutex<PipelineRun>>,
    updates: Arc<watch::Sender<PipelineRun>>,
    gate: PermissionGate,
    sources: Arc<HashMap<SourceKind, Arc<dyn ImageSource>>>,
    analysis: Arc<dyn AnalysisService>,
}

impl CapturePipeline {
    pub fn new(
        gate: PermissionGate,
        sources: Vec<Arc<dyn ImageSource>>,
        analysis: Arc<dyn AnalysisService>,
    ) -> Self {
        let sources = sources
            .into_iter()
            .map(|source| (source.kind(), source))
            .collect();
        let (updates, _) = watch::channel(PipelineRun::idle());

        Self {
            run: Arc::new(Mutex::new(PipelineRun::idle())),
            updates: Arc::new(updates),
            gate,
            sources: Arc::new(sources),
            analysis,
        }
    }

    pub async fn current(&self) -> PipelineRun {
        self.run.lock().await.clone()
    }

    pub async fn is_busy(&self) -> bool {
        self.run.lock().await.status.is_in_flight()
    }

    /// Every transition of the shared run, in order.
    pub fn subscribe(&self) -> watch::Receiver<PipelineRun> {
        self.updates.subscribe()
    }

    /// Runs the pipeline against the registered source of `kind`.
    pub async fn run(&self, kind: SourceKind) -> Result<PipelineRun, PipelineError> {
        let source = self.sources.get(&kind).cloned();
        self.run_with(kind, source).await
    }

    /// Runs the pipeline against a one-off source (e.g. a file the user picked).
    pub async fn run_source(
        &self,
        source: Arc<dyn ImageSource>,
    ) -> Result<PipelineRun, PipelineError> {
        self.run_with(source.kind(), Some(source)).await
    }

    /// Returns the run to Idle. Refused while a run is in flight: once started
    /// it has to settle first.
    pub async fn reset(&self) -> bool {
        let mut run = self.run.lock().await;
        if run.status.is_in_flight() {
            return false;
        }
        run.reset();
        self.updates.send_replace(run.clone());
        true
    }

    /// Claims the pipeline and drives the run on a background task. `Busy` is
    /// reported before anything is spawned.
    pub async fn start(&self, kind: SourceKind) -> Result<JoinHandle<PipelineRun>, PipelineError> {
        let source = self.sources.get(&kind).cloned();
        self.start_with(kind, source).await
    }

    /// Like [`CapturePipeline::start`], against a one-off source.
    pub async fn start_source(
        &self,
        source: Arc<dyn ImageSource>,
    ) -> Result<JoinHandle<PipelineRun>, PipelineError> {
        self.start_with(source.kind(), Some(source)).await
    }

    async fn start_with(
        &self,
        kind: SourceKind,
        source: Option<Arc<dyn ImageSource>>,
    ) -> Result<JoinHandle<PipelineRun>, PipelineError> {
        let run_id = self.claim(kind).await?;
        let pipeline = self.clone();
        Ok(tokio::spawn(async move {
            pipeline.settle(run_id, kind, source).await
        }))
    }

    async fn run_with(
        &self,
        kind: SourceKind,
        source: Option<Arc<dyn ImageSource>>,
    ) -> Result<PipelineRun, PipelineError> {
        let run_id = self.claim(kind).await?;
        Ok(self.settle(run_id, kind, source).await)
    }

    /// Single-flight check and the move to AcquiringImage happen under one lock.
    async fn claim(&self, kind: SourceKind) -> Result<Uuid, PipelineError> {
        let mut run = self.run.lock().await;
        if run.status.is_in_flight() {
            return Err(PipelineError::Busy);
        }
        *run = PipelineRun::begin(kind, Utc::now());
        self.updates.send_replace(run.clone());
        Ok(run.id.unwrap_or_default())
    }

    async fn settle(
        &self,
        run_id: Uuid,
        kind: SourceKind,
        source: Option<Arc<dyn ImageSource>>,
    ) -> PipelineRun {
        let started = Instant::now();
        log_info!("Capture run {} started from {}", run_id, kind.as_str());

        match self.drive(run_id, kind, source).await {
            Ok(Some(verdict)) => {
                log_info!(
                    "Capture run {} succeeded in {}ms (score {})",
                    run_id,
                    started.elapsed().as_millis(),
                    verdict.truth_score
                );
                self.transition(run_id, |run| run.succeed(verdict)).await
            }
            Ok(None) => {
                log_info!("Capture run {} cancelled by user", run_id);
                self.transition(run_id, PipelineRun::cancel).await
            }
            Err(err) => {
                log_warn!(
                    "Capture run {} failed after {}ms: {}",
                    run_id,
                    started.elapsed().as_millis(),
                    err
                );
                let info = ErrorInfo::from_pipeline_error(&err);
                self.transition(run_id, |run| run.fail(info)).await
            }
        }
    }

    async fn drive(
        &self,
        run_id: Uuid,
        kind: SourceKind,
        source: Option<Arc<dyn ImageSource>>,
    ) -> Result<Option<Verdict>, PipelineError> {
        self.gate.ensure(kind.capability()).await?;

        let source = source.ok_or_else(|| {
            AcquireError::Unavailable(format!("no {} source registered", kind.as_str()))
        })?;

        let payload = match source.acquire().await? {
            Acquisition::Captured(payload) => payload,
            Acquisition::Cancelled => return Ok(None),
        };

        self.transition(run_id, PipelineRun::analyzing).await;

        let raw = self.analysis.analyze(&payload).await?;
        Ok(Some(Verdict::from_raw(raw)))
    }

    /// Applies `apply` if `run_id` still owns the pipeline and returns the run
    /// as published, read under the same lock.
    async fn transition(&self, run_id: Uuid, apply: impl FnOnce(&mut PipelineRun)) -> PipelineRun {
        let mut run = self.run.lock().await;
        if run.id != Some(run_id) {
            log_warn!("Capture run {} no longer owns the pipeline", run_id);
            return run.clone();
        }
        apply(&mut run);
        self.updates.send_replace(run.clone());
        run.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::oneshot;

    use super::*;
    use crate::{
        errors::{AnalysisError, BrokerError, ErrorAction, ErrorKind},
        models::{RawVerdict, RunStatus},
        permissions::{Capability, PermissionBroker, PermissionOutcome, Platform},
        pipeline::{FileImageSource, ImagePayload},
    };

    struct AllowAll;

    #[async_trait]
    impl PermissionBroker for AllowAll {
        async fn check(&self, _capability: Capability) -> Result<bool, BrokerError> {
            Ok(true)
        }
        async fn request(&self, _capability: Capability) -> Result<PermissionOutcome, BrokerError> {
            Ok(PermissionOutcome::Granted)
        }
        async fn open_settings(&self) -> Result<(), BrokerError> {
            Ok(())
        }
    }

    struct HardDeny;

    #[async_trait]
    impl PermissionBroker for HardDeny {
        async fn check(&self, _capability: Capability) -> Result<bool, BrokerError> {
            Ok(false)
        }
        async fn request(&self, _capability: Capability) -> Result<PermissionOutcome, BrokerError> {
            Ok(PermissionOutcome::DeniedHard)
        }
        async fn open_settings(&self) -> Result<(), BrokerError> {
            Ok(())
        }
    }

    struct FixedSource(Acquisition);

    #[async_trait]
    impl ImageSource for FixedSource {
        fn kind(&self) -> SourceKind {
            SourceKind::Camera
        }
        async fn acquire(&self) -> Result<Acquisition, AcquireError> {
            Ok(self.0.clone())
        }
    }

    /// Holds `analyze` until the test releases it.
    struct GatedAnalysis {
        release: std::sync::Mutex<Option<oneshot::Receiver<Result<RawVerdict, AnalysisError>>>>,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl AnalysisService for GatedAnalysis {
        async fn analyze(&self, _image: &ImagePayload) -> Result<RawVerdict, AnalysisError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let rx = self.release.lock().unwrap().take().expect("single call");
            rx.await.unwrap_or_else(|_| {
                Err(AnalysisError::Transport {
                    status: None,
                    message: "dropped".into(),
                })
            })
        }
    }

    struct ImmediateAnalysis;

    #[async_trait]
    impl AnalysisService for ImmediateAnalysis {
        async fn analyze(&self, _image: &ImagePayload) -> Result<RawVerdict, AnalysisError> {
            Ok(RawVerdict {
                claim: "X".into(),
                truth_score: 85.0,
                summary: "Confirmed".into(),
                sources: vec!["AP".into()],
            })
        }
    }

    fn gated() -> (
        Arc<GatedAnalysis>,
        oneshot::Sender<Result<RawVerdict, AnalysisError>>,
    ) {
        let (tx, rx) = oneshot::channel();
        let service = Arc::new(GatedAnalysis {
            release: std::sync::Mutex::new(Some(rx)),
            calls: Default::default(),
        });
        (service, tx)
    }

    fn pipeline(
        broker: Arc<dyn PermissionBroker>,
        acquisition: Acquisition,
        analysis: Arc<dyn AnalysisService>,
    ) -> CapturePipeline {
        let gate = PermissionGate::new(broker, Platform::Android);
        let sources: Vec<Arc<dyn ImageSource>> = vec![Arc::new(FixedSource(acquisition))];
        CapturePipeline::new(gate, sources, analysis)
    }

    fn captured() -> Acquisition {
        Acquisition::Captured(ImagePayload::from_base64("aGVsbG8="))
    }

    async fn wait_for(pipeline: &CapturePipeline, status: RunStatus) {
        let mut rx = pipeline.subscribe();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|run| run.status == status))
            .await
            .expect("status never reached")
            .unwrap();
    }

    #[tokio::test]
    async fn cancellation_skips_analysis() {
        let (analysis, _tx) = gated();
        let pipeline = pipeline(Arc::new(AllowAll), Acquisition::Cancelled, analysis.clone());

        let run = pipeline.run(SourceKind::Camera).await.unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
        assert!(run.error.is_none());
        assert_eq!(analysis.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn second_run_while_analyzing_is_busy() {
        let (analysis, tx) = gated();
        let pipeline = pipeline(Arc::new(AllowAll), captured(), analysis);

        let first = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.run(SourceKind::Camera).await }
        });
        wait_for(&pipeline, RunStatus::Analyzing).await;

        let before = pipeline.current().await;
        assert!(matches!(
            pipeline.run(SourceKind::Camera).await,
            Err(PipelineError::Busy)
        ));
        assert_eq!(pipeline.current().await, before);
        assert!(!pipeline.reset().await);

        tx.send(Ok(RawVerdict {
            claim: "X".into(),
            truth_score: 130.0,
            summary: "s".into(),
            sources: vec![],
        }))
        .unwrap();
        let run = first.await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Succeeded);
        assert_eq!(run.result.unwrap().truth_score, 100);
    }

    #[tokio::test]
    async fn service_failure_is_normalized() {
        let (analysis, tx) = gated();
        let pipeline = pipeline(Arc::new(AllowAll), captured(), analysis);
        tx.send(Err(AnalysisError::Rejected("Server error: 500".into())))
            .unwrap();

        let run = pipeline.run(SourceKind::Camera).await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        let error = run.error.unwrap();
        assert_eq!(error.kind, ErrorKind::Transport);
        assert_ne!(error.message, "Server error: 500");
        assert!(run.result.is_none());
    }

    #[tokio::test]
    async fn hard_denial_fails_before_acquiring() {
        let (analysis, _tx) = gated();
        let pipeline = pipeline(Arc::new(HardDeny), captured(), analysis);

        let run = pipeline.run(SourceKind::Camera).await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        let error = run.error.unwrap();
        assert_eq!(error.kind, ErrorKind::PermissionDenied);
        assert_eq!(error.action, ErrorAction::OpenSettings);
    }

    #[tokio::test]
    async fn unregistered_source_fails_as_acquisition() {
        let (analysis, _tx) = gated();
        let pipeline = pipeline(Arc::new(AllowAll), captured(), analysis);

        let run = pipeline.run(SourceKind::Screenshot).await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error.unwrap().kind, ErrorKind::Acquisition);
    }

    #[tokio::test]
    async fn start_claims_before_returning() {
        let (analysis, tx) = gated();
        let pipeline = pipeline(Arc::new(AllowAll), captured(), analysis);

        let handle = pipeline.start(SourceKind::Camera).await.unwrap();
        assert!(pipeline.is_busy().await);
        assert!(matches!(
            pipeline.start(SourceKind::Camera).await,
            Err(PipelineError::Busy)
        ));

        tx.send(Err(AnalysisError::Malformed("no result".into())))
            .unwrap();
        let run = handle.await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error.unwrap().kind, ErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn reset_returns_settled_run_to_idle() {
        let pipeline = pipeline(Arc::new(AllowAll), Acquisition::Cancelled, gated().0);
        pipeline.run(SourceKind::Camera).await.unwrap();

        assert!(pipeline.reset().await);
        assert_eq!(pipeline.current().await, PipelineRun::idle());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_caller_gets_its_own_settled_run() {
        let pipeline = pipeline(Arc::new(AllowAll), captured(), Arc::new(ImmediateAnalysis));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let pipeline = pipeline.clone();
                tokio::spawn(async move {
                    let mut completed = 0;
                    for _ in 0..500 {
                        match pipeline.run(SourceKind::Camera).await {
                            Ok(run) => {
                                assert_eq!(run.status, RunStatus::Succeeded, "{run:?}");
                                assert_eq!(run.result.unwrap().truth_score, 85);
                                completed += 1;
                            }
                            Err(PipelineError::Busy) => {}
                            Err(other) => panic!("unexpected {other:?}"),
                        }
                    }
                    completed
                })
            })
            .collect();

        let mut completed = 0;
        for worker in workers {
            completed += worker.await.unwrap();
        }
        assert!(completed > 0);
    }

    #[tokio::test]
    async fn one_off_file_source_runs_through_the_pipeline() {
        let path = std::env::temp_dir().join(format!("is-this-true-{}.png", Uuid::new_v4()));
        image::RgbImage::from_pixel(32, 24, image::Rgb([10, 120, 200]))
            .save(&path)
            .unwrap();
        let pipeline = pipeline(Arc::new(AllowAll), captured(), Arc::new(ImmediateAnalysis));

        let run = pipeline
            .run_source(Arc::new(FileImageSource::new(SourceKind::Gallery, Some(path.clone()))))
            .await
            .unwrap();
        assert_eq!(run.status, RunStatus::Succeeded);
        assert_eq!(run.source, Some(SourceKind::Gallery));
        let _ = std::fs::remove_file(path);

        assert!(pipeline.reset().await);
        let missing = FileImageSource::new(
            SourceKind::Gallery,
            Some(std::env::temp_dir().join("is-this-true-missing.png")),
        );
        let run = pipeline.run_source(Arc::new(missing)).await.unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
    }
}

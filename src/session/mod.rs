pub mod pipeline;
pub mod scheduler;

pub use pipeline::{FramePipeline, FrameSnapshot, PipelineCommand};
pub use scheduler::{DetectionScheduler, FrameClock, IntervalClock, SnapshotReceiver};

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::camera::FrameSource;
use crate::config::Config;
use crate::error::TryOnError;
use crate::pose::{BackendLoader, LifecycleState, ModelLifecycleManager, PoseBackend};
use crate::render::ContainerSize;
use crate::tracker::GarmentItem;

/// 試着セッション。モデルの管理と検出ループをまとめて持つ
///
/// セッションを作り直すと平滑化の状態もすべて新しくなる
pub struct TryOnSession<S, L>
where
    S: FrameSource,
    L: BackendLoader,
    L::Backend: PoseBackend<S>,
{
    source: Arc<S>,
    lifecycle: Arc<ModelLifecycleManager<L>>,
    scheduler: DetectionScheduler<S, L::Backend>,
    render_fps: u32,
}

impl<S, L> TryOnSession<S, L>
where
    S: FrameSource,
    L: BackendLoader,
    L::Backend: PoseBackend<S>,
{
    pub fn new(source: Arc<S>, loader: L, config: &Config) -> Self {
        Self {
            lifecycle: Arc::new(ModelLifecycleManager::new(loader, config.model.clone())),
            scheduler: DetectionScheduler::new(source.clone(), config),
            source,
            render_fps: config.scheduler.render_fps,
        }
    }

    /// モデルのロードとカメラの準備を並行して待ち、検出ループを始める
    ///
    /// すでに動いていれば Ok(false)
    pub async fn start(&mut self) -> Result<bool, TryOnError> {
        let clock = IntervalClock::new(self.render_fps);
        self.start_with_clock(clock).await
    }

    pub async fn start_with_clock<C: FrameClock>(&mut self, clock: C) -> Result<bool, TryOnError> {
        if self.scheduler.is_running() {
            return Ok(false);
        }
        let lifecycle = self.lifecycle.clone();
        let (backend, video) = tokio::try_join!(
            async { lifecycle.ensure_ready().await.map_err(TryOnError::from) },
            self.source.wait_ready(),
        )?;
        info!(width = video.width, height = video.height, "camera and model ready");
        Ok(self.scheduler.start(backend, clock, video))
    }

    /// Failed からモデルを読み直して開始する
    pub async fn retry_model(&mut self) -> Result<bool, TryOnError> {
        self.lifecycle.retry().await?;
        self.start().await
    }

    pub async fn stop(&mut self) {
        self.scheduler.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn reset_tracking(&mut self) {
        self.scheduler.reset_tracking();
    }

    pub fn resize_container(&mut self, container: ContainerSize) {
        self.scheduler.resize_container(container);
    }

    /// 試着アイテムを差し替える。平滑化はやり直し
    pub fn set_catalog(&mut self, catalog: Vec<GarmentItem>) {
        self.scheduler.set_catalog(catalog);
    }

    pub fn subscribe(&self) -> SnapshotReceiver {
        self.scheduler.subscribe()
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn subscribe_lifecycle(&self) -> watch::Receiver<LifecycleState> {
        self.lifecycle.subscribe()
    }
}

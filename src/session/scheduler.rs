use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::camera::FrameSource;
use crate::config::Config;
use crate::pose::PoseBackend;
use crate::render::{ContainerSize, VideoDimensions};
use crate::tracker::GarmentItem;

use super::pipeline::{FramePipeline, FrameSnapshot, PipelineCommand};

/// 描画のタイミング
pub trait FrameClock: Send + 'static {
    fn next_frame(&mut self) -> impl Future<Output = ()> + Send;
}

/// 一定間隔で刻むクロック。推論が遅れた分の tick は溜めずに捨てる
pub struct IntervalClock {
    interval: Interval,
}

impl IntervalClock {
    pub fn new(fps: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

impl FrameClock for IntervalClock {
    async fn next_frame(&mut self) {
        self.interval.tick().await;
    }
}

pub type SnapshotReceiver = watch::Receiver<Option<Arc<FrameSnapshot>>>;

struct RunningLoop {
    cancel: CancellationToken,
    commands: mpsc::UnboundedSender<PipelineCommand>,
    handle: JoinHandle<(FramePipeline, mpsc::UnboundedReceiver<PipelineCommand>)>,
}

/// 検出ループを動かす
///
/// - ループ中のパイプラインはタスクが専有し、停止すると戻ってくる
/// - detect_every フレームに1回だけ推論し、平滑化は毎フレーム進める
/// - 1フレームの推論失敗ではループは止まらない
pub struct DetectionScheduler<S: FrameSource, B: PoseBackend<S>> {
    source: Arc<S>,
    config: Config,
    catalog: Vec<GarmentItem>,
    container: Option<ContainerSize>,
    parked: Option<FramePipeline>,
    running: Option<RunningLoop>,
    active: Arc<AtomicBool>,
    snapshots: watch::Sender<Option<Arc<FrameSnapshot>>>,
    _backend: PhantomData<fn() -> B>,
}

impl<S: FrameSource, B: PoseBackend<S>> DetectionScheduler<S, B> {
    pub fn new(source: Arc<S>, config: &Config) -> Self {
        let (snapshots, _) = watch::channel(None);
        Self {
            source,
            config: config.clone(),
            catalog: config.garments.clone(),
            container: None,
            parked: None,
            running: None,
            active: Arc::new(AtomicBool::new(false)),
            snapshots,
            _backend: PhantomData,
        }
    }

    pub fn subscribe(&self) -> SnapshotReceiver {
        self.snapshots.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// ループを開始する。すでに動いていれば何もせず false
    pub fn start<C: FrameClock>(&mut self, backend: Arc<B>, clock: C, video: VideoDimensions) -> bool {
        if self.running.is_some() {
            debug!("detection loop already running");
            return false;
        }

        let mut pipeline = match self.parked.take() {
            Some(pipeline) => pipeline,
            None => {
                let mut config = self.config.clone();
                config.garments = self.catalog.clone();
                FramePipeline::from_config(&config, video)
            }
        };
        pipeline.set_video(video);
        if let Some(container) = self.container {
            pipeline.set_container(container);
        }

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.active.store(true, Ordering::Release);

        let handle = tokio::spawn(run_loop(LoopContext {
            source: self.source.clone(),
            backend,
            clock,
            pipeline,
            commands: rx,
            cancel: cancel.clone(),
            active: self.active.clone(),
            snapshots: self.snapshots.clone(),
            detect_every: self.config.scheduler.detect_every.max(1) as u64,
        }));

        info!(
            width = video.width,
            height = video.height,
            detect_every = self.config.scheduler.detect_every,
            "detection loop started"
        );
        self.running = Some(RunningLoop {
            cancel,
            commands: tx,
            handle,
        });
        true
    }

    /// ループを止める。戻った時点で以後スナップショットは publish されない
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.cancel.cancel();
        self.active.store(false, Ordering::Release);
        drop(running.commands);

        match running.handle.await {
            Ok((mut pipeline, mut commands)) => {
                while let Ok(command) = commands.try_recv() {
                    pipeline.apply(command);
                }
                self.parked = Some(pipeline);
            }
            Err(e) => {
                warn!("detection loop ended abnormally: {}", e);
                self.parked = None;
            }
        }

        self.snapshots.send_replace(None);
        info!("detection loop stopped");
    }

    /// 平滑化の状態を捨てる。次の検出からやり直し
    pub fn reset_tracking(&mut self) {
        self.dispatch(PipelineCommand::ResetTracking);
    }

    pub fn set_catalog(&mut self, catalog: Vec<GarmentItem>) {
        self.catalog = catalog.clone();
        self.dispatch(PipelineCommand::SetCatalog(catalog));
    }

    pub fn resize_container(&mut self, container: ContainerSize) {
        self.container = Some(container);
        self.dispatch(PipelineCommand::Resize(container));
    }

    /// 実行中ならループへ送り、止まっていれば待機中のパイプラインに直接適用
    fn dispatch(&mut self, command: PipelineCommand) {
        let command = match &self.running {
            Some(running) => match running.commands.send(command) {
                Ok(()) => return,
                Err(mpsc::error::SendError(command)) => command,
            },
            None => command,
        };
        if let Some(pipeline) = self.parked.as_mut() {
            pipeline.apply(command);
        }
    }
}

struct LoopContext<S, B, C> {
    source: Arc<S>,
    backend: Arc<B>,
    clock: C,
    pipeline: FramePipeline,
    commands: mpsc::UnboundedReceiver<PipelineCommand>,
    cancel: CancellationToken,
    active: Arc<AtomicBool>,
    snapshots: watch::Sender<Option<Arc<FrameSnapshot>>>,
    detect_every: u64,
}

async fn run_loop<S, B, C>(ctx: LoopContext<S, B, C>) -> (FramePipeline, mpsc::UnboundedReceiver<PipelineCommand>)
where
    S: FrameSource,
    B: PoseBackend<S>,
    C: FrameClock,
{
    let LoopContext {
        source,
        backend,
        mut clock,
        mut pipeline,
        mut commands,
        cancel,
        active,
        snapshots,
        detect_every,
    } = ctx;
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = clock.next_frame() => {}
        }
        if cancel.is_cancelled() {
            break;
        }

        while let Ok(command) = commands.try_recv() {
            pipeline.apply(command);
        }

        tick += 1;
        if tick % detect_every == 0 {
            // 推論は途中で打ち切らない。停止はこの tick の結果を捨てて反映する
            let result = backend.estimate(source.as_ref()).await;
            if cancel.is_cancelled() {
                break;
            }
            match result {
                Ok(Some(raw)) => {
                    pipeline.ingest(&raw);
                }
                Ok(None) => pipeline.clear_pose(),
                Err(e) => {
                    warn!(frame = tick, "pose estimation failed: {:#}", e);
                    continue;
                }
            }
        }

        let snapshot = pipeline.snapshot(tick);
        if cancel.is_cancelled() {
            break;
        }
        snapshots.send_replace(Some(Arc::new(snapshot)));
    }

    active.store(false, Ordering::Release);
    debug!(frames = tick, "detection loop exited");
    (pipeline, commands)
}

use anyhow::{Context, Result};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs, VideoCaptureTrait},
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::TryOnError;
use crate::render::VideoDimensions;

use super::source::FrameSource;

/// OpenCVを使用したカメラキャプチャ
pub struct OpenCvCamera {
    capture: VideoCapture,
    width: u32,
    height: u32,
}

impl OpenCvCamera {
    /// 解像度を指定してカメラを開く
    pub fn open_with_resolution(index: i32, width: Option<u32>, height: Option<u32>) -> Result<Self> {
        let mut capture =
            VideoCapture::new(index, VideoCaptureAPIs::CAP_ANY as i32).context("Failed to open camera")?;

        if !capture.is_opened()? {
            anyhow::bail!("Camera {} is not available", index);
        }

        if let Some(w) = width {
            capture.set(videoio::CAP_PROP_FRAME_WIDTH, w as f64)?;
        }
        if let Some(h) = height {
            capture.set(videoio::CAP_PROP_FRAME_HEIGHT, h as f64)?;
        }
        capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;

        let actual_width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let actual_height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;
        let actual_fps = capture.get(videoio::CAP_PROP_FPS)?;
        info!(index, width = actual_width, height = actual_height, fps = actual_fps, "camera opened");

        Ok(Self {
            capture,
            width: actual_width,
            height: actual_height,
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// フレームを読み込む（BGR形式）
    pub fn read_frame(&mut self) -> Result<Mat> {
        let mut frame = Mat::default();
        self.capture
            .read(&mut frame)
            .context("Failed to read frame")?;

        if frame.empty() {
            anyhow::bail!("Empty frame received");
        }

        Ok(frame)
    }
}

/// 最初のフレーム待ちのポーリング間隔
const READY_POLL: Duration = Duration::from_millis(10);

/// 別スレッドでカメラキャプチャを行い、最新フレームを提供する
pub struct ThreadedCamera {
    latest: Arc<Mutex<Option<Mat>>>,
    frame_id: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    width: u32,
    height: u32,
    ready_timeout: Duration,
    handle: Option<thread::JoinHandle<()>>,
}

impl ThreadedCamera {
    pub fn start(index: i32, width: Option<u32>, height: Option<u32>, ready_timeout: Duration) -> Result<Self> {
        let mut camera = OpenCvCamera::open_with_resolution(index, width, height)?;
        let (w, h) = camera.resolution();
        let latest = Arc::new(Mutex::new(None::<Mat>));
        let latest_ref = latest.clone();
        let frame_id = Arc::new(AtomicU64::new(0));
        let frame_id_ref = frame_id.clone();
        let running = Arc::new(AtomicBool::new(true));
        let running_ref = running.clone();

        let handle = thread::spawn(move || {
            let mut failures = 0u32;
            while running_ref.load(Ordering::Acquire) {
                match camera.read_frame() {
                    Ok(frame) => {
                        if let Ok(mut guard) = latest_ref.lock() {
                            *guard = Some(frame);
                        }
                        frame_id_ref.fetch_add(1, Ordering::Release);
                        failures = 0;
                    }
                    Err(e) => {
                        failures += 1;
                        if failures == 1 {
                            warn!("camera read failed: {:#}", e);
                        }
                        thread::sleep(READY_POLL);
                    }
                }
            }
        });

        Ok(Self {
            latest,
            frame_id,
            running,
            width: w,
            height: h,
            ready_timeout,
            handle: Some(handle),
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// 新フレームが到着するたびにインクリメントされる
    pub fn frame_id(&self) -> u64 {
        self.frame_id.load(Ordering::Acquire)
    }

    /// 最新フレーム。初回フレーム到着前のみ None
    pub fn get_frame(&self) -> Option<Mat> {
        let guard = self.latest.lock().ok()?;
        guard.as_ref().map(|m| m.clone())
    }
}

impl FrameSource for ThreadedCamera {
    fn dimensions(&self) -> Option<VideoDimensions> {
        let dims = VideoDimensions::new(self.width, self.height);
        (self.frame_id() > 0 && dims.is_valid()).then_some(dims)
    }

    async fn wait_ready(&self) -> Result<VideoDimensions, TryOnError> {
        let deadline = tokio::time::Instant::now() + self.ready_timeout;
        loop {
            if let Some(dims) = self.dimensions() {
                return Ok(dims);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(TryOnError::CaptureUnavailable(format!(
                    "no frame within {:?}",
                    self.ready_timeout
                )));
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }
}

impl Drop for ThreadedCamera {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

use anyhow::{bail, Result};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::camera::FrameSource;
use crate::config::ModelVariant;

use super::backend::{BackendLoader, PoseBackend};
use super::keypoint::KeypointIndex;
use super::normalize::{RawLandmark, RawPose};

/// 正面を向いて立つ人の基準姿勢（画面に対する割合, 信頼度）
const BASE_POSE: [(KeypointIndex, f32, f32, f32); KeypointIndex::COUNT] = [
    (KeypointIndex::Nose, 0.50, 0.18, 0.95),
    (KeypointIndex::LeftEye, 0.52, 0.16, 0.9),
    (KeypointIndex::RightEye, 0.48, 0.16, 0.9),
    (KeypointIndex::LeftEar, 0.55, 0.17, 0.7),
    (KeypointIndex::RightEar, 0.45, 0.17, 0.7),
    (KeypointIndex::LeftShoulder, 0.62, 0.33, 0.9),
    (KeypointIndex::RightShoulder, 0.38, 0.33, 0.9),
    (KeypointIndex::LeftElbow, 0.67, 0.48, 0.8),
    (KeypointIndex::RightElbow, 0.33, 0.48, 0.8),
    (KeypointIndex::LeftWrist, 0.69, 0.62, 0.75),
    (KeypointIndex::RightWrist, 0.31, 0.62, 0.75),
    (KeypointIndex::LeftHip, 0.60, 0.66, 0.8),
    (KeypointIndex::RightHip, 0.40, 0.66, 0.8),
    (KeypointIndex::LeftKnee, 0.60, 0.81, 0.7),
    (KeypointIndex::RightKnee, 0.40, 0.81, 0.7),
    (KeypointIndex::LeftAnkle, 0.60, 0.95, 0.6),
    (KeypointIndex::RightAnkle, 0.40, 0.95, 0.6),
];

/// 推論1回ごとの位相の進み（ラジアン）
const SWAY_STEP: f32 = 0.15;

/// 左右に揺れる人物を返す決定的なバックエンド
///
/// モデルファイルなしでパイプライン全体を動かすためのもの
pub struct MockPoseBackend {
    model_id: String,
    /// 肩の揺れ幅（画面幅に対する割合）
    sway: f32,
    frame: AtomicU64,
}

impl MockPoseBackend {
    pub fn new(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            sway: 0.02,
            frame: AtomicU64::new(0),
        }
    }

    pub fn with_sway(mut self, sway: f32) -> Self {
        self.sway = sway;
        self
    }

    /// n 回目の推論結果
    pub fn pose_at(&self, n: u64, width: f32, height: f32) -> RawPose {
        let phase = n as f32 * SWAY_STEP;
        let dx = phase.sin() * self.sway;
        // 肩だけ逆位相で上下させて傾きを作る
        let tilt = phase.cos() * self.sway * 0.5;

        let landmarks = BASE_POSE
            .iter()
            .map(|&(idx, fx, fy, score)| {
                let fy = match idx {
                    KeypointIndex::LeftShoulder => fy + tilt,
                    KeypointIndex::RightShoulder => fy - tilt,
                    _ => fy,
                };
                RawLandmark::new(idx.name(), (fx + dx) * width, fy * height, score)
            })
            .collect();

        RawPose {
            landmarks,
            score: 0.85,
            timestamp_ms: n * 33,
            model_id: self.model_id.clone(),
        }
    }
}

impl<S: FrameSource + ?Sized> PoseBackend<S> for MockPoseBackend {
    async fn estimate(&self, source: &S) -> Result<Option<RawPose>> {
        let Some(dims) = source.dimensions() else {
            return Ok(None);
        };
        let n = self.frame.fetch_add(1, Ordering::Relaxed);
        Ok(Some(self.pose_at(n, dims.width as f32, dims.height as f32)))
    }
}

/// MockPoseBackend を作るローダー。ロード失敗と遅延を再現できる
pub struct MockLoader {
    load_delay: Duration,
    fail_first: u32,
    calls: AtomicU32,
}

impl MockLoader {
    pub fn new() -> Self {
        Self {
            load_delay: Duration::ZERO,
            fail_first: 0,
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// 最初の n 回の load を失敗させる
    pub fn failing_first(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendLoader for MockLoader {
    type Backend = MockPoseBackend;

    async fn load(&self, variant: &ModelVariant) -> Result<MockPoseBackend> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        if n < self.fail_first {
            bail!("mock load failure #{}", n + 1);
        }
        debug!(model = %variant.id, "mock pose backend loaded");
        Ok(MockPoseBackend::new(&variant.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::StaticFrameSource;
    use crate::pose::PoseNormalizer;

    #[tokio::test]
    async fn test_mock_pose_passes_normalizer() {
        let backend = MockPoseBackend::new("mock");
        let source = StaticFrameSource::new(640, 480);
        let raw = backend.estimate(&source).await.unwrap().unwrap();
        assert_eq!(raw.landmarks.len(), KeypointIndex::COUNT);
        assert_eq!(raw.model_id, "mock");

        let pose = PoseNormalizer::default().normalize(&raw).unwrap();
        assert_eq!(pose.len(), KeypointIndex::COUNT);
        let (l, r) = pose
            .pair(KeypointIndex::LeftShoulder, KeypointIndex::RightShoulder)
            .unwrap();
        assert!(l.x > r.x);
    }

    #[tokio::test]
    async fn test_mock_sways() {
        let backend = MockPoseBackend::new("mock");
        let source = StaticFrameSource::new(640, 480);
        let a = backend.estimate(&source).await.unwrap().unwrap();
        for _ in 0..5 {
            backend.estimate(&source).await.unwrap();
        }
        let b = backend.estimate(&source).await.unwrap().unwrap();
        assert_ne!(a.landmarks[0].x, b.landmarks[0].x);
        assert!(b.timestamp_ms > a.timestamp_ms);
    }

    #[tokio::test]
    async fn test_mock_without_video() {
        let backend = MockPoseBackend::new("mock");
        let source = StaticFrameSource::unavailable();
        assert!(backend.estimate(&source).await.unwrap().is_none());
    }

    #[test]
    fn test_pose_at_deterministic() {
        let backend = MockPoseBackend::new("mock").with_sway(0.05);
        assert_eq!(backend.pose_at(7, 640.0, 480.0), backend.pose_at(7, 640.0, 480.0));
    }

    #[tokio::test]
    async fn test_mock_loader_failures() {
        let loader = MockLoader::new().failing_first(1);
        let variant = ModelVariant::new("movenet_lightning", "unused.onnx", 192);
        assert!(loader.load(&variant).await.is_err());
        assert!(loader.load(&variant).await.is_ok());
        assert_eq!(loader.calls(), 2);
    }
}

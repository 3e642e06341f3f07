use tracing::debug;

use crate::config::Config;
use crate::pose::{Pose, PoseNormalizer, RawPose};
use crate::render::{
    skeleton_segments, ContainerSize, CoordinateTransformer, DisplayRect, SkeletonSegment, VideoDimensions,
};
use crate::tracker::{AnchorCalculator, GarmentItem, GarmentSmoother, GarmentTransform};

/// 1フレーム分の出力。描画側はこれだけを見て描く
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSnapshot {
    pub frame_index: u64,
    pub video: VideoDimensions,
    pub display: Option<DisplayRect>,
    /// 直近の検出結果。人物がいなければ None
    pub pose: Option<Pose>,
    pub garments: Vec<GarmentTransform>,
    pub skeleton: Vec<SkeletonSegment>,
}

/// ループ実行中にパイプラインへ渡す操作
#[derive(Debug, Clone)]
pub enum PipelineCommand {
    SetCatalog(Vec<GarmentItem>),
    Resize(ContainerSize),
    ResetTracking,
}

/// 正規化 → アンカー計算 → 平滑化 の一連の処理と、その状態
pub struct FramePipeline {
    normalizer: PoseNormalizer,
    transformer: CoordinateTransformer,
    calculator: AnchorCalculator,
    smoother: GarmentSmoother,
    catalog: Vec<GarmentItem>,
    skeleton_confidence: f32,
    last_pose: Option<Pose>,
}

impl FramePipeline {
    pub fn from_config(config: &Config, video: VideoDimensions) -> Self {
        Self {
            normalizer: PoseNormalizer::from_config(&config.normalizer),
            transformer: CoordinateTransformer::new(video, &config.scene, &config.display),
            calculator: AnchorCalculator::from_config(&config.anchor),
            smoother: GarmentSmoother::from_config(&config.smoothing),
            catalog: config.garments.clone(),
            skeleton_confidence: config.scheduler.skeleton_confidence,
            last_pose: None,
        }
    }

    pub fn last_pose(&self) -> Option<&Pose> {
        self.last_pose.as_ref()
    }

    /// 検出結果を取り込む。アンカーが得られたアイテムだけ平滑化の目標を更新する
    ///
    /// キーポイント不足なら姿勢は None になるが、平滑化の状態はそのまま残る
    pub fn ingest(&mut self, raw: &RawPose) -> Option<&Pose> {
        let Some(pose) = self.normalizer.normalize(raw) else {
            debug!(model = %raw.model_id, "not enough keypoints, keeping previous garments");
            self.last_pose = None;
            return None;
        };

        for (index, item) in self.catalog.iter().enumerate() {
            if let Some(anchor) = self.calculator.compute(&pose, item, index, &self.transformer) {
                self.smoother.set_target(&item.id, index, anchor);
            }
        }

        self.last_pose = Some(pose);
        self.last_pose.as_ref()
    }

    /// 人物が見つからなかったフレーム
    pub fn clear_pose(&mut self) {
        self.last_pose = None;
    }

    /// 毎フレーム呼ぶ。まだ一度もアンカーがないアイテムは含まれない
    pub fn step(&mut self) -> Vec<GarmentTransform> {
        let mut garments = Vec::with_capacity(self.catalog.len());
        for (index, item) in self.catalog.iter().enumerate() {
            if let Some(anchor) = self.smoother.step(&item.id, index) {
                garments.push(GarmentTransform {
                    item_id: item.id.clone(),
                    index,
                    anchor,
                });
            }
        }
        garments
    }

    pub fn snapshot(&mut self, frame_index: u64) -> FrameSnapshot {
        let garments = self.step();
        let skeleton = match &self.last_pose {
            Some(pose) => skeleton_segments(pose, self.skeleton_confidence, &self.transformer),
            None => Vec::new(),
        };
        FrameSnapshot {
            frame_index,
            video: self.transformer.video(),
            display: self.transformer.display_rect(),
            pose: self.last_pose.clone(),
            garments,
            skeleton,
        }
    }

    /// カタログを差し替える。平滑化の状態は作り直す
    pub fn set_catalog(&mut self, catalog: Vec<GarmentItem>) {
        self.catalog = catalog;
        self.smoother.reset();
    }

    pub fn set_container(&mut self, container: ContainerSize) {
        self.transformer.set_container(container);
    }

    pub fn set_video(&mut self, video: VideoDimensions) {
        self.transformer.set_video(video);
    }

    pub fn reset(&mut self) {
        self.smoother.reset();
        self.last_pose = None;
    }

    pub fn apply(&mut self, command: PipelineCommand) {
        match command {
            PipelineCommand::SetCatalog(catalog) => self.set_catalog(catalog),
            PipelineCommand::Resize(container) => self.set_container(container),
            PipelineCommand::ResetTracking => self.reset(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{KeypointIndex, MockPoseBackend, RawLandmark};
    use crate::tracker::GarmentCategory;

    fn catalog() -> Vec<GarmentItem> {
        vec![
            GarmentItem::new("shirt", GarmentCategory::TopLike),
            GarmentItem::new("jeans", GarmentCategory::BottomLike),
            GarmentItem::new("hat", GarmentCategory::Default),
        ]
    }

    fn pipeline() -> FramePipeline {
        let mut config = Config::default();
        config.garments = catalog();
        FramePipeline::from_config(&config, VideoDimensions::new(640, 480))
    }

    fn raw(n: u64) -> RawPose {
        MockPoseBackend::new("mock").pose_at(n, 640.0, 480.0)
    }

    /// 肩だけ写っている（キーポイント不足）
    fn shoulders_only() -> RawPose {
        RawPose {
            landmarks: vec![
                RawLandmark::new("left_shoulder", 400.0, 160.0, 0.9),
                RawLandmark::new("right_shoulder", 240.0, 160.0, 0.9),
            ],
            score: 0.5,
            timestamp_ms: 0,
            model_id: "mock".to_string(),
        }
    }

    #[test]
    fn test_no_garments_before_first_pose() {
        let mut p = pipeline();
        assert!(p.step().is_empty());
        let snap = p.snapshot(1);
        assert!(snap.pose.is_none());
        assert!(snap.skeleton.is_empty());
    }

    #[test]
    fn test_ingest_produces_all_garments() {
        let mut p = pipeline();
        let pose = p.ingest(&raw(0)).unwrap();
        assert_eq!(pose.len(), KeypointIndex::COUNT);

        let snap = p.snapshot(2);
        assert_eq!(snap.frame_index, 2);
        assert_eq!(snap.garments.len(), 3);
        assert_eq!(snap.garments[0].item_id, "shirt");
        assert_eq!(snap.garments[2].anchor.category, GarmentCategory::Default);
        assert!(!snap.skeleton.is_empty());
        assert!(snap.pose.is_some());
    }

    #[test]
    fn test_upright_subject_top_is_level() {
        let mut p = pipeline();
        let still = MockPoseBackend::new("mock").with_sway(0.0).pose_at(0, 640.0, 480.0);
        p.ingest(&still);
        let snap = p.snapshot(1);
        let shirt = &snap.garments[0];
        assert_eq!(shirt.item_id, "shirt");
        assert!(shirt.anchor.rotation.abs() < 0.1, "rotation = {}", shirt.anchor.rotation);
    }

    #[test]
    fn test_insufficient_keypoints_keeps_geometry() {
        let mut p = pipeline();
        p.ingest(&raw(0));
        let before = p.step();

        assert!(p.ingest(&shoulders_only()).is_none());
        let after = p.snapshot(3);
        assert!(after.pose.is_none());
        assert!(after.skeleton.is_empty());
        // 目標が変わらないので同じ位置に留まる
        assert_eq!(after.garments.len(), before.len());
        for (a, b) in after.garments.iter().zip(before.iter()) {
            assert!((a.anchor.position.x - b.anchor.position.x).abs() < 1e-5);
            assert!((a.anchor.position.y - b.anchor.position.y).abs() < 1e-5);
        }
    }

    #[test]
    fn test_steps_between_detections_move_toward_target() {
        let mut p = pipeline();
        p.ingest(&raw(0));
        let first = p.step()[0].anchor.position.x;

        // 大きく動いた姿勢
        let mut moved = raw(0);
        for lm in moved.landmarks.iter_mut() {
            lm.x += 100.0;
        }
        p.ingest(&moved);
        let a = p.step()[0].anchor.position.x;
        let b = p.step()[0].anchor.position.x;
        assert!(first < a && a < b);
    }

    #[test]
    fn test_set_catalog_resets_smoothing() {
        let mut p = pipeline();
        p.ingest(&raw(0));
        assert_eq!(p.step().len(), 3);

        p.apply(PipelineCommand::SetCatalog(vec![GarmentItem::new("dress", GarmentCategory::Dress)]));
        assert!(p.step().is_empty());
        p.ingest(&raw(1));
        let garments = p.step();
        assert_eq!(garments.len(), 1);
        assert_eq!(garments[0].item_id, "dress");
    }

    #[test]
    fn test_reset_and_resize() {
        let mut p = pipeline();
        p.ingest(&raw(0));
        p.apply(PipelineCommand::ResetTracking);
        assert!(p.step().is_empty());
        assert!(p.last_pose().is_none());

        assert!(p.snapshot(1).display.is_none());
        p.apply(PipelineCommand::Resize(ContainerSize::new(1280.0, 720.0)));
        let rect = p.snapshot(2).display.unwrap();
        assert!((rect.scale - 1.5).abs() < 1e-5);
    }
}

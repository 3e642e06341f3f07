use std::collections::BTreeMap;

use crate::config::NormalizerConfig;

use super::keypoint::{BBox, BodyMeasurements, Keypoint, KeypointIndex, Pose};

/// 検出器が返す生のランドマーク（ネイティブ画素座標）
#[derive(Debug, Clone, PartialEq)]
pub struct RawLandmark {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub z: Option<f32>,
    pub score: f32,
}

impl RawLandmark {
    pub fn new(name: &str, x: f32, y: f32, score: f32) -> Self {
        Self {
            name: name.to_string(),
            x,
            y,
            z: None,
            score,
        }
    }
}

/// 1フレーム分の検出器出力
#[derive(Debug, Clone, PartialEq)]
pub struct RawPose {
    pub landmarks: Vec<RawLandmark>,
    pub score: f32,
    pub timestamp_ms: u64,
    pub model_id: String,
}

impl From<&Pose> for RawPose {
    fn from(pose: &Pose) -> Self {
        Self {
            landmarks: pose
                .keypoints
                .iter()
                .map(|(idx, kp)| RawLandmark {
                    name: idx.name().to_string(),
                    x: kp.x,
                    y: kp.y,
                    z: kp.z,
                    score: kp.confidence,
                })
                .collect(),
            score: pose.score,
            timestamp_ms: pose.timestamp_ms,
            model_id: pose.model_id.clone(),
        }
    }
}

/// BBox の余白（画素）
const BBOX_PADDING: f32 = 60.0;
const BBOX_MIN_WIDTH: f32 = 100.0;
const BBOX_MIN_HEIGHT: f32 = 200.0;

/// 生の検出結果を正規化された Pose に変換する
///
/// - acceptance_threshold 未満のキーポイントを除去
/// - 採用数が min_keypoints 未満なら None（エラーではない）
/// - min_pose_score があれば、姿勢のスコアがそれ未満のときも None
/// - 純粋関数: 同じ入力には同じ出力を返し、正規化済みの姿勢に再適用しても変わらない
#[derive(Debug, Clone)]
pub struct PoseNormalizer {
    acceptance_threshold: f32,
    min_keypoints: usize,
    min_pose_score: Option<f32>,
}

impl PoseNormalizer {
    pub fn new(acceptance_threshold: f32, min_keypoints: usize) -> Self {
        Self {
            acceptance_threshold,
            min_keypoints,
            min_pose_score: None,
        }
    }

    pub fn with_min_pose_score(mut self, min_pose_score: f32) -> Self {
        self.min_pose_score = Some(min_pose_score);
        self
    }

    pub fn from_config(config: &NormalizerConfig) -> Self {
        let normalizer = Self::new(config.acceptance_threshold, config.min_keypoints);
        match config.min_pose_score {
            Some(score) => normalizer.with_min_pose_score(score),
            None => normalizer,
        }
    }

    pub fn acceptance_threshold(&self) -> f32 {
        self.acceptance_threshold
    }

    pub fn normalize(&self, raw: &RawPose) -> Option<Pose> {
        if let Some(min) = self.min_pose_score {
            if !(raw.score >= min) {
                return None;
            }
        }

        let mut keypoints = BTreeMap::new();
        for lm in &raw.landmarks {
            if !(lm.score >= self.acceptance_threshold) {
                continue;
            }
            let Some(index) = KeypointIndex::from_name(&lm.name) else {
                continue;
            };
            // 同名が重複した場合は信頼度の高い方
            let candidate = Keypoint {
                x: lm.x,
                y: lm.y,
                z: lm.z,
                confidence: lm.score,
            };
            keypoints
                .entry(index)
                .and_modify(|kp: &mut Keypoint| {
                    if candidate.confidence > kp.confidence {
                        *kp = candidate;
                    }
                })
                .or_insert(candidate);
        }

        if keypoints.len() < self.min_keypoints {
            return None;
        }

        let bounding_box = bounding_box(&keypoints);
        let measurements = measurements(&keypoints);

        Some(Pose {
            keypoints,
            score: raw.score,
            timestamp_ms: raw.timestamp_ms,
            model_id: raw.model_id.clone(),
            bounding_box,
            measurements,
        })
    }
}

impl Default for PoseNormalizer {
    fn default() -> Self {
        Self::from_config(&NormalizerConfig::default())
    }
}

fn bounding_box(keypoints: &BTreeMap<KeypointIndex, Keypoint>) -> BBox {
    if keypoints.is_empty() {
        return BBox::FALLBACK;
    }

    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    for kp in keypoints.values() {
        min_x = min_x.min(kp.x);
        min_y = min_y.min(kp.y);
        max_x = max_x.max(kp.x);
        max_y = max_y.max(kp.y);
    }

    BBox {
        x: (min_x - BBOX_PADDING).max(0.0),
        y: (min_y - BBOX_PADDING).max(0.0),
        width: (max_x - min_x + BBOX_PADDING * 2.0).max(BBOX_MIN_WIDTH),
        height: (max_y - min_y + BBOX_PADDING * 2.0).max(BBOX_MIN_HEIGHT),
    }
}

fn measurements(keypoints: &BTreeMap<KeypointIndex, Keypoint>) -> BodyMeasurements {
    use KeypointIndex::*;
    let get = |idx: KeypointIndex| keypoints.get(&idx);

    let shoulder_width = match (get(LeftShoulder), get(RightShoulder)) {
        (Some(l), Some(r)) => l.distance_to(r),
        _ => 0.0,
    };
    let torso_height = match (get(LeftShoulder), get(LeftHip)) {
        (Some(s), Some(h)) => (h.y - s.y).abs(),
        _ => 0.0,
    };
    let hip_width = match (get(LeftHip), get(RightHip)) {
        (Some(l), Some(r)) => (r.x - l.x).abs(),
        _ => 0.0,
    };
    let arm_length = match (get(LeftShoulder), get(LeftWrist)) {
        (Some(s), Some(w)) => s.distance_to(w),
        _ => 0.0,
    };

    BodyMeasurements {
        shoulder_width,
        torso_height,
        hip_width,
        arm_length,
    }
}

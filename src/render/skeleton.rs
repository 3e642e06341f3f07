use crate::pose::{KeypointIndex, Pose};

use super::display::{CoordinateTransformer, Point2};

/// 骨格の接続定義 (開始キーポイント, 終了キーポイント)
pub const SKELETON_CONNECTIONS: [(KeypointIndex, KeypointIndex); 16] = [
    // 顔
    (KeypointIndex::LeftEar, KeypointIndex::LeftEye),
    (KeypointIndex::LeftEye, KeypointIndex::Nose),
    (KeypointIndex::Nose, KeypointIndex::RightEye),
    (KeypointIndex::RightEye, KeypointIndex::RightEar),
    // 肩と腕
    (KeypointIndex::LeftShoulder, KeypointIndex::RightShoulder),
    (KeypointIndex::LeftShoulder, KeypointIndex::LeftElbow),
    (KeypointIndex::LeftElbow, KeypointIndex::LeftWrist),
    (KeypointIndex::RightShoulder, KeypointIndex::RightElbow),
    (KeypointIndex::RightElbow, KeypointIndex::RightWrist),
    // 胴体と腰
    (KeypointIndex::LeftShoulder, KeypointIndex::LeftHip),
    (KeypointIndex::RightShoulder, KeypointIndex::RightHip),
    (KeypointIndex::LeftHip, KeypointIndex::RightHip),
    // 脚
    (KeypointIndex::LeftHip, KeypointIndex::LeftKnee),
    (KeypointIndex::LeftKnee, KeypointIndex::LeftAnkle),
    (KeypointIndex::RightHip, KeypointIndex::RightKnee),
    (KeypointIndex::RightKnee, KeypointIndex::RightAnkle),
];

/// キーポイントの色 (RGB)
pub const KEYPOINT_COLOR: u32 = 0x00FF00; // 緑

/// 骨格線の色 (RGB)
pub const SKELETON_COLOR: u32 = 0xFFFF00; // 黄色

/// 信頼度が低いキーポイントの色 (RGB)
pub const LOW_CONFIDENCE_COLOR: u32 = 0xFF0000; // 赤

/// 衣服の枠の色 (RGB)
pub const GARMENT_COLOR: u32 = 0x00C0FF;

/// シーン座標の骨格線1本
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkeletonSegment {
    pub start_index: KeypointIndex,
    pub end_index: KeypointIndex,
    pub start: Point2,
    pub end: Point2,
}

/// 両端が min_confidence 以上の接続だけシーン座標に変換して返す
pub fn skeleton_segments(
    pose: &Pose,
    min_confidence: f32,
    transformer: &CoordinateTransformer,
) -> Vec<SkeletonSegment> {
    SKELETON_CONNECTIONS
        .iter()
        .filter_map(|&(a, b)| {
            let (start, end) = pose.pair(a, b)?;
            if !(start.is_valid(min_confidence) && end.is_valid(min_confidence)) {
                return None;
            }
            Some(SkeletonSegment {
                start_index: a,
                end_index: b,
                start: transformer.native_to_scene(Point2::new(start.x, start.y)),
                end: transformer.native_to_scene(Point2::new(end.x, end.y)),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DisplayConfig, SceneConfig};
    use crate::pose::{BBox, BodyMeasurements, Keypoint};
    use crate::render::VideoDimensions;

    fn transformer() -> CoordinateTransformer {
        CoordinateTransformer::new(
            VideoDimensions::new(640, 480),
            &SceneConfig::default(),
            &DisplayConfig::default(),
        )
    }

    fn pose(points: &[(KeypointIndex, f32, f32, f32)]) -> Pose {
        Pose {
            keypoints: points
                .iter()
                .map(|&(idx, x, y, c)| (idx, Keypoint::new(x, y, c)))
                .collect(),
            score: 0.9,
            timestamp_ms: 0,
            model_id: "test".to_string(),
            bounding_box: BBox::FALLBACK,
            measurements: BodyMeasurements::default(),
        }
    }

    #[test]
    fn test_connections_cover_body() {
        for idx in KeypointIndex::ALL {
            assert!(
                SKELETON_CONNECTIONS.iter().any(|&(a, b)| a == idx || b == idx),
                "{:?} is not connected",
                idx
            );
        }
    }

    #[test]
    fn test_segments_filter_by_confidence() {
        let p = pose(&[
            (KeypointIndex::LeftShoulder, 320.0, 240.0, 0.9),
            (KeypointIndex::RightShoulder, 640.0, 0.0, 0.9),
            (KeypointIndex::LeftElbow, 300.0, 300.0, 0.25),
        ]);
        let segments = skeleton_segments(&p, 0.3, &transformer());
        assert_eq!(segments.len(), 1);
        let seg = segments[0];
        assert_eq!(seg.start_index, KeypointIndex::LeftShoulder);
        assert_eq!(seg.start, Point2::new(0.0, 0.0));
        assert_eq!(seg.end, Point2::new(6.0, 6.0));

        // 閾値を下げれば肘も出る
        assert_eq!(skeleton_segments(&p, 0.2, &transformer()).len(), 2);
    }

    #[test]
    fn test_segments_empty_pose() {
        assert!(skeleton_segments(&pose(&[]), 0.3, &transformer()).is_empty());
    }
}

use std::collections::BTreeMap;

/// COCO / MoveNet の 17 キーポイント
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(usize)]
pub enum KeypointIndex {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl KeypointIndex {
    pub const COUNT: usize = 17;

    pub const ALL: [KeypointIndex; KeypointIndex::COUNT] = [
        Self::Nose,
        Self::LeftEye,
        Self::RightEye,
        Self::LeftEar,
        Self::RightEar,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
    ];

    /// 検出器が返すランドマーク名 (snake_case)
    pub fn name(self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "left_eye",
            Self::RightEye => "right_eye",
            Self::LeftEar => "left_ear",
            Self::RightEar => "right_ear",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftElbow => "left_elbow",
            Self::RightElbow => "right_elbow",
            Self::LeftWrist => "left_wrist",
            Self::RightWrist => "right_wrist",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
            Self::LeftKnee => "left_knee",
            Self::RightKnee => "right_knee",
            Self::LeftAnkle => "left_ankle",
            Self::RightAnkle => "right_ankle",
        }
    }

    /// 名前からインデックスを引く。BlazePose の追加ランドマーク等、未知の名前は None
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|idx| idx.name() == name)
    }
}

/// 単一キーポイント（ネイティブ画素座標）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// 奥行き（モデルが出す場合のみ）
    pub z: Option<f32>,
    /// 信頼度スコア (0.0〜1.0)
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self {
            x,
            y,
            z: None,
            confidence,
        }
    }

    /// 信頼度が閾値以上か
    pub fn is_valid(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }

    pub fn distance_to(&self, other: &Keypoint) -> f32 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

impl Default for Keypoint {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

/// 有効キーポイントを囲む矩形（ネイティブ画素座標）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BBox {
    /// キーポイントが一つもない場合の既定値
    pub const FALLBACK: BBox = BBox {
        x: 0.0,
        y: 0.0,
        width: 200.0,
        height: 400.0,
    };
}

/// 体の寸法（ネイティブ画素）。キーポイントが欠けている項目は 0
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BodyMeasurements {
    pub shoulder_width: f32,
    pub torso_height: f32,
    pub hip_width: f32,
    pub arm_length: f32,
}

/// 一人分の姿勢。閾値を通過したキーポイントのみ保持する
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub keypoints: BTreeMap<KeypointIndex, Keypoint>,
    /// 検出器が返す姿勢全体のスコア
    pub score: f32,
    pub timestamp_ms: u64,
    pub model_id: String,
    pub bounding_box: BBox,
    pub measurements: BodyMeasurements,
}

impl Pose {
    pub fn get(&self, index: KeypointIndex) -> Option<&Keypoint> {
        self.keypoints.get(&index)
    }

    /// 両方そろっている場合のみ返す
    pub fn pair(&self, a: KeypointIndex, b: KeypointIndex) -> Option<(&Keypoint, &Keypoint)> {
        Some((self.get(a)?, self.get(b)?))
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    /// 保持しているキーポイントの平均信頼度
    pub fn average_confidence(&self) -> f32 {
        if self.keypoints.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.keypoints.values().map(|k| k.confidence).sum();
        sum / self.keypoints.len() as f32
    }
}

use serde::Deserialize;

use crate::config::AnchorConfig;
use crate::pose::{KeypointIndex, Pose};
use crate::render::{CoordinateTransformer, Point2};

/// 衣服のカテゴリ。アンカーの計算方法が決まる
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub enum GarmentCategory {
    /// 肩に合わせる（トップス・アウター）
    TopLike,
    /// 腰に合わせる（パンツ・スカート）
    BottomLike,
    /// 肩から腰の下まで
    Dress,
    /// 姿勢を使わず固定位置に並べる
    Default,
}

impl GarmentCategory {
    /// カタログの種類名から変換。大文字小文字は区別しない
    pub fn from_type_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "top" | "shirt" | "tshirt" | "t-shirt" | "blouse" | "jacket" | "outerwear" => Self::TopLike,
            "bottom" | "pants" | "jeans" | "skirt" | "shorts" => Self::BottomLike,
            "dress" => Self::Dress,
            _ => Self::Default,
        }
    }
}

impl From<String> for GarmentCategory {
    fn from(name: String) -> Self {
        Self::from_type_name(&name)
    }
}

/// カタログの1アイテム
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GarmentItem {
    pub id: String,
    pub category: GarmentCategory,
    /// 画像の参照先（URL やパス）。描画側がそのまま使う
    #[serde(default)]
    pub image_ref: String,
    /// 画像の 高さ/幅
    #[serde(default)]
    pub aspect_ratio: Option<f32>,
}

impl GarmentItem {
    pub fn new(id: &str, category: GarmentCategory) -> Self {
        Self {
            id: id.to_string(),
            category,
            image_ref: String::new(),
            aspect_ratio: None,
        }
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: f32) -> Self {
        self.aspect_ratio = Some(aspect_ratio);
        self
    }
}

/// ネイティブ画素空間のアンカー（中心・大きさ・回転）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelAnchor {
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
    /// ラジアン。画像座標系 (Y 下向き)
    pub rotation: f32,
}

/// シーン単位のアンカー。描画側はこれを画像の配置に使う
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GarmentAnchor {
    pub category: GarmentCategory,
    pub position: Point2,
    pub width: f32,
    pub height: f32,
    /// ラジアン。シーン座標系 (Y 上向き)
    pub rotation: f32,
}

/// 1フレーム分の、カタログ内の1アイテムの配置
#[derive(Debug, Clone, PartialEq)]
pub struct GarmentTransform {
    pub item_id: String,
    /// カタログ内の順番
    pub index: usize,
    pub anchor: GarmentAnchor,
}

/// カテゴリ別のアンカー計算。必要なキーポイントが欠けていれば None
pub type AnchorStrategy = fn(&Pose, &AnchorConfig, Option<f32>) -> Option<PixelAnchor>;

/// 姿勢を使うカテゴリの計算表。Default はここに含めず固定配置
pub const ANCHOR_STRATEGIES: [(GarmentCategory, AnchorStrategy); 3] = [
    (GarmentCategory::TopLike, top_anchor),
    (GarmentCategory::BottomLike, bottom_anchor),
    (GarmentCategory::Dress, dress_anchor),
];

pub fn strategy_for(category: GarmentCategory) -> Option<AnchorStrategy> {
    ANCHOR_STRATEGIES
        .iter()
        .find(|(c, _)| *c == category)
        .map(|(_, strategy)| *strategy)
}

fn midpoint(a: (f32, f32), b: (f32, f32)) -> (f32, f32) {
    ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0)
}

/// 有効なアスペクト比だけ採用する
fn aspect_or(aspect: Option<f32>, fallback: f32) -> f32 {
    match aspect {
        Some(a) if a.is_finite() && a > 0.0 => a,
        _ => fallback,
    }
}

pub fn top_anchor(pose: &Pose, params: &AnchorConfig, aspect: Option<f32>) -> Option<PixelAnchor> {
    let (left, right) = pose.pair(KeypointIndex::LeftShoulder, KeypointIndex::RightShoulder)?;
    let (cx, cy) = midpoint((left.x, left.y), (right.x, right.y));
    let width = left.distance_to(right) * params.top_width_factor;
    let height = width * aspect_or(aspect, params.top_default_aspect);
    // 向かい合う人物は左肩が画像の右に来る。角度は画像の左から右へ測る
    let (a, b) = if left.x <= right.x { (left, right) } else { (right, left) };
    let rotation = (b.y - a.y).atan2(b.x - a.x);

    Some(PixelAnchor {
        center_x: cx,
        center_y: cy - params.top_neck_offset_px,
        width,
        height,
        rotation,
    })
}

pub fn bottom_anchor(pose: &Pose, params: &AnchorConfig, aspect: Option<f32>) -> Option<PixelAnchor> {
    let (left, right) = pose.pair(KeypointIndex::LeftHip, KeypointIndex::RightHip)?;
    let (cx, cy) = midpoint((left.x, left.y), (right.x, right.y));
    let width = left.distance_to(right) * params.bottom_width_factor;
    let height = width * aspect_or(aspect, params.bottom_default_aspect);

    Some(PixelAnchor {
        center_x: cx,
        center_y: cy + params.bottom_offset_px,
        width,
        height,
        rotation: 0.0,
    })
}

/// 肩の両方と腰のどちらか一方が必要。高さは腰の位置で決まるので aspect は使わない
pub fn dress_anchor(pose: &Pose, params: &AnchorConfig, _aspect: Option<f32>) -> Option<PixelAnchor> {
    let (left, right) = pose.pair(KeypointIndex::LeftShoulder, KeypointIndex::RightShoulder)?;
    let hips: Vec<f32> = [KeypointIndex::LeftHip, KeypointIndex::RightHip]
        .iter()
        .filter_map(|idx| pose.get(*idx))
        .map(|kp| kp.y)
        .collect();
    if hips.is_empty() {
        return None;
    }
    let hip_y = hips.iter().sum::<f32>() / hips.len() as f32;

    let (cx, shoulder_y) = midpoint((left.x, left.y), (right.x, right.y));
    let width = left.distance_to(right) * params.dress_width_factor;
    let height = (hip_y - shoulder_y) + params.dress_extension_px;

    Some(PixelAnchor {
        center_x: cx,
        center_y: shoulder_y - params.dress_neck_offset_px,
        width,
        height,
        rotation: 0.0,
    })
}

/// カテゴリに応じて姿勢から衣服のアンカーを求める
#[derive(Debug, Clone)]
pub struct AnchorCalculator {
    params: AnchorConfig,
}

impl AnchorCalculator {
    pub fn new(params: AnchorConfig) -> Self {
        Self { params }
    }

    pub fn from_config(config: &AnchorConfig) -> Self {
        Self::new(config.clone())
    }

    /// 画素空間のアンカー。Default カテゴリは姿勢を使わないので常に None
    pub fn pixel_anchor(&self, pose: &Pose, category: GarmentCategory, aspect: Option<f32>) -> Option<PixelAnchor> {
        let strategy = strategy_for(category)?;
        strategy(pose, &self.params, aspect)
    }

    /// index 番目に並べる固定配置（シーン単位）
    pub fn fallback_anchor(&self, index: usize) -> GarmentAnchor {
        let p = &self.params;
        GarmentAnchor {
            category: GarmentCategory::Default,
            position: Point2::new(0.0, p.fallback_base_y + p.fallback_step_y * index as f32),
            width: p.fallback_width,
            height: p.fallback_height,
            rotation: 0.0,
        }
    }

    /// シーン単位のアンカー。None は「このフレームは更新しない」
    pub fn compute(
        &self,
        pose: &Pose,
        item: &GarmentItem,
        index: usize,
        transformer: &CoordinateTransformer,
    ) -> Option<GarmentAnchor> {
        if item.category == GarmentCategory::Default {
            return Some(self.fallback_anchor(index));
        }
        self.pixel_anchor(pose, item.category, item.aspect_ratio)
            .map(|anchor| transformer.anchor_to_scene(&anchor, item.category))
    }
}

impl Default for AnchorCalculator {
    fn default() -> Self {
        Self::new(AnchorConfig::default())
    }
}

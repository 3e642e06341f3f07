use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::tracker::GarmentItem;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    #[serde(default)]
    pub scene: SceneConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub anchor: AnchorConfig,
    #[serde(default)]
    pub smoothing: SmoothConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// 試着するアイテム一覧（カタログ）
    #[serde(default)]
    pub garments: Vec<GarmentItem>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NormalizerConfig {
    /// これ未満の信頼度のキーポイントは捨てる
    #[serde(default = "default_acceptance_threshold")]
    pub acceptance_threshold: f32,
    /// 採用キーポイントがこれ未満の姿勢は「検出なし」扱い
    #[serde(default = "default_min_keypoints")]
    pub min_keypoints: usize,
    /// 姿勢全体のスコアの下限。なければ見ない
    #[serde(default)]
    pub min_pose_score: Option<f32>,
}

fn default_acceptance_threshold() -> f32 { 0.2 }
fn default_min_keypoints() -> usize { 8 }

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: default_acceptance_threshold(),
            min_keypoints: default_min_keypoints(),
            min_pose_score: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SceneConfig {
    /// 画面幅・高さに対応するシーン単位の大きさ
    #[serde(default = "default_world_extent")]
    pub world_extent: f32,
    /// シーン座標で左右反転するか（検出器側で反転済みなら false）
    #[serde(default)]
    pub mirror: bool,
}

fn default_world_extent() -> f32 { 12.0 }

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            world_extent: default_world_extent(),
            mirror: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DisplayConfig {
    /// フロントカメラ用の鏡像表示
    #[serde(default = "default_display_mirror")]
    pub mirror: bool,
}

fn default_display_mirror() -> bool { true }

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            mirror: default_display_mirror(),
        }
    }
}

/// カテゴリ別アンカー計算の定数。オフセットはネイティブ画素
#[derive(Debug, Deserialize, Clone)]
pub struct AnchorConfig {
    #[serde(default = "default_top_neck_offset")]
    pub top_neck_offset_px: f32,
    #[serde(default = "default_top_width_factor")]
    pub top_width_factor: f32,
    #[serde(default = "default_top_aspect")]
    pub top_default_aspect: f32,
    #[serde(default = "default_bottom_offset")]
    pub bottom_offset_px: f32,
    #[serde(default = "default_bottom_width_factor")]
    pub bottom_width_factor: f32,
    #[serde(default = "default_bottom_aspect")]
    pub bottom_default_aspect: f32,
    #[serde(default = "default_dress_neck_offset")]
    pub dress_neck_offset_px: f32,
    #[serde(default = "default_dress_extension")]
    pub dress_extension_px: f32,
    #[serde(default = "default_dress_width_factor")]
    pub dress_width_factor: f32,
    /// 以下はカテゴリ不明時の固定配置（シーン単位）
    #[serde(default = "default_fallback_base_y")]
    pub fallback_base_y: f32,
    #[serde(default = "default_fallback_step_y")]
    pub fallback_step_y: f32,
    #[serde(default = "default_fallback_width")]
    pub fallback_width: f32,
    #[serde(default = "default_fallback_height")]
    pub fallback_height: f32,
}

fn default_top_neck_offset() -> f32 { 50.0 }
fn default_top_width_factor() -> f32 { 1.25 }
fn default_top_aspect() -> f32 { 1.4 }
fn default_bottom_offset() -> f32 { 20.0 }
fn default_bottom_width_factor() -> f32 { 1.4 }
fn default_bottom_aspect() -> f32 { 1.8 }
fn default_dress_neck_offset() -> f32 { 60.0 }
fn default_dress_extension() -> f32 { 100.0 }
fn default_dress_width_factor() -> f32 { 1.6 }
fn default_fallback_base_y() -> f32 { -2.0 }
fn default_fallback_step_y() -> f32 { 1.5 }
fn default_fallback_width() -> f32 { 3.0 }
fn default_fallback_height() -> f32 { 4.0 }

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            top_neck_offset_px: default_top_neck_offset(),
            top_width_factor: default_top_width_factor(),
            top_default_aspect: default_top_aspect(),
            bottom_offset_px: default_bottom_offset(),
            bottom_width_factor: default_bottom_width_factor(),
            bottom_default_aspect: default_bottom_aspect(),
            dress_neck_offset_px: default_dress_neck_offset(),
            dress_extension_px: default_dress_extension(),
            dress_width_factor: default_dress_width_factor(),
            fallback_base_y: default_fallback_base_y(),
            fallback_step_y: default_fallback_step_y(),
            fallback_width: default_fallback_width(),
            fallback_height: default_fallback_height(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmoothConfig {
    /// EMA係数。小さいほど滑らか、大きいほど追従が速い
    #[serde(default = "default_smooth_alpha")]
    pub alpha: f32,
}

fn default_smooth_alpha() -> f32 { 0.2 }

impl Default for SmoothConfig {
    fn default() -> Self {
        Self {
            alpha: default_smooth_alpha(),
        }
    }
}

/// 姿勢推定モデルの候補
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ModelVariant {
    /// 出力 Pose の model_id になる
    pub id: String,
    /// ONNX ファイル（desktop バックエンドのみ使用）
    #[serde(default)]
    pub path: Option<String>,
    /// 正方形の入力解像度
    #[serde(default = "default_input_size")]
    pub input_size: u32,
}

fn default_input_size() -> u32 { 192 }

impl ModelVariant {
    pub fn new(id: &str, path: &str, input_size: u32) -> Self {
        Self {
            id: id.to_string(),
            path: Some(path.to_string()),
            input_size,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// 軽量モデルから順に試す
    #[serde(default = "default_variants")]
    pub variants: Vec<ModelVariant>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// 失敗後の待ち時間は attempt * backoff_step_ms
    #[serde(default = "default_backoff_step_ms")]
    pub backoff_step_ms: u64,
    /// 1モデルあたりのロード制限時間
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,
}

fn default_variants() -> Vec<ModelVariant> {
    vec![
        ModelVariant::new("movenet_lightning", "models/movenet_lightning.onnx", 192),
        ModelVariant::new("movenet_thunder", "models/movenet_thunder.onnx", 256),
    ]
}
fn default_max_attempts() -> u32 { 3 }
fn default_backoff_step_ms() -> u64 { 2000 }
fn default_load_timeout_ms() -> u64 { 30_000 }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            variants: default_variants(),
            max_attempts: default_max_attempts(),
            backoff_step_ms: default_backoff_step_ms(),
            load_timeout_ms: default_load_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// 描画ループの目標FPS
    #[serde(default = "default_render_fps")]
    pub render_fps: u32,
    /// N フレームに1回だけ推論する
    #[serde(default = "default_detect_every")]
    pub detect_every: u32,
    /// 骨格線を出す最低信頼度
    #[serde(default = "default_skeleton_confidence")]
    pub skeleton_confidence: f32,
    /// カメラ準備の待ち時間
    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,
}

fn default_render_fps() -> u32 { 60 }
fn default_detect_every() -> u32 { 2 }
fn default_skeleton_confidence() -> f32 { 0.3 }
fn default_capture_timeout_ms() -> u64 { 3000 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            render_fps: default_render_fps(),
            detect_every: default_detect_every(),
            skeleton_confidence: default_skeleton_confidence(),
            capture_timeout_ms: default_capture_timeout_ms(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Invalid config")?;
        Ok(config)
    }

    /// 読めなければ既定値で続行する
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                warn!("{:#}; using default config", e);
                Self::default()
            }
        }
    }
}

use anyhow::{anyhow, bail, Context, Result};
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::info;

use crate::camera::ThreadedCamera;
use crate::config::ModelVariant;

use super::backend::{BackendLoader, PoseBackend};
use super::keypoint::KeypointIndex;
use super::normalize::{RawLandmark, RawPose};
use super::preprocess::preprocess_for_movenet;

fn build_session(model_path: &Path) -> Result<Session> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .commit_from_file(model_path)
        .with_context(|| format!("Failed to load ONNX model {}", model_path.display()))?;
    Ok(session)
}

/// MoveNet の推論を1回実行し、ネイティブ画素座標のランドマークを返す
///
/// 入力: [1, size, size, 3] の f32 テンソル
/// 出力: [1, 1, 17, 3] (y, x, confidence)。座標は 0..1
fn run_movenet(session: &mut Session, input: Array4<f32>, width: f32, height: f32) -> Result<(Vec<RawLandmark>, f32)> {
    let input_tensor = Tensor::from_array(input)?;
    let outputs = session
        .run(ort::inputs!["serving_default_input_0" => input_tensor])
        .context("Inference failed")?;

    let output: ndarray::ArrayViewD<f32> = outputs["StatefulPartitionedCall_0"]
        .try_extract_array()
        .context("Failed to extract output tensor")?;

    let mut landmarks = Vec::with_capacity(KeypointIndex::COUNT);
    let mut total = 0.0;
    for idx in KeypointIndex::ALL {
        let i = idx as usize;
        let y = output[[0, 0, i, 0]];
        let x = output[[0, 0, i, 1]];
        let confidence = output[[0, 0, i, 2]];
        total += confidence;
        landmarks.push(RawLandmark::new(idx.name(), x * width, y * height, confidence));
    }

    Ok((landmarks, total / KeypointIndex::COUNT as f32))
}

/// ONNX MoveNet による姿勢推定
pub struct MoveNetBackend {
    session: Arc<Mutex<Session>>,
    input_size: u32,
    model_id: String,
    started: Instant,
}

impl MoveNetBackend {
    pub fn new<P: AsRef<Path>>(model_path: P, model_id: &str, input_size: u32) -> Result<Self> {
        let session = build_session(model_path.as_ref())?;
        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_size,
            model_id: model_id.to_string(),
            started: Instant::now(),
        })
    }
}

impl PoseBackend<ThreadedCamera> for MoveNetBackend {
    async fn estimate(&self, source: &ThreadedCamera) -> Result<Option<RawPose>> {
        let Some(frame) = source.get_frame() else {
            return Ok(None);
        };
        let (width, height) = source.resolution();
        let session = self.session.clone();
        let input_size = self.input_size;
        let timestamp_ms = self.started.elapsed().as_millis() as u64;

        // 推論はブロッキングなので描画側のタスクを止めない
        let (landmarks, score) = tokio::task::spawn_blocking(move || {
            let input = preprocess_for_movenet(&frame, input_size)?;
            let mut session = session
                .lock()
                .map_err(|_| anyhow!("ONNX session lock poisoned"))?;
            run_movenet(&mut session, input, width as f32, height as f32)
        })
        .await
        .context("Inference task panicked")??;

        Ok(Some(RawPose {
            landmarks,
            score,
            timestamp_ms,
            model_id: self.model_id.clone(),
        }))
    }
}

/// ModelVariant の path から MoveNetBackend を作る
#[derive(Debug, Default)]
pub struct MoveNetLoader;

impl BackendLoader for MoveNetLoader {
    type Backend = MoveNetBackend;

    async fn load(&self, variant: &ModelVariant) -> Result<MoveNetBackend> {
        let Some(path) = variant.path.clone() else {
            bail!("model {} has no path", variant.id);
        };
        let id = variant.id.clone();
        let input_size = variant.input_size;
        info!(model = %id, path = %path, "loading ONNX model");
        tokio::task::spawn_blocking(move || MoveNetBackend::new(&path, &id, input_size))
            .await
            .context("Model load task panicked")?
    }
}

use anyhow::Result;
use std::future::Future;

use crate::config::ModelVariant;

use super::normalize::RawPose;

/// 姿勢推定バックエンド
///
/// S はフレームの取得元。推論中もフレームは借用のままで、コピーしない
pub trait PoseBackend<S: ?Sized>: Send + Sync + 'static {
    /// 人物が見つからなければ Ok(None)。Err はこのフレームだけの失敗
    fn estimate(&self, source: &S) -> impl Future<Output = Result<Option<RawPose>>> + Send;
}

/// モデル候補からバックエンドを作る
pub trait BackendLoader: Send + Sync + 'static {
    type Backend: Send + Sync + 'static;

    fn load(&self, variant: &ModelVariant) -> impl Future<Output = Result<Self::Backend>> + Send;
}

use std::future::Future;

use crate::error::TryOnError;
use crate::render::VideoDimensions;

/// 映像の取得元
pub trait FrameSource: Send + Sync + 'static {
    /// 最初のフレームが来るまでは None
    fn dimensions(&self) -> Option<VideoDimensions>;

    /// 最初のフレームを待つ。取得できなければ CaptureUnavailable
    fn wait_ready(&self) -> impl Future<Output = Result<VideoDimensions, TryOnError>> + Send;
}

/// 解像度だけを持つフレーム源。ヘッドレス実行とテスト用
#[derive(Debug, Clone)]
pub struct StaticFrameSource {
    dimensions: Option<VideoDimensions>,
}

impl StaticFrameSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            dimensions: Some(VideoDimensions::new(width, height)),
        }
    }

    /// カメラがない状態
    pub fn unavailable() -> Self {
        Self { dimensions: None }
    }
}

impl FrameSource for StaticFrameSource {
    fn dimensions(&self) -> Option<VideoDimensions> {
        self.dimensions.filter(|d| d.is_valid())
    }

    async fn wait_ready(&self) -> Result<VideoDimensions, TryOnError> {
        self.dimensions()
            .ok_or_else(|| TryOnError::CaptureUnavailable("no video source".to_string()))
    }
}

use thiserror::Error;

/// モデルのロードに関するエラー
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelLoadError {
    /// 全候補・全試行が失敗した。retry() で再開できる
    #[error("model loading failed after {attempts} attempts: {message}")]
    Exhausted { attempts: u32, message: String },
    /// 候補モデルが一つも設定されていない
    #[error("no model variants configured")]
    NoVariants,
}

/// セッション開始時のエラー
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TryOnError {
    #[error("camera unavailable: {0}")]
    CaptureUnavailable(String),
    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let e = ModelLoadError::Exhausted {
            attempts: 3,
            message: "timeout".to_string(),
        };
        assert_eq!(e.to_string(), "model loading failed after 3 attempts: timeout");

        let e: TryOnError = e.into();
        assert!(matches!(e, TryOnError::ModelLoad(ModelLoadError::Exhausted { attempts: 3, .. })));
        assert_eq!(
            TryOnError::CaptureUnavailable("no device".to_string()).to_string(),
            "camera unavailable: no device"
        );
    }
}

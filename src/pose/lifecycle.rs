use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::ModelConfig;
use crate::error::ModelLoadError;

use super::backend::BackendLoader;

/// モデルの状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    /// attempt は 1 始まり
    Loading { attempt: u32 },
    Ready { model_id: String },
    Failed { attempts: u32, message: String },
}

impl LifecycleState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

/// ロード中の future が途中で破棄されたら Uninitialized に戻す
struct LoadGuard<'a> {
    state: &'a watch::Sender<LifecycleState>,
    armed: bool,
}

impl<'a> LoadGuard<'a> {
    fn new(state: &'a watch::Sender<LifecycleState>) -> Self {
        Self { state, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("model load cancelled");
            self.state.send_replace(LifecycleState::Uninitialized);
        }
    }
}

/// 姿勢推定モデルのロードを管理する
///
/// - 候補モデルを順に試し、全滅したら attempt * backoff_step 待って次の試行
/// - max_attempts 回失敗したら Failed。retry() で最初からやり直せる
/// - 同時に ensure_ready を呼んでもロードは一度だけ
pub struct ModelLifecycleManager<L: BackendLoader> {
    loader: L,
    config: ModelConfig,
    state: watch::Sender<LifecycleState>,
    backend: OnceLock<Arc<L::Backend>>,
}

impl<L: BackendLoader> ModelLifecycleManager<L> {
    pub fn new(loader: L, config: ModelConfig) -> Self {
        let (state, _) = watch::channel(LifecycleState::Uninitialized);
        Self {
            loader,
            config,
            state,
            backend: OnceLock::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Ready になっていれば読み込み済みのバックエンド
    pub fn backend(&self) -> Option<Arc<L::Backend>> {
        self.backend.get().cloned()
    }

    /// Ready になるまで待つ。未初期化ならこの呼び出しがロードを担当する
    pub async fn ensure_ready(&self) -> Result<Arc<L::Backend>, ModelLoadError> {
        let mut rx = self.state.subscribe();
        loop {
            if let Some(backend) = self.backend.get() {
                return Ok(backend.clone());
            }

            let claimed = self.state.send_if_modified(|state| {
                if *state == LifecycleState::Uninitialized {
                    *state = LifecycleState::Loading { attempt: 1 };
                    true
                } else {
                    false
                }
            });
            if claimed {
                let mut guard = LoadGuard::new(&self.state);
                let result = self.run_load().await;
                guard.disarm();
                return result;
            }

            let current = rx.borrow_and_update().clone();
            match current {
                LifecycleState::Failed { attempts, message } => {
                    return Err(ModelLoadError::Exhausted { attempts, message });
                }
                // backend は Ready の前にセット済み
                LifecycleState::Ready { .. } | LifecycleState::Uninitialized => continue,
                LifecycleState::Loading { attempt } => {
                    debug!(attempt, "waiting for in-flight model load");
                }
            }

            if rx.changed().await.is_err() {
                // self が Sender を持っているので通常は起きない
                return Err(ModelLoadError::Exhausted {
                    attempts: 0,
                    message: "lifecycle state channel closed".to_string(),
                });
            }
        }
    }

    /// Failed から再ロードする。Failed 以外では ensure_ready と同じ
    pub async fn retry(&self) -> Result<Arc<L::Backend>, ModelLoadError> {
        let reset = self.state.send_if_modified(|state| {
            if matches!(state, LifecycleState::Failed { .. }) {
                *state = LifecycleState::Uninitialized;
                true
            } else {
                false
            }
        });
        if reset {
            info!("retrying model load");
        }
        self.ensure_ready().await
    }

    async fn run_load(&self) -> Result<Arc<L::Backend>, ModelLoadError> {
        if self.config.variants.is_empty() {
            self.state.send_replace(LifecycleState::Failed {
                attempts: 0,
                message: ModelLoadError::NoVariants.to_string(),
            });
            return Err(ModelLoadError::NoVariants);
        }

        let max_attempts = self.config.max_attempts.max(1);
        let load_timeout = Duration::from_millis(self.config.load_timeout_ms);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            self.state.send_replace(LifecycleState::Loading { attempt });

            for variant in &self.config.variants {
                info!(attempt, model = %variant.id, "loading pose model");
                match timeout(load_timeout, self.loader.load(variant)).await {
                    Ok(Ok(backend)) => {
                        let backend = Arc::new(backend);
                        let _ = self.backend.set(backend.clone());
                        self.state.send_replace(LifecycleState::Ready {
                            model_id: variant.id.clone(),
                        });
                        info!(model = %variant.id, "pose model ready");
                        return Ok(backend);
                    }
                    Ok(Err(e)) => {
                        warn!(attempt, model = %variant.id, "model load failed: {:#}", e);
                        last_error = format!("{}: {:#}", variant.id, e);
                    }
                    Err(_) => {
                        warn!(attempt, model = %variant.id, "model load timed out after {:?}", load_timeout);
                        last_error = format!("{}: timed out after {:?}", variant.id, load_timeout);
                    }
                }
            }

            if attempt < max_attempts {
                let delay = Duration::from_millis(self.config.backoff_step_ms * attempt as u64);
                debug!(attempt, ?delay, "backing off before next model load attempt");
                sleep(delay).await;
            }
        }

        warn!(attempts = max_attempts, "giving up on model load");
        self.state.send_replace(LifecycleState::Failed {
            attempts: max_attempts,
            message: last_error.clone(),
        });
        Err(ModelLoadError::Exhausted {
            attempts: max_attempts,
            message: last_error,
        })
    }
}

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tryon_tracker::camera::StaticFrameSource;
use tryon_tracker::config::Config;
use tryon_tracker::pose::MockLoader;
use tryon_tracker::render::ContainerSize;
use tryon_tracker::tracker::{GarmentCategory, GarmentItem};
use tryon_tracker::TryOnSession;

const CONFIG_PATH: &str = "config.toml";

/// デモの実行時間
const RUN_FOR: Duration = Duration::from_secs(5);

/// カメラもモデルもなしで、揺れる人物に衣服を重ねるデモ
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!(version = env!("GIT_VERSION"), "tryon tracker (headless demo)");

    let path = std::env::args().nth(1).unwrap_or_else(|| CONFIG_PATH.to_string());
    let mut config = Config::load_or_default(&path);
    if config.garments.is_empty() {
        config.garments = vec![
            GarmentItem::new("demo-shirt", GarmentCategory::TopLike).with_aspect_ratio(1.2),
            GarmentItem::new("demo-jeans", GarmentCategory::BottomLike),
            GarmentItem::new("demo-hat", GarmentCategory::Default),
        ];
    }

    let source = Arc::new(StaticFrameSource::new(640, 480));
    let loader = MockLoader::new().with_delay(Duration::from_millis(300));
    let mut session = TryOnSession::new(source, loader, &config);
    session.resize_container(ContainerSize::new(1280.0, 720.0));

    let mut lifecycle = session.subscribe_lifecycle();
    tokio::spawn(async move {
        while lifecycle.changed().await.is_ok() {
            let state = lifecycle.borrow_and_update().clone();
            info!(state = ?state, "model lifecycle");
        }
    });

    let mut snapshots = session.subscribe();
    session.start().await?;

    let deadline = tokio::time::sleep(RUN_FOR);
    tokio::pin!(deadline);
    let mut last_report = 0u64;
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    warn!("snapshot channel closed");
                    break;
                }
            }
        }

        let Some(snapshot) = snapshots.borrow_and_update().clone() else {
            continue;
        };
        // 1秒に1回程度
        if snapshot.frame_index < last_report + config.scheduler.render_fps as u64 {
            continue;
        }
        last_report = snapshot.frame_index;

        info!(
            frame = snapshot.frame_index,
            keypoints = snapshot.pose.as_ref().map_or(0, |p| p.len()),
            segments = snapshot.skeleton.len(),
            "snapshot"
        );
        for garment in &snapshot.garments {
            let a = &garment.anchor;
            info!(
                "  {}[{}] {:?} pos=({:.2}, {:.2}) size={:.2}x{:.2} rot={:.1}°",
                garment.item_id,
                garment.index,
                a.category,
                a.position.x,
                a.position.y,
                a.width,
                a.height,
                a.rotation.to_degrees()
            );
        }
    }

    session.stop().await;
    info!("done");
    Ok(())
}

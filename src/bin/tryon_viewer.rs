use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tryon_tracker::camera::ThreadedCamera;
use tryon_tracker::config::Config;
use tryon_tracker::pose::MoveNetLoader;
use tryon_tracker::render::{ContainerSize, CoordinateTransformer, Key, MinifbRenderer, VideoDimensions};
use tryon_tracker::TryOnSession;

const CONFIG_PATH: &str = "config.toml";

const WINDOW_WIDTH: usize = 960;
const WINDOW_HEIGHT: usize = 720;

/// ウィンドウ更新の間隔
const REDRAW: Duration = Duration::from_millis(16);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!(version = env!("GIT_VERSION"), "tryon viewer");
    info!("ESC: quit, R: reset tracking");

    let config = Config::load_or_default(CONFIG_PATH);
    if config.garments.is_empty() {
        warn!("no garments in {}; only the skeleton will be drawn", CONFIG_PATH);
    }

    let camera = Arc::new(
        ThreadedCamera::start(
            0,
            Some(640),
            Some(480),
            Duration::from_millis(config.scheduler.capture_timeout_ms),
        )
        .context("Failed to start camera")?,
    );
    let (width, height) = camera.resolution();

    let mut session = TryOnSession::new(camera.clone(), MoveNetLoader, &config);
    let container = ContainerSize::new(WINDOW_WIDTH as f32, WINDOW_HEIGHT as f32);
    session.resize_container(container);
    let mut snapshots = session.subscribe();

    let mut renderer = MinifbRenderer::new("Try-On Viewer", WINDOW_WIDTH, WINDOW_HEIGHT)?;
    let mut transformer = CoordinateTransformer::new(VideoDimensions::new(width, height), &config.scene, &config.display);
    transformer.set_container(container);

    info!("loading model and waiting for camera...");
    session.start().await?;
    info!(state = ?session.lifecycle_state(), "running");

    let mut frame_count = 0u32;
    let mut fps_timer = Instant::now();

    while renderer.is_open() {
        tokio::time::sleep(REDRAW).await;

        if renderer.is_key_down(Key::R) {
            session.reset_tracking();
        }

        let Some(snapshot) = snapshots.borrow_and_update().clone() else {
            renderer.update()?;
            continue;
        };
        transformer.set_video(snapshot.video);

        if let Some(frame) = camera.get_frame() {
            renderer.draw_frame(&frame, &transformer)?;
        }
        renderer.draw_snapshot(&snapshot, &transformer, config.scheduler.skeleton_confidence);
        renderer.update()?;

        frame_count += 1;
        let elapsed = fps_timer.elapsed().as_secs_f32();
        if elapsed >= 1.0 {
            info!(
                fps = %format!("{:.1}", frame_count as f32 / elapsed),
                frame = snapshot.frame_index,
                garments = snapshot.garments.len(),
                confidence = %format!("{:.2}", snapshot.pose.as_ref().map_or(0.0, |p| p.average_confidence())),
                "viewer"
            );
            frame_count = 0;
            fps_timer = Instant::now();
        }
    }

    info!("shutting down...");
    session.stop().await;
    Ok(())
}

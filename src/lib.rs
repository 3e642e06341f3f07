pub mod camera;
pub mod config;
pub mod error;
pub mod pose;
pub mod render;
pub mod session;
pub mod tracker;

pub use error::{ModelLoadError, TryOnError};
pub use session::{FrameSnapshot, TryOnSession};

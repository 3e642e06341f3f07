pub mod display;
pub mod skeleton;
#[cfg(feature = "desktop")]
pub mod window;

pub use display::{ContainerSize, CoordinateTransformer, DisplayRect, Point2, VideoDimensions};
pub use skeleton::{skeleton_segments, SkeletonSegment, SKELETON_CONNECTIONS};
#[cfg(feature = "desktop")]
pub use minifb::Key;
#[cfg(feature = "desktop")]
pub use window::MinifbRenderer;

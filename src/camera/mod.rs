#[cfg(feature = "desktop")]
pub mod capture;
pub mod source;

#[cfg(feature = "desktop")]
pub use capture::{OpenCvCamera, ThreadedCamera};
pub use source::{FrameSource, StaticFrameSource};

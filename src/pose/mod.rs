pub mod backend;
#[cfg(feature = "desktop")]
pub mod detector;
pub mod keypoint;
pub mod lifecycle;
pub mod mock;
pub mod normalize;
#[cfg(feature = "desktop")]
pub mod preprocess;

pub use backend::{BackendLoader, PoseBackend};
#[cfg(feature = "desktop")]
pub use detector::{MoveNetBackend, MoveNetLoader};
pub use keypoint::{BBox, BodyMeasurements, Keypoint, KeypointIndex, Pose};
pub use lifecycle::{LifecycleState, ModelLifecycleManager};
pub use mock::{MockLoader, MockPoseBackend};
pub use normalize::{PoseNormalizer, RawLandmark, RawPose};
#[cfg(feature = "desktop")]
pub use preprocess::preprocess_for_movenet;

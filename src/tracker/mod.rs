pub mod anchor;
pub mod smooth;

pub use anchor::{
    strategy_for, AnchorCalculator, AnchorStrategy, GarmentAnchor, GarmentCategory, GarmentItem,
    GarmentTransform, PixelAnchor,
};
pub use smooth::{wrap_angle, AnchorSmoother, GarmentSmoother};

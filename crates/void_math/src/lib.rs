//! # void_math - Spatial Math for AI
//!
//! Small, copyable math primitives shared by the perception, tactical and
//! pipeline layers. Positions are world-space `f32` triples.

pub mod bounds;
pub mod vector;

pub use bounds::*;
pub use vector::*;

/// Common math constants
pub mod consts {
    pub const PI: f32 = core::f32::consts::PI;
    pub const DEG_TO_RAD: f32 = PI / 180.0;
    pub const RAD_TO_DEG: f32 = 180.0 / PI;
    /// Lengths below this are treated as zero when normalizing
    pub const DEGENERATE_LENGTH: f32 = 0.001;
}

/// Convert degrees to radians
#[inline]
pub fn radians(degrees: f32) -> f32 {
    degrees * consts::DEG_TO_RAD
}

/// Convert radians to degrees
#[inline]
pub fn degrees(radians: f32) -> f32 {
    radians * consts::RAD_TO_DEG
}

pub mod prelude {
    pub use crate::bounds::Aabb;
    pub use crate::vector::Vec3;
    pub use crate::{degrees, radians};
}

mod aabb;
mod matrix;

pub use aabb::{Aabb, Axis};
pub use matrix::{array_to_matrix, invert_or_identity, is_identity, matrix_to_array};

/// Tolerance used for floating point comparisons.
pub const EPSILON: f32 = 1e-5;

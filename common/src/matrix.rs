//! Small matrix helpers shared by the graph compiler and the scene file format.
//!
//! Matrix math itself comes from `cgmath`; these functions only cover comparisons
//! and conversions the compiler needs.

use cgmath::{Matrix4, SquareMatrix};

use super::EPSILON;

/// Returns true if every element of `matrix` is within `EPSILON` of the identity.
pub fn is_identity(matrix: &Matrix4<f32>) -> bool {
    let difference = *matrix - Matrix4::identity();
    let columns: [[f32; 4]; 4] = difference.into();
    columns.iter().flatten().all(|value| value.abs() < EPSILON)
}

/// Inverts an affine transform, falling back to the identity for singular matrices.
pub fn invert_or_identity(matrix: &Matrix4<f32>) -> Matrix4<f32> {
    matrix.invert().unwrap_or_else(Matrix4::identity)
}

/// Converts a matrix to column-major nested arrays (the layout cgmath stores).
pub fn matrix_to_array(matrix: &Matrix4<f32>) -> [[f32; 4]; 4] {
    (*matrix).into()
}

/// Converts column-major nested arrays to a matrix.
pub fn array_to_matrix(columns: [[f32; 4]; 4]) -> Matrix4<f32> {
    columns.into()
}

//! Small 2D math utilities that are not provided directly by `nalgebra`.

use crate::{
    fph,
    quantities::{Position, Rotation, Transform},
    settings::EPSILON,
};
use nalgebra::{Isometry2, Matrix2, Translation2, Vector2};

/// Computes the 2D cross product (the z-component of the 3D cross product)
/// of two vectors.
#[inline]
pub fn cross(a: &Vector2<fph>, b: &Vector2<fph>) -> fph {
    a.x * b.y - a.y * b.x
}

/// Computes the cross product of a scalar (representing a vector along z)
/// with a vector, `s × v`.
#[inline]
pub fn cross_scalar_vector(s: fph, v: &Vector2<fph>) -> Vector2<fph> {
    Vector2::new(-s * v.y, s * v.x)
}

/// Computes the cross product of a vector with a scalar (representing a
/// vector along z), `v × s`.
#[inline]
pub fn cross_vector_scalar(v: &Vector2<fph>, s: fph) -> Vector2<fph> {
    Vector2::new(s * v.y, -s * v.x)
}

/// Transforms the given point from the frame of the transform to world
/// space.
#[inline]
pub fn transform_point(transform: &Transform, point: &Position) -> Position {
    transform.rotation * point + transform.translation.vector
}

/// Transforms the given world space point into the frame of the transform.
#[inline]
pub fn inverse_transform_point(transform: &Transform, point: &Position) -> Position {
    transform
        .rotation
        .inverse_transform_vector(&(point - transform.translation.vector))
}

/// Constructs the transform of a body whose center of mass is located at
/// `center` in world space, at `local_center` in the body frame, and whose
/// frame is rotated by `angle`.
#[inline]
pub fn body_transform(center: &Position, angle: fph, local_center: &Position) -> Transform {
    let rotation = Rotation::new(angle);
    let origin = center - rotation * local_center;
    Isometry2::from_parts(Translation2::from(origin), rotation)
}

/// Normalizes the given vector in place and returns its original length. If
/// the length is below [`EPSILON`], the vector is left untouched and zero is
/// returned.
#[inline]
pub fn normalize_and_get_length(v: &mut Vector2<fph>) -> fph {
    let length = v.norm();
    if length < EPSILON {
        return 0.0;
    }
    *v /= length;
    length
}

/// Inverts the given 2x2 matrix, returning the zero matrix if it is
/// singular.
#[inline]
pub fn invert_or_zero(matrix: &Matrix2<fph>) -> Matrix2<fph> {
    matrix.try_inverse().unwrap_or_else(Matrix2::zeros)
}

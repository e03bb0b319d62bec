//! World space contact geometry.

use super::{Manifold, ManifoldType};
use crate::{
    fph,
    math::transform_point,
    quantities::{Direction, Position, Transform},
    settings::{EPSILON, MAX_MANIFOLD_POINTS},
};

/// The world space contact normal and contact points of a [`Manifold`].
#[derive(Clone, Debug, PartialEq)]
pub struct WorldManifold {
    normal: Direction,
    points: [Position; MAX_MANIFOLD_POINTS],
    point_count: usize,
}

impl WorldManifold {
    /// Computes the world space geometry of the given manifold for two shapes
    /// with the given transforms and rounding radii.
    ///
    /// Each contact point is placed midway between the surfaces of the two
    /// shapes along the normal. An empty manifold gives a zero normal and no
    /// points.
    pub fn new(
        manifold: &Manifold,
        transform_a: &Transform,
        radius_a: fph,
        transform_b: &Transform,
        radius_b: fph,
    ) -> Self {
        let mut normal = Direction::zeros();
        let mut points = [Position::zeros(); MAX_MANIFOLD_POINTS];
        let point_count = manifold.point_count();

        if point_count == 0 {
            return Self {
                normal,
                points,
                point_count,
            };
        }

        match manifold.manifold_type {
            ManifoldType::Circles => {
                let point_a = transform_point(transform_a, &manifold.local_point);
                let point_b = transform_point(transform_b, &manifold.points()[0].local_point);

                normal = Direction::new(1.0, 0.0);
                let displacement = point_b - point_a;
                if displacement.norm_squared() > EPSILON * EPSILON {
                    normal = displacement.normalize();
                }

                let c_a = point_a + radius_a * normal;
                let c_b = point_b - radius_b * normal;
                points[0] = 0.5 * (c_a + c_b);
            }
            ManifoldType::FaceA => {
                normal = transform_a.rotation * manifold.local_normal;
                let plane_point = transform_point(transform_a, &manifold.local_point);

                for (point, manifold_point) in points.iter_mut().zip(manifold.points()) {
                    let clip_point = transform_point(transform_b, &manifold_point.local_point);
                    let c_a = clip_point
                        + (radius_a - (clip_point - plane_point).dot(&normal)) * normal;
                    let c_b = clip_point - radius_b * normal;
                    *point = 0.5 * (c_a + c_b);
                }
            }
            ManifoldType::FaceB => {
                normal = transform_b.rotation * manifold.local_normal;
                let plane_point = transform_point(transform_b, &manifold.local_point);

                for (point, manifold_point) in points.iter_mut().zip(manifold.points()) {
                    let clip_point = transform_point(transform_a, &manifold_point.local_point);
                    let c_b = clip_point
                        + (radius_b - (clip_point - plane_point).dot(&normal)) * normal;
                    let c_a = clip_point - radius_a * normal;
                    *point = 0.5 * (c_a + c_b);
                }

                // Ensure normal points from A to B
                normal = -normal;
            }
        }

        Self {
            normal,
            points,
            point_count,
        }
    }

    /// The world space normal, pointing from shape A to shape B.
    pub fn normal(&self) -> &Direction {
        &self.normal
    }

    /// The world space contact points.
    pub fn points(&self) -> &[Position] {
        &self.points[..self.point_count]
    }
}

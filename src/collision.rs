//! Contact manifolds produced by narrow phase collision detection.

pub mod world_manifold;

use crate::{
    fph,
    quantities::{Direction, Position},
    settings::MAX_MANIFOLD_POINTS,
};
use bytemuck::{Pod, Zeroable};
use tinyvec::ArrayVec;

/// Whether a contact feature is a vertex or a face.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ContactFeatureType {
    Vertex = 0,
    Face = 1,
}

/// Identifies the features of the two shapes that produced a contact point,
/// so that points can be matched between steps for warm starting.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Zeroable, Pod)]
pub struct ContactID {
    /// Feature index on shape A.
    pub index_a: u8,
    /// Feature index on shape B.
    pub index_b: u8,
    /// Feature type on shape A.
    pub type_a: u8,
    /// Feature type on shape B.
    pub type_b: u8,
}

/// How the geometry of a [`Manifold`] is to be interpreted.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ManifoldType {
    /// The local point is the center of circle A and each manifold point
    /// holds the center of circle B.
    #[default]
    Circles,
    /// The local normal and point describe a face of shape A, and the
    /// manifold points lie on shape B.
    FaceA,
    /// The local normal and point describe a face of shape B, and the
    /// manifold points lie on shape A.
    FaceB,
}

/// A contact point of a [`Manifold`], holding the impulses accumulated on it
/// by the contact solver.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ManifoldPoint {
    /// Usage depends on the manifold type:
    /// - [`ManifoldType::Circles`]: the local center of circle B.
    /// - [`ManifoldType::FaceA`]: the local center of circle B or the clip
    ///   point of polygon B.
    /// - [`ManifoldType::FaceB`]: the clip point of polygon A.
    pub local_point: Position,
    /// The non-penetration impulse.
    pub normal_impulse: fph,
    /// The friction impulse.
    pub tangent_impulse: fph,
    /// Uniquely identifies the contact point between two shapes.
    pub id: ContactID,
}

/// Local-space description of the contact between two convex shapes.
#[derive(Clone, Debug, PartialEq)]
pub struct Manifold {
    /// Not used for [`ManifoldType::Circles`].
    pub local_normal: Direction,
    /// Usage depends on the manifold type:
    /// - [`ManifoldType::Circles`]: the local center of circle A.
    /// - [`ManifoldType::FaceA`]: the center of face A.
    /// - [`ManifoldType::FaceB`]: the center of face B.
    pub local_point: Position,
    pub manifold_type: ManifoldType,
    points: ArrayVec<[ManifoldPoint; MAX_MANIFOLD_POINTS]>,
}

/// How a contact point changed between two successive manifolds.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum PointState {
    /// The point does not exist.
    #[default]
    Null,
    /// The point was added in the update.
    Add,
    /// The point persisted across the update.
    Persist,
    /// The point was removed in the update.
    Remove,
}

impl ContactID {
    /// Creates a new contact ID from the indices and types of the two
    /// features.
    pub fn new(
        index_a: u8,
        index_b: u8,
        type_a: ContactFeatureType,
        type_b: ContactFeatureType,
    ) -> Self {
        Self {
            index_a,
            index_b,
            type_a: type_a as u8,
            type_b: type_b as u8,
        }
    }

    /// Packs the feature indices and types into a single key.
    pub fn key(&self) -> u32 {
        u32::from(self.index_a) << 24
            | u32::from(self.index_b) << 16
            | u32::from(self.type_a) << 8
            | u32::from(self.type_b)
    }

    /// Swaps the roles of shape A and B.
    pub fn flip(&mut self) {
        std::mem::swap(&mut self.index_a, &mut self.index_b);
        std::mem::swap(&mut self.type_a, &mut self.type_b);
    }
}

impl ManifoldPoint {
    /// Creates a new manifold point with zero accumulated impulses.
    pub fn new(local_point: Position, id: ContactID) -> Self {
        Self {
            local_point,
            normal_impulse: 0.0,
            tangent_impulse: 0.0,
            id,
        }
    }
}

impl Default for ManifoldPoint {
    fn default() -> Self {
        Self::new(Position::zeros(), ContactID::zeroed())
    }
}

impl Default for Manifold {
    fn default() -> Self {
        Self::new(ManifoldType::Circles, Direction::zeros(), Position::zeros())
    }
}

impl Manifold {
    /// Creates a new manifold with no points.
    pub fn new(manifold_type: ManifoldType, local_normal: Direction, local_point: Position) -> Self {
        Self {
            local_normal,
            local_point,
            manifold_type,
            points: ArrayVec::new(),
        }
    }

    /// Creates a circle-circle manifold with a single point. `center_a` and
    /// `center_b` are the circle centers in the frames of their bodies.
    pub fn circles(center_a: Position, center_b: Position) -> Self {
        let mut manifold = Self::new(ManifoldType::Circles, Direction::zeros(), center_a);
        manifold.add_point(ManifoldPoint::new(center_b, ContactID::zeroed()));
        manifold
    }

    /// Returns the number of points in the manifold.
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Returns the points of the manifold.
    pub fn points(&self) -> &[ManifoldPoint] {
        self.points.as_slice()
    }

    /// Returns the points of the manifold for modification.
    pub fn points_mut(&mut self) -> &mut [ManifoldPoint] {
        self.points.as_mut_slice()
    }

    /// Adds the given point to the manifold.
    ///
    /// # Panics
    /// If the manifold already holds [`MAX_MANIFOLD_POINTS`] points.
    pub fn add_point(&mut self, point: ManifoldPoint) {
        assert!(
            self.points.len() < MAX_MANIFOLD_POINTS,
            "Tried to add more than {} points to manifold",
            MAX_MANIFOLD_POINTS
        );
        self.points.push(point);
    }

    /// Removes all points from the manifold.
    pub fn clear_points(&mut self) {
        self.points.clear();
    }

    /// Copies the accumulated impulses of points in the old manifold to the
    /// points of this manifold with matching contact IDs. Points without a
    /// match get zero impulses.
    pub fn inherit_impulses(&mut self, old: &Self) {
        for point in &mut self.points {
            let key = point.id.key();
            match old.points.iter().find(|old_point| old_point.id.key() == key) {
                Some(old_point) => {
                    point.normal_impulse = old_point.normal_impulse;
                    point.tangent_impulse = old_point.tangent_impulse;
                }
                None => {
                    point.normal_impulse = 0.0;
                    point.tangent_impulse = 0.0;
                }
            }
        }
    }
}

/// Classifies the points of two successive manifolds. The returned states
/// for `manifold_1` are either [`PointState::Persist`] or
/// [`PointState::Remove`], and those for `manifold_2` are either
/// [`PointState::Persist`] or [`PointState::Add`]. Unused slots are
/// [`PointState::Null`].
pub fn compute_point_states(
    manifold_1: &Manifold,
    manifold_2: &Manifold,
) -> (
    [PointState; MAX_MANIFOLD_POINTS],
    [PointState; MAX_MANIFOLD_POINTS],
) {
    let mut states_1 = [PointState::Null; MAX_MANIFOLD_POINTS];
    let mut states_2 = [PointState::Null; MAX_MANIFOLD_POINTS];

    let persists_in = |manifold: &Manifold, id: &ContactID| {
        manifold
            .points()
            .iter()
            .any(|point| point.id.key() == id.key())
    };

    for (state, point) in states_1.iter_mut().zip(manifold_1.points()) {
        *state = if persists_in(manifold_2, &point.id) {
            PointState::Persist
        } else {
            PointState::Remove
        };
    }

    for (state, point) in states_2.iter_mut().zip(manifold_2.points()) {
        *state = if persists_in(manifold_1, &point.id) {
            PointState::Persist
        } else {
            PointState::Add
        };
    }

    (states_1, states_2)
}

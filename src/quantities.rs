//! Physical quantities in 2D.

use crate::fph;
use nalgebra::{Isometry2, UnitComplex, Vector2};

/// A position in 2D space, represented by its displacement from the origin.
pub type Position = Vector2<fph>;

/// A displacement in 2D space.
pub type Displacement = Vector2<fph>;

/// A unit vector in 2D space. The solver works with plain vectors and keeps
/// them normalized itself, since degenerate directions must be representable
/// as the zero vector.
pub type Direction = Vector2<fph>;

/// A linear velocity in 2D space.
pub type Velocity = Vector2<fph>;

/// A linear impulse in 2D space.
pub type Impulse = Vector2<fph>;

/// A force in 2D space.
pub type Force = Vector2<fph>;

/// An acceleration in 2D space.
pub type Acceleration = Vector2<fph>;

/// A rotation in the plane.
pub type Rotation = UnitComplex<fph>;

/// A rigid transform in the plane, taking points from the reference frame of
/// a body to world space.
pub type Transform = Isometry2<fph>;

//! Global tolerances and limits used by the solver.

use crate::fph;

/// The maximum number of contact points between two convex shapes.
pub const MAX_MANIFOLD_POINTS: usize = 2;

/// Numerical tolerance for treating lengths as zero.
pub const EPSILON: fph = fph::EPSILON;

/// A small length used as a collision and constraint tolerance. Usually it is
/// chosen to be numerically significant, but visually insignificant.
pub const LINEAR_SLOP: fph = 0.005;

/// The maximum linear position correction used when solving constraints.
/// This helps to prevent overshoot.
pub const MAX_LINEAR_CORRECTION: fph = 0.2;

/// The maximum linear velocity of a body, expressed as the distance it may
/// move in a single step.
pub const MAX_TRANSLATION: fph = 2.0;

/// The maximum angular velocity of a body, expressed as the angle it may
/// rotate in a single step.
pub const MAX_ROTATION: fph = 0.5 * std::f64::consts::PI;

/// The fraction of overlap that is resolved per position iteration.
pub const BAUMGARTE: fph = 0.2;

/// The fraction of overlap that is resolved per position iteration of the
/// time of impact solver.
pub const TOI_BAUMGARTE: fph = 0.75;

/// Relative normal speeds below this threshold are treated as inelastic.
pub const VELOCITY_THRESHOLD: fph = 1.0;

//! Constraint solving for 2D rigid body simulation: contacts between bodies
//! with friction and restitution, and joints of various kinds, resolved by
//! sequential impulses with warm starting.

pub mod body;
pub mod collision;
pub mod contact;
pub mod island;
pub mod joint;
pub mod math;
pub mod quantities;
pub mod settings;
pub mod step;

/// Floating point type used for physics simulation.
#[allow(non_camel_case_types)]
pub type fph = f64;

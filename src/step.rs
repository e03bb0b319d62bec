//! Per-step parameters and the dense body state arrays shared by all
//! constraints of an island.

use crate::{
    fph,
    quantities::{Position, Velocity},
};
use bytemuck::{Pod, Zeroable};

/// Parameters of the current time step.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TimeStep {
    /// Duration of the step.
    pub dt: fph,
    /// Inverse of the step duration, or zero for a zero-length step.
    pub inv_dt: fph,
    /// `dt` multiplied by the inverse duration of the previous step. Used to
    /// rescale accumulated impulses when the step duration varies.
    pub dt_ratio: fph,
    pub velocity_iterations: u32,
    pub position_iterations: u32,
    pub warm_starting: bool,
}

/// Position of a body's center of mass and its angle, as integrated by the
/// solver.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Zeroable, Pod)]
pub struct SolverPosition {
    pub c: Position,
    pub a: fph,
}

/// Linear and angular velocity of a body, as integrated by the solver.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Zeroable, Pod)]
pub struct SolverVelocity {
    pub v: Velocity,
    pub w: fph,
}

/// The step parameters and the body state arrays of an island, indexed by
/// the island index of each body.
#[derive(Debug)]
pub struct SolverData<'a> {
    pub step: TimeStep,
    pub positions: &'a mut [SolverPosition],
    pub velocities: &'a mut [SolverVelocity],
}

impl TimeStep {
    /// Creates the parameters for a step of duration `dt`, given the inverse
    /// duration of the previous step (zero if there was none).
    pub fn new(
        dt: fph,
        previous_inv_dt: fph,
        velocity_iterations: u32,
        position_iterations: u32,
        warm_starting: bool,
    ) -> Self {
        let inv_dt = if dt > 0.0 { 1.0 / dt } else { 0.0 };
        let dt_ratio = if previous_inv_dt > 0.0 {
            dt * previous_inv_dt
        } else {
            1.0
        };
        Self {
            dt,
            inv_dt,
            dt_ratio,
            velocity_iterations,
            position_iterations,
            warm_starting,
        }
    }
}

impl<'a> SolverData<'a> {
    /// Bundles the step with the solver arrays.
    ///
    /// # Panics
    /// If the position and velocity arrays differ in length.
    pub fn new(
        step: TimeStep,
        positions: &'a mut [SolverPosition],
        velocities: &'a mut [SolverVelocity],
    ) -> Self {
        assert_eq!(
            positions.len(),
            velocities.len(),
            "Solver position and velocity arrays must have the same length"
        );
        Self {
            step,
            positions,
            velocities,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn first_step_has_unit_dt_ratio() {
        let step = TimeStep::new(1.0 / 60.0, 0.0, 8, 3, true);
        assert_abs_diff_eq!(step.dt_ratio, 1.0);
        assert_abs_diff_eq!(step.inv_dt, 60.0, epsilon = 1e-9);
    }

    #[test]
    fn dt_ratio_compares_with_previous_step() {
        let step = TimeStep::new(1.0 / 30.0, 60.0, 8, 3, true);
        assert_abs_diff_eq!(step.dt_ratio, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn zero_step_has_zero_inverse() {
        let step = TimeStep::new(0.0, 60.0, 8, 3, false);
        assert_eq!(step.inv_dt, 0.0);
    }
}

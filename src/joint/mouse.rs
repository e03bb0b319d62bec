//! Joints dragging a point on a body towards a target.

use super::{ConstrainedBody, Joint, JointType};
use crate::{
    body::{BodyID, BodyManager},
    fph,
    math::{cross, cross_scalar_vector, invert_or_zero},
    quantities::{Force, Impulse, Position},
    step::{SolverData, SolverPosition, SolverVelocity},
};
use anyhow::{Result, bail};
use nalgebra::Matrix2;
use std::f64::consts::PI;

/// Definition of a [`MouseJoint`]. Body A is only used as a reference and
/// is typically a static ground body.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct MouseJointDef {
    pub body_a: BodyID,
    pub body_b: BodyID,
    pub collide_connected: bool,
    /// The initial world target point. The point on body B currently at the
    /// target becomes the anchor.
    pub target: Position,
    /// The maximum force that can be exerted to move the anchor, typically
    /// some multiple of the weight of body B.
    pub max_force: fph,
    /// The response speed in hertz.
    pub frequency_hz: fph,
    /// The damping ratio. 0 gives no damping, 1 gives critical damping.
    pub damping_ratio: fph,
}

/// A soft joint pulling an anchor point on body B towards a world target.
#[derive(Clone, Debug)]
pub struct MouseJoint {
    body_a: BodyID,
    body_b: BodyID,
    collide_connected: bool,
    local_anchor_b: Position,
    target: Position,
    frequency_hz: fph,
    damping_ratio: fph,
    beta: fph,
    impulse: Impulse,
    max_force: fph,
    gamma: fph,
    constrained_b: ConstrainedBody,
    r_b: Position,
    mass: Matrix2<fph>,
    c: Position,
}

impl MouseJointDef {
    /// Creates a definition pulling body B towards the given world space
    /// target, with default spring parameters. The maximum force starts at
    /// zero and must be raised for the joint to have any effect.
    pub fn new(body_a: BodyID, body_b: BodyID, target: Position) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            target,
            max_force: 0.0,
            frequency_hz: 5.0,
            damping_ratio: 0.7,
        }
    }
}

impl MouseJoint {
    /// Creates a new mouse joint from the given definition, anchored at the
    /// point on body B that currently coincides with the target.
    ///
    /// # Errors
    /// Returns an error if the frequency is not positive or if the damping
    /// ratio or maximum force is negative.
    ///
    /// # Panics
    /// If body B does not exist.
    pub fn new(bodies: &BodyManager, def: &MouseJointDef) -> Result<Self> {
        if !(def.frequency_hz > 0.0) {
            bail!("Invalid frequency for mouse joint: {}", def.frequency_hz);
        }
        if def.damping_ratio < 0.0 {
            bail!(
                "Invalid damping ratio for mouse joint: {}",
                def.damping_ratio
            );
        }
        if def.max_force < 0.0 {
            bail!("Invalid maximum force for mouse joint: {}", def.max_force);
        }
        Ok(Self {
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            local_anchor_b: bodies.body(def.body_b).local_point(&def.target),
            target: def.target,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            beta: 0.0,
            impulse: Impulse::zeros(),
            max_force: def.max_force,
            gamma: 0.0,
            constrained_b: ConstrainedBody::default(),
            r_b: Position::zeros(),
            mass: Matrix2::zeros(),
            c: Position::zeros(),
        })
    }

    /// Returns the world space target point.
    pub fn target(&self) -> &Position {
        &self.target
    }

    /// Moves the target the anchor is pulled towards.
    pub fn set_target(&mut self, target: Position) {
        self.target = target;
    }

    /// Returns the maximum force the joint may apply.
    pub fn max_force(&self) -> fph {
        self.max_force
    }

    /// Sets the maximum force the joint may apply.
    pub fn set_max_force(&mut self, max_force: fph) {
        self.max_force = max_force;
    }

    /// Returns the spring frequency.
    pub fn frequency_hz(&self) -> fph {
        self.frequency_hz
    }

    /// Sets the spring frequency.
    pub fn set_frequency_hz(&mut self, frequency_hz: fph) {
        self.frequency_hz = frequency_hz;
    }

    /// Returns the damping ratio of the spring.
    pub fn damping_ratio(&self) -> fph {
        self.damping_ratio
    }

    /// Sets the damping ratio of the spring.
    pub fn set_damping_ratio(&mut self, damping_ratio: fph) {
        self.damping_ratio = damping_ratio;
    }
}

impl Joint for MouseJoint {
    fn joint_type(&self) -> JointType {
        JointType::Mouse
    }

    fn body_a(&self) -> BodyID {
        self.body_a
    }

    fn body_b(&self) -> BodyID {
        self.body_b
    }

    fn collide_connected(&self) -> bool {
        self.collide_connected
    }

    fn anchor_a(&self, _bodies: &BodyManager) -> Position {
        self.target
    }

    fn anchor_b(&self, bodies: &BodyManager) -> Position {
        bodies.body(self.body_b).world_point(&self.local_anchor_b)
    }

    fn reaction_force(&self, inv_dt: fph) -> Force {
        inv_dt * self.impulse
    }

    fn reaction_torque(&self, _inv_dt: fph) -> fph {
        0.0
    }

    fn init_velocity_constraints(&mut self, bodies: &BodyManager, data: &mut SolverData<'_>) {
        let b = ConstrainedBody::gather(bodies, self.body_b);
        self.constrained_b = b;

        let SolverPosition { c: c_b, a: a_b } = data.positions[b.index];
        let SolverVelocity {
            v: mut v_b,
            w: mut w_b,
        } = data.velocities[b.index];

        let mass = bodies.body(self.body_b).mass();

        let omega = 2.0 * PI * self.frequency_hz;
        let damping = 2.0 * mass * self.damping_ratio * omega;
        let stiffness = mass * omega * omega;

        // Magic formulas
        // gamma has units of inverse mass
        // beta has units of inverse time
        let h = data.step.dt;
        self.gamma = h * (damping + h * stiffness);
        if self.gamma != 0.0 {
            self.gamma = 1.0 / self.gamma;
        }
        self.beta = h * stiffness * self.gamma;

        self.r_b = b.anchor_offset(a_b, &self.local_anchor_b);

        let (m_b, i_b) = (b.inverse_mass, b.inverse_inertia);
        let r_b = self.r_b;

        let k11 = m_b + i_b * r_b.y * r_b.y + self.gamma;
        let k12 = -i_b * r_b.x * r_b.y;
        let k22 = m_b + i_b * r_b.x * r_b.x + self.gamma;

        self.mass = invert_or_zero(&Matrix2::new(k11, k12, k12, k22));

        self.c = (c_b + r_b - self.target) * self.beta;

        // Cheat with some damping
        w_b *= 0.98;

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            v_b += m_b * self.impulse;
            w_b += i_b * cross(&r_b, &self.impulse);
        } else {
            self.impulse = Impulse::zeros();
        }

        data.velocities[b.index] = SolverVelocity { v: v_b, w: w_b };
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let b = self.constrained_b;

        let SolverVelocity {
            v: mut v_b,
            w: mut w_b,
        } = data.velocities[b.index];

        let c_dot = v_b + cross_scalar_vector(w_b, &self.r_b);
        let impulse = self.mass * (-(c_dot + self.c + self.gamma * self.impulse));

        let old_impulse = self.impulse;
        self.impulse += impulse;
        let max_impulse = data.step.dt * self.max_force;
        if self.impulse.norm_squared() > max_impulse * max_impulse {
            self.impulse *= max_impulse / self.impulse.norm();
        }
        let impulse = self.impulse - old_impulse;

        v_b += b.inverse_mass * impulse;
        w_b += b.inverse_inertia * cross(&self.r_b, &impulse);

        data.velocities[b.index] = SolverVelocity { v: v_b, w: w_b };
    }

    fn solve_position_constraints(&mut self, _data: &mut SolverData<'_>) -> bool {
        true
    }
}

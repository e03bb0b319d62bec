//! Joints connecting two bodies through an idealized pulley.

use super::{ConstrainedBody, Joint, JointType};
use crate::{
    body::{BodyID, BodyManager},
    fph,
    math::{cross, cross_scalar_vector},
    quantities::{Direction, Force, Position},
    settings::{EPSILON, LINEAR_SLOP},
    step::{SolverData, SolverPosition, SolverVelocity},
};
use anyhow::{Result, bail};

/// Definition of a [`PulleyJoint`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct PulleyJointDef {
    pub body_a: BodyID,
    pub body_b: BodyID,
    pub collide_connected: bool,
    /// The first ground anchor in world space. This point never moves.
    pub ground_anchor_a: Position,
    /// The second ground anchor in world space. This point never moves.
    pub ground_anchor_b: Position,
    pub local_anchor_a: Position,
    pub local_anchor_b: Position,
    /// The reference length of the segment attached to body A.
    pub length_a: fph,
    /// The reference length of the segment attached to body B.
    pub length_b: fph,
    /// The pulley ratio, used to simulate a block-and-tackle.
    pub ratio: fph,
}

/// A joint connecting two bodies to two fixed ground points, keeping
/// `length_a + ratio * length_b` constant.
#[derive(Clone, Debug)]
pub struct PulleyJoint {
    body_a: BodyID,
    body_b: BodyID,
    collide_connected: bool,
    ground_anchor_a: Position,
    ground_anchor_b: Position,
    length_a: fph,
    length_b: fph,
    local_anchor_a: Position,
    local_anchor_b: Position,
    constant: fph,
    ratio: fph,
    impulse: fph,
    constrained_a: ConstrainedBody,
    constrained_b: ConstrainedBody,
    u_a: Direction,
    u_b: Direction,
    r_a: Position,
    r_b: Position,
    mass: fph,
}

impl PulleyJointDef {
    /// Creates a definition of a pulley between the given world space
    /// anchors on the two bodies and the given ground anchors. The reference
    /// lengths are the current distances from the anchors to the ground
    /// anchors.
    ///
    /// # Panics
    /// If either body does not exist.
    pub fn from_world_anchors(
        bodies: &BodyManager,
        body_a: BodyID,
        body_b: BodyID,
        ground_anchor_a: &Position,
        ground_anchor_b: &Position,
        anchor_a: &Position,
        anchor_b: &Position,
        ratio: fph,
    ) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: true,
            ground_anchor_a: *ground_anchor_a,
            ground_anchor_b: *ground_anchor_b,
            local_anchor_a: bodies.body(body_a).local_point(anchor_a),
            local_anchor_b: bodies.body(body_b).local_point(anchor_b),
            length_a: (anchor_a - ground_anchor_a).norm(),
            length_b: (anchor_b - ground_anchor_b).norm(),
            ratio,
        }
    }

    /// Creates a definition with ground anchors at (∓1, 1), body anchors at
    /// (∓1, 0) in the local frames and a ratio of one.
    pub fn new(body_a: BodyID, body_b: BodyID) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: true,
            ground_anchor_a: Position::new(-1.0, 1.0),
            ground_anchor_b: Position::new(1.0, 1.0),
            local_anchor_a: Position::new(-1.0, 0.0),
            local_anchor_b: Position::new(1.0, 0.0),
            length_a: 0.0,
            length_b: 0.0,
            ratio: 1.0,
        }
    }
}

impl PulleyJoint {
    /// Creates a new pulley joint from the given definition.
    ///
    /// # Errors
    /// Returns an error if the ratio is not positive.
    pub fn new(def: &PulleyJointDef) -> Result<Self> {
        if def.ratio <= EPSILON {
            bail!("Invalid ratio for pulley joint: {}", def.ratio);
        }
        Ok(Self {
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            ground_anchor_a: def.ground_anchor_a,
            ground_anchor_b: def.ground_anchor_b,
            length_a: def.length_a,
            length_b: def.length_b,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            constant: def.length_a + def.ratio * def.length_b,
            ratio: def.ratio,
            impulse: 0.0,
            constrained_a: ConstrainedBody::default(),
            constrained_b: ConstrainedBody::default(),
            u_a: Direction::zeros(),
            u_b: Direction::zeros(),
            r_a: Position::zeros(),
            r_b: Position::zeros(),
            mass: 0.0,
        })
    }

    /// Returns the world space ground anchor for body A.
    pub fn ground_anchor_a(&self) -> &Position {
        &self.ground_anchor_a
    }

    /// Returns the world space ground anchor for body B.
    pub fn ground_anchor_b(&self) -> &Position {
        &self.ground_anchor_b
    }

    /// The reference length of the segment attached to body A.
    pub fn length_a(&self) -> fph {
        self.length_a
    }

    /// The reference length of the segment attached to body B.
    pub fn length_b(&self) -> fph {
        self.length_b
    }

    /// Returns the pulley ratio.
    pub fn ratio(&self) -> fph {
        self.ratio
    }

    /// The current length of the segment attached to body A.
    pub fn current_length_a(&self, bodies: &BodyManager) -> fph {
        (self.anchor_a(bodies) - self.ground_anchor_a).norm()
    }

    /// The current length of the segment attached to body B.
    pub fn current_length_b(&self, bodies: &BodyManager) -> fph {
        (self.anchor_b(bodies) - self.ground_anchor_b).norm()
    }

    /// Computes the unit segment directions and their lengths for the given
    /// anchor offsets and centers.
    fn segments(
        &self,
        c_a: &Position,
        r_a: &Position,
        c_b: &Position,
        r_b: &Position,
    ) -> (Direction, fph, Direction, fph) {
        let mut u_a = c_a + r_a - self.ground_anchor_a;
        let mut u_b = c_b + r_b - self.ground_anchor_b;

        let length_a = u_a.norm();
        let length_b = u_b.norm();

        if length_a > 10.0 * LINEAR_SLOP {
            u_a /= length_a;
        } else {
            u_a = Direction::zeros();
        }

        if length_b > 10.0 * LINEAR_SLOP {
            u_b /= length_b;
        } else {
            u_b = Direction::zeros();
        }

        (u_a, length_a, u_b, length_b)
    }

    fn effective_mass(
        &self,
        a: &ConstrainedBody,
        b: &ConstrainedBody,
        r_a: &Position,
        u_a: &Direction,
        r_b: &Position,
        u_b: &Direction,
    ) -> fph {
        let ru_a = cross(r_a, u_a);
        let ru_b = cross(r_b, u_b);

        let m_a = a.inverse_mass + a.inverse_inertia * ru_a * ru_a;
        let m_b = b.inverse_mass + b.inverse_inertia * ru_b * ru_b;

        let mass = m_a + self.ratio * self.ratio * m_b;
        if mass > 0.0 { 1.0 / mass } else { mass }
    }
}

impl Joint for PulleyJoint {
    fn joint_type(&self) -> JointType {
        JointType::Pulley
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

    fn anchor_a(&self, bodies: &BodyManager) -> Position {
        bodies.body(self.body_a).world_point(&self.local_anchor_a)
    }

    fn anchor_b(&self, bodies: &BodyManager) -> Position {
        bodies.body(self.body_b).world_point(&self.local_anchor_b)
    }

    fn reaction_force(&self, inv_dt: fph) -> Force {
        inv_dt * self.impulse * self.u_b
    }

    fn reaction_torque(&self, _inv_dt: fph) -> fph {
        0.0
    }

    fn init_velocity_constraints(&mut self, bodies: &BodyManager, data: &mut SolverData<'_>) {
        let a = ConstrainedBody::gather(bodies, self.body_a);
        let b = ConstrainedBody::gather(bodies, self.body_b);
        self.constrained_a = a;
        self.constrained_b = b;

        let SolverPosition { c: c_a, a: a_a } = data.positions[a.index];
        let SolverPosition { c: c_b, a: a_b } = data.positions[b.index];
        let SolverVelocity {
            v: mut v_a,
            w: mut w_a,
        } = data.velocities[a.index];
        let SolverVelocity {
            v: mut v_b,
            w: mut w_b,
        } = data.velocities[b.index];

        self.r_a = a.anchor_offset(a_a, &self.local_anchor_a);
        self.r_b = b.anchor_offset(a_b, &self.local_anchor_b);

        let (u_a, _, u_b, _) = self.segments(&c_a, &self.r_a, &c_b, &self.r_b);
        self.u_a = u_a;
        self.u_b = u_b;

        self.mass = self.effective_mass(&a, &b, &self.r_a, &u_a, &self.r_b, &u_b);

        if data.step.warm_starting {
            // Scale the impulse to support a variable time step
            self.impulse *= data.step.dt_ratio;

            let p_a = -self.impulse * self.u_a;
            let p_b = -self.ratio * self.impulse * self.u_b;

            v_a += a.inverse_mass * p_a;
            w_a += a.inverse_inertia * cross(&self.r_a, &p_a);
            v_b += b.inverse_mass * p_b;
            w_b += b.inverse_inertia * cross(&self.r_b, &p_b);
        } else {
            self.impulse = 0.0;
        }

        data.velocities[a.index] = SolverVelocity { v: v_a, w: w_a };
        data.velocities[b.index] = SolverVelocity { v: v_b, w: w_b };
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let (a, b) = (self.constrained_a, self.constrained_b);

        let SolverVelocity {
            v: mut v_a,
            w: mut w_a,
        } = data.velocities[a.index];
        let SolverVelocity {
            v: mut v_b,
            w: mut w_b,
        } = data.velocities[b.index];

        let vp_a = v_a + cross_scalar_vector(w_a, &self.r_a);
        let vp_b = v_b + cross_scalar_vector(w_b, &self.r_b);

        let c_dot = -self.u_a.dot(&vp_a) - self.ratio * self.u_b.dot(&vp_b);
        let impulse = -self.mass * c_dot;
        self.impulse += impulse;

        let p_a = -impulse * self.u_a;
        let p_b = -self.ratio * impulse * self.u_b;

        v_a += a.inverse_mass * p_a;
        w_a += a.inverse_inertia * cross(&self.r_a, &p_a);
        v_b += b.inverse_mass * p_b;
        w_b += b.inverse_inertia * cross(&self.r_b, &p_b);

        data.velocities[a.index] = SolverVelocity { v: v_a, w: w_a };
        data.velocities[b.index] = SolverVelocity { v: v_b, w: w_b };
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        let (a, b) = (self.constrained_a, self.constrained_b);

        let SolverPosition {
            c: mut c_a,
            a: mut a_a,
        } = data.positions[a.index];
        let SolverPosition {
            c: mut c_b,
            a: mut a_b,
        } = data.positions[b.index];

        let r_a = a.anchor_offset(a_a, &self.local_anchor_a);
        let r_b = b.anchor_offset(a_b, &self.local_anchor_b);

        let (u_a, length_a, u_b, length_b) = self.segments(&c_a, &r_a, &c_b, &r_b);
        let mass = self.effective_mass(&a, &b, &r_a, &u_a, &r_b, &u_b);

        let c = self.constant - length_a - self.ratio * length_b;
        let linear_error = c.abs();

        let impulse = -mass * c;

        let p_a = -impulse * u_a;
        let p_b = -self.ratio * impulse * u_b;

        c_a += a.inverse_mass * p_a;
        a_a += a.inverse_inertia * cross(&r_a, &p_a);
        c_b += b.inverse_mass * p_b;
        a_b += b.inverse_inertia * cross(&r_b, &p_b);

        data.positions[a.index] = SolverPosition { c: c_a, a: a_a };
        data.positions[b.index] = SolverPosition { c: c_b, a: a_b };

        linear_error < LINEAR_SLOP
    }
}

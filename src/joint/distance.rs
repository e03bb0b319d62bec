//! Joints keeping two anchor points at a fixed distance.

use super::{ConstrainedBody, Joint, JointType};
use crate::{
    body::{BodyID, BodyManager},
    fph,
    math::{cross, cross_scalar_vector, normalize_and_get_length},
    quantities::{Direction, Force, Position},
    settings::{LINEAR_SLOP, MAX_LINEAR_CORRECTION},
    step::{SolverData, SolverPosition, SolverVelocity},
};
use anyhow::{Result, bail};
use std::f64::consts::PI;

/// Definition of a [`DistanceJoint`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct DistanceJointDef {
    pub body_a: BodyID,
    pub body_b: BodyID,
    pub collide_connected: bool,
    /// The anchor point relative to the origin of body A.
    pub local_anchor_a: Position,
    /// The anchor point relative to the origin of body B.
    pub local_anchor_b: Position,
    /// The rest length of the joint.
    pub length: fph,
    /// The mass-spring-damper frequency in hertz. Zero makes the joint
    /// rigid.
    pub frequency_hz: fph,
    /// The damping ratio. 0 gives no damping, 1 gives critical damping.
    pub damping_ratio: fph,
}

/// A joint constraining the distance between an anchor point on each of two
/// bodies to a rest length, either rigidly or as a soft spring.
#[derive(Clone, Debug)]
pub struct DistanceJoint {
    body_a: BodyID,
    body_b: BodyID,
    collide_connected: bool,
    local_anchor_a: Position,
    local_anchor_b: Position,
    length: fph,
    frequency_hz: fph,
    damping_ratio: fph,
    bias: fph,
    gamma: fph,
    impulse: fph,
    constrained_a: ConstrainedBody,
    constrained_b: ConstrainedBody,
    u: Direction,
    r_a: Position,
    r_b: Position,
    mass: fph,
}

impl DistanceJointDef {
    /// Creates a definition of a rigid joint of unit length between the
    /// origins of the two bodies.
    pub fn new(body_a: BodyID, body_b: BodyID) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_a: Position::zeros(),
            local_anchor_b: Position::zeros(),
            length: 1.0,
            frequency_hz: 0.0,
            damping_ratio: 0.0,
        }
    }

    /// Creates a definition of a rigid joint between the given world space
    /// anchor points on the two bodies, with the current distance between
    /// the anchors as the rest length.
    ///
    /// # Panics
    /// If either body does not exist.
    pub fn from_world_anchors(
        bodies: &BodyManager,
        body_a: BodyID,
        body_b: BodyID,
        anchor_a: &Position,
        anchor_b: &Position,
    ) -> Self {
        Self {
            local_anchor_a: bodies.body(body_a).local_point(anchor_a),
            local_anchor_b: bodies.body(body_b).local_point(anchor_b),
            length: (anchor_b - anchor_a).norm(),
            ..Self::new(body_a, body_b)
        }
    }
}

impl DistanceJoint {
    /// Creates a new distance joint from the given definition.
    ///
    /// # Errors
    /// Returns an error if the length, frequency or damping ratio is
    /// negative.
    pub fn new(def: &DistanceJointDef) -> Result<Self> {
        if def.length < 0.0 {
            bail!("Invalid length for distance joint: {}", def.length);
        }
        if def.frequency_hz < 0.0 {
            bail!("Invalid frequency for distance joint: {}", def.frequency_hz);
        }
        if def.damping_ratio < 0.0 {
            bail!(
                "Invalid damping ratio for distance joint: {}",
                def.damping_ratio
            );
        }
        Ok(Self {
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            length: def.length,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            bias: 0.0,
            gamma: 0.0,
            impulse: 0.0,
            constrained_a: ConstrainedBody::default(),
            constrained_b: ConstrainedBody::default(),
            u: Direction::zeros(),
            r_a: Position::zeros(),
            r_b: Position::zeros(),
            mass: 0.0,
        })
    }

    /// Returns the anchor point on body A, in its body frame.
    pub fn local_anchor_a(&self) -> &Position {
        &self.local_anchor_a
    }

    /// Returns the anchor point on body B, in its body frame.
    pub fn local_anchor_b(&self) -> &Position {
        &self.local_anchor_b
    }

    /// Returns the rest length of the joint.
    pub fn length(&self) -> fph {
        self.length
    }

    /// Returns the spring frequency, where zero means the joint is rigid.
    pub fn frequency_hz(&self) -> fph {
        self.frequency_hz
    }

    /// Returns the damping ratio of the spring.
    pub fn damping_ratio(&self) -> fph {
        self.damping_ratio
    }

    /// The impulse accumulated along the joint axis in the last step.
    pub fn impulse(&self) -> fph {
        self.impulse
    }

    /// Whether the joint currently behaves as a soft spring.
    pub fn is_soft(&self) -> bool {
        self.frequency_hz > 0.0
    }

    /// Sets the rest length of the joint.
    pub fn set_length(&mut self, length: fph) {
        self.length = length;
    }

    /// Sets the spring frequency, where zero makes the joint rigid.
    pub fn set_frequency_hz(&mut self, frequency_hz: fph) {
        self.frequency_hz = frequency_hz;
    }

    /// Sets the damping ratio of the spring.
    pub fn set_damping_ratio(&mut self, damping_ratio: fph) {
        self.damping_ratio = damping_ratio;
    }
}

impl Joint for DistanceJoint {
    fn joint_type(&self) -> JointType {
        JointType::Distance
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
        self.impulse * inv_dt * self.u
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
        self.u = c_b + self.r_b - c_a - self.r_a;

        // Handle singularity
        let length = self.u.norm();
        if length > LINEAR_SLOP {
            self.u /= length;
        } else {
            self.u = Direction::zeros();
        }

        let cr_au = cross(&self.r_a, &self.u);
        let cr_bu = cross(&self.r_b, &self.u);
        let mut inv_mass = a.inverse_mass
            + a.inverse_inertia * cr_au * cr_au
            + b.inverse_mass
            + b.inverse_inertia * cr_bu * cr_bu;

        self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

        if self.frequency_hz > 0.0 {
            let c = length - self.length;

            let omega = 2.0 * PI * self.frequency_hz;
            let damping = 2.0 * self.mass * self.damping_ratio * omega;
            let stiffness = self.mass * omega * omega;

            // Magic formulas
            let h = data.step.dt;
            self.gamma = h * (damping + h * stiffness);
            self.gamma = if self.gamma != 0.0 {
                1.0 / self.gamma
            } else {
                0.0
            };
            self.bias = c * h * stiffness * self.gamma;

            inv_mass += self.gamma;
            self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };
        } else {
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if data.step.warm_starting {
            // Scale the impulse to support a variable time step
            self.impulse *= data.step.dt_ratio;

            let p = self.impulse * self.u;
            v_a -= a.inverse_mass * p;
            w_a -= a.inverse_inertia * cross(&self.r_a, &p);
            v_b += b.inverse_mass * p;
            w_b += b.inverse_inertia * cross(&self.r_b, &p);
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
        let c_dot = self.u.dot(&(vp_b - vp_a));

        let impulse = -self.mass * (c_dot + self.bias + self.gamma * self.impulse);
        self.impulse += impulse;

        let p = impulse * self.u;
        v_a -= a.inverse_mass * p;
        w_a -= a.inverse_inertia * cross(&self.r_a, &p);
        v_b += b.inverse_mass * p;
        w_b += b.inverse_inertia * cross(&self.r_b, &p);

        data.velocities[a.index] = SolverVelocity { v: v_a, w: w_a };
        data.velocities[b.index] = SolverVelocity { v: v_b, w: w_b };
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        if self.frequency_hz > 0.0 {
            // There is no position correction for soft distance constraints
            return true;
        }

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
        let mut u = c_b + r_b - c_a - r_a;

        let length = normalize_and_get_length(&mut u);
        let c = (length - self.length).clamp(-MAX_LINEAR_CORRECTION, MAX_LINEAR_CORRECTION);

        let impulse = -self.mass * c;
        let p = impulse * u;

        c_a -= a.inverse_mass * p;
        a_a -= a.inverse_inertia * cross(&r_a, &p);
        c_b += b.inverse_mass * p;
        a_b += b.inverse_inertia * cross(&r_b, &p);

        data.positions[a.index] = SolverPosition { c: c_a, a: a_a };
        data.positions[b.index] = SolverPosition { c: c_b, a: a_b };

        c.abs() < LINEAR_SLOP
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        body::{BodyDef, BodyType, MassData},
        step::TimeStep,
    };
    use approx::assert_abs_diff_eq;
    use nalgebra::Vector2;

    fn setup(
        frequency_hz: fph,
    ) -> (BodyManager, DistanceJoint, Vec<SolverPosition>, Vec<SolverVelocity>) {
        let mut bodies = BodyManager::new();
        let mut add_body = |x: fph| {
            bodies
                .add_dynamic_body(
                    &BodyDef {
                        body_type: BodyType::Dynamic,
                        position: Vector2::new(x, 0.0),
                        ..Default::default()
                    },
                    &MassData::for_disk(1.0, 0.25, Position::zeros()),
                )
                .unwrap()
        };
        let a = add_body(0.0);
        let b = add_body(1.5);

        bodies.assign_island_indices();

        let joint = DistanceJoint::new(&DistanceJointDef {
            length: 1.0,
            frequency_hz,
            damping_ratio: 0.5,
            ..DistanceJointDef::new(a, b)
        })
        .unwrap();

        let (positions, velocities) = bodies.solver_states();
        (bodies, joint, positions, velocities)
    }

    #[test]
    fn negative_length_is_rejected() {
        let mut bodies = BodyManager::new();
        let a = bodies.add_body(&BodyDef::default());
        let b = bodies.add_body(&BodyDef::default());
        assert!(
            DistanceJoint::new(&DistanceJointDef {
                length: -1.0,
                ..DistanceJointDef::new(a, b)
            })
            .is_err()
        );
    }

    #[test]
    fn world_anchor_definition_uses_current_distance() {
        let mut bodies = BodyManager::new();
        let a = bodies.add_body(&BodyDef {
            position: Vector2::new(1.0, 0.0),
            ..Default::default()
        });
        let b = bodies.add_body(&BodyDef {
            position: Vector2::new(1.0, 2.0),
            ..Default::default()
        });
        let def = DistanceJointDef::from_world_anchors(
            &bodies,
            a,
            b,
            &Vector2::new(1.0, 0.5),
            &Vector2::new(1.0, 2.0),
        );
        assert_abs_diff_eq!(def.length, 1.5);
        assert_abs_diff_eq!(def.local_anchor_a, Vector2::new(0.0, 0.5));
        assert_abs_diff_eq!(def.local_anchor_b, Vector2::zeros());
    }

    #[test]
    fn rigid_joint_position_solve_pulls_bodies_to_rest_length() {
        let (bodies, mut joint, mut positions, mut velocities) = setup(0.0);
        let step = TimeStep::new(1.0 / 60.0, 0.0, 8, 3, false);

        let mut data = SolverData::new(step, &mut positions, &mut velocities);
        joint.init_velocity_constraints(&bodies, &mut data);

        let mut solved = false;
        for _ in 0..20 {
            solved = joint.solve_position_constraints(&mut data);
            if solved {
                break;
            }
        }
        assert!(solved);

        let distance = (positions[1].c - positions[0].c).norm();
        assert_abs_diff_eq!(distance, 1.0, epsilon = LINEAR_SLOP);
    }

    #[test]
    fn soft_joint_skips_position_solve_and_pulls_through_velocity() {
        let (bodies, mut joint, mut positions, mut velocities) = setup(4.0);
        let step = TimeStep::new(1.0 / 60.0, 0.0, 8, 3, true);

        let mut data = SolverData::new(step, &mut positions, &mut velocities);
        joint.init_velocity_constraints(&bodies, &mut data);
        joint.solve_velocity_constraints(&mut data);
        let positions_before = data.positions.to_vec();
        assert!(joint.solve_position_constraints(&mut data));
        assert_eq!(data.positions.to_vec(), positions_before);

        // The stretched spring pulls the bodies towards each other
        assert!(velocities[0].v.x > 0.0);
        assert!(velocities[1].v.x < 0.0);
        assert!(joint.impulse() < 0.0);
        assert!(joint.reaction_force(60.0).x < 0.0);
    }

    #[test]
    fn stretched_rigid_joint_velocity_solve_stops_separation() {
        let (bodies, mut joint, mut positions, mut velocities) = setup(0.0);
        velocities[1].v = Vector2::new(2.0, 0.0);
        let step = TimeStep::new(1.0 / 60.0, 0.0, 8, 3, true);

        let mut data = SolverData::new(step, &mut positions, &mut velocities);
        joint.init_velocity_constraints(&bodies, &mut data);
        joint.solve_velocity_constraints(&mut data);

        assert_abs_diff_eq!(velocities[1].v.x - velocities[0].v.x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(velocities[0].v.x + velocities[1].v.x, 2.0, epsilon = 1e-12);
        assert_eq!(joint.reaction_torque(60.0), 0.0);
    }
}

//! Joints applying top-down friction between two bodies.

use super::{ConstrainedBody, Joint, JointType};
use crate::{
    body::{BodyID, BodyManager},
    fph,
    math::{cross, cross_scalar_vector, invert_or_zero},
    quantities::{Force, Impulse, Position},
    step::{SolverData, SolverVelocity},
};
use anyhow::{Result, bail};
use nalgebra::Matrix2;

/// Definition of a [`FrictionJoint`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct FrictionJointDef {
    pub body_a: BodyID,
    pub body_b: BodyID,
    pub collide_connected: bool,
    /// The anchor point relative to the origin of body A.
    pub local_anchor_a: Position,
    /// The anchor point relative to the origin of body B.
    pub local_anchor_b: Position,
    /// The maximum friction force.
    pub max_force: fph,
    /// The maximum friction torque.
    pub max_torque: fph,
}

/// A joint resisting relative linear and angular motion of two bodies with
/// bounded force and torque, as friction against a surface seen from above.
#[derive(Clone, Debug)]
pub struct FrictionJoint {
    body_a: BodyID,
    body_b: BodyID,
    collide_connected: bool,
    local_anchor_a: Position,
    local_anchor_b: Position,
    max_force: fph,
    max_torque: fph,
    linear_impulse: Impulse,
    angular_impulse: fph,
    constrained_a: ConstrainedBody,
    constrained_b: ConstrainedBody,
    r_a: Position,
    r_b: Position,
    linear_mass: Matrix2<fph>,
    angular_mass: fph,
}

impl FrictionJointDef {
    /// Creates a definition of a joint between the origins of the two
    /// bodies with zero maximum force and torque.
    pub fn new(body_a: BodyID, body_b: BodyID) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_a: Position::zeros(),
            local_anchor_b: Position::zeros(),
            max_force: 0.0,
            max_torque: 0.0,
        }
    }

    /// Creates a definition of a joint anchored at the given world point on
    /// both bodies.
    ///
    /// # Panics
    /// If either body does not exist.
    pub fn from_world_anchor(
        bodies: &BodyManager,
        body_a: BodyID,
        body_b: BodyID,
        anchor: &Position,
    ) -> Self {
        Self {
            local_anchor_a: bodies.body(body_a).local_point(anchor),
            local_anchor_b: bodies.body(body_b).local_point(anchor),
            ..Self::new(body_a, body_b)
        }
    }
}

impl FrictionJoint {
    /// Creates a new friction joint from the given definition.
    ///
    /// # Errors
    /// Returns an error if the maximum force or torque is negative.
    pub fn new(def: &FrictionJointDef) -> Result<Self> {
        if def.max_force < 0.0 {
            bail!("Invalid maximum force for friction joint: {}", def.max_force);
        }
        if def.max_torque < 0.0 {
            bail!(
                "Invalid maximum torque for friction joint: {}",
                def.max_torque
            );
        }
        Ok(Self {
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            max_force: def.max_force,
            max_torque: def.max_torque,
            linear_impulse: Impulse::zeros(),
            angular_impulse: 0.0,
            constrained_a: ConstrainedBody::default(),
            constrained_b: ConstrainedBody::default(),
            r_a: Position::zeros(),
            r_b: Position::zeros(),
            linear_mass: Matrix2::zeros(),
            angular_mass: 0.0,
        })
    }

    /// Returns the maximum friction force.
    pub fn max_force(&self) -> fph {
        self.max_force
    }

    /// Returns the maximum friction torque.
    pub fn max_torque(&self) -> fph {
        self.max_torque
    }

    /// Sets the maximum friction force. Negative values are treated as zero.
    pub fn set_max_force(&mut self, max_force: fph) {
        self.max_force = max_force.max(0.0);
    }

    /// Sets the maximum friction torque. Negative values are treated as
    /// zero.
    pub fn set_max_torque(&mut self, max_torque: fph) {
        self.max_torque = max_torque.max(0.0);
    }
}

impl Joint for FrictionJoint {
    fn joint_type(&self) -> JointType {
        JointType::Friction
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
        inv_dt * self.linear_impulse
    }

    fn reaction_torque(&self, inv_dt: fph) -> fph {
        inv_dt * self.angular_impulse
    }

    fn init_velocity_constraints(&mut self, bodies: &BodyManager, data: &mut SolverData<'_>) {
        let a = ConstrainedBody::gather(bodies, self.body_a);
        let b = ConstrainedBody::gather(bodies, self.body_b);
        self.constrained_a = a;
        self.constrained_b = b;

        let a_a = data.positions[a.index].a;
        let a_b = data.positions[b.index].a;
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

        let (m_a, m_b) = (a.inverse_mass, b.inverse_mass);
        let (i_a, i_b) = (a.inverse_inertia, b.inverse_inertia);
        let (r_a, r_b) = (self.r_a, self.r_b);

        let k11 = m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y;
        let k12 = -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y;
        let k22 = m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x;

        self.linear_mass = invert_or_zero(&Matrix2::new(k11, k12, k12, k22));

        self.angular_mass = i_a + i_b;
        if self.angular_mass > 0.0 {
            self.angular_mass = 1.0 / self.angular_mass;
        }

        if data.step.warm_starting {
            // Scale impulses to support a variable time step
            self.linear_impulse *= data.step.dt_ratio;
            self.angular_impulse *= data.step.dt_ratio;

            let p = self.linear_impulse;
            v_a -= m_a * p;
            w_a -= i_a * (cross(&r_a, &p) + self.angular_impulse);
            v_b += m_b * p;
            w_b += i_b * (cross(&r_b, &p) + self.angular_impulse);
        } else {
            self.linear_impulse = Impulse::zeros();
            self.angular_impulse = 0.0;
        }

        data.velocities[a.index] = SolverVelocity { v: v_a, w: w_a };
        data.velocities[b.index] = SolverVelocity { v: v_b, w: w_b };
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let (a, b) = (self.constrained_a, self.constrained_b);
        let (m_a, m_b) = (a.inverse_mass, b.inverse_mass);
        let (i_a, i_b) = (a.inverse_inertia, b.inverse_inertia);
        let h = data.step.dt;

        let SolverVelocity {
            v: mut v_a,
            w: mut w_a,
        } = data.velocities[a.index];
        let SolverVelocity {
            v: mut v_b,
            w: mut w_b,
        } = data.velocities[b.index];

        // Solve angular friction
        {
            let c_dot = w_b - w_a;
            let impulse = -self.angular_mass * c_dot;

            let old_impulse = self.angular_impulse;
            let max_impulse = h * self.max_torque;
            self.angular_impulse = (old_impulse + impulse).clamp(-max_impulse, max_impulse);
            let impulse = self.angular_impulse - old_impulse;

            w_a -= i_a * impulse;
            w_b += i_b * impulse;
        }

        // Solve linear friction
        {
            let c_dot = v_b + cross_scalar_vector(w_b, &self.r_b)
                - v_a
                - cross_scalar_vector(w_a, &self.r_a);

            let impulse = -(self.linear_mass * c_dot);
            let old_impulse = self.linear_impulse;
            self.linear_impulse += impulse;

            let max_impulse = h * self.max_force;
            if self.linear_impulse.norm_squared() > max_impulse * max_impulse {
                self.linear_impulse = self.linear_impulse.normalize() * max_impulse;
            }

            let impulse = self.linear_impulse - old_impulse;

            v_a -= m_a * impulse;
            w_a -= i_a * cross(&self.r_a, &impulse);
            v_b += m_b * impulse;
            w_b += i_b * cross(&self.r_b, &impulse);
        }

        data.velocities[a.index] = SolverVelocity { v: v_a, w: w_a };
        data.velocities[b.index] = SolverVelocity { v: v_b, w: w_b };
    }

    fn solve_position_constraints(&mut self, _data: &mut SolverData<'_>) -> bool {
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        body::{BodyDef, BodyType, MassData},
        step::{SolverPosition, TimeStep},
    };
    use approx::assert_abs_diff_eq;
    use nalgebra::Vector2;

    struct Setup {
        bodies: BodyManager,
        ground: BodyID,
        puck: BodyID,
        positions: Vec<SolverPosition>,
        velocities: Vec<SolverVelocity>,
    }

    fn setup() -> Setup {
        let mut bodies = BodyManager::new();
        let ground = bodies.add_body(&BodyDef::default());
        let puck = bodies
            .add_dynamic_body(
                &BodyDef {
                    body_type: BodyType::Dynamic,
                    position: Vector2::new(0.0, 1.0),
                    ..Default::default()
                },
                &MassData::for_disk(1.0, 0.5, Position::zeros()),
            )
            .unwrap();
        bodies.assign_island_indices();

        let (positions, mut velocities) = bodies.solver_states();
        velocities[1] = SolverVelocity {
            v: Vector2::new(3.0, 0.0),
            w: 2.0,
        };
        Setup {
            bodies,
            ground,
            puck,
            positions,
            velocities,
        }
    }

    #[test]
    fn negative_max_force_is_rejected() {
        let Setup { ground, puck, .. } = setup();
        assert!(
            FrictionJoint::new(&FrictionJointDef {
                max_force: -1.0,
                ..FrictionJointDef::new(ground, puck)
            })
            .is_err()
        );
    }

    #[test]
    fn friction_impulses_are_bounded_by_max_force_and_torque() {
        let Setup {
            bodies,
            ground,
            puck,
            mut positions,
            mut velocities,
        } = setup();

        let mut joint = FrictionJoint::new(&FrictionJointDef {
            max_force: 1.0,
            max_torque: 0.5,
            ..FrictionJointDef::from_world_anchor(&bodies, ground, puck, &Vector2::new(0.0, 1.0))
        })
        .unwrap();

        let dt = 1.0 / 60.0;
        let step = TimeStep::new(dt, 0.0, 8, 3, true);
        let mut data = SolverData::new(step, &mut positions, &mut velocities);
        joint.init_velocity_constraints(&bodies, &mut data);
        for _ in 0..8 {
            joint.solve_velocity_constraints(&mut data);
        }
        assert!(joint.solve_position_constraints(&mut data));

        assert_abs_diff_eq!(joint.reaction_force(1.0 / dt).norm(), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(joint.reaction_torque(1.0 / dt).abs(), 0.5, epsilon = 1e-9);

        // Friction only slows the puck down
        let puck_mass = bodies.body(puck).mass();
        assert_abs_diff_eq!(velocities[1].v.x, 3.0 - dt / puck_mass, epsilon = 1e-9);
        assert!(velocities[1].w < 2.0 && velocities[1].w > 0.0);
        assert_eq!(velocities[0].v, Vector2::zeros());
    }

    #[test]
    fn unbounded_friction_stops_relative_motion() {
        let Setup {
            bodies,
            ground,
            puck,
            mut positions,
            mut velocities,
        } = setup();

        let mut joint = FrictionJoint::new(&FrictionJointDef {
            max_force: 1e6,
            max_torque: 1e6,
            ..FrictionJointDef::new(ground, puck)
        })
        .unwrap();

        let step = TimeStep::new(1.0 / 60.0, 0.0, 8, 3, false);
        let mut data = SolverData::new(step, &mut positions, &mut velocities);
        joint.init_velocity_constraints(&bodies, &mut data);
        joint.solve_velocity_constraints(&mut data);

        assert_abs_diff_eq!(velocities[1].w, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(velocities[1].v, Vector2::zeros(), epsilon = 1e-9);
    }
}

//! Stepping an island of bodies, contacts and joints.

use crate::{
    body::{BodyID, BodyManager},
    contact::{Contact, solver::ContactSolver},
    fph,
    joint::{Joint, JointManager},
    quantities::Acceleration,
    settings::{MAX_ROTATION, MAX_TRANSLATION},
    step::{SolverData, SolverPosition, SolverVelocity, TimeStep},
};
use anyhow::{Result, bail};
use log::{debug, trace};

/// Configuration parameters for the island solver.
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[derive(Clone, Debug)]
pub struct IslandSolverConfig {
    /// The number of sequential impulse iterations on the velocity
    /// constraints each step.
    pub velocity_iterations: u32,
    /// The maximum number of position correction iterations each step.
    pub position_iterations: u32,
    /// The number of velocity iterations for time of impact substeps.
    pub toi_velocity_iterations: u32,
    /// The maximum number of position iterations for time of impact
    /// substeps.
    pub toi_position_iterations: u32,
    /// Whether to initialize the solve with the impulses accumulated in the
    /// previous step.
    pub warm_starting: bool,
    /// The gravitational acceleration applied to dynamic bodies.
    pub gravity: Acceleration,
}

/// Solver advancing the bodies of an island by one time step while
/// enforcing the constraints of its contacts and joints.
#[derive(Debug)]
pub struct IslandSolver {
    config: IslandSolverConfig,
    contact_solver: ContactSolver,
    previous_inv_dt: fph,
    positions: Vec<SolverPosition>,
    velocities: Vec<SolverVelocity>,
}

impl IslandSolverConfig {
    fn validate(&self) -> Result<()> {
        if self.velocity_iterations == 0 {
            bail!(
                "Invalid number of velocity iterations for island solver: {}",
                self.velocity_iterations
            );
        }
        if self.toi_velocity_iterations == 0 {
            bail!(
                "Invalid number of time of impact velocity iterations for island solver: {}",
                self.toi_velocity_iterations
            );
        }
        Ok(())
    }
}

impl Default for IslandSolverConfig {
    fn default() -> Self {
        Self {
            velocity_iterations: 8,
            position_iterations: 3,
            toi_velocity_iterations: 8,
            toi_position_iterations: 20,
            warm_starting: true,
            gravity: Acceleration::new(0.0, -10.0),
        }
    }
}

impl IslandSolver {
    /// Creates a new island solver with the given configuration parameters.
    ///
    /// # Errors
    /// Returns an error if any of the configuration parameters are invalid.
    pub fn new(config: IslandSolverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            contact_solver: ContactSolver::new(),
            previous_inv_dt: 0.0,
            positions: Vec::new(),
            velocities: Vec::new(),
        })
    }

    /// Returns the configuration of the solver.
    pub fn config(&self) -> &IslandSolverConfig {
        &self.config
    }

    /// Returns the contact solver, holding the constraints of the last step.
    pub fn contact_solver(&self) -> &ContactSolver {
        &self.contact_solver
    }

    /// Advances all bodies by `dt`, solving the given contacts and all
    /// joints. Accumulated impulses are stored back into the contact
    /// manifolds for warm starting the next step. Forces on the bodies are
    /// left for the caller to clear.
    ///
    /// Returns whether the position constraints were solved within
    /// tolerance.
    ///
    /// # Errors
    /// Returns an error if `dt` is not positive.
    pub fn solve(
        &mut self,
        dt: fph,
        bodies: &mut BodyManager,
        contacts: &mut [Contact],
        joints: &mut JointManager,
    ) -> Result<bool> {
        if !(dt > 0.0) {
            bail!("Invalid time step duration for island solver: {}", dt);
        }

        trace!(
            "Solving island with {} bodies, {} contacts and {} joints",
            bodies.body_count(),
            contacts.len(),
            joints.joint_count()
        );

        let step = TimeStep::new(
            dt,
            self.previous_inv_dt,
            self.config.velocity_iterations,
            self.config.position_iterations,
            self.config.warm_starting,
        );

        self.gather_body_states(bodies);
        self.integrate_velocities(bodies, dt);

        self.contact_solver.init(&step, contacts, bodies);
        self.contact_solver.initialize_velocity_constraints(
            contacts,
            &self.positions,
            &self.velocities,
        );
        if step.warm_starting {
            self.contact_solver.warm_start(&mut self.velocities);
        }

        let mut data = SolverData::new(step, &mut self.positions, &mut self.velocities);

        for joint in joints.joints_mut() {
            joint.init_velocity_constraints(bodies, &mut data);
        }

        for _ in 0..step.velocity_iterations {
            for joint in joints.joints_mut() {
                joint.solve_velocity_constraints(&mut data);
            }
            self.contact_solver
                .solve_velocity_constraints(data.velocities);
        }

        self.contact_solver.store_impulses(contacts);

        integrate_positions(data.positions, data.velocities, dt);

        let mut position_solved = false;
        for _ in 0..step.position_iterations {
            let contacts_okay = self
                .contact_solver
                .solve_position_constraints(data.positions);

            let mut joints_okay = true;
            for joint in joints.joints_mut() {
                joints_okay &= joint.solve_position_constraints(&mut data);
            }

            if contacts_okay && joints_okay {
                position_solved = true;
                break;
            }
        }

        if !position_solved {
            debug!(
                "Island position constraints not solved within {} iterations",
                step.position_iterations
            );
        }

        self.scatter_body_states(bodies);
        self.previous_inv_dt = step.inv_dt;

        Ok(position_solved)
    }

    /// Resolves the overlap of the two given bodies at their time of impact
    /// and advances all bodies through the remaining `dt`. Only the two
    /// impact bodies are moved by the position correction, and the contacts
    /// are solved without warm starting. Joints are not involved.
    ///
    /// Returns whether the position constraints were solved within
    /// tolerance.
    ///
    /// # Errors
    /// Returns an error if `dt` is not positive.
    ///
    /// # Panics
    /// If either impact body does not exist.
    pub fn solve_toi(
        &mut self,
        dt: fph,
        bodies: &mut BodyManager,
        contacts: &mut [Contact],
        toi_body_a: BodyID,
        toi_body_b: BodyID,
    ) -> Result<bool> {
        if !(dt > 0.0) {
            bail!("Invalid time step duration for island solver: {}", dt);
        }

        trace!(
            "Solving time of impact between {:?} and {:?} with {} contacts",
            toi_body_a,
            toi_body_b,
            contacts.len()
        );

        let step = TimeStep::new(
            dt,
            0.0,
            self.config.toi_velocity_iterations,
            self.config.toi_position_iterations,
            false,
        );

        self.gather_body_states(bodies);

        let toi_index_a = bodies.body(toi_body_a).island_index();
        let toi_index_b = bodies.body(toi_body_b).island_index();

        self.contact_solver.init(&step, contacts, bodies);

        let mut position_solved = false;
        for _ in 0..step.position_iterations {
            if self.contact_solver.solve_toi_position_constraints(
                &mut self.positions,
                toi_index_a,
                toi_index_b,
            ) {
                position_solved = true;
                break;
            }
        }

        self.contact_solver.initialize_velocity_constraints(
            contacts,
            &self.positions,
            &self.velocities,
        );

        for _ in 0..step.velocity_iterations {
            self.contact_solver
                .solve_velocity_constraints(&mut self.velocities);
        }

        integrate_positions(&mut self.positions, &mut self.velocities, dt);

        self.scatter_body_states(bodies);

        Ok(position_solved)
    }

    /// Assigns island indices to all bodies and copies their state into the
    /// solver arrays.
    fn gather_body_states(&mut self, bodies: &mut BodyManager) {
        self.positions.clear();
        self.velocities.clear();

        bodies.assign_island_indices();

        for body in bodies.bodies() {
            self.positions.push(SolverPosition {
                c: *body.center(),
                a: body.angle(),
            });
            self.velocities.push(SolverVelocity {
                v: *body.linear_velocity(),
                w: body.angular_velocity(),
            });
        }
    }

    /// Integrates gravity and applied forces into the velocities of the
    /// dynamic bodies and applies damping.
    fn integrate_velocities(&mut self, bodies: &BodyManager, h: fph) {
        for (body, velocity) in bodies.bodies().iter().zip(&mut self.velocities) {
            if !body.is_dynamic() {
                continue;
            }

            velocity.v += h
                * (body.gravity_scale() * self.config.gravity
                    + body.inverse_mass() * body.force());
            velocity.w += h * body.inverse_rotational_inertia() * body.torque();

            // Pade approximation of exp(-h*damping), stable for large steps
            velocity.v *= 1.0 / (1.0 + h * body.linear_damping());
            velocity.w *= 1.0 / (1.0 + h * body.angular_damping());
        }
    }

    fn scatter_body_states(&self, bodies: &mut BodyManager) {
        for ((body, position), velocity) in bodies
            .bodies_mut()
            .iter_mut()
            .zip(&self.positions)
            .zip(&self.velocities)
        {
            body.set_center_and_angle(&position.c, position.a);
            body.set_linear_velocity(&velocity.v);
            body.set_angular_velocity(velocity.w);
        }
    }
}

/// Advances the positions with the given velocities, first scaling down
/// velocities that would move a body too far in a single step.
fn integrate_positions(positions: &mut [SolverPosition], velocities: &mut [SolverVelocity], h: fph) {
    for (position, velocity) in positions.iter_mut().zip(velocities.iter_mut()) {
        let translation = h * velocity.v;
        let translation_squared = translation.norm_squared();
        if translation_squared > MAX_TRANSLATION * MAX_TRANSLATION {
            velocity.v *= MAX_TRANSLATION / translation_squared.sqrt();
        }

        let rotation = h * velocity.w;
        if rotation * rotation > MAX_ROTATION * MAX_ROTATION {
            velocity.w *= MAX_ROTATION / rotation.abs();
        }

        position.c += h * velocity.v;
        position.a += h * velocity.w;
    }
}

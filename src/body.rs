//! Rigid bodies.

use crate::{
    fph,
    math::{self, cross, cross_scalar_vector},
    quantities::{Force, Impulse, Position, Transform, Velocity},
    step::{SolverPosition, SolverVelocity},
};
use anyhow::{Result, bail};
use bytemuck::{Pod, Zeroable};
use nohash_hasher::{BuildNoHashHasher, IsEnabled};
use std::collections::HashMap;

/// Identifier for a [`Body`] in a [`BodyManager`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Zeroable, Pod)]
pub struct BodyID(u32);

/// How a body takes part in the simulation.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum BodyType {
    /// Zero mass, zero velocity. May be moved manually.
    #[default]
    Static,
    /// Zero mass, velocity set by the user and integrated by the solver.
    Kinematic,
    /// Positive mass, velocity determined by forces and constraints.
    Dynamic,
}

/// Definition of a body to add to a [`BodyManager`].
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[derive(Clone, Debug)]
pub struct BodyDef {
    pub body_type: BodyType,
    /// World position of the body origin.
    pub position: Position,
    /// World angle of the body in radians.
    pub angle: fph,
    pub linear_velocity: Velocity,
    pub angular_velocity: fph,
    pub linear_damping: fph,
    pub angular_damping: fph,
    pub gravity_scale: fph,
    /// Whether the body should be prevented from rotating.
    pub fixed_rotation: bool,
}

/// Mass properties of a body, typically accumulated from its shapes.
#[derive(Clone, Debug, PartialEq)]
pub struct MassData {
    pub mass: fph,
    /// Center of mass relative to the body origin.
    pub center: Position,
    /// Rotational inertia about the body origin.
    pub rotational_inertia: fph,
}

/// A rigid body in the plane.
///
/// The body state is stored in terms of the world space center of mass and
/// the body angle, since these are the quantities the solver integrates. The
/// transform of the body origin is derived from them.
#[derive(Clone, Debug)]
pub struct Body {
    body_type: BodyType,
    center: Position,
    angle: fph,
    local_center: Position,
    linear_velocity: Velocity,
    angular_velocity: fph,
    mass: fph,
    inverse_mass: fph,
    rotational_inertia: fph,
    inverse_rotational_inertia: fph,
    linear_damping: fph,
    angular_damping: fph,
    gravity_scale: fph,
    fixed_rotation: bool,
    force: Force,
    torque: fph,
    island_index: usize,
}

/// Manages all rigid bodies in the simulation.
#[derive(Clone, Debug, Default)]
pub struct BodyManager {
    bodies: Vec<Body>,
    body_ids: Vec<BodyID>,
    body_indices_by_id: HashMap<BodyID, usize, BuildNoHashHasher<BodyID>>,
    body_id_counter: u32,
}

impl IsEnabled for BodyID {}

impl BodyID {
    /// Returns the raw value of the ID.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            position: Position::zeros(),
            angle: 0.0,
            linear_velocity: Velocity::zeros(),
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            gravity_scale: 1.0,
            fixed_rotation: false,
        }
    }
}

impl MassData {
    /// Mass data for a uniform disk with the given density and radius,
    /// centered at `center` in the body frame.
    pub fn for_disk(density: fph, radius: fph, center: Position) -> Self {
        let mass = density * std::f64::consts::PI * radius.powi(2);
        Self {
            mass,
            center,
            rotational_inertia: mass * (0.5 * radius.powi(2) + center.norm_squared()),
        }
    }
}

impl Body {
    /// Creates a new body from the given definition. Dynamic bodies start out
    /// with unit mass and zero rotational inertia until
    /// [`Self::set_mass_data`] is called.
    pub fn new(def: &BodyDef) -> Self {
        let (mass, inverse_mass) = if def.body_type == BodyType::Dynamic {
            (1.0, 1.0)
        } else {
            (0.0, 0.0)
        };
        let mut body = Self {
            body_type: def.body_type,
            center: def.position,
            angle: def.angle,
            local_center: Position::zeros(),
            linear_velocity: Velocity::zeros(),
            angular_velocity: 0.0,
            mass,
            inverse_mass,
            rotational_inertia: 0.0,
            inverse_rotational_inertia: 0.0,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            gravity_scale: def.gravity_scale,
            fixed_rotation: def.fixed_rotation,
            force: Force::zeros(),
            torque: 0.0,
            island_index: 0,
        };
        if def.body_type != BodyType::Static {
            body.linear_velocity = def.linear_velocity;
            body.angular_velocity = def.angular_velocity;
        }
        body
    }

    /// Returns the type of the body.
    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    /// Whether the body is dynamic.
    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    /// The world position of the center of mass.
    pub fn center(&self) -> &Position {
        &self.center
    }

    /// The center of mass in the body frame.
    pub fn local_center(&self) -> &Position {
        &self.local_center
    }

    /// Returns the angle of the body, in radians.
    pub fn angle(&self) -> fph {
        self.angle
    }

    /// The world position of the body origin.
    pub fn position(&self) -> Position {
        self.transform().translation.vector
    }

    /// The transform from the body frame to world space.
    pub fn transform(&self) -> Transform {
        math::body_transform(&self.center, self.angle, &self.local_center)
    }

    /// Returns the linear velocity of the center of mass.
    pub fn linear_velocity(&self) -> &Velocity {
        &self.linear_velocity
    }

    /// Returns the angular velocity of the body.
    pub fn angular_velocity(&self) -> fph {
        self.angular_velocity
    }

    /// Returns the mass of the body.
    pub fn mass(&self) -> fph {
        self.mass
    }

    /// Returns the inverse mass of the body, which is zero unless it is dynamic.
    pub fn inverse_mass(&self) -> fph {
        self.inverse_mass
    }

    /// Rotational inertia about the center of mass.
    pub fn rotational_inertia(&self) -> fph {
        self.rotational_inertia
    }

    /// Returns the inverse rotational inertia about the center of mass.
    pub fn inverse_rotational_inertia(&self) -> fph {
        self.inverse_rotational_inertia
    }

    /// Returns the linear damping coefficient.
    pub fn linear_damping(&self) -> fph {
        self.linear_damping
    }

    /// Returns the angular damping coefficient.
    pub fn angular_damping(&self) -> fph {
        self.angular_damping
    }

    /// Returns the factor scaling the gravity applied to the body.
    pub fn gravity_scale(&self) -> fph {
        self.gravity_scale
    }

    /// Returns the force accumulated since the last call to [`Self::clear_forces`].
    pub fn force(&self) -> &Force {
        &self.force
    }

    /// Returns the torque accumulated since the last call to [`Self::clear_forces`].
    pub fn torque(&self) -> fph {
        self.torque
    }

    /// The index of the body in the dense arrays of the island it was last
    /// solved in.
    pub fn island_index(&self) -> usize {
        self.island_index
    }

    pub(crate) fn set_island_index(&mut self, island_index: usize) {
        self.island_index = island_index;
    }

    /// Transforms a point from the body frame to world space.
    pub fn world_point(&self, local_point: &Position) -> Position {
        math::transform_point(&self.transform(), local_point)
    }

    /// Transforms a world space point to the body frame.
    pub fn local_point(&self, world_point: &Position) -> Position {
        math::inverse_transform_point(&self.transform(), world_point)
    }

    /// Rotates a vector from the body frame to world space.
    pub fn world_vector(&self, local_vector: &Position) -> Position {
        self.transform().rotation * local_vector
    }

    /// The world velocity of the material point at the given world position.
    pub fn velocity_at_world_point(&self, world_point: &Position) -> Velocity {
        self.linear_velocity
            + cross_scalar_vector(self.angular_velocity, &(world_point - self.center))
    }

    /// Moves the body origin to the given world position and sets its angle.
    pub fn set_transform(&mut self, position: &Position, angle: fph) {
        self.angle = angle;
        self.center = math::transform_point(&Transform::new(*position, angle), &self.local_center);
    }

    /// Sets the world position of the center of mass and the body angle
    /// directly.
    pub fn set_center_and_angle(&mut self, center: &Position, angle: fph) {
        self.center = *center;
        self.angle = angle;
    }

    /// Sets the linear velocity of the center of mass.
    pub fn set_linear_velocity(&mut self, velocity: &Velocity) {
        if self.body_type != BodyType::Static {
            self.linear_velocity = *velocity;
        }
    }

    /// Sets the angular velocity of the body.
    pub fn set_angular_velocity(&mut self, angular_velocity: fph) {
        if self.body_type != BodyType::Static {
            self.angular_velocity = angular_velocity;
        }
    }

    /// Sets the linear and angular damping coefficients.
    pub fn set_damping(&mut self, linear_damping: fph, angular_damping: fph) {
        self.linear_damping = linear_damping;
        self.angular_damping = angular_damping;
    }

    /// Sets the factor scaling the gravity applied to the body.
    pub fn set_gravity_scale(&mut self, gravity_scale: fph) {
        self.gravity_scale = gravity_scale;
    }

    /// Sets the mass properties of the body. Ignored for bodies that are not
    /// dynamic. A non-positive mass is replaced by unit mass.
    ///
    /// # Errors
    /// Returns an error if the rotational inertia about the center of mass
    /// would be negative.
    pub fn set_mass_data(&mut self, mass_data: &MassData) -> Result<()> {
        if self.body_type != BodyType::Dynamic {
            return Ok(());
        }

        let mass = if mass_data.mass > 0.0 {
            mass_data.mass
        } else {
            1.0
        };

        let central_inertia = if mass_data.rotational_inertia > 0.0 && !self.fixed_rotation {
            let central_inertia =
                mass_data.rotational_inertia - mass * mass_data.center.norm_squared();
            if central_inertia <= 0.0 {
                bail!(
                    "Invalid rotational inertia for body: {} about origin gives {} about center of mass",
                    mass_data.rotational_inertia,
                    central_inertia
                );
            }
            central_inertia
        } else {
            0.0
        };

        // Keep the center of mass velocity consistent with the new center
        let old_center = self.center;
        let transform = self.transform();
        self.local_center = mass_data.center;
        self.center = math::transform_point(&transform, &self.local_center);
        self.linear_velocity += cross_scalar_vector(self.angular_velocity, &(self.center - old_center));

        self.mass = mass;
        self.inverse_mass = 1.0 / mass;
        self.rotational_inertia = central_inertia;
        self.inverse_rotational_inertia = if central_inertia > 0.0 {
            1.0 / central_inertia
        } else {
            0.0
        };

        Ok(())
    }

    /// Applies a force at the given world point, which generates a torque
    /// if the point is not the center of mass.
    pub fn apply_force(&mut self, force: &Force, world_point: &Position) {
        if !self.is_dynamic() {
            return;
        }
        self.force += force;
        self.torque += cross(&(world_point - self.center), force);
    }

    /// Accumulates a force acting on the center of mass.
    pub fn apply_force_to_center(&mut self, force: &Force) {
        if self.is_dynamic() {
            self.force += force;
        }
    }

    /// Accumulates a torque acting on the body.
    pub fn apply_torque(&mut self, torque: fph) {
        if self.is_dynamic() {
            self.torque += torque;
        }
    }

    /// Applies an impulse at the given world point, changing the velocities
    /// immediately.
    pub fn apply_linear_impulse(&mut self, impulse: &Impulse, world_point: &Position) {
        if !self.is_dynamic() {
            return;
        }
        self.linear_velocity += self.inverse_mass * impulse;
        self.angular_velocity +=
            self.inverse_rotational_inertia * cross(&(world_point - self.center), impulse);
    }

    /// Resets the accumulated force and torque to zero.
    pub fn clear_forces(&mut self) {
        self.force = Force::zeros();
        self.torque = 0.0;
    }
}

impl BodyManager {
    /// Creates a new body manager with no bodies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of bodies.
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Whether a body with the given ID exists.
    pub fn has_body(&self, body_id: BodyID) -> bool {
        self.body_indices_by_id.contains_key(&body_id)
    }

    /// Returns a reference to the body with the given ID.
    ///
    /// # Panics
    /// If no body with the given ID exists.
    pub fn body(&self, body_id: BodyID) -> &Body {
        self.get_body(body_id)
            .unwrap_or_else(|| panic!("Requested missing body with ID {:?}", body_id))
    }

    /// Returns a mutable reference to the body with the given ID.
    ///
    /// # Panics
    /// If no body with the given ID exists.
    pub fn body_mut(&mut self, body_id: BodyID) -> &mut Body {
        self.get_body_mut(body_id)
            .unwrap_or_else(|| panic!("Requested missing body with ID {:?}", body_id))
    }

    /// Returns a reference to the body with the given ID, or [`None`] if it
    /// does not exist.
    pub fn get_body(&self, body_id: BodyID) -> Option<&Body> {
        let idx = *self.body_indices_by_id.get(&body_id)?;
        Some(&self.bodies[idx])
    }

    /// Returns a mutable reference to the body with the given ID, or [`None`]
    /// if it does not exist.
    pub fn get_body_mut(&mut self, body_id: BodyID) -> Option<&mut Body> {
        let idx = *self.body_indices_by_id.get(&body_id)?;
        Some(&mut self.bodies[idx])
    }

    /// The IDs of all bodies, in storage order.
    pub fn body_ids(&self) -> &[BodyID] {
        &self.body_ids
    }

    /// All bodies, in storage order.
    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub(crate) fn bodies_mut(&mut self) -> &mut [Body] {
        &mut self.bodies
    }

    /// Creates a body from the given definition and returns its ID.
    pub fn add_body(&mut self, def: &BodyDef) -> BodyID {
        let body_id = self.create_new_body_id();
        self.body_indices_by_id.insert(body_id, self.bodies.len());
        self.bodies.push(Body::new(def));
        self.body_ids.push(body_id);
        body_id
    }

    /// Creates a dynamic body from the given definition and assigns it the
    /// given mass data.
    ///
    /// # Errors
    /// See [`Body::set_mass_data`].
    pub fn add_dynamic_body(&mut self, def: &BodyDef, mass_data: &MassData) -> Result<BodyID> {
        let def = BodyDef {
            body_type: BodyType::Dynamic,
            ..def.clone()
        };
        let mut body = Body::new(&def);
        body.set_mass_data(mass_data)?;

        let body_id = self.create_new_body_id();
        self.body_indices_by_id.insert(body_id, self.bodies.len());
        self.bodies.push(body);
        self.body_ids.push(body_id);
        Ok(body_id)
    }

    /// Removes the body with the given ID.
    ///
    /// # Panics
    /// If no body with the given ID exists.
    pub fn remove_body(&mut self, body_id: BodyID) {
        let idx = self
            .body_indices_by_id
            .remove(&body_id)
            .unwrap_or_else(|| panic!("Tried to remove missing body with ID {:?}", body_id));

        self.bodies.swap_remove(idx);
        self.body_ids.swap_remove(idx);

        if let Some(&moved_id) = self.body_ids.get(idx) {
            self.body_indices_by_id.insert(moved_id, idx);
        }
    }

    /// Assigns each body its storage index as island index, so that all
    /// bodies form a single island.
    pub fn assign_island_indices(&mut self) {
        for (idx, body) in self.bodies.iter_mut().enumerate() {
            body.set_island_index(idx);
        }
    }

    /// Copies the position and velocity state of all bodies into solver
    /// arrays, in storage order.
    pub fn solver_states(&self) -> (Vec<SolverPosition>, Vec<SolverVelocity>) {
        self.bodies
            .iter()
            .map(|body| {
                (
                    SolverPosition {
                        c: body.center,
                        a: body.angle,
                    },
                    SolverVelocity {
                        v: body.linear_velocity,
                        w: body.angular_velocity,
                    },
                )
            })
            .unzip()
    }

    /// Resets the accumulated force and torque on all bodies.
    pub fn clear_forces(&mut self) {
        for body in &mut self.bodies {
            body.clear_forces();
        }
    }

    fn create_new_body_id(&mut self) -> BodyID {
        let body_id = BodyID(self.body_id_counter);
        self.body_id_counter = self.body_id_counter.wrapping_add(1);
        body_id
    }
}

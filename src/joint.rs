//! Joint constraints between bodies.

pub mod constant_volume;
pub mod distance;
pub mod friction;
pub mod mouse;
pub mod pulley;

use crate::{
    body::{BodyID, BodyManager},
    fph,
    quantities::{Force, Position, Rotation},
    step::SolverData,
};
use anyhow::{Result, bail};
use bytemuck::{Pod, Zeroable};
use constant_volume::{ConstantVolumeJoint, ConstantVolumeJointDef};
use distance::{DistanceJoint, DistanceJointDef};
use friction::{FrictionJoint, FrictionJointDef};
use log::debug;
use mouse::{MouseJoint, MouseJointDef};
use nohash_hasher::{BuildNoHashHasher, IsEnabled};
use pulley::{PulleyJoint, PulleyJointDef};
use std::{collections::HashMap, fmt};

/// Identifier for a joint in a [`JointManager`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Zeroable, Pod)]
pub struct JointID(u32);

/// The kind of a joint.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum JointType {
    Distance,
    Friction,
    Pulley,
    Mouse,
    ConstantVolume,
}

/// The definition of a joint of any kind, from which
/// [`JointManager::create_joint`] constructs the joint.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug)]
pub enum JointDef {
    Distance(DistanceJointDef),
    Friction(FrictionJointDef),
    Pulley(PulleyJointDef),
    Mouse(MouseJointDef),
    ConstantVolume(ConstantVolumeJointDef),
}

/// A constraint that takes part in the per-step velocity and position
/// solve of an island, alongside the contacts.
///
/// For each step, [`Self::init_velocity_constraints`] is called once, then
/// [`Self::solve_velocity_constraints`] once per velocity iteration, then
/// [`Self::solve_position_constraints`] once per position iteration until
/// all constraints report success.
pub trait Joint: fmt::Debug {
    fn joint_type(&self) -> JointType;

    fn body_a(&self) -> BodyID;

    fn body_b(&self) -> BodyID;

    /// Whether the two bodies of the joint may still collide with each
    /// other.
    fn collide_connected(&self) -> bool;

    /// The anchor point on body A in world space.
    fn anchor_a(&self, bodies: &BodyManager) -> Position;

    /// The anchor point on body B in world space.
    fn anchor_b(&self, bodies: &BodyManager) -> Position;

    /// The reaction force on body B at the anchor, given the inverse duration
    /// of the last step.
    fn reaction_force(&self, inv_dt: fph) -> Force;

    /// The reaction torque on body B, given the inverse duration of the last
    /// step.
    fn reaction_torque(&self, inv_dt: fph) -> fph;

    /// Computes the effective masses and bias terms of the constraint from
    /// the current state of its bodies and applies the warm starting
    /// impulses.
    fn init_velocity_constraints(&mut self, bodies: &BodyManager, data: &mut SolverData<'_>);

    /// Performs one velocity iteration, applying impulses directly to the
    /// body velocities.
    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>);

    /// Performs one position correction iteration. Returns whether the
    /// position error is within tolerance.
    fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool;

    /// Joints that are owned by this joint and must be destroyed along with
    /// it.
    fn owned_joints(&self) -> &[JointID] {
        &[]
    }
}

/// A joint of any kind, as stored in a [`JointManager`].
#[derive(Clone, Debug)]
pub enum AnyJoint {
    Distance(DistanceJoint),
    Friction(FrictionJoint),
    Pulley(PulleyJoint),
    Mouse(MouseJoint),
    ConstantVolume(ConstantVolumeJoint),
}

/// Manages all joints in the simulation.
#[derive(Clone, Debug, Default)]
pub struct JointManager {
    joints: Vec<AnyJoint>,
    joint_ids: Vec<JointID>,
    joint_indices_by_id: HashMap<JointID, usize, BuildNoHashHasher<JointID>>,
    joint_id_counter: u32,
}

/// The properties of a body that a joint needs for solving, gathered when
/// the velocity constraints are initialized.
#[derive(Copy, Clone, Debug)]
pub(crate) struct ConstrainedBody {
    /// Index of the body in the island arrays.
    pub index: usize,
    pub local_center: Position,
    pub inverse_mass: fph,
    pub inverse_inertia: fph,
}

impl IsEnabled for JointID {}

impl JointDef {
    /// Returns the type of the joint.
    pub fn joint_type(&self) -> JointType {
        match self {
            Self::Distance(_) => JointType::Distance,
            Self::Friction(_) => JointType::Friction,
            Self::Pulley(_) => JointType::Pulley,
            Self::Mouse(_) => JointType::Mouse,
            Self::ConstantVolume(_) => JointType::ConstantVolume,
        }
    }
}

macro_rules! for_each_joint_variant {
    ($joint:expr, $inner:ident => $body:expr) => {
        match $joint {
            AnyJoint::Distance($inner) => $body,
            AnyJoint::Friction($inner) => $body,
            AnyJoint::Pulley($inner) => $body,
            AnyJoint::Mouse($inner) => $body,
            AnyJoint::ConstantVolume($inner) => $body,
        }
    };
}

impl AnyJoint {
    /// Returns the joint if it is a distance joint.
    pub fn as_distance(&self) -> Option<&DistanceJoint> {
        match self {
            Self::Distance(joint) => Some(joint),
            _ => None,
        }
    }

    /// Returns the joint for modification if it is a distance joint.
    pub fn as_distance_mut(&mut self) -> Option<&mut DistanceJoint> {
        match self {
            Self::Distance(joint) => Some(joint),
            _ => None,
        }
    }

    /// Returns the joint if it is a friction joint.
    pub fn as_friction(&self) -> Option<&FrictionJoint> {
        match self {
            Self::Friction(joint) => Some(joint),
            _ => None,
        }
    }

    /// Returns the joint if it is a pulley joint.
    pub fn as_pulley(&self) -> Option<&PulleyJoint> {
        match self {
            Self::Pulley(joint) => Some(joint),
            _ => None,
        }
    }

    /// Returns the joint if it is a mouse joint.
    pub fn as_mouse(&self) -> Option<&MouseJoint> {
        match self {
            Self::Mouse(joint) => Some(joint),
            _ => None,
        }
    }

    /// Returns the joint for modification if it is a mouse joint.
    pub fn as_mouse_mut(&mut self) -> Option<&mut MouseJoint> {
        match self {
            Self::Mouse(joint) => Some(joint),
            _ => None,
        }
    }

    /// Returns the joint if it is a constant volume joint.
    pub fn as_constant_volume(&self) -> Option<&ConstantVolumeJoint> {
        match self {
            Self::ConstantVolume(joint) => Some(joint),
            _ => None,
        }
    }

    /// Returns the joint for modification if it is a constant volume joint.
    pub fn as_constant_volume_mut(&mut self) -> Option<&mut ConstantVolumeJoint> {
        match self {
            Self::ConstantVolume(joint) => Some(joint),
            _ => None,
        }
    }

    /// Whether this joint connects the two given bodies, in either order.
    pub fn connects(&self, body_1: BodyID, body_2: BodyID) -> bool {
        let (a, b) = (self.body_a(), self.body_b());
        (a == body_1 && b == body_2) || (a == body_2 && b == body_1)
    }
}

impl Joint for AnyJoint {
    fn joint_type(&self) -> JointType {
        for_each_joint_variant!(self, joint => joint.joint_type())
    }

    fn body_a(&self) -> BodyID {
        for_each_joint_variant!(self, joint => joint.body_a())
    }

    fn body_b(&self) -> BodyID {
        for_each_joint_variant!(self, joint => joint.body_b())
    }

    fn collide_connected(&self) -> bool {
        for_each_joint_variant!(self, joint => joint.collide_connected())
    }

    fn anchor_a(&self, bodies: &BodyManager) -> Position {
        for_each_joint_variant!(self, joint => joint.anchor_a(bodies))
    }

    fn anchor_b(&self, bodies: &BodyManager) -> Position {
        for_each_joint_variant!(self, joint => joint.anchor_b(bodies))
    }

    fn reaction_force(&self, inv_dt: fph) -> Force {
        for_each_joint_variant!(self, joint => joint.reaction_force(inv_dt))
    }

    fn reaction_torque(&self, inv_dt: fph) -> fph {
        for_each_joint_variant!(self, joint => joint.reaction_torque(inv_dt))
    }

    fn init_velocity_constraints(&mut self, bodies: &BodyManager, data: &mut SolverData<'_>) {
        for_each_joint_variant!(self, joint => joint.init_velocity_constraints(bodies, data));
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        for_each_joint_variant!(self, joint => joint.solve_velocity_constraints(data));
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        for_each_joint_variant!(self, joint => joint.solve_position_constraints(data))
    }

    fn owned_joints(&self) -> &[JointID] {
        for_each_joint_variant!(self, joint => joint.owned_joints())
    }
}

impl JointManager {
    /// Creates a new joint manager with no joints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of joints, including owned joints.
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Whether a joint with the given ID exists.
    pub fn has_joint(&self, joint_id: JointID) -> bool {
        self.joint_indices_by_id.contains_key(&joint_id)
    }

    /// Returns a reference to the joint with the given ID, or [`None`] if it
    /// does not exist.
    pub fn get_joint(&self, joint_id: JointID) -> Option<&AnyJoint> {
        let idx = *self.joint_indices_by_id.get(&joint_id)?;
        Some(&self.joints[idx])
    }

    /// Returns a mutable reference to the joint with the given ID, or [`None`]
    /// if it does not exist.
    pub fn get_joint_mut(&mut self, joint_id: JointID) -> Option<&mut AnyJoint> {
        let idx = *self.joint_indices_by_id.get(&joint_id)?;
        Some(&mut self.joints[idx])
    }

    /// Returns a reference to the joint with the given ID.
    ///
    /// # Panics
    /// If no joint with the given ID exists.
    pub fn joint(&self, joint_id: JointID) -> &AnyJoint {
        self.get_joint(joint_id)
            .unwrap_or_else(|| panic!("Requested missing joint with ID {:?}", joint_id))
    }

    /// Returns a mutable reference to the joint with the given ID.
    ///
    /// # Panics
    /// If no joint with the given ID exists.
    pub fn joint_mut(&mut self, joint_id: JointID) -> &mut AnyJoint {
        self.get_joint_mut(joint_id)
            .unwrap_or_else(|| panic!("Requested missing joint with ID {:?}", joint_id))
    }

    /// The IDs of all joints, in solve order.
    pub fn joint_ids(&self) -> &[JointID] {
        &self.joint_ids
    }

    /// All joints, in solve order.
    pub fn joints(&self) -> &[AnyJoint] {
        &self.joints
    }

    pub(crate) fn joints_mut(&mut self) -> &mut [AnyJoint] {
        &mut self.joints
    }

    /// Constructs a joint from the given definition and returns its ID. A
    /// constant volume joint without supplied distance joints also creates
    /// one distance joint per edge, which it then owns.
    ///
    /// # Errors
    /// Returns an error if the definition is invalid, for example if it
    /// refers to a missing body or connects a body to itself.
    pub fn create_joint(&mut self, bodies: &BodyManager, def: &JointDef) -> Result<JointID> {
        let joint = match def {
            JointDef::Distance(def) => {
                validate_body_pair(bodies, def.body_a, def.body_b)?;
                AnyJoint::Distance(DistanceJoint::new(def)?)
            }
            JointDef::Friction(def) => {
                validate_body_pair(bodies, def.body_a, def.body_b)?;
                AnyJoint::Friction(FrictionJoint::new(def)?)
            }
            JointDef::Pulley(def) => {
                validate_body_pair(bodies, def.body_a, def.body_b)?;
                AnyJoint::Pulley(PulleyJoint::new(def)?)
            }
            JointDef::Mouse(def) => {
                validate_body_pair(bodies, def.body_a, def.body_b)?;
                AnyJoint::Mouse(MouseJoint::new(bodies, def)?)
            }
            JointDef::ConstantVolume(def) => {
                AnyJoint::ConstantVolume(self.create_constant_volume_joint(bodies, def)?)
            }
        };

        Ok(self.insert_joint(joint))
    }

    /// Destroys the joint with the given ID along with every joint it owns.
    ///
    /// # Panics
    /// If no joint with the given ID exists.
    pub fn destroy_joint(&mut self, joint_id: JointID) {
        let joint = self
            .remove_joint(joint_id)
            .unwrap_or_else(|| panic!("Tried to destroy missing joint with ID {:?}", joint_id));

        debug!("Destroyed {:?} joint {:?}", joint.joint_type(), joint_id);

        for &owned_joint_id in joint.owned_joints() {
            if self.has_joint(owned_joint_id) {
                self.destroy_joint(owned_joint_id);
            } else {
                debug!(
                    "Owned joint {:?} of joint {:?} was already destroyed",
                    owned_joint_id, joint_id
                );
            }
        }
    }

    /// Whether the two given bodies may collide, which they may not if they
    /// are connected by a joint that does not allow it.
    pub fn should_collide(&self, body_1: BodyID, body_2: BodyID) -> bool {
        !self
            .joints
            .iter()
            .any(|joint| !joint.collide_connected() && joint.connects(body_1, body_2))
    }

    fn create_constant_volume_joint(
        &mut self,
        bodies: &BodyManager,
        def: &ConstantVolumeJointDef,
    ) -> Result<ConstantVolumeJoint> {
        def.validate()?;
        for &body_id in &def.bodies {
            validate_body(bodies, body_id)?;
        }

        let distance_joints = match &def.joints {
            Some(joint_ids) => {
                for &joint_id in joint_ids {
                    match self.get_joint(joint_id) {
                        Some(AnyJoint::Distance(_)) => {}
                        Some(joint) => bail!(
                            "Invalid joint for constant volume joint: {:?} is a {:?} joint",
                            joint_id,
                            joint.joint_type()
                        ),
                        None => bail!(
                            "Invalid joint for constant volume joint: {:?} does not exist",
                            joint_id
                        ),
                    }
                }
                joint_ids.clone()
            }
            None => {
                // All edges are built before any is registered, so a rejected
                // edge leaves the manager untouched
                let n_bodies = def.bodies.len();
                let mut edge_joints = Vec::with_capacity(n_bodies);
                for (idx, &body_id) in def.bodies.iter().enumerate() {
                    let next_body_id = def.bodies[(idx + 1) % n_bodies];
                    validate_body_pair(bodies, body_id, next_body_id)?;
                    let distance_def = DistanceJointDef {
                        frequency_hz: def.frequency_hz,
                        damping_ratio: def.damping_ratio,
                        ..DistanceJointDef::from_world_anchors(
                            bodies,
                            body_id,
                            next_body_id,
                            bodies.body(body_id).center(),
                            bodies.body(next_body_id).center(),
                        )
                    };
                    edge_joints.push(AnyJoint::Distance(DistanceJoint::new(&distance_def)?));
                }
                edge_joints
                    .into_iter()
                    .map(|joint| self.insert_joint(joint))
                    .collect()
            }
        };

        Ok(ConstantVolumeJoint::new(bodies, def, distance_joints))
    }

    fn insert_joint(&mut self, joint: AnyJoint) -> JointID {
        let joint_id = self.create_new_joint_id();
        debug!(
            "Created {:?} joint {:?} between bodies {:?} and {:?}",
            joint.joint_type(),
            joint_id,
            joint.body_a(),
            joint.body_b()
        );

        self.joint_indices_by_id.insert(joint_id, self.joints.len());
        self.joints.push(joint);
        self.joint_ids.push(joint_id);

        joint_id
    }

        fn remove_joint(&mut self, joint_id: JointID) -> Option<AnyJoint> {
        let idx = self.joint_indices_by_id.remove(&joint_id)?;

        let joint = self.joints.swap_remove(idx);
        self.joint_ids.swap_remove(idx);

        if let Some(&moved_id) = self.joint_ids.get(idx) {
            self.joint_indices_by_id.insert(moved_id, idx);
        }

        Some(joint)
    }

    fn create_new_joint_id(&mut self) -> JointID {
        let joint_id = JointID(self.joint_id_counter);
        self.joint_id_counter = self.joint_id_counter.wrapping_add(1);
        joint_id
    }
}

impl ConstrainedBody {
    /// Gathers the solver properties of the given body.
    ///
    /// # Panics
    /// If the body does not exist.
    pub(crate) fn gather(bodies: &BodyManager, body_id: BodyID) -> Self {
        let body = bodies.body(body_id);
        Self {
            index: body.island_index(),
            local_center: *body.local_center(),
            inverse_mass: body.inverse_mass(),
            inverse_inertia: body.inverse_rotational_inertia(),
        }
    }

    /// The offset from the center of mass to the given local anchor, in
    /// world orientation for the given body angle.
    pub(crate) fn anchor_offset(&self, angle: fph, local_anchor: &Position) -> Position {
        Rotation::new(angle) * (local_anchor - self.local_center)
    }
}

impl Default for ConstrainedBody {
    fn default() -> Self {
        Self {
            index: 0,
            local_center: Position::zeros(),
            inverse_mass: 0.0,
            inverse_inertia: 0.0,
        }
    }
}

fn validate_body(bodies: &BodyManager, body_id: BodyID) -> Result<()> {
    if !bodies.has_body(body_id) {
        bail!("Invalid body for joint: {:?} does not exist", body_id);
    }
    Ok(())
}

fn validate_body_pair(bodies: &BodyManager, body_a: BodyID, body_b: BodyID) -> Result<()> {
    validate_body(bodies, body_a)?;
    validate_body(bodies, body_b)?;
    if body_a == body_b {
        bail!("Invalid bodies for joint: both are {:?}", body_a);
    }
    Ok(())
}

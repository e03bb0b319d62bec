//! Joints preserving the area enclosed by a ring of bodies.

use super::{Joint, JointID, JointType};
use crate::{
    body::{BodyID, BodyManager},
    fph,
    math::cross,
    quantities::{Direction, Force, Position},
    settings::{EPSILON, LINEAR_SLOP, MAX_LINEAR_CORRECTION},
    step::{SolverData, SolverPosition},
};
use anyhow::{Result, bail};

/// Definition of a [`ConstantVolumeJoint`].
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstantVolumeJointDef {
    /// The bodies forming the ring, in order around the enclosed area.
    pub bodies: Vec<BodyID>,
    /// Existing distance joints along the ring edges, where joint `i`
    /// connects body `i` to body `i + 1`. When absent, the joints are
    /// created along with the constant volume joint.
    pub joints: Option<Vec<JointID>>,
    /// The frequency of the created edge joints.
    pub frequency_hz: fph,
    /// The damping ratio of the created edge joints.
    pub damping_ratio: fph,
}

/// A composite joint keeping the polygon spanned by the centers of a ring
/// of bodies at a constant area. It owns the distance joints along the
/// edges of the ring, which are destroyed along with it.
#[derive(Clone, Debug)]
pub struct ConstantVolumeJoint {
    bodies: Vec<BodyID>,
    distance_joints: Vec<JointID>,
    target_lengths: Vec<fph>,
    target_volume: fph,
    frequency_hz: fph,
    damping_ratio: fph,
    impulse: fph,
    island_indices: Vec<usize>,
    inverse_masses: Vec<fph>,
    normals: Vec<Direction>,
}

impl ConstantVolumeJointDef {
    /// Creates an empty definition with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a body to the ring.
    pub fn add_body(&mut self, body: BodyID) {
        self.bodies.push(body);
    }

    /// Appends a body to the ring together with the distance joint
    /// connecting it to the next body.
    pub fn add_body_and_joint(&mut self, body: BodyID, joint: JointID) {
        self.bodies.push(body);
        self.joints.get_or_insert_with(Vec::new).push(joint);
    }

    /// Checks that the definition describes a valid ring.
    ///
    /// # Errors
    /// Returns an error if there are fewer than three bodies or if the
    /// number of supplied joints differs from the number of bodies.
    pub fn validate(&self) -> Result<()> {
        if self.bodies.len() < 3 {
            bail!(
                "Invalid number of bodies for constant volume joint: {} (at least 3 required)",
                self.bodies.len()
            );
        }
        if let Some((idx, body_id)) = self
            .bodies
            .iter()
            .enumerate()
            .find(|&(idx, body_id)| self.bodies[..idx].contains(body_id))
        {
            bail!(
                "Invalid bodies for constant volume joint: {:?} appears more than once (at index {})",
                body_id,
                idx
            );
        }
        if let Some(joints) = &self.joints {
            if joints.len() != self.bodies.len() {
                bail!(
                    "Invalid number of joints for constant volume joint: {} (must equal the number of bodies, {})",
                    joints.len(),
                    self.bodies.len()
                );
            }
        }
        if self.frequency_hz < 0.0 {
            bail!(
                "Invalid frequency for constant volume joint: {}",
                self.frequency_hz
            );
        }
        if self.damping_ratio < 0.0 {
            bail!(
                "Invalid damping ratio for constant volume joint: {}",
                self.damping_ratio
            );
        }
        Ok(())
    }
}

impl ConstantVolumeJoint {
    /// Creates a constant volume joint over the bodies of the given
    /// (validated) definition, taking ownership of the given edge joints.
    /// The current edge lengths and enclosed area become the targets.
    ///
    /// # Panics
    /// If any of the bodies does not exist.
    pub fn new(
        bodies: &BodyManager,
        def: &ConstantVolumeJointDef,
        distance_joints: Vec<JointID>,
    ) -> Self {
        let centers: Vec<Position> = def
            .bodies
            .iter()
            .map(|&body_id| *bodies.body(body_id).center())
            .collect();

        let n_bodies = centers.len();
        let target_lengths = (0..n_bodies)
            .map(|idx| (centers[next(idx, n_bodies)] - centers[idx]).norm())
            .collect();

        Self {
            bodies: def.bodies.clone(),
            distance_joints,
            target_lengths,
            target_volume: signed_area(&centers),
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            impulse: 0.0,
            island_indices: vec![0; n_bodies],
            inverse_masses: vec![0.0; n_bodies],
            normals: vec![Direction::zeros(); n_bodies],
        }
    }

    /// The bodies forming the ring.
    pub fn bodies(&self) -> &[BodyID] {
        &self.bodies
    }

    /// The distance joints along the edges of the ring.
    pub fn distance_joints(&self) -> &[JointID] {
        &self.distance_joints
    }

    /// The edge lengths at creation.
    pub fn target_lengths(&self) -> &[fph] {
        &self.target_lengths
    }

    /// The signed area the joint maintains.
    pub fn target_volume(&self) -> fph {
        self.target_volume
    }

    /// Returns the spring frequency of the edge distance joints.
    pub fn frequency_hz(&self) -> fph {
        self.frequency_hz
    }

    /// Returns the damping ratio of the edge distance joints.
    pub fn damping_ratio(&self) -> fph {
        self.damping_ratio
    }

    /// Scales the target area by the given factor.
    pub fn inflate(&mut self, factor: fph) {
        self.target_volume *= factor;
    }

    fn island_area(&self, positions: &[SolverPosition]) -> fph {
        let n_bodies = self.island_indices.len();
        let mut area = 0.0;
        for idx in 0..n_bodies {
            let c = &positions[self.island_indices[idx]].c;
            let c_next = &positions[self.island_indices[next(idx, n_bodies)]].c;
            area += cross(c, c_next);
        }
        0.5 * area
    }

    /// For each body, the vector from its previous to its next neighbor.
    fn neighbor_spans(&self, data: &SolverData<'_>) -> Vec<Position> {
        let n_bodies = self.island_indices.len();
        (0..n_bodies)
            .map(|idx| {
                data.positions[self.island_indices[next(idx, n_bodies)]].c
                    - data.positions[self.island_indices[prev(idx, n_bodies)]].c
            })
            .collect()
    }

    /// Applies the given area impulse to the body velocities along the
    /// outward normals of the neighbor spans.
    fn apply_impulse(&self, data: &mut SolverData<'_>, spans: &[Position], impulse: fph) {
        for ((&index, &inverse_mass), span) in self
            .island_indices
            .iter()
            .zip(&self.inverse_masses)
            .zip(spans)
        {
            data.velocities[index].v +=
                inverse_mass * 0.5 * impulse * Position::new(span.y, -span.x);
        }
    }

    /// Pushes the bodies out along the edge normals to restore the target
    /// area. Returns whether every correction was within tolerance.
    fn constrain_edges(&mut self, data: &mut SolverData<'_>) -> bool {
        let n_bodies = self.island_indices.len();

        let mut perimeter = 0.0;
        for idx in 0..n_bodies {
            let edge = data.positions[self.island_indices[next(idx, n_bodies)]].c
                - data.positions[self.island_indices[idx]].c;
            let mut dist = edge.norm();
            if dist < EPSILON {
                dist = 1.0;
            }
            self.normals[idx] = Direction::new(edge.y / dist, -edge.x / dist);
            perimeter += dist;
        }

        let delta_area = self.target_volume - self.island_area(data.positions);
        let to_extrude = 0.5 * delta_area / perimeter;

        let mut done = true;
        for idx in 0..n_bodies {
            let next_idx = next(idx, n_bodies);
            let mut delta = to_extrude * (self.normals[idx] + self.normals[next_idx]);
            let norm = delta.norm();
            if norm > MAX_LINEAR_CORRECTION {
                delta *= MAX_LINEAR_CORRECTION / norm;
            }
            if norm > LINEAR_SLOP {
                done = false;
            }
            data.positions[self.island_indices[next_idx]].c += delta;
        }
        done
    }
}

impl Joint for ConstantVolumeJoint {
    fn joint_type(&self) -> JointType {
        JointType::ConstantVolume
    }

    fn body_a(&self) -> BodyID {
        self.bodies[0]
    }

    fn body_b(&self) -> BodyID {
        self.bodies[1]
    }

    fn collide_connected(&self) -> bool {
        false
    }

    fn anchor_a(&self, bodies: &BodyManager) -> Position {
        *bodies.body(self.bodies[0]).center()
    }

    fn anchor_b(&self, bodies: &BodyManager) -> Position {
        *bodies.body(self.bodies[1]).center()
    }

    fn reaction_force(&self, _inv_dt: fph) -> Force {
        Force::zeros()
    }

    fn reaction_torque(&self, _inv_dt: fph) -> fph {
        0.0
    }

    fn init_velocity_constraints(&mut self, bodies: &BodyManager, data: &mut SolverData<'_>) {
        for (idx, &body_id) in self.bodies.iter().enumerate() {
            let body = bodies.body(body_id);
            self.island_indices[idx] = body.island_index();
            self.inverse_masses[idx] = body.inverse_mass();
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            let spans = self.neighbor_spans(data);
            self.apply_impulse(data, &spans, self.impulse);
        } else {
            self.impulse = 0.0;
        }
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let spans = self.neighbor_spans(data);

        let mut cross_mass_sum = 0.0;
        let mut dot_mass_sum = 0.0;
        for ((&index, &inverse_mass), span) in self
            .island_indices
            .iter()
            .zip(&self.inverse_masses)
            .zip(&spans)
        {
            dot_mass_sum += span.norm_squared() * inverse_mass;
            cross_mass_sum += cross(&data.velocities[index].v, span);
        }

        if dot_mass_sum <= 0.0 {
            return;
        }

        let lambda = -2.0 * cross_mass_sum / dot_mass_sum;
        self.impulse += lambda;

        self.apply_impulse(data, &spans, lambda);
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        self.constrain_edges(data)
    }

    fn owned_joints(&self) -> &[JointID] {
        &self.distance_joints
    }
}

fn next(idx: usize, n: usize) -> usize {
    if idx + 1 == n { 0 } else { idx + 1 }
}

fn prev(idx: usize, n: usize) -> usize {
    if idx == 0 { n - 1 } else { idx - 1 }
}

/// Signed area of the polygon with the given vertices (positive for
/// counter-clockwise order).
fn signed_area(vertices: &[Position]) -> fph {
    let n = vertices.len();
    0.5 * (0..n)
        .map(|idx| cross(&vertices[idx], &vertices[next(idx, n)]))
        .sum::<fph>()
}

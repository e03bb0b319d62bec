//! Contact constraint solving based on the sequential impulse method.

use crate::{
    body::BodyManager,
    collision::{ManifoldType, world_manifold::WorldManifold},
    contact::Contact,
    fph,
    math::{self, cross, cross_scalar_vector, cross_vector_scalar},
    quantities::{Direction, Impulse, Position, Transform},
    settings::{
        BAUMGARTE, LINEAR_SLOP, MAX_LINEAR_CORRECTION, MAX_MANIFOLD_POINTS, TOI_BAUMGARTE,
        VELOCITY_THRESHOLD,
    },
    step::{SolverPosition, SolverVelocity, TimeStep},
};
use log::{debug, trace};
use nalgebra::{Matrix2, Vector2};

/// The constraint storage is never allocated with room for fewer
/// constraints than this.
const MIN_CONSTRAINT_CAPACITY: usize = 256;

/// The block solver is only used when the condition number of the 2x2
/// coupling matrix is estimated to be below this value.
const MAX_CONDITION_NUMBER: fph = 100.0;

/// Solves the velocity and position constraints of all active contacts in
/// an island.
///
/// For each step, the methods are to be called in the order
/// [`Self::init`], [`Self::initialize_velocity_constraints`],
/// [`Self::warm_start`], [`Self::solve_velocity_constraints`] (repeatedly),
/// [`Self::store_impulses`] and [`Self::solve_position_constraints`]
/// (repeatedly).
#[derive(Clone, Debug)]
pub struct ContactSolver {
    velocity_constraints: Vec<ContactVelocityConstraint>,
    position_constraints: Vec<ContactPositionConstraint>,
}

/// The velocity constraint data for a single contact point.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VelocityConstraintPoint {
    r_a: Vector2<fph>,
    r_b: Vector2<fph>,
    normal_impulse: fph,
    tangent_impulse: fph,
    normal_mass: fph,
    tangent_mass: fph,
    velocity_bias: fph,
}

/// The velocity constraint data for a contact, rebuilt every step.
#[derive(Clone, Debug)]
pub struct ContactVelocityConstraint {
    points: [VelocityConstraintPoint; MAX_MANIFOLD_POINTS],
    normal: Direction,
    normal_mass: Matrix2<fph>,
    k: Matrix2<fph>,
    index_a: usize,
    index_b: usize,
    inverse_mass_a: fph,
    inverse_mass_b: fph,
    inverse_inertia_a: fph,
    inverse_inertia_b: fph,
    friction: fph,
    restitution: fph,
    tangent_speed: fph,
    point_count: usize,
    contact_index: usize,
}

/// The data required to recompute the separation of a contact during
/// position correction, without running narrow phase again.
#[derive(Clone, Debug)]
struct ContactPositionConstraint {
    local_points: [Position; MAX_MANIFOLD_POINTS],
    local_normal: Direction,
    local_point: Position,
    index_a: usize,
    index_b: usize,
    inverse_mass_a: fph,
    inverse_mass_b: fph,
    local_center_a: Position,
    local_center_b: Position,
    inverse_inertia_a: fph,
    inverse_inertia_b: fph,
    manifold_type: ManifoldType,
    radius_a: fph,
    radius_b: fph,
    point_count: usize,
}

/// World space normal, contact point and separation for one point of a
/// [`ContactPositionConstraint`] at the current trial positions.
#[derive(Clone, Debug)]
struct PositionSolverManifold {
    normal: Direction,
    point: Position,
    separation: fph,
}

/// Inverse masses and inertias of the two bodies of a constraint.
#[derive(Copy, Clone, Debug)]
struct BodyPairMasses {
    m_a: fph,
    m_b: fph,
    i_a: fph,
    i_b: fph,
}

impl ContactSolver {
    /// Creates a new contact solver with no constraints.
    pub fn new() -> Self {
        Self {
            velocity_constraints: Vec::new(),
            position_constraints: Vec::new(),
        }
    }

    /// The number of contacts prepared by the last call to [`Self::init`].
    pub fn constraint_count(&self) -> usize {
        self.velocity_constraints.len()
    }

    /// The number of constraints that fit in the currently allocated
    /// storage.
    pub fn constraint_capacity(&self) -> usize {
        self.velocity_constraints.capacity()
    }

    /// The constraints prepared by the last call to [`Self::init`].
    pub fn velocity_constraints(&self) -> &[ContactVelocityConstraint] {
        &self.velocity_constraints
    }

    /// Prepares constraints for all active contacts in the given slice. The
    /// accumulated impulses stored in each manifold are used as the initial
    /// impulses (scaled by the step's `dt_ratio`) if warm starting is enabled,
    /// otherwise the initial impulses are zero.
    ///
    /// # Panics
    /// If a contact refers to a body that does not exist.
    pub fn init(&mut self, step: &TimeStep, contacts: &[Contact], bodies: &BodyManager) {
        let count = contacts.iter().filter(|contact| contact.is_active()).count();
        self.ensure_capacity(count);

        self.velocity_constraints.clear();
        self.position_constraints.clear();

        for (contact_index, contact) in contacts.iter().enumerate() {
            if !contact.is_active() {
                continue;
            }

            let body_a = bodies.body(contact.body_a());
            let body_b = bodies.body(contact.body_b());
            let manifold = contact.manifold();
            let point_count = manifold.point_count();

            let mut points = [VelocityConstraintPoint::zeroed(); MAX_MANIFOLD_POINTS];
            let mut local_points = [Position::zeros(); MAX_MANIFOLD_POINTS];

            for ((point, local_point), manifold_point) in points
                .iter_mut()
                .zip(local_points.iter_mut())
                .zip(manifold.points())
            {
                if step.warm_starting {
                    point.normal_impulse = step.dt_ratio * manifold_point.normal_impulse;
                    point.tangent_impulse = step.dt_ratio * manifold_point.tangent_impulse;
                }
                *local_point = manifold_point.local_point;
            }

            self.velocity_constraints.push(ContactVelocityConstraint {
                points,
                normal: Direction::zeros(),
                normal_mass: Matrix2::zeros(),
                k: Matrix2::zeros(),
                index_a: body_a.island_index(),
                index_b: body_b.island_index(),
                inverse_mass_a: body_a.inverse_mass(),
                inverse_mass_b: body_b.inverse_mass(),
                inverse_inertia_a: body_a.inverse_rotational_inertia(),
                inverse_inertia_b: body_b.inverse_rotational_inertia(),
                friction: contact.friction(),
                restitution: contact.restitution(),
                tangent_speed: contact.tangent_speed(),
                point_count,
                contact_index,
            });

            self.position_constraints.push(ContactPositionConstraint {
                local_points,
                local_normal: manifold.local_normal,
                local_point: manifold.local_point,
                index_a: body_a.island_index(),
                index_b: body_b.island_index(),
                inverse_mass_a: body_a.inverse_mass(),
                inverse_mass_b: body_b.inverse_mass(),
                local_center_a: *body_a.local_center(),
                local_center_b: *body_b.local_center(),
                inverse_inertia_a: body_a.inverse_rotational_inertia(),
                inverse_inertia_b: body_b.inverse_rotational_inertia(),
                manifold_type: manifold.manifold_type,
                radius_a: contact.radius_a(),
                radius_b: contact.radius_b(),
                point_count,
            });
        }
    }

    /// Applies the initial accumulated impulses of all constraints to the
    /// body velocities. Must be called after
    /// [`Self::initialize_velocity_constraints`], since the impulses are
    /// applied at the anchors computed there.
    pub fn warm_start(&self, velocities: &mut [SolverVelocity]) {
        for vc in &self.velocity_constraints {
            let masses = vc.masses();
            let normal = vc.normal;
            let tangent = cross_vector_scalar(&normal, 1.0);

            let mut v_a = velocities[vc.index_a];
            let mut v_b = velocities[vc.index_b];

            for point in vc.active_points() {
                let p = point.normal_impulse * normal + point.tangent_impulse * tangent;
                apply_impulse(&mut v_a, &mut v_b, &masses, &point.r_a, &point.r_b, &p);
            }

            velocities[vc.index_a] = v_a;
            velocities[vc.index_b] = v_b;
        }
    }

    /// Computes the world space contact geometry, effective masses and
    /// restitution bias of every constraint from the current body state.
    ///
    /// # Panics
    /// If `contacts` is not the slice that was passed to [`Self::init`].
    pub fn initialize_velocity_constraints(
        &mut self,
        contacts: &[Contact],
        positions: &[SolverPosition],
        velocities: &[SolverVelocity],
    ) {
        for (vc, pc) in self
            .velocity_constraints
            .iter_mut()
            .zip(&self.position_constraints)
        {
            let manifold = contacts[vc.contact_index].manifold();
            assert_eq!(
                manifold.point_count(),
                pc.point_count,
                "Contact manifold changed after the contact solver was initialized"
            );

            let SolverPosition { c: c_a, a: a_a } = positions[vc.index_a];
            let SolverPosition { c: c_b, a: a_b } = positions[vc.index_b];
            let SolverVelocity { v: v_a, w: w_a } = velocities[vc.index_a];
            let SolverVelocity { v: v_b, w: w_b } = velocities[vc.index_b];

            let transform_a = math::body_transform(&c_a, a_a, &pc.local_center_a);
            let transform_b = math::body_transform(&c_b, a_b, &pc.local_center_b);

            let world_manifold = WorldManifold::new(
                manifold,
                &transform_a,
                pc.radius_a,
                &transform_b,
                pc.radius_b,
            );

            let masses = vc.masses();
            let normal = *world_manifold.normal();
            let tangent = cross_vector_scalar(&normal, 1.0);
            vc.normal = normal;

            for (point, world_point) in vc.points[..pc.point_count]
                .iter_mut()
                .zip(world_manifold.points())
            {
                point.r_a = world_point - c_a;
                point.r_b = world_point - c_b;

                point.normal_mass = masses.effective_mass(&point.r_a, &point.r_b, &normal);
                point.tangent_mass = masses.effective_mass(&point.r_a, &point.r_b, &tangent);

                // Set up a velocity bias for restitution
                point.velocity_bias = 0.0;
                let relative_velocity = normal.dot(
                    &(v_b + cross_scalar_vector(w_b, &point.r_b)
                        - v_a
                        - cross_scalar_vector(w_a, &point.r_a)),
                );
                if relative_velocity < -VELOCITY_THRESHOLD {
                    point.velocity_bias = -vc.restitution * relative_velocity;
                }
            }

            if vc.point_count == 2 {
                let point_1 = &vc.points[0];
                let point_2 = &vc.points[1];

                let rn_1a = cross(&point_1.r_a, &normal);
                let rn_1b = cross(&point_1.r_b, &normal);
                let rn_2a = cross(&point_2.r_a, &normal);
                let rn_2b = cross(&point_2.r_b, &normal);

                let BodyPairMasses { m_a, m_b, i_a, i_b } = masses;

                let k11 = m_a + m_b + i_a * rn_1a * rn_1a + i_b * rn_1b * rn_1b;
                let k22 = m_a + m_b + i_a * rn_2a * rn_2a + i_b * rn_2b * rn_2b;
                let k12 = m_a + m_b + i_a * rn_1a * rn_2a + i_b * rn_1b * rn_2b;

                match try_invert_block_matrix(k11, k12, k22) {
                    Some((k, normal_mass)) => {
                        vc.k = k;
                        vc.normal_mass = normal_mass;
                    }
                    None => {
                        // The constraints are redundant, so just use one
                        vc.point_count = 1;
                    }
                }
            }
        }
    }

    /// Performs one sequential impulse iteration over all contacts, updating
    /// the body velocities in place.
    pub fn solve_velocity_constraints(&mut self, velocities: &mut [SolverVelocity]) {
        for vc in &mut self.velocity_constraints {
            let masses = vc.masses();
            let normal = vc.normal;
            let tangent = cross_vector_scalar(&normal, 1.0);
            let friction = vc.friction;
            let tangent_speed = vc.tangent_speed;
            let point_count = vc.point_count;

            let mut v_a = velocities[vc.index_a];
            let mut v_b = velocities[vc.index_b];

            // Solve tangent constraints first because non-penetration is more
            // important than friction
            for point in &mut vc.points[..point_count] {
                let dv = relative_velocity(&v_a, &v_b, &point.r_a, &point.r_b);

                let vt = dv.dot(&tangent) - tangent_speed;
                let lambda = point.tangent_mass * (-vt);

                // Clamp the accumulated force
                let max_friction = friction * point.normal_impulse;
                let new_impulse =
                    (point.tangent_impulse + lambda).clamp(-max_friction, max_friction);
                let lambda = new_impulse - point.tangent_impulse;
                point.tangent_impulse = new_impulse;

                let p = lambda * tangent;
                apply_impulse(&mut v_a, &mut v_b, &masses, &point.r_a, &point.r_b, &p);
            }

            if point_count == 1 {
                let point = &mut vc.points[0];
                let dv = relative_velocity(&v_a, &v_b, &point.r_a, &point.r_b);

                let vn = dv.dot(&normal);
                let lambda = -point.normal_mass * (vn - point.velocity_bias);

                // Clamp the accumulated impulse
                let new_impulse = (point.normal_impulse + lambda).max(0.0);
                let lambda = new_impulse - point.normal_impulse;
                point.normal_impulse = new_impulse;

                let p = lambda * normal;
                apply_impulse(&mut v_a, &mut v_b, &masses, &point.r_a, &point.r_b, &p);
            } else {
                // Block solver for the two-point manifold, following
                // Erin Catto's total enumeration of the LCP cases
                let [point_1, point_2] = &mut vc.points;

                let accumulated = Vector2::new(point_1.normal_impulse, point_2.normal_impulse);

                let dv_1 = relative_velocity(&v_a, &v_b, &point_1.r_a, &point_1.r_b);
                let dv_2 = relative_velocity(&v_a, &v_b, &point_2.r_a, &point_2.r_b);

                let b = Vector2::new(
                    dv_1.dot(&normal) - point_1.velocity_bias,
                    dv_2.dot(&normal) - point_2.velocity_bias,
                ) - vc.k * accumulated;

                match solve_two_point_lcp(
                    &vc.k,
                    &vc.normal_mass,
                    point_1.normal_mass,
                    point_2.normal_mass,
                    &b,
                ) {
                    Some(x) => {
                        let d = x - accumulated;
                        let p_1 = d.x * normal;
                        let p_2 = d.y * normal;
                        apply_impulse(&mut v_a, &mut v_b, &masses, &point_1.r_a, &point_1.r_b, &p_1);
                        apply_impulse(&mut v_a, &mut v_b, &masses, &point_2.r_a, &point_2.r_b, &p_2);

                        point_1.normal_impulse = x.x;
                        point_2.normal_impulse = x.y;
                    }
                    None => {
                        trace!(
                            "No consistent block solution for contact {}, leaving impulses unchanged",
                            vc.contact_index
                        );
                    }
                }
            }

            velocities[vc.index_a] = v_a;
            velocities[vc.index_b] = v_b;
        }
    }

    /// Writes the accumulated impulses back to the manifolds of the contacts
    /// for warm starting the next step.
    ///
    /// # Panics
    /// If `contacts` is not the slice that was passed to [`Self::init`].
    pub fn store_impulses(&self, contacts: &mut [Contact]) {
        for vc in &self.velocity_constraints {
            let manifold = contacts[vc.contact_index].manifold_mut();
            for (manifold_point, point) in manifold.points_mut().iter_mut().zip(vc.active_points())
            {
                manifold_point.normal_impulse = point.normal_impulse;
                manifold_point.tangent_impulse = point.tangent_impulse;
            }
        }
    }

    /// Performs one sequential position correction iteration over all
    /// contacts. Returns whether the largest penetration is within
    /// tolerance.
    pub fn solve_position_constraints(&self, positions: &mut [SolverPosition]) -> bool {
        let min_separation = self.solve_positions(positions, BAUMGARTE, |pc| {
            BodyPairMasses {
                m_a: pc.inverse_mass_a,
                m_b: pc.inverse_mass_b,
                i_a: pc.inverse_inertia_a,
                i_b: pc.inverse_inertia_b,
            }
        });

        // We can't expect min_separation >= -LINEAR_SLOP because we don't
        // push the separation above -LINEAR_SLOP
        min_separation >= -3.0 * LINEAR_SLOP
    }

    /// Like [`Self::solve_position_constraints`], but only the two bodies
    /// with the given island indices are moved. This is used for resolving a
    /// time of impact event.
    pub fn solve_toi_position_constraints(
        &self,
        positions: &mut [SolverPosition],
        toi_index_a: usize,
        toi_index_b: usize,
    ) -> bool {
        let is_toi_body = |index| index == toi_index_a || index == toi_index_b;

        let min_separation = self.solve_positions(positions, TOI_BAUMGARTE, |pc| {
            let (m_a, i_a) = if is_toi_body(pc.index_a) {
                (pc.inverse_mass_a, pc.inverse_inertia_a)
            } else {
                (0.0, 0.0)
            };
            let (m_b, i_b) = if is_toi_body(pc.index_b) {
                (pc.inverse_mass_b, pc.inverse_inertia_b)
            } else {
                (0.0, 0.0)
            };
            BodyPairMasses { m_a, m_b, i_a, i_b }
        });

        min_separation >= -1.5 * LINEAR_SLOP
    }

    /// Runs one position correction pass and returns the smallest separation
    /// encountered (never positive).
    fn solve_positions(
        &self,
        positions: &mut [SolverPosition],
        baumgarte: fph,
        masses_for: impl Fn(&ContactPositionConstraint) -> BodyPairMasses,
    ) -> fph {
        let mut min_separation: fph = 0.0;

        for pc in &self.position_constraints {
            let masses = masses_for(pc);

            let SolverPosition {
                c: mut c_a,
                a: mut a_a,
            } = positions[pc.index_a];
            let SolverPosition {
                c: mut c_b,
                a: mut a_b,
            } = positions[pc.index_b];

            for point_index in 0..pc.point_count {
                let transform_a = math::body_transform(&c_a, a_a, &pc.local_center_a);
                let transform_b = math::body_transform(&c_b, a_b, &pc.local_center_b);

                let PositionSolverManifold {
                    normal,
                    point,
                    separation,
                } = PositionSolverManifold::new(pc, &transform_a, &transform_b, point_index);

                let r_a = point - c_a;
                let r_b = point - c_b;

                // Track max constraint error
                min_separation = min_separation.min(separation);

                // Prevent large corrections and allow slop
                let c = (baumgarte * (separation + LINEAR_SLOP)).clamp(-MAX_LINEAR_CORRECTION, 0.0);

                let k = masses.effective_mass_denominator(&r_a, &r_b, &normal);
                let impulse = if k > 0.0 { -c / k } else { 0.0 };

                let p = impulse * normal;

                c_a -= masses.m_a * p;
                a_a -= masses.i_a * cross(&r_a, &p);

                c_b += masses.m_b * p;
                a_b += masses.i_b * cross(&r_b, &p);
            }

            positions[pc.index_a] = SolverPosition { c: c_a, a: a_a };
            positions[pc.index_b] = SolverPosition { c: c_b, a: a_b };
        }

        min_separation
    }

    /// Makes sure the constraint storage can hold `count` constraints,
    /// growing it to at least twice its current capacity if not.
    fn ensure_capacity(&mut self, count: usize) {
        let capacity = self.velocity_constraints.capacity();
        if count <= capacity {
            return;
        }
        let new_capacity = count.max(2 * capacity).max(MIN_CONSTRAINT_CAPACITY);

        debug!(
            "Growing contact constraint storage from {} to {} constraints",
            capacity, new_capacity
        );

        self.velocity_constraints.clear();
        self.position_constraints.clear();
        self.velocity_constraints.reserve_exact(new_capacity);
        self.position_constraints.reserve_exact(new_capacity);
    }
}

impl Default for ContactSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl VelocityConstraintPoint {
    fn zeroed() -> Self {
        Self {
            r_a: Vector2::zeros(),
            r_b: Vector2::zeros(),
            normal_impulse: 0.0,
            tangent_impulse: 0.0,
            normal_mass: 0.0,
            tangent_mass: 0.0,
            velocity_bias: 0.0,
        }
    }

    /// Anchor of the point relative to the center of mass of body A.
    pub fn r_a(&self) -> &Vector2<fph> {
        &self.r_a
    }

    /// Anchor of the point relative to the center of mass of body B.
    pub fn r_b(&self) -> &Vector2<fph> {
        &self.r_b
    }

    /// Accumulated impulse along the contact normal.
    pub fn normal_impulse(&self) -> fph {
        self.normal_impulse
    }

    /// Accumulated friction impulse along the contact tangent.
    pub fn tangent_impulse(&self) -> fph {
        self.tangent_impulse
    }

    /// Effective mass of the point along the contact normal.
    pub fn normal_mass(&self) -> fph {
        self.normal_mass
    }

    /// Effective mass of the point along the contact tangent.
    pub fn tangent_mass(&self) -> fph {
        self.tangent_mass
    }

    /// Target normal velocity from restitution. Zero unless the approach
    /// speed exceeded the velocity threshold when the step began.
    pub fn velocity_bias(&self) -> fph {
        self.velocity_bias
    }
}

impl ContactVelocityConstraint {
    /// The number of points being solved. This may be lower than the number
    /// of points in the manifold if the two points were found to be
    /// redundant.
    pub fn point_count(&self) -> usize {
        self.point_count
    }

    /// The points currently being solved.
    pub fn active_points(&self) -> &[VelocityConstraintPoint] {
        &self.points[..self.point_count]
    }

    /// The world space contact normal, pointing from body A to body B.
    pub fn normal(&self) -> &Direction {
        &self.normal
    }

    /// The coupling matrix of the two normal constraints (zero unless the
    /// block solver is used).
    pub fn k(&self) -> &Matrix2<fph> {
        &self.k
    }

    /// The inverse of [`Self::k`].
    pub fn normal_mass(&self) -> &Matrix2<fph> {
        &self.normal_mass
    }

    /// The index of the contact this constraint was created from, in the
    /// slice passed to [`ContactSolver::init`].
    pub fn contact_index(&self) -> usize {
        self.contact_index
    }

    fn masses(&self) -> BodyPairMasses {
        BodyPairMasses {
            m_a: self.inverse_mass_a,
            m_b: self.inverse_mass_b,
            i_a: self.inverse_inertia_a,
            i_b: self.inverse_inertia_b,
        }
    }
}

impl PositionSolverManifold {
    fn new(
        pc: &ContactPositionConstraint,
        transform_a: &Transform,
        transform_b: &Transform,
        point_index: usize,
    ) -> Self {
        match pc.manifold_type {
            ManifoldType::Circles => {
                let point_a = math::transform_point(transform_a, &pc.local_point);
                let point_b = math::transform_point(transform_b, &pc.local_points[0]);
                let mut normal = point_b - point_a;
                math::normalize_and_get_length(&mut normal);
                Self {
                    normal,
                    point: 0.5 * (point_a + point_b),
                    separation: (point_b - point_a).dot(&normal) - pc.radius_a - pc.radius_b,
                }
            }
            ManifoldType::FaceA => {
                let normal = transform_a.rotation * pc.local_normal;
                let plane_point = math::transform_point(transform_a, &pc.local_point);
                let clip_point = math::transform_point(transform_b, &pc.local_points[point_index]);
                Self {
                    normal,
                    point: clip_point,
                    separation: (clip_point - plane_point).dot(&normal)
                        - pc.radius_a
                        - pc.radius_b,
                }
            }
            ManifoldType::FaceB => {
                let normal = transform_b.rotation * pc.local_normal;
                let plane_point = math::transform_point(transform_b, &pc.local_point);
                let clip_point = math::transform_point(transform_a, &pc.local_points[point_index]);
                Self {
                    // Ensure normal points from A to B
                    normal: -normal,
                    point: clip_point,
                    separation: (clip_point - plane_point).dot(&normal)
                        - pc.radius_a
                        - pc.radius_b,
                }
            }
        }
    }
}

impl BodyPairMasses {
    /// `mA + mB + iA (rA × d)² + iB (rB × d)²` for constraint direction `d`.
    fn effective_mass_denominator(
        &self,
        r_a: &Vector2<fph>,
        r_b: &Vector2<fph>,
        direction: &Direction,
    ) -> fph {
        let rd_a = cross(r_a, direction);
        let rd_b = cross(r_b, direction);
        self.m_a + self.m_b + self.i_a * rd_a * rd_a + self.i_b * rd_b * rd_b
    }

    /// The effective mass along the given direction, or zero if it is
    /// undefined.
    fn effective_mass(&self, r_a: &Vector2<fph>, r_b: &Vector2<fph>, direction: &Direction) -> fph {
        let k = self.effective_mass_denominator(r_a, r_b, direction);
        if k > 0.0 { 1.0 / k } else { 0.0 }
    }
}

/// The velocity of the contact point on body B relative to that on body A.
#[inline]
fn relative_velocity(
    v_a: &SolverVelocity,
    v_b: &SolverVelocity,
    r_a: &Vector2<fph>,
    r_b: &Vector2<fph>,
) -> Vector2<fph> {
    v_b.v + cross_scalar_vector(v_b.w, r_b) - v_a.v - cross_scalar_vector(v_a.w, r_a)
}

/// Applies `-p` to body A and `p` to body B at the given anchors.
#[inline]
fn apply_impulse(
    v_a: &mut SolverVelocity,
    v_b: &mut SolverVelocity,
    masses: &BodyPairMasses,
    r_a: &Vector2<fph>,
    r_b: &Vector2<fph>,
    p: &Impulse,
) {
    v_a.v -= masses.m_a * p;
    v_a.w -= masses.i_a * cross(r_a, p);
    v_b.v += masses.m_b * p;
    v_b.w += masses.i_b * cross(r_b, p);
}

/// Builds the symmetric 2x2 coupling matrix of a two-point contact and its
/// inverse, provided the matrix is well conditioned (`k11² < 100 det(K)`).
/// Returns [`None`] otherwise.
pub fn try_invert_block_matrix(
    k11: fph,
    k12: fph,
    k22: fph,
) -> Option<(Matrix2<fph>, Matrix2<fph>)> {
    if k11 * k11 < MAX_CONDITION_NUMBER * (k11 * k22 - k12 * k12) {
        let k = Matrix2::new(k11, k12, k12, k22);
        let normal_mass = math::invert_or_zero(&k);
        Some((k, normal_mass))
    } else {
        None
    }
}

/// Solves the mixed linear complementarity problem for the total normal
/// impulses `x` of a two-point contact, by trying each combination of active
/// points in turn:
///
/// `vn = K x + b`, with `vn ≥ 0`, `x ≥ 0` and `vn_i x_i = 0`,
///
/// where `b = vn0 - velocity_bias - K a` has already been shifted by the
/// accumulated impulses `a`. Returns [`None`] if no case is consistent.
fn solve_two_point_lcp(
    k: &Matrix2<fph>,
    normal_mass: &Matrix2<fph>,
    normal_mass_1: fph,
    normal_mass_2: fph,
    b: &Vector2<fph>,
) -> Option<Vector2<fph>> {
    // Case 1: both points active, vn = 0
    let x = -(normal_mass * b);
    if x.x >= 0.0 && x.y >= 0.0 {
        return Some(x);
    }

    // Case 2: point 1 active, x2 = 0 and vn1 = 0
    let x = Vector2::new(-normal_mass_1 * b.x, 0.0);
    let vn_2 = k[(1, 0)] * x.x + b.y;
    if x.x >= 0.0 && vn_2 >= 0.0 {
        return Some(x);
    }

    // Case 3: point 2 active, x1 = 0 and vn2 = 0
    let x = Vector2::new(0.0, -normal_mass_2 * b.y);
    let vn_1 = k[(0, 1)] * x.y + b.x;
    if x.y >= 0.0 && vn_1 >= 0.0 {
        return Some(x);
    }

    // Case 4: no points active, x = 0
    if b.x >= 0.0 && b.y >= 0.0 {
        return Some(Vector2::zeros());
    }

    None
}

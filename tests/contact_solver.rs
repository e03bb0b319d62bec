//! Contact constraint solving tests.

use approx::assert_abs_diff_eq;
use impact_planar::{
    body::{BodyDef, BodyID, BodyManager, BodyType, MassData},
    collision::{ContactID, ContactFeatureType, Manifold, ManifoldPoint, ManifoldType},
    contact::{Contact, ContactShape, solver::ContactSolver},
    fph,
    quantities::Position,
    settings::{LINEAR_SLOP, VELOCITY_THRESHOLD},
    step::{SolverPosition, SolverVelocity, TimeStep},
};
use nalgebra::Vector2;

const DT: fph = 1.0 / 60.0;
const GRAVITY: fph = 10.0;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn shape(body: BodyID, radius: fph) -> ContactShape {
    ContactShape {
        body,
        radius,
        friction: 0.3,
        restitution: 0.0,
    }
}

/// A unit box resting on the horizontal ground, with its center at the
/// given height.
fn box_on_ground(center_height: fph, fixed_rotation: bool) -> (BodyManager, BodyID, BodyID) {
    let mut bodies = BodyManager::new();
    let ground = bodies.add_body(&BodyDef::default());
    let block = bodies
        .add_dynamic_body(
            &BodyDef {
                body_type: BodyType::Dynamic,
                position: Vector2::new(0.0, center_height),
                fixed_rotation,
                ..Default::default()
            },
            &MassData {
                mass: 1.0,
                center: Position::zeros(),
                rotational_inertia: 1.0 / 6.0,
            },
        )
        .unwrap();
    bodies.assign_island_indices();
    (bodies, ground, block)
}

/// A face manifold of the ground's top face against the given bottom
/// points of the box, in the box frame.
fn ground_manifold(box_points: &[Position]) -> Manifold {
    let mut manifold = Manifold::new(ManifoldType::FaceA, Vector2::new(0.0, 1.0), Position::zeros());
    for (idx, point) in box_points.iter().enumerate() {
        let id = ContactID::new(
            0,
            u8::try_from(idx).unwrap(),
            ContactFeatureType::Face,
            ContactFeatureType::Vertex,
        );
        manifold.add_point(ManifoldPoint::new(*point, id));
    }
    manifold
}

fn resting_box_contact(ground: BodyID, block: BodyID, box_points: &[Position]) -> Contact {
    Contact::with_manifold(&shape(ground, 0.0), &shape(block, 0.0), ground_manifold(box_points))
}

/// Runs the velocity phase of a step and returns the resulting velocities.
fn solve_velocities(
    solver: &mut ContactSolver,
    step: &TimeStep,
    contacts: &[Contact],
    bodies: &BodyManager,
    positions: &[SolverPosition],
    mut velocities: Vec<SolverVelocity>,
) -> Vec<SolverVelocity> {
    solver.init(step, contacts, bodies);
    solver.initialize_velocity_constraints(contacts, positions, &velocities);
    if step.warm_starting {
        solver.warm_start(&mut velocities);
    }
    for _ in 0..step.velocity_iterations {
        solver.solve_velocity_constraints(&mut velocities);
    }
    velocities
}

#[test]
fn impulses_are_not_seeded_without_warm_starting() {
    init_logging();

    let (bodies, ground, block) = box_on_ground(0.5, false);
    let mut contact = resting_box_contact(
        ground,
        block,
        &[Vector2::new(-0.5, -0.5), Vector2::new(0.5, -0.5)],
    );
    for point in contact.manifold_mut().points_mut() {
        point.normal_impulse = 5.0;
        point.tangent_impulse = -2.0;
    }

    let mut solver = ContactSolver::new();
    let step = TimeStep::new(DT, 0.0, 8, 3, false);
    let (positions, velocities) = bodies.solver_states();
    solver.init(&step, &[contact.clone()], &bodies);
    solver.initialize_velocity_constraints(&[contact], &positions, &velocities);

    let constraint = &solver.velocity_constraints()[0];
    assert_eq!(constraint.point_count(), 2);
    for point in constraint.active_points() {
        assert_eq!(point.normal_impulse(), 0.0);
        assert_eq!(point.tangent_impulse(), 0.0);
    }
}

#[test]
fn inactive_contacts_are_skipped() {
    init_logging();

    let (bodies, ground, block) = box_on_ground(0.5, false);
    let touching = resting_box_contact(ground, block, &[Vector2::new(0.0, -0.5)]);
    let mut disabled = touching.clone();
    disabled.set_enabled(false);
    let not_touching = Contact::new(&shape(ground, 0.0), &shape(block, 0.0));

    let mut solver = ContactSolver::new();
    let step = TimeStep::new(DT, 0.0, 8, 3, true);
    solver.init(&step, &[disabled, not_touching, touching], &bodies);

    assert_eq!(solver.constraint_count(), 1);
    assert_eq!(solver.velocity_constraints()[0].contact_index(), 2);
    assert!(solver.constraint_capacity() >= 256);
}

#[test]
fn resting_contact_impulse_cancels_gravity_and_is_a_fixed_point() {
    init_logging();

    let (bodies, ground, block) = box_on_ground(0.5, false);
    let mut contacts = vec![resting_box_contact(ground, block, &[Vector2::new(0.0, -0.5)])];

    let (positions, mut velocities) = bodies.solver_states();
    // Gravity integrated over one step
    velocities[1].v.y = -GRAVITY * DT;

    let mut solver = ContactSolver::new();
    let step = TimeStep::new(DT, 0.0, 8, 3, true);
    let solved = solve_velocities(&mut solver, &step, &contacts, &bodies, &positions, velocities.clone());

    let impulse = solver.velocity_constraints()[0].active_points()[0].normal_impulse();
    assert_abs_diff_eq!(impulse, GRAVITY * DT, epsilon = 1e-3);
    assert_abs_diff_eq!(solved[1].v, Vector2::zeros(), epsilon = 1e-3);

    solver.store_impulses(&mut contacts);

    // With the impulse carried over, the next step starts at the solution
    let step = TimeStep::new(DT, 1.0 / DT, 8, 3, true);
    let resolved = solve_velocities(&mut solver, &step, &contacts, &bodies, &positions, velocities);

    let next_impulse = solver.velocity_constraints()[0].active_points()[0].normal_impulse();
    assert_abs_diff_eq!(next_impulse, impulse, epsilon = 1e-3);
    assert_abs_diff_eq!(resolved[1].v, Vector2::zeros(), epsilon = 1e-3);
}

#[test]
fn two_point_contact_shares_the_load_evenly() {
    init_logging();

    let (bodies, ground, block) = box_on_ground(0.5, false);
    let contacts = vec![resting_box_contact(
        ground,
        block,
        &[Vector2::new(-0.5, -0.5), Vector2::new(0.5, -0.5)],
    )];

    let (positions, mut velocities) = bodies.solver_states();
    velocities[1].v.y = -GRAVITY * DT;

    let mut solver = ContactSolver::new();
    let step = TimeStep::new(DT, 0.0, 8, 3, false);
    let solved = solve_velocities(&mut solver, &step, &contacts, &bodies, &positions, velocities);

    let constraint = &solver.velocity_constraints()[0];
    assert_eq!(constraint.point_count(), 2);
    for point in constraint.active_points() {
        assert!(point.normal_impulse() >= 0.0);
        assert_abs_diff_eq!(point.normal_impulse(), 0.5 * GRAVITY * DT, epsilon = 1e-9);
    }
    assert_abs_diff_eq!(solved[1].v, Vector2::zeros(), epsilon = 1e-9);
    assert_abs_diff_eq!(solved[1].w, 0.0, epsilon = 1e-9);
}

#[test]
fn stored_impulses_seed_the_next_step() {
    init_logging();

    let (bodies, ground, block) = box_on_ground(0.5, false);
    let mut contacts = vec![resting_box_contact(
        ground,
        block,
        &[Vector2::new(-0.5, -0.5), Vector2::new(0.5, -0.5)],
    )];

    let (positions, mut velocities) = bodies.solver_states();
    velocities[1].v = Vector2::new(0.5, -GRAVITY * DT);

    let mut solver = ContactSolver::new();
    let step = TimeStep::new(DT, 0.0, 8, 3, true);
    solve_velocities(&mut solver, &step, &contacts, &bodies, &positions, velocities);
    solver.store_impulses(&mut contacts);

    let stored: Vec<(fph, fph)> = solver.velocity_constraints()[0]
        .active_points()
        .iter()
        .map(|point| (point.normal_impulse(), point.tangent_impulse()))
        .collect();
    assert!(stored.iter().any(|&(_, tangent)| tangent != 0.0));

    for (manifold_point, &(normal, tangent)) in contacts[0].manifold().points().iter().zip(&stored) {
        assert_eq!(manifold_point.normal_impulse, normal);
        assert_eq!(manifold_point.tangent_impulse, tangent);
    }

    // Same step duration, so dt_ratio is one
    let step = TimeStep::new(DT, 1.0 / DT, 8, 3, true);
    assert_abs_diff_eq!(step.dt_ratio, 1.0, epsilon = 1e-12);
    solver.init(&step, &contacts, &bodies);

    for (point, &(normal, tangent)) in solver.velocity_constraints()[0]
        .active_points()
        .iter()
        .zip(&stored)
    {
        assert_abs_diff_eq!(point.normal_impulse(), normal, epsilon = 1e-12);
        assert_abs_diff_eq!(point.tangent_impulse(), tangent, epsilon = 1e-12);
    }
}

#[test]
fn redundant_two_point_contact_degrades_to_one_point() {
    init_logging();

    let (bodies, ground, block) = box_on_ground(0.5, false);
    let contacts = vec![resting_box_contact(
        ground,
        block,
        &[Vector2::new(0.0, -0.5), Vector2::new(1e-4, -0.5)],
    )];

    let (positions, velocities) = bodies.solver_states();

    let mut solver = ContactSolver::new();
    let step = TimeStep::new(DT, 0.0, 8, 3, false);
    solver.init(&step, &contacts, &bodies);
    solver.initialize_velocity_constraints(&contacts, &positions, &velocities);

    assert_eq!(contacts[0].manifold().point_count(), 2);
    assert_eq!(solver.velocity_constraints()[0].point_count(), 1);
}

#[test]
fn position_solve_reduces_penetration_monotonically() {
    init_logging();

    let (bodies, ground, block) = box_on_ground(0.4, true);
    let contacts = vec![resting_box_contact(
        ground,
        block,
        &[Vector2::new(-0.5, -0.5), Vector2::new(0.5, -0.5)],
    )];

    let (mut positions, velocities) = bodies.solver_states();

    let mut solver = ContactSolver::new();
    let step = TimeStep::new(DT, 0.0, 8, 3, false);
    solver.init(&step, &contacts, &bodies);
    solver.initialize_velocity_constraints(&contacts, &positions, &velocities);

    let penetration = |positions: &[SolverPosition]| 0.5 - positions[1].c.y;

    let mut previous_penetration = penetration(&positions);
    let mut solved = false;
    for _ in 0..100 {
        solved = solver.solve_position_constraints(&mut positions);

        let current_penetration = penetration(&positions);
        assert!(current_penetration <= previous_penetration);
        previous_penetration = current_penetration;

        if solved {
            break;
        }
    }
    assert!(solved);
    assert!(-penetration(&positions) >= -3.0 * LINEAR_SLOP);
    // The static ground never moves
    assert_eq!(positions[0].c, Vector2::zeros());
}

#[test]
fn fast_approach_bounces_and_friction_saturates() {
    init_logging();

    let (bodies, ground, block) = box_on_ground(0.5, true);
    let mut contact = resting_box_contact(ground, block, &[Vector2::new(0.0, -0.5)]);
    contact.set_restitution(0.5);

    let mut solver = ContactSolver::new();
    let step = TimeStep::new(DT, 0.0, 8, 3, false);
    let (positions, mut velocities) = bodies.solver_states();
    velocities[1].v = Vector2::new(3.0, -4.0);

    let contacts = [contact];
    let velocities = solve_velocities(&mut solver, &step, &contacts, &bodies, &positions, velocities);

    let point = &solver.velocity_constraints()[0].active_points()[0];
    assert_abs_diff_eq!(point.velocity_bias(), 2.0, epsilon = 1e-12);
    assert_abs_diff_eq!(point.normal_impulse(), 6.0, epsilon = 1e-12);

    // Sliding friction is bounded by the friction coefficient times the
    // normal impulse
    assert_abs_diff_eq!(point.tangent_impulse(), -0.3 * 6.0, epsilon = 1e-12);
    assert_abs_diff_eq!(velocities[1].v, Vector2::new(1.2, 2.0), epsilon = 1e-12);
}

#[test]
fn slow_approach_does_not_bounce() {
    init_logging();

    let (bodies, ground, block) = box_on_ground(0.5, true);
    let mut contact = resting_box_contact(ground, block, &[Vector2::new(0.0, -0.5)]);
    contact.set_restitution(0.5);

    let mut solver = ContactSolver::new();
    let step = TimeStep::new(DT, 0.0, 8, 3, false);
    let (positions, mut velocities) = bodies.solver_states();
    let approach_speed = 0.5 * VELOCITY_THRESHOLD;
    velocities[1].v.y = -approach_speed;

    let contacts = [contact];
    let velocities = solve_velocities(&mut solver, &step, &contacts, &bodies, &positions, velocities);

    let point = &solver.velocity_constraints()[0].active_points()[0];
    assert_eq!(point.velocity_bias(), 0.0);
    assert_abs_diff_eq!(point.normal_impulse(), approach_speed, epsilon = 1e-12);
    assert_abs_diff_eq!(velocities[1].v, Vector2::zeros(), epsilon = 1e-12);
}

#[test]
fn tangent_speed_drives_body_along_surface() {
    init_logging();

    let (bodies, ground, block) = box_on_ground(0.5, true);
    let mut contact = resting_box_contact(ground, block, &[Vector2::new(0.0, -0.5)]);
    contact.set_friction(10.0);
    contact.set_tangent_speed(2.0);

    let mut solver = ContactSolver::new();
    let step = TimeStep::new(DT, 0.0, 8, 3, false);
    let (positions, mut velocities) = bodies.solver_states();
    velocities[1].v.y = -0.5;

    let contacts = [contact];
    let velocities = solve_velocities(&mut solver, &step, &contacts, &bodies, &positions, velocities);

    let point = &solver.velocity_constraints()[0].active_points()[0];
    assert_abs_diff_eq!(point.normal_impulse(), 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(point.tangent_impulse(), 2.0, epsilon = 1e-12);
    assert_abs_diff_eq!(velocities[1].v, Vector2::new(2.0, 0.0), epsilon = 1e-12);
}

mod two_circles {
    use super::*;

    fn overlapping_circles() -> (BodyManager, Vec<Contact>) {
        let mut bodies = BodyManager::new();
        let mut add_circle = |x: fph| {
            bodies
                .add_dynamic_body(
                    &BodyDef {
                        body_type: BodyType::Dynamic,
                        position: Vector2::new(x, 0.0),
                        ..Default::default()
                    },
                    &MassData {
                        mass: 1.0,
                        center: Position::zeros(),
                        rotational_inertia: 0.5 * 0.5 * 0.5,
                    },
                )
                .unwrap()
        };
        let a = add_circle(0.0);
        let b = add_circle(0.9);
        bodies.assign_island_indices();

        let contact = Contact::with_manifold(
            &shape(a, 0.5),
            &shape(b, 0.5),
            Manifold::circles(Position::zeros(), Position::zeros()),
        );
        (bodies, vec![contact])
    }

    #[test]
    fn world_manifold_normal_points_along_x() {
        let (bodies, contacts) = overlapping_circles();
        let world_manifold = contacts[0].world_manifold(&bodies);
        assert_abs_diff_eq!(*world_manifold.normal(), Vector2::new(1.0, 0.0), epsilon = 1e-12);
        assert_abs_diff_eq!(world_manifold.points()[0], Vector2::new(0.45, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn approaching_circles_get_separating_normal_impulse() {
        init_logging();

        let (bodies, contacts) = overlapping_circles();
        let (positions, mut velocities) = bodies.solver_states();
        velocities[0].v.x = 0.1;
        velocities[1].v.x = -0.1;

        let mut solver = ContactSolver::new();
        let step = TimeStep::new(DT, 0.0, 8, 3, true);
        solver.init(&step, &contacts, &bodies);
        solver.initialize_velocity_constraints(&contacts, &positions, &velocities);
        solver.warm_start(&mut velocities);
        solver.solve_velocity_constraints(&mut velocities);

        let constraint = &solver.velocity_constraints()[0];
        assert_abs_diff_eq!(*constraint.normal(), Vector2::new(1.0, 0.0), epsilon = 1e-12);

        let point = &constraint.active_points()[0];
        assert!(point.normal_impulse() > 0.0);
        assert_abs_diff_eq!(point.normal_impulse(), 0.1, epsilon = 1e-12);
        assert_eq!(point.tangent_impulse(), 0.0);

        assert_abs_diff_eq!(velocities[0].v, Vector2::zeros(), epsilon = 1e-12);
        assert_abs_diff_eq!(velocities[1].v, Vector2::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn resting_circles_are_pushed_apart_by_position_solve() {
        init_logging();

        let (bodies, contacts) = overlapping_circles();
        let (mut positions, velocities) = bodies.solver_states();

        let mut solver = ContactSolver::new();
        let step = TimeStep::new(DT, 0.0, 8, 3, true);
        solver.init(&step, &contacts, &bodies);
        solver.initialize_velocity_constraints(&contacts, &positions, &velocities);

        let mut solved = false;
        for _ in 0..100 {
            solved = solver.solve_position_constraints(&mut positions);
            if solved {
                break;
            }
        }
        assert!(solved);
        assert!(positions[0].c.x < 0.0);
        assert!(positions[1].c.x > 0.9);
        assert_abs_diff_eq!(positions[0].c.x + positions[1].c.x, 0.9, epsilon = 1e-12);
    }
}

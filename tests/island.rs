//! Island stepping tests.

use approx::assert_abs_diff_eq;
use impact_planar::{
    body::{BodyDef, BodyID, BodyManager, BodyType, MassData},
    collision::{ContactFeatureType, ContactID, Manifold, ManifoldPoint, ManifoldType},
    contact::{Contact, ContactShape},
    fph,
    island::{IslandSolver, IslandSolverConfig},
    joint::{JointDef, JointManager, distance::DistanceJointDef},
    quantities::Position,
    settings::LINEAR_SLOP,
};
use nalgebra::Vector2;

const DT: fph = 1.0 / 60.0;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn add_body(bodies: &mut BodyManager, position: Position, mass_data: &MassData) -> BodyID {
    bodies
        .add_dynamic_body(
            &BodyDef {
                body_type: BodyType::Dynamic,
                position,
                ..Default::default()
            },
            mass_data,
        )
        .unwrap()
}

fn unit_box_mass() -> MassData {
    MassData {
        mass: 1.0,
        center: Position::zeros(),
        rotational_inertia: 1.0 / 6.0,
    }
}

fn ground_contact(ground: BodyID, body: BodyID, radius: fph, body_points: &[Position]) -> Contact {
    let mut manifold = Manifold::new(ManifoldType::FaceA, Vector2::new(0.0, 1.0), Position::zeros());
    for (idx, point) in body_points.iter().enumerate() {
        manifold.add_point(ManifoldPoint::new(
            *point,
            ContactID::new(
                0,
                u8::try_from(idx).unwrap(),
                ContactFeatureType::Face,
                ContactFeatureType::Vertex,
            ),
        ));
    }
    let shape = |body, radius| ContactShape {
        body,
        radius,
        friction: 0.6,
        restitution: 0.0,
    };
    Contact::with_manifold(&shape(ground, 0.0), &shape(body, radius), manifold)
}

#[test]
fn box_rests_on_ground() {
    init_logging();

    let mut bodies = BodyManager::new();
    let ground = bodies.add_body(&BodyDef::default());
    let block = add_body(&mut bodies, Vector2::new(0.0, 0.5), &unit_box_mass());

    let mut contacts = vec![ground_contact(
        ground,
        block,
        0.0,
        &[Vector2::new(-0.5, -0.5), Vector2::new(0.5, -0.5)],
    )];
    let mut joints = JointManager::new();
    let mut solver = IslandSolver::new(IslandSolverConfig::default()).unwrap();

    for _ in 0..120 {
        assert!(solver.solve(DT, &mut bodies, &mut contacts, &mut joints).unwrap());
    }

    let block = bodies.body(block);
    assert_abs_diff_eq!(*block.center(), Vector2::new(0.0, 0.5), epsilon = 1e-6);
    assert_abs_diff_eq!(block.angle(), 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(*block.linear_velocity(), Vector2::zeros(), epsilon = 1e-6);

    // The stored impulses carry the weight of the box
    let total_impulse: fph = contacts[0]
        .manifold()
        .points()
        .iter()
        .map(|point| point.normal_impulse)
        .sum();
    assert_abs_diff_eq!(total_impulse, 10.0 * DT, epsilon = 1e-6);
}

#[test]
fn warm_started_resting_contact_needs_no_correction() {
    init_logging();

    let mut bodies = BodyManager::new();
    let ground = bodies.add_body(&BodyDef::default());
    let block = add_body(&mut bodies, Vector2::new(0.0, 0.5), &unit_box_mass());

    let mut contacts = vec![ground_contact(ground, block, 0.0, &[Vector2::new(0.0, -0.5)])];
    let mut joints = JointManager::new();
    let mut solver = IslandSolver::new(IslandSolverConfig {
        velocity_iterations: 1,
        ..Default::default()
    })
    .unwrap();

    solver.solve(DT, &mut bodies, &mut contacts, &mut joints).unwrap();
    let first_impulse = contacts[0].manifold().points()[0].normal_impulse;

    solver.solve(DT, &mut bodies, &mut contacts, &mut joints).unwrap();
    let second_impulse = contacts[0].manifold().points()[0].normal_impulse;

    assert_abs_diff_eq!(first_impulse, 10.0 * DT, epsilon = 1e-9);
    assert_abs_diff_eq!(second_impulse, first_impulse, epsilon = 1e-9);
    assert_abs_diff_eq!(bodies.body(block).center().y, 0.5, epsilon = 1e-9);
}

#[test]
fn pendulum_keeps_its_length() {
    init_logging();

    let mut bodies = BodyManager::new();
    let pivot = bodies.add_body(&BodyDef::default());
    let bob = add_body(
        &mut bodies,
        Vector2::new(1.0, 0.0),
        &MassData::for_disk(1.0, 0.1, Position::zeros()),
    );

    let mut joints = JointManager::new();
    joints
        .create_joint(
            &bodies,
            &JointDef::Distance(DistanceJointDef::from_world_anchors(
                &bodies,
                pivot,
                bob,
                &Vector2::zeros(),
                &Vector2::new(1.0, 0.0),
            )),
        )
        .unwrap();

    let mut solver = IslandSolver::new(IslandSolverConfig::default()).unwrap();

    // Roughly a quarter swing, ending near the bottom
    for _ in 0..30 {
        solver.solve(DT, &mut bodies, &mut [], &mut joints).unwrap();
        let length = bodies.body(bob).center().norm();
        assert_abs_diff_eq!(length, 1.0, epsilon = 1e-2);
    }

    let bob = bodies.body(bob);
    assert!(bob.center().y < -0.5);
    assert_eq!(*bodies.body(pivot).center(), Vector2::zeros());
}

#[test]
fn time_of_impact_resolves_overlap_of_impact_bodies() {
    init_logging();

    let mut bodies = BodyManager::new();
    let ground = bodies.add_body(&BodyDef::default());
    let ball = add_body(
        &mut bodies,
        Vector2::new(0.0, 0.4),
        &MassData::for_disk(1.0, 0.5, Position::zeros()),
    );

    let mut contacts = vec![ground_contact(ground, ball, 0.5, &[Position::zeros()])];
    let mut solver = IslandSolver::new(IslandSolverConfig::default()).unwrap();

    assert!(
        solver
            .solve_toi(DT, &mut bodies, &mut contacts, ground, ball)
            .unwrap()
    );

    let separation = bodies.body(ball).center().y - 0.5;
    assert!(separation >= -1.5 * LINEAR_SLOP);
    assert_eq!(*bodies.body(ground).center(), Vector2::zeros());
}

#[test]
fn time_of_impact_leaves_other_bodies_in_place() {
    init_logging();

    let mut bodies = BodyManager::new();
    let ground = bodies.add_body(&BodyDef::default());
    let disk = MassData::for_disk(1.0, 0.5, Position::zeros());
    let ball = add_body(&mut bodies, Vector2::new(0.0, 0.4), &disk);
    let bystander = add_body(&mut bodies, Vector2::new(5.0, 0.4), &disk);

    let mut contacts = vec![
        ground_contact(ground, ball, 0.5, &[Position::zeros()]),
        ground_contact(ground, bystander, 0.5, &[Position::zeros()]),
    ];
    let mut solver = IslandSolver::new(IslandSolverConfig::default()).unwrap();

    solver
        .solve_toi(DT, &mut bodies, &mut contacts, ground, ball)
        .unwrap();

    assert!(bodies.body(ball).center().y - 0.5 >= -1.5 * LINEAR_SLOP);
    assert_abs_diff_eq!(*bodies.body(bystander).center(), Vector2::new(5.0, 0.4), epsilon = 1e-12);
}

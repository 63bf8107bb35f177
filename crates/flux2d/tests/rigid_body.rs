//! Rigid bodies coupled to the pressure solve.

mod common;

use flux2d::engine::{RigidBodyKind, World};
use flux2d::renderer::{Device, Ellipse, Rectangle, Shape, Transform};
use flux2d::WorldConfig;
use glam::{UVec2, Vec2};

const SIZE: u32 = 32;

fn world(device: &Device, liquid: bool) -> World {
    let mut world = World::new(device, &WorldConfig::new(SIZE, SIZE));
    if liquid {
        let mut fill = Rectangle::new(device, Vec2::splat(4.0 * SIZE as f32));
        fill.set_transform(Transform::new(Vec2::splat(SIZE as f32 * 0.5), 0.0));
        world.draw_liquid(&fill);
    }
    world
}

#[test]
fn test_body_level_set_follows_centre() {
    let Some(device) = common::device() else { return };
    let mut world = world(&device, false);
    let id = world.create_rigid_body(
        Box::new(Ellipse::circle(&device, 4.0)),
        Vec2::new(10.0, 20.0),
        RigidBodyKind::Static,
    );

    let size = UVec2::splat(SIZE);
    let body = world.rigid_body(id);
    assert_eq!(body.shape().transform().position, Vec2::new(10.0, 20.0));
    let phi = body.phi().copy_to::<f32>().unwrap();
    assert!(phi[common::index(size, 10, 20)] < 0.0);
    assert!(phi[common::index(size, 25, 5)] > 0.0);

    // Static bodies are part of the solid from creation.
    let solid = world.static_solid_phi().copy_to::<f32>().unwrap();
    assert!(solid[common::index(size, 10, 20)] < 0.0);
}

#[test]
fn test_body_in_air_feels_no_force() {
    let Some(device) = common::device() else { return };
    let mut world = world(&device, false);
    let id = world.create_rigid_body(
        Box::new(Ellipse::circle(&device, 5.0)),
        Vec2::splat(16.0),
        RigidBodyKind::Static,
    );

    world.step().unwrap();
    let forces = world.rigid_body_mut(id).forces().unwrap();
    assert_eq!(forces.force, Vec2::ZERO);
    assert_eq!(forces.torque, 0.0);
}

/// A body pushed through still liquid is resisted by the pressure it builds.
#[test]
fn test_moving_body_is_resisted() {
    let Some(device) = common::device() else { return };
    let mut world = world(&device, true);
    let id = world.create_rigid_body(
        Box::new(Ellipse::circle(&device, 4.0)),
        Vec2::splat(16.0),
        RigidBodyKind::Dynamic,
    );
    world.rigid_body_mut(id).set_velocities(Vec2::new(1.0, 0.0), 0.0);

    let params = world.step().unwrap();
    assert!(params.out_iterations > 0);
    let forces = world.rigid_body_mut(id).forces().unwrap();
    assert!(forces.force.x < 0.0, "force {:?}", forces.force);
    assert!(
        forces.force.y.abs() < 0.1 * forces.force.x.abs(),
        "force {:?}",
        forces.force
    );

    // Moving the body re-records its passes; the next step still runs.
    world.rigid_body_mut(id).update_position(Vec2::new(17.0, 16.0), 0.0);
    world.step().unwrap();
    let moved = world.rigid_body_mut(id).forces().unwrap();
    assert_eq!(world.rigid_body(id).centre(), Vec2::new(17.0, 16.0));
    assert!(moved.force.x < 0.0, "force {:?}", moved.force);
}

/// A finite mass adds the body's inertia to the diagonal next to it.
#[test]
fn test_finite_mass_stiffens_diagonal() {
    let Some(device) = common::device() else { return };
    let size = UVec2::splat(SIZE);
    // Centre (20.5, 16.5) is outside the circle, its left neighbour inside.
    let cell = common::index(size, 20, 16);

    let mut diagonals = Vec::new();
    for mass in [f32::INFINITY, 1.0] {
        let mut world = world(&device, true);
        let id = world.create_rigid_body(
            Box::new(Ellipse::circle(&device, 4.0)),
            Vec2::splat(16.0),
            RigidBodyKind::Dynamic,
        );
        world.rigid_body_mut(id).set_mass(mass, mass * 10.0);
        world.step().unwrap();
        diagonals.push(world.data().diagonal.copy_to::<f32>().unwrap()[cell]);
    }

    let (heavy, light) = (diagonals[0], diagonals[1]);
    assert!(heavy > 0.0);
    assert!(light > heavy + 1e-3, "diagonal {heavy} -> {light}");
}

/// Faces inside a moving body carry the body's normal velocity after a step.
#[test]
fn test_constrain_imposes_body_velocity_on_covered_faces() {
    let Some(device) = common::device() else { return };
    let mut world = world(&device, true);
    // Centred on cell (16, 16): the faces on row 16 and column 16 have
    // axis-aligned normals.
    let id = world.create_rigid_body(
        Box::new(Ellipse::circle(&device, 4.0)),
        Vec2::splat(16.5),
        RigidBodyKind::Dynamic,
    );
    world.rigid_body_mut(id).set_velocities(Vec2::new(2.0, -1.0), 0.0);

    world.step().unwrap();

    let size = UVec2::splat(SIZE);
    let velocity = world.velocity().field().copy_to::<[f32; 2]>().unwrap();
    for k in 14..=19 {
        let [u, _] = velocity[common::index(size, k, 16)];
        assert!((u - 2.0).abs() < 1e-4, "u face ({k}, 16) = {u}");
        let [_, v] = velocity[common::index(size, 16, k)];
        assert!((v + 1.0).abs() < 1e-4, "v face (16, {k}) = {v}");
    }
}

/// A spinning plank is braked by the liquid: the torque opposes the spin.
#[test]
fn test_spinning_body_feels_opposing_torque() {
    let Some(device) = common::device() else { return };

    let mut torques = Vec::new();
    for angular_velocity in [1.0f32, -1.0] {
        let mut world = world(&device, true);
        let id = world.create_rigid_body(
            Box::new(Rectangle::new(&device, Vec2::new(12.0, 3.0))),
            Vec2::splat(16.0),
            RigidBodyKind::Dynamic,
        );
        world.rigid_body_mut(id).set_velocities(Vec2::ZERO, angular_velocity);
        world.step().unwrap();
        torques.push(world.rigid_body_mut(id).forces().unwrap().torque);
    }

    let (ccw, cw) = (torques[0], torques[1]);
    assert!(ccw < 0.0, "torque {ccw} for a counter-clockwise spin");
    assert!(cw > 0.0, "torque {cw} for a clockwise spin");
}

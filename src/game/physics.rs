//! Car handling: tyre grip, drive force and steering torque

use std::f32::consts::TAU;

use rapier2d::na as nalgebra;
use rapier2d::prelude::{vector, Real, RigidBody, Vector};

use crate::config::CarPhysics;

use super::constants::{BRAKE_SPEED_THRESHOLD, SCALE};
use super::player::{Controls, DirectionX, DirectionY};

/// Forward and right unit vectors in body space; sprites face +y
const FORWARD: [Real; 2] = [0.0, 1.0];
const RIGHT: [Real; 2] = [1.0, 0.0];

/// Stateless helpers that push forces into a car body
pub struct DrivePhysics;

impl DrivePhysics {
    fn world_vector(body: &RigidBody, local: [Real; 2]) -> Vector<Real> {
        body.rotation().transform_vector(&vector![local[0], local[1]])
    }

    pub fn forward_speed(body: &RigidBody) -> f32 {
        Self::world_vector(body, FORWARD).dot(body.linvel())
    }

    pub fn lateral_velocity(body: &RigidBody) -> Vector<Real> {
        let right = Self::world_vector(body, RIGHT);
        right * right.dot(body.linvel())
    }

    /// Moment of inertia of the car box about its centre
    fn inertia(body: &RigidBody, physics: &CarPhysics) -> f32 {
        let w = physics.width / SCALE;
        let h = physics.height / SCALE;
        body.mass() * (w * w + h * h) / 12.0
    }

    /// Kill sideways slip (capped so the car can still drift), damp spin and
    /// apply rolling drag along the heading
    pub fn apply_friction(body: &mut RigidBody, physics: &CarPhysics) {
        let mass = body.mass();

        let mut impulse = -Self::lateral_velocity(body) * mass;
        let max_impulse = physics.max_lateral_impulse * mass;
        let len = impulse.norm();
        if len > max_impulse && len > 0.0 {
            impulse *= max_impulse / len;
        }
        body.apply_impulse(impulse, true);

        let angular = physics.angular_friction * Self::inertia(body, physics) * -body.angvel();
        body.apply_torque_impulse(angular, true);

        let forward = Self::world_vector(body, FORWARD);
        let speed = forward.dot(body.linvel());
        body.add_force(forward * (mass * physics.forward_drag_coefficient * speed), true);
    }

    /// Target speed in m/s for the vertical input
    pub fn desired_speed(y: DirectionY, physics: &CarPhysics) -> f32 {
        match y {
            DirectionY::Up => physics.max_speed / SCALE,
            DirectionY::Down => -physics.max_speed * physics.backward_speed_multiplier / SCALE,
            DirectionY::None => 0.0,
        }
    }

    /// Proportional speed controller, clamped to the car's acceleration
    pub fn accel_command(desired: f32, current: f32, physics: &CarPhysics) -> f32 {
        let mut max_accel = physics.max_acceleration / SCALE;
        if desired < 0.0 {
            max_accel *= physics.backward_speed_multiplier;
        }
        ((desired - current) * physics.speed_controller_gain).clamp(-max_accel, max_accel)
    }

    /// Apply drive force and steering torque. Returns whether the car is braking.
    pub fn apply_drive(body: &mut RigidBody, controls: &Controls, physics: &CarPhysics) -> bool {
        let forward = Self::world_vector(body, FORWARD);
        let current = forward.dot(body.linvel());
        let is_stopping = controls.y == DirectionY::Down && current > BRAKE_SPEED_THRESHOLD;

        if controls.y != DirectionY::None {
            let desired = Self::desired_speed(controls.y, physics);
            let command = Self::accel_command(desired, current, physics);
            body.add_force(forward * (body.mass() * command), true);
        }

        match controls.x {
            DirectionX::Left => body.add_torque(-physics.torque, true),
            DirectionX::Right => body.add_torque(physics.torque, true),
            DirectionX::None => {}
        }

        is_stopping
    }
}

/// Wrap an angle into [0, 2π)
pub fn normalize_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(TAU);
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

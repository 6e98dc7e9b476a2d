//! Collision damage model

use rapier2d::prelude::{Real, Vector};
use tracing::info;

use super::constants::{FRONTAL_SPEED_THRESHOLD, MIN_COLLISION_DAMAGE};
use super::player::PlayerData;
use super::race::RaceManager;

pub struct CollisionHandler;

impl CollisionHandler {
    /// 1.0 normally; 1.5..=2.5 when both bodies move and head into each other
    pub fn frontal_multiplier(vel_a: &Vector<Real>, vel_b: &Vector<Real>) -> f32 {
        if vel_a.norm() <= FRONTAL_SPEED_THRESHOLD || vel_b.norm() <= FRONTAL_SPEED_THRESHOLD {
            return 1.0;
        }
        let dot = vel_a.normalize().dot(&vel_b.normalize()).clamp(-1.0, 1.0);
        if dot < -0.5 {
            1.5 + (-dot - 0.5) * 2.0
        } else {
            1.0
        }
    }

    pub fn damage(impact_velocity: f32, durability: f32, frontal_multiplier: f32) -> f32 {
        impact_velocity * durability * frontal_multiplier * 0.1
    }

    /// Damage `player` from a hit against a body moving at `vel_other`.
    /// Returns true when the hit eliminated the player.
    pub fn process_hit(player: &mut PlayerData, vel_self: &Vector<Real>, vel_other: &Vector<Real>) -> bool {
        let impact = (vel_self - vel_other).norm();
        let frontal = Self::frontal_multiplier(vel_self, vel_other);
        Self::apply_collision_damage(player, impact, frontal)
    }

    pub fn apply_collision_damage(player: &mut PlayerData, impact_velocity: f32, frontal_multiplier: f32) -> bool {
        if player.is_dead || player.god_mode {
            return false;
        }

        let damage = Self::damage(impact_velocity, player.car.durability, frontal_multiplier);
        if damage < MIN_COLLISION_DAMAGE {
            return false;
        }

        player.car.hp -= damage;
        player.collision_this_frame = true;

        if player.car.hp <= 0.0 {
            info!(player_id = player.id, damage, "Player destroyed in collision");
            RaceManager::disqualify(player);
            return true;
        }
        false
    }
}

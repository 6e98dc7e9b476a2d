//! Player state and the per-session roster

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use rapier2d::prelude::{Real, RigidBodyHandle, Vector};
use tracing::{debug, info, warn};

use crate::config::{CarPhysics, CarPhysicsConfig, CarType};
use crate::ws::protocol::{Movement, PositionUpdate, UpgradeLevels, UpgradeStat};

use super::constants::{
    ACCELERATION_UPGRADE_MULTIPLIER, DURABILITY_UPGRADE_MULTIPLIER, HANDLING_UPGRADE_MULTIPLIER,
    MAX_UPGRADES_PER_STAT, SPEED_UPGRADE_MULTIPLIER, TOTAL_ROUNDS,
};
use super::map::SpawnPoint;
use super::physics::DrivePhysics;
use super::snapshot::SnapshotBuilder;
use super::state::GameState;
use super::world::PhysicsWorld;
use super::PlayerId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DirectionX {
    Left,
    #[default]
    None,
    Right,
}

impl DirectionX {
    pub fn as_i8(&self) -> i8 {
        match self {
            DirectionX::Left => -1,
            DirectionX::None => 0,
            DirectionX::Right => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DirectionY {
    Up,
    #[default]
    None,
    Down,
}

impl DirectionY {
    pub fn as_i8(&self) -> i8 {
        match self {
            DirectionY::Up => -1,
            DirectionY::None => 0,
            DirectionY::Down => 1,
        }
    }
}

/// Control intent on two independent axes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Controls {
    pub x: DirectionX,
    pub y: DirectionY,
    /// Last movement transition that changed the intent
    pub last: Option<Movement>,
}

impl Controls {
    /// Apply a key transition. Releasing a key while the opposite key on the
    /// same axis was the last press keeps the opposite direction.
    pub fn apply(&mut self, movement: Movement) {
        use Movement::*;

        let blocked_by = match movement {
            UpReleased => Some(DownPressed),
            DownReleased => Some(UpPressed),
            LeftReleased => Some(RightPressed),
            RightReleased => Some(LeftPressed),
            _ => None,
        };
        if blocked_by.is_some() && self.last == blocked_by {
            return;
        }

        match movement {
            UpPressed => self.y = DirectionY::Up,
            DownPressed => self.y = DirectionY::Down,
            UpReleased | DownReleased => self.y = DirectionY::None,
            LeftPressed => self.x = DirectionX::Left,
            RightPressed => self.x = DirectionX::Right,
            LeftReleased | RightReleased => self.x = DirectionX::None,
        }
        self.last = Some(movement);
    }
}

/// The car a player drives, with upgraded stats
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarInfo {
    pub car_type: CarType,
    /// Max speed, px/s
    pub speed: f32,
    /// Max acceleration, px/s²
    pub acceleration: f32,
    /// Steering torque
    pub handling: f32,
    /// Collision damage multiplier; lower is tougher
    pub durability: f32,
    pub hp: f32,
    pub max_hp: f32,
}

impl CarInfo {
    pub fn from_profile(car_type: CarType, physics: &CarPhysics) -> Self {
        Self {
            car_type,
            speed: physics.max_speed,
            acceleration: physics.max_acceleration,
            handling: physics.torque,
            durability: physics.collision_damage_multiplier,
            hp: physics.max_hp,
            max_hp: physics.max_hp,
        }
    }

    /// Profile with this car's upgraded stats layered on top
    pub fn effective_physics(&self, base: &CarPhysics) -> CarPhysics {
        CarPhysics {
            max_speed: self.speed,
            max_acceleration: self.acceleration,
            torque: self.handling,
            collision_damage_multiplier: self.durability,
            ..*base
        }
    }
}

/// Authoritative per-player state
#[derive(Debug, Clone)]
pub struct PlayerData {
    pub id: PlayerId,
    pub body: Option<RigidBodyHandle>,
    pub car: CarInfo,
    pub controls: Controls,
    pub upgrades: UpgradeLevels,
    pub on_bridge: bool,

    // Last known pose in pixels
    pub x: f32,
    pub y: f32,
    pub angle: f32,

    // Race progress
    pub next_checkpoint: usize,
    pub rounds_completed: usize,
    pub round_times_ms: [u32; TOTAL_ROUNDS],
    pub total_time_ms: u32,
    pub lap_start: Instant,

    // Lifecycle flags
    pub is_dead: bool,
    pub race_finished: bool,
    pub disqualified: bool,
    pub god_mode: bool,
    pub pending_disqualification: bool,
    pub pending_race_complete: bool,
    pub collision_this_frame: bool,
    pub mark_body_for_removal: bool,
    pub is_stopping: bool,
}

impl PlayerData {
    pub fn new(id: PlayerId, car: CarInfo, spawn: &SpawnPoint, now: Instant) -> Self {
        Self {
            id,
            body: None,
            car,
            controls: Controls::default(),
            upgrades: UpgradeLevels::default(),
            on_bridge: false,
            x: spawn.x,
            y: spawn.y,
            angle: spawn.angle,
            next_checkpoint: 0,
            rounds_completed: 0,
            round_times_ms: [0; TOTAL_ROUNDS],
            total_time_ms: 0,
            lap_start: now,
            is_dead: false,
            race_finished: false,
            disqualified: false,
            god_mode: false,
            pending_disqualification: false,
            pending_race_complete: false,
            collision_this_frame: false,
            mark_body_for_removal: false,
            is_stopping: false,
        }
    }

    /// Finished or dead: nothing left to do this round
    pub fn is_done(&self) -> bool {
        self.race_finished || self.is_dead
    }

    /// Add time to a round slot and keep the championship total in sync
    pub fn add_round_time(&mut self, round: usize, ms: u32) {
        if let Some(slot) = self.round_times_ms.get_mut(round) {
            *slot = slot.saturating_add(ms);
        }
        self.recompute_total();
    }

    pub fn recompute_total(&mut self) {
        self.total_time_ms = self
            .round_times_ms
            .iter()
            .fold(0u32, |acc, t| acc.saturating_add(*t));
    }

    fn level_mut(&mut self, stat: UpgradeStat) -> &mut u8 {
        match stat {
            UpgradeStat::Speed => &mut self.upgrades.speed,
            UpgradeStat::Acceleration => &mut self.upgrades.acceleration,
            UpgradeStat::Handling => &mut self.upgrades.handling,
            UpgradeStat::Durability => &mut self.upgrades.durability,
        }
    }

    /// Raise one stat by a level. Returns false at the cap.
    pub fn apply_upgrade(&mut self, stat: UpgradeStat) -> bool {
        let level = self.level_mut(stat);
        if *level >= MAX_UPGRADES_PER_STAT {
            return false;
        }
        *level += 1;

        match stat {
            UpgradeStat::Speed => self.car.speed *= SPEED_UPGRADE_MULTIPLIER,
            UpgradeStat::Acceleration => self.car.acceleration *= ACCELERATION_UPGRADE_MULTIPLIER,
            UpgradeStat::Handling => self.car.handling *= HANDLING_UPGRADE_MULTIPLIER,
            UpgradeStat::Durability => self.car.durability *= DURABILITY_UPGRADE_MULTIPLIER,
        }
        true
    }

    /// Clear per-round state ahead of a new race
    pub fn reset_for_race(&mut self, now: Instant) {
        self.next_checkpoint = 0;
        self.race_finished = false;
        self.is_dead = false;
        self.disqualified = false;
        self.god_mode = false;
        self.on_bridge = false;
        self.controls = Controls::default();
        self.pending_disqualification = false;
        self.pending_race_complete = false;
        self.collision_this_frame = false;
        self.is_stopping = false;
        self.car.hp = self.car.max_hp;
        self.lap_start = now;
    }

    /// Forget championship results and upgrades
    pub fn reset_championship(&mut self, physics: &CarPhysics) {
        self.rounds_completed = 0;
        self.round_times_ms = [0; TOTAL_ROUNDS];
        self.total_time_ms = 0;
        self.upgrades = UpgradeLevels::default();
        self.car = CarInfo::from_profile(self.car.car_type, physics);
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PlayerError {
    #[error("session is full ({capacity} players)")]
    Full { capacity: usize },
    #[error("player {0} is already in the session")]
    Duplicate(PlayerId),
}

/// Players of one session, in arrival order
pub struct PlayerManager {
    players: HashMap<PlayerId, PlayerData>,
    order: Vec<PlayerId>,
    spawn_points: Vec<SpawnPoint>,
    car_physics: Arc<CarPhysicsConfig>,
}

impl PlayerManager {
    pub fn new(spawn_points: Vec<SpawnPoint>, car_physics: Arc<CarPhysicsConfig>) -> Self {
        Self {
            players: HashMap::new(),
            order: Vec::new(),
            spawn_points,
            car_physics,
        }
    }

    pub fn capacity(&self) -> usize {
        self.spawn_points.len()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    pub fn get(&self, id: PlayerId) -> Option<&PlayerData> {
        self.players.get(&id)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut PlayerData> {
        self.players.get_mut(&id)
    }

    /// Players in arrival order
    pub fn iter(&self) -> impl Iterator<Item = &PlayerData> {
        self.order.iter().filter_map(|id| self.players.get(id))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PlayerData> {
        self.players.values_mut()
    }

    pub fn all_dead(&self) -> bool {
        !self.players.is_empty() && self.players.values().all(|p| p.is_dead)
    }

    /// Add a player at the next spawn slot with the default car
    pub fn add_player(
        &mut self,
        id: PlayerId,
        world: &mut PhysicsWorld,
        now: Instant,
    ) -> Result<(), PlayerError> {
        if self.players.contains_key(&id) {
            return Err(PlayerError::Duplicate(id));
        }
        if self.players.len() >= self.spawn_points.len() {
            warn!(player_id = id, capacity = self.capacity(), "Session full, player rejected");
            return Err(PlayerError::Full {
                capacity: self.capacity(),
            });
        }

        let slot = self.order.len();
        let spawn = self.spawn_points[slot];
        let car_type = CarType::default();
        let physics = *self.car_physics.get(car_type);

        let mut player = PlayerData::new(id, CarInfo::from_profile(car_type, &physics), &spawn, now);
        player.body = Some(world.create_car_body(id, spawn.x, spawn.y, spawn.angle, &physics));

        self.order.push(id);
        self.players.insert(id, player);
        info!(player_id = id, slot, players = self.players.len(), "Player added");
        Ok(())
    }

    /// Remove a player; unknown ids are ignored. In the lobby the remaining
    /// players are compacted onto the first spawn slots.
    pub fn remove_player(&mut self, id: PlayerId, state: GameState, world: &mut PhysicsWorld) -> bool {
        let Some(player) = self.players.remove(&id) else {
            debug!(player_id = id, "remove_player on unknown id");
            return false;
        };
        if let Some(body) = player.body {
            world.destroy_body(body);
        }
        self.order.retain(|p| *p != id);
        info!(player_id = id, players = self.players.len(), "Player removed");

        if state == GameState::Lobby && !self.order.is_empty() {
            self.respawn_all(world);
        }
        true
    }

    /// Recreate every body at its arrival-order spawn slot
    fn respawn_all(&mut self, world: &mut PhysicsWorld) {
        for (slot, id) in self.order.iter().enumerate() {
            let (Some(player), Some(spawn)) = (self.players.get_mut(id), self.spawn_points.get(slot)) else {
                continue;
            };
            if let Some(body) = player.body.take() {
                world.destroy_body(body);
            }
            let physics = *self.car_physics.get(player.car.car_type);
            player.body = Some(world.create_car_body(*id, spawn.x, spawn.y, spawn.angle, &physics));
            player.x = spawn.x;
            player.y = spawn.y;
            player.angle = spawn.angle;
            player.on_bridge = false;
            player.mark_body_for_removal = false;
            player.controls = Controls::default();
        }
    }

    /// Put everyone back on the grid with fresh race state and full HP
    pub fn reset_all_players_to_lobby(&mut self, world: &mut PhysicsWorld, now: Instant) {
        self.respawn_all(world);
        for player in self.players.values_mut() {
            player.reset_for_race(now);
        }
    }

    /// Stop every car in place and clear race state for a new start
    pub fn reset_for_race_start(&mut self, world: &mut PhysicsWorld, now: Instant) {
        // eliminated cars lost their bodies; restart them from the grid
        if self.players.values().any(|p| p.body.is_none()) {
            self.respawn_all(world);
        }
        for player in self.players.values_mut() {
            let Some(handle) = player.body else {
                continue;
            };
            if let Some(body) = world.body_mut(handle) {
                body.set_linvel(Vector::zeros(), true);
                body.set_angvel(0.0, true);
            }
            if player.on_bridge {
                let _ = world.set_on_bridge(handle, false);
            }
            player.reset_for_race(now);
        }
    }

    /// Drop championship results and upgrades for everyone
    pub fn reset_championship(&mut self) {
        for player in self.players.values_mut() {
            let physics = self.car_physics.get(player.car.car_type);
            player.reset_championship(physics);
        }
    }

    /// Start every player's lap clock
    pub fn stamp_lap_start(&mut self, now: Instant) {
        for player in self.players.values_mut() {
            player.lap_start = now;
        }
    }

    /// Clear one-frame collision flags
    pub fn clear_collision_flags(&mut self) {
        for player in self.players.values_mut() {
            player.collision_this_frame = false;
        }
    }

    /// Turn control intent into forces on every live car
    pub fn update_body_positions(&mut self, world: &mut PhysicsWorld) {
        for player in self.players.values_mut() {
            if player.is_dead {
                continue;
            }
            let Some(handle) = player.body else {
                continue;
            };

            if player.race_finished {
                if let Some(body) = world.body_mut(handle) {
                    body.set_linvel(Vector::zeros(), true);
                    body.set_angvel(0.0, true);
                }
                continue;
            }
            if player.mark_body_for_removal {
                continue;
            }

            let Some(body) = world.body_mut(handle) else {
                continue;
            };
            let physics = player
                .car
                .effective_physics(self.car_physics.get(player.car.car_type));

            // rapier keeps user forces across steps
            body.reset_forces(true);
            body.reset_torques(true);
            DrivePhysics::apply_friction(body, &physics);
            player.is_stopping = DrivePhysics::apply_drive(body, &player.controls, &physics);
        }
    }

    /// Refresh poses from the world and build one update per visible player
    pub fn update_player_positions(
        &mut self,
        world: &PhysicsWorld,
        checkpoint_centers: &[Vector<Real>],
    ) -> Vec<PositionUpdate> {
        let mut updates = Vec::with_capacity(self.order.len());
        for id in &self.order {
            let Some(player) = self.players.get_mut(id) else {
                continue;
            };
            if let Some(body) = player.body.and_then(|h| world.body(h)) {
                let (x, y) = super::map::to_pixels(body.translation());
                player.x = x;
                player.y = y;
                player.angle = body.rotation().angle();
            }
            if player.is_dead && player.body.is_none() {
                continue;
            }
            updates.push(SnapshotBuilder::player_update(player, checkpoint_centers));
        }
        updates
    }

    /// Switch a lobby player's car, keeping pose and velocity
    pub fn select_car(&mut self, id: PlayerId, car: CarType, world: &mut PhysicsWorld) -> bool {
        let Some(player) = self.players.get_mut(&id) else {
            return false;
        };
        let physics = *self.car_physics.get(car);
        player.car = CarInfo::from_profile(car, &physics);

        if let Some(old) = player.body.take() {
            let snapshot = world
                .body(old)
                .map(|b| (*b.translation(), b.rotation().angle(), *b.linvel(), b.angvel()));
            world.destroy_body(old);

            if let Some((pos, angle, linvel, angvel)) = snapshot {
                let (x, y) = super::map::to_pixels(&pos);
                let handle = world.create_car_body(id, x, y, angle, &physics);
                if let Some(body) = world.body_mut(handle) {
                    body.set_linvel(linvel, true);
                    body.set_angvel(angvel, true);
                }
                player.body = Some(handle);
                player.on_bridge = false;
            }
        }
        info!(player_id = id, car = %car, "Car selected");
        true
    }

    /// Destroy bodies flagged during contact processing
    pub fn flush_removals(&mut self, world: &mut PhysicsWorld) {
        for player in self.players.values_mut() {
            if !player.mark_body_for_removal {
                continue;
            }
            if let Some(body) = player.body.take() {
                world.destroy_body(body);
                debug!(player_id = player.id, "Destroyed body of eliminated player");
            }
            player.mark_body_for_removal = false;
        }
    }
}

//! Background traffic: parked cars and waypoint-following NPCs

use std::f32::consts::FRAC_PI_2;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rapier2d::prelude::{Isometry, Real, RigidBodyHandle, Vector};
use tracing::{info, warn};

use crate::config::NpcConfig;
use crate::ws::protocol::PositionUpdate;

use super::constants::{
    MIN_DISTANCE_FROM_PARKED_M, MIN_DISTANCE_FROM_SPAWN_M, NPC_ARRIVAL_THRESHOLD_M, SCALE,
};
use super::map::{to_metres, MapLayout};
use super::snapshot::SnapshotBuilder;
use super::world::PhysicsWorld;
use super::PlayerId;

#[derive(Debug, Clone)]
pub struct Npc {
    /// Negative, so clients can tell traffic from players
    pub id: PlayerId,
    pub body: RigidBodyHandle,
    pub current_waypoint: Option<usize>,
    pub target_waypoint: Option<usize>,
    /// m/s
    pub speed: f32,
    pub parked: bool,
    pub on_bridge: bool,
}

#[derive(Debug, Clone)]
struct GraphNode {
    position: Vector<Real>,
    connections: Vec<usize>,
}

pub struct NpcManager {
    npcs: Vec<Npc>,
    graph: Vec<GraphNode>,
    rng: ChaCha8Rng,
}

impl NpcManager {
    pub fn new(seed: u64) -> Self {
        Self {
            npcs: Vec::new(),
            graph: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn npcs(&self) -> &[Npc] {
        &self.npcs
    }

    /// Spawn parked and moving traffic from the map
    pub fn init(&mut self, world: &mut PhysicsWorld, layout: &MapLayout, config: &NpcConfig) {
        self.graph = layout
            .waypoints
            .iter()
            .map(|wp| GraphNode {
                position: to_metres(wp.x, wp.y),
                connections: wp.connections.clone(),
            })
            .collect();

        let mut next_id: PlayerId = -1;
        self.spawn_parked(world, layout, config, &mut next_id);
        self.spawn_moving(world, layout, config, &mut next_id);
        info!(
            total = self.npcs.len(),
            parked = self.npcs.iter().filter(|n| n.parked).count(),
            "NPCs spawned"
        );
    }

    fn spawn_parked(
        &mut self,
        world: &mut PhysicsWorld,
        layout: &MapLayout,
        config: &NpcConfig,
        next_id: &mut PlayerId,
    ) {
        let mut slots: Vec<usize> = (0..layout.parked_cars.len()).collect();
        slots.shuffle(&mut self.rng);

        for idx in slots.into_iter().take(config.max_parked) {
            let parked = &layout.parked_cars[idx];
            let angle = if parked.horizontal { FRAC_PI_2 } else { 0.0 };
            let body = world.create_npc_body(*next_id, to_metres(parked.x, parked.y), angle, true);
            self.npcs.push(Npc {
                id: *next_id,
                body,
                current_waypoint: None,
                target_waypoint: None,
                speed: 0.0,
                parked: true,
                on_bridge: false,
            });
            *next_id -= 1;
        }
    }

    /// Waypoints far enough from player spawns and parked cars; all of them
    /// when the filter leaves nothing
    fn spawn_candidates(&self, layout: &MapLayout) -> Vec<usize> {
        let spawns: Vec<Vector<Real>> = layout
            .spawn_points
            .iter()
            .map(|s| to_metres(s.x, s.y))
            .collect();
        let parked: Vec<Vector<Real>> = layout
            .parked_cars
            .iter()
            .map(|p| to_metres(p.x, p.y))
            .collect();

        let candidates: Vec<usize> = self
            .graph
            .iter()
            .enumerate()
            .filter(|(_, node)| {
                spawns
                    .iter()
                    .all(|s| (node.position - s).norm() >= MIN_DISTANCE_FROM_SPAWN_M)
                    && parked
                        .iter()
                        .all(|p| (node.position - p).norm() >= MIN_DISTANCE_FROM_PARKED_M)
            })
            .map(|(idx, _)| idx)
            .collect();

        if candidates.is_empty() {
            warn!("Every waypoint filtered out, spawning NPCs anywhere on the graph");
            return (0..self.graph.len()).collect();
        }
        candidates
    }

    fn closest_connection(&self, start: usize) -> usize {
        let origin = self.graph[start].position;
        self.graph[start]
            .connections
            .iter()
            .copied()
            .filter(|c| *c < self.graph.len())
            .min_by(|a, b| {
                let da = (self.graph[*a].position - origin).norm();
                let db = (self.graph[*b].position - origin).norm();
                da.total_cmp(&db)
            })
            .unwrap_or(start)
    }

    /// Sprite faces +y, so heading is the travel angle minus a quarter turn
    fn heading(from: &Vector<Real>, to: &Vector<Real>) -> f32 {
        let dir = to - from;
        if dir.norm() <= 1e-4 {
            return 0.0;
        }
        dir.y.atan2(dir.x) - FRAC_PI_2
    }

    fn spawn_moving(
        &mut self,
        world: &mut PhysicsWorld,
        layout: &MapLayout,
        config: &NpcConfig,
        next_id: &mut PlayerId,
    ) {
        if self.graph.len() < 2 {
            info!("Not enough waypoints for moving NPCs");
            return;
        }

        let mut candidates = self.spawn_candidates(layout);
        candidates.shuffle(&mut self.rng);
        let speed = config.speed_px_s / SCALE;

        for start in candidates.into_iter().take(config.max_moving) {
            let target = self.closest_connection(start);
            let from = self.graph[start].position;
            let angle = Self::heading(&from, &self.graph[target].position);
            let body = world.create_npc_body(*next_id, from, angle, false);
            self.npcs.push(Npc {
                id: *next_id,
                body,
                current_waypoint: Some(start),
                target_waypoint: Some(target),
                speed,
                parked: false,
                on_bridge: false,
            });
            *next_id -= 1;
        }
    }

    /// Pick a random onward connection, avoiding the waypoint just left when
    /// there is another choice
    fn next_target(&mut self, arrived: usize, came_from: Option<usize>) -> Option<usize> {
        let connections = &self.graph.get(arrived)?.connections;
        let onward: Vec<usize> = connections
            .iter()
            .copied()
            .filter(|c| Some(*c) != came_from)
            .collect();
        if onward.is_empty() {
            connections.choose(&mut self.rng).copied()
        } else {
            onward.choose(&mut self.rng).copied()
        }
    }

    /// Steer moving NPCs toward their targets by setting velocity directly
    pub fn update(&mut self, world: &mut PhysicsWorld) {
        if self.graph.is_empty() {
            return;
        }

        for i in 0..self.npcs.len() {
            if self.npcs[i].parked {
                continue;
            }
            let Some(mut target) = self.npcs[i].target_waypoint.filter(|t| *t < self.graph.len()) else {
                continue;
            };
            let Some(pos) = world.body(self.npcs[i].body).map(|b| *b.translation()) else {
                continue;
            };

            if (self.graph[target].position - pos).norm() < NPC_ARRIVAL_THRESHOLD_M {
                let came_from = self.npcs[i].current_waypoint;
                if let Some(next) = self.next_target(target, came_from) {
                    self.npcs[i].current_waypoint = Some(target);
                    self.npcs[i].target_waypoint = Some(next);
                    target = next;
                }
            }

            let npc = &self.npcs[i];
            let to_target = self.graph[target].position - pos;
            let Some(body) = world.body_mut(npc.body) else {
                continue;
            };
            let dist = to_target.norm();
            if dist > 1e-4 {
                let vel = to_target / dist * npc.speed;
                let angle = vel.y.atan2(vel.x) - FRAC_PI_2;
                body.set_position(Isometry::new(pos, angle), true);
                body.set_linvel(vel, true);
            } else {
                body.set_linvel(Vector::zeros(), true);
            }
        }
    }

    pub fn reset_velocities(&mut self, world: &mut PhysicsWorld) {
        for npc in self.npcs.iter().filter(|n| !n.parked) {
            if let Some(body) = world.body_mut(npc.body) {
                body.set_linvel(Vector::zeros(), true);
                body.set_angvel(0.0, true);
            }
        }
    }

    pub fn by_body(&mut self, body: RigidBodyHandle) -> Option<&mut Npc> {
        self.npcs.iter_mut().find(|n| n.body == body)
    }

    pub fn snapshot(&self, world: &PhysicsWorld) -> Vec<PositionUpdate> {
        self.npcs
            .iter()
            .filter_map(|npc| world.body(npc.body).map(|b| SnapshotBuilder::npc_update(npc, b)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::map::tests::test_layout;

    fn spawned(config: NpcConfig) -> (PhysicsWorld, NpcManager) {
        let mut world = PhysicsWorld::new();
        let mut npcs = NpcManager::new(7);
        npcs.init(&mut world, &test_layout(), &config);
        (world, npcs)
    }

    #[test]
    fn test_npc_ids_are_negative_and_unique() {
        let (_world, npcs) = spawned(NpcConfig::default());
        let ids: Vec<_> = npcs.npcs().iter().map(|n| n.id).collect();
        assert_eq!(ids[0], -1);
        assert!(ids.iter().all(|id| *id < 0));
        let mut dedup = ids.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), ids.len());
    }

    #[test]
    fn test_spawn_counts_respect_config() {
        let (_world, npcs) = spawned(NpcConfig {
            max_moving: 2,
            max_parked: 0,
            speed_px_s: 90.0,
        });
        assert_eq!(npcs.npcs().iter().filter(|n| n.parked).count(), 0);
        assert_eq!(npcs.npcs().iter().filter(|n| !n.parked).count(), 2);
    }

    #[test]
    fn test_moving_npcs_head_to_a_connection() {
        let (mut world, mut npcs) = spawned(NpcConfig::default());
        npcs.update(&mut world);

        let layout = test_layout();
        for npc in npcs.npcs().iter().filter(|n| !n.parked) {
            let current = npc.current_waypoint.unwrap();
            let target = npc.target_waypoint.unwrap();
            assert!(layout.waypoints[current].connections.contains(&target));

            let speed = world.body(npc.body).unwrap().linvel().norm();
            assert!((speed - 90.0 / SCALE).abs() < 1e-3);
        }
    }

    #[test]
    fn test_arrival_avoids_previous_waypoint() {
        let mut npcs = NpcManager::new(1);
        npcs.graph = vec![
            GraphNode { position: Vector::zeros(), connections: vec![1] },
            GraphNode { position: Vector::zeros(), connections: vec![0, 2] },
            GraphNode { position: Vector::zeros(), connections: vec![1] },
        ];
        for _ in 0..20 {
            assert_eq!(npcs.next_target(1, Some(0)), Some(2));
        }
        // dead end: turning back is the only option
        assert_eq!(npcs.next_target(2, Some(1)), Some(1));
    }

    #[test]
    fn test_reset_velocities_stops_traffic() {
        let (mut world, mut npcs) = spawned(NpcConfig::default());
        npcs.update(&mut world);
        npcs.reset_velocities(&mut world);
        assert!(npcs
            .npcs()
            .iter()
            .all(|n| world.body(n.body).unwrap().linvel().norm() == 0.0));
    }
}

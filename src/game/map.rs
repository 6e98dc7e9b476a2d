//! Authored map layouts: static geometry, checkpoints, traffic graph, spawns.
//!
//! Files store pixel coordinates. Everything handed to the physics world is
//! converted to metres through [`to_metres`].

use std::path::Path;
use std::sync::Arc;

use rapier2d::na as nalgebra;
use rapier2d::prelude::{vector, Real, Vector};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::constants::{
    COLLISION_BRIDGE, COLLISION_FLOOR, COLLISION_UNDER, SCALE, SENSOR_END_BRIDGE,
    SENSOR_START_BRIDGE, TOTAL_ROUNDS,
};

pub fn to_metres(x_px: f32, y_px: f32) -> Vector<Real> {
    vector![x_px / SCALE, y_px / SCALE]
}

pub fn to_pixels(v: &Vector<Real>) -> (f32, f32) {
    (v.x * SCALE, v.y * SCALE)
}

/// Named geometry layer; decides the collision category of its shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Floor,
    Bridge,
    Under,
    BridgeStart,
    BridgeEnd,
}

impl LayerKind {
    pub fn category(&self) -> u32 {
        match self {
            LayerKind::Floor => COLLISION_FLOOR,
            LayerKind::Bridge => COLLISION_BRIDGE,
            LayerKind::Under => COLLISION_UNDER,
            LayerKind::BridgeStart => SENSOR_START_BRIDGE,
            LayerKind::BridgeEnd => SENSOR_END_BRIDGE,
        }
    }

    pub fn is_sensor(&self) -> bool {
        matches!(self, LayerKind::BridgeStart | LayerKind::BridgeEnd)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticShape {
    pub layer: LayerKind,
    /// Polygon outline in pixels
    pub points: Vec<[f32; 2]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnPoint {
    pub x: f32,
    pub y: f32,
    /// Heading in radians
    #[serde(default)]
    pub angle: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Waypoint {
    pub id: usize,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub connections: Vec<usize>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ParkedCar {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub horizontal: bool,
}

/// A parsed map
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapLayout {
    pub name: String,
    #[serde(default)]
    pub shapes: Vec<StaticShape>,
    /// One checkpoint list per round, centres in pixels
    pub checkpoints: Vec<Vec<[f32; 2]>>,
    #[serde(default)]
    pub waypoints: Vec<Waypoint>,
    #[serde(default)]
    pub parked_cars: Vec<ParkedCar>,
    pub spawn_points: Vec<SpawnPoint>,
}

#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("failed to read map {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid map json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("map {0} needs {TOTAL_ROUNDS} checkpoint lists")]
    RoundCount(String),
    #[error("map {0} has no spawn points")]
    NoSpawnPoints(String),
    #[error("waypoint {id} on map {map} is out of order or links to a missing waypoint")]
    BadWaypoint { map: String, id: usize },
}

impl MapLayout {
    pub fn from_json(raw: &str) -> Result<Self, MapError> {
        let layout: MapLayout = serde_json::from_str(raw)?;
        layout.validate()?;
        Ok(layout)
    }

    pub fn load(path: &Path) -> Result<Self, MapError> {
        let raw = std::fs::read_to_string(path).map_err(|source| MapError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    fn validate(&self) -> Result<(), MapError> {
        if self.checkpoints.len() != TOTAL_ROUNDS {
            return Err(MapError::RoundCount(self.name.clone()));
        }
        if self.spawn_points.is_empty() {
            return Err(MapError::NoSpawnPoints(self.name.clone()));
        }
        let count = self.waypoints.len();
        for (idx, wp) in self.waypoints.iter().enumerate() {
            if wp.id != idx || wp.connections.iter().any(|c| *c >= count) {
                return Err(MapError::BadWaypoint {
                    map: self.name.clone(),
                    id: wp.id,
                });
            }
        }
        Ok(())
    }

    /// Player capacity equals the number of spawn slots
    pub fn capacity(&self) -> usize {
        self.spawn_points.len()
    }

    /// Checkpoint centres of a round, in metres
    pub fn round_checkpoints(&self, round: usize) -> Vec<Vector<Real>> {
        self.checkpoints
            .get(round)
            .map(|list| list.iter().map(|[x, y]| to_metres(*x, *y)).collect())
            .unwrap_or_default()
    }
}

/// Every map the server can host, indexed by map id
#[derive(Debug, Clone)]
pub struct MapCatalog {
    maps: Vec<Arc<MapLayout>>,
}

impl MapCatalog {
    pub fn new(maps: Vec<MapLayout>) -> Self {
        Self {
            maps: maps.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn load(paths: &[impl AsRef<Path>]) -> Result<Self, MapError> {
        let mut maps = Vec::with_capacity(paths.len());
        for path in paths {
            let layout = MapLayout::load(path.as_ref())?;
            info!(
                map = %layout.name,
                spawn_points = layout.spawn_points.len(),
                waypoints = layout.waypoints.len(),
                "Loaded map"
            );
            maps.push(layout);
        }
        Ok(Self::new(maps))
    }

    /// Out-of-range ids fall back to map 0
    pub fn resolve(&self, map_id: u8) -> (u8, Arc<MapLayout>) {
        let id = if (map_id as usize) < self.maps.len() { map_id } else { 0 };
        (id, self.maps[id as usize].clone())
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }
}

//! Per-car physics profiles

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Car models a player can drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarType {
    GreenCar,
    RedSquaredCar,
    RedSportsCar,
    LightBlueCar,
    RedJeepCar,
    PurpleTruck,
    LimousineCar,
}

impl CarType {
    pub const ALL: [CarType; 7] = [
        CarType::GreenCar,
        CarType::RedSquaredCar,
        CarType::RedSportsCar,
        CarType::LightBlueCar,
        CarType::RedJeepCar,
        CarType::PurpleTruck,
        CarType::LimousineCar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CarType::GreenCar => "green_car",
            CarType::RedSquaredCar => "red_squared_car",
            CarType::RedSportsCar => "red_sports_car",
            CarType::LightBlueCar => "light_blue_car",
            CarType::RedJeepCar => "red_jeep_car",
            CarType::PurpleTruck => "purple_truck",
            CarType::LimousineCar => "limousine_car",
        }
    }
}

impl Default for CarType {
    fn default() -> Self {
        Self::GreenCar
    }
}

impl fmt::Display for CarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tuning for one car model. Speeds and accelerations are in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarPhysics {
    // Turning
    pub torque: f32,
    pub angular_friction: f32,
    pub angular_damping: f32,

    // Movement
    pub max_speed: f32,
    pub max_acceleration: f32,
    pub backward_speed_multiplier: f32,
    pub speed_controller_gain: f32,

    // Friction
    pub max_lateral_impulse: f32,
    pub forward_drag_coefficient: f32,
    pub linear_damping: f32,

    // Body
    pub density: f32,
    pub friction: f32,
    pub restitution: f32,
    pub width: f32,
    pub height: f32,
    /// Vertical offset of the collision box centre, in pixels
    pub center_offset_y: f32,

    // Health
    pub max_hp: f32,
    pub collision_damage_multiplier: f32,
}

impl Default for CarPhysics {
    fn default() -> Self {
        Self {
            torque: 6.0,
            angular_friction: 0.1,
            angular_damping: 3.0,
            max_speed: 320.0,
            max_acceleration: 260.0,
            backward_speed_multiplier: 0.5,
            speed_controller_gain: 4.0,
            max_lateral_impulse: 0.6,
            forward_drag_coefficient: -0.2,
            linear_damping: 0.3,
            density: 1.0,
            friction: 0.3,
            restitution: 0.1,
            width: 22.0,
            height: 28.0,
            center_offset_y: 0.0,
            max_hp: 100.0,
            collision_damage_multiplier: 1.0,
        }
    }
}

impl CarPhysics {
    fn for_type(car: CarType) -> Self {
        let base = Self::default();
        match car {
            CarType::GreenCar => base,
            CarType::RedSquaredCar => Self {
                max_speed: 300.0,
                max_acceleration: 240.0,
                width: 24.0,
                height: 28.0,
                max_hp: 110.0,
                collision_damage_multiplier: 0.9,
                ..base
            },
            CarType::RedSportsCar => Self {
                max_speed: 380.0,
                max_acceleration: 320.0,
                torque: 7.0,
                max_hp: 80.0,
                collision_damage_multiplier: 1.2,
                ..base
            },
            CarType::LightBlueCar => Self {
                max_speed: 340.0,
                max_acceleration: 280.0,
                torque: 6.5,
                max_hp: 90.0,
                collision_damage_multiplier: 1.1,
                ..base
            },
            CarType::RedJeepCar => Self {
                max_speed: 290.0,
                max_acceleration: 230.0,
                width: 24.0,
                height: 32.0,
                density: 1.3,
                max_hp: 130.0,
                collision_damage_multiplier: 0.8,
                ..base
            },
            CarType::PurpleTruck => Self {
                max_speed: 250.0,
                max_acceleration: 180.0,
                torque: 5.0,
                width: 28.0,
                height: 40.0,
                density: 1.6,
                max_hp: 160.0,
                collision_damage_multiplier: 0.7,
                ..base
            },
            CarType::LimousineCar => Self {
                max_speed: 300.0,
                max_acceleration: 200.0,
                torque: 4.5,
                width: 24.0,
                height: 48.0,
                center_offset_y: 4.0,
                density: 1.2,
                max_hp: 120.0,
                collision_damage_multiplier: 0.9,
                ..base
            },
        }
    }
}

/// On-disk override format: `{ "defaults": {...}, "cars": { "green_car": {...} } }`
#[derive(Debug, Default, Deserialize)]
struct CarPhysicsFile {
    defaults: Option<CarPhysics>,
    #[serde(default)]
    cars: HashMap<CarType, CarPhysics>,
}

/// Physics profiles for every car model
#[derive(Debug, Clone)]
pub struct CarPhysicsConfig {
    defaults: CarPhysics,
    cars: HashMap<CarType, CarPhysics>,
}

impl CarPhysicsConfig {
    /// Built-in profiles
    pub fn builtin() -> Self {
        Self {
            defaults: CarPhysics::default(),
            cars: CarType::ALL
                .iter()
                .map(|car| (*car, CarPhysics::for_type(*car)))
                .collect(),
        }
    }

    /// Load overrides from a JSON file, keeping built-ins for anything missing.
    /// An unreadable or invalid file is logged and ignored.
    pub fn load_or_builtin(path: Option<&Path>) -> Self {
        let mut config = Self::builtin();
        let Some(path) = path else {
            return config;
        };

        let parsed = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|raw| {
                serde_json::from_str::<CarPhysicsFile>(&raw).map_err(|e| e.to_string())
            });

        match parsed {
            Ok(file) => {
                if let Some(defaults) = file.defaults {
                    config.defaults = defaults;
                }
                let count = file.cars.len();
                config.cars.extend(file.cars);
                info!(path = %path.display(), cars = count, "Loaded car physics overrides");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load car physics, using built-in profiles");
            }
        }

        config
    }

    pub fn get(&self, car: CarType) -> &CarPhysics {
        self.cars.get(&car).unwrap_or(&self.defaults)
    }
}

impl Default for CarPhysicsConfig {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_car_has_a_profile() {
        let config = CarPhysicsConfig::builtin();
        for car in CarType::ALL {
            assert!(config.get(car).max_hp > 0.0, "{car} has no hp");
        }
    }

    #[test]
    fn test_missing_file_keeps_builtin() {
        let config = CarPhysicsConfig::load_or_builtin(Some(Path::new("/nonexistent/cars.json")));
        assert_eq!(
            config.get(CarType::PurpleTruck),
            &CarPhysics::for_type(CarType::PurpleTruck)
        );
    }

    #[test]
    fn test_file_override_parses_partial_profiles() {
        let raw = r#"{ "cars": { "green_car": { "max_speed": 999.0 } } }"#;
        let file: CarPhysicsFile = serde_json::from_str(raw).unwrap();
        let green = file.cars[&CarType::GreenCar];
        assert_eq!(green.max_speed, 999.0);
        assert_eq!(green.max_hp, CarPhysics::default().max_hp);
    }

    #[test]
    fn test_car_type_wire_names() {
        let json = serde_json::to_string(&CarType::RedJeepCar).unwrap();
        assert_eq!(json, "\"red_jeep_car\"");
        assert_eq!(CarType::RedJeepCar.as_str(), "red_jeep_car");
    }
}

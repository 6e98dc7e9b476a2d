//! Simulation, race and collision constants

/// Pixels per physics metre.
pub const SCALE: f32 = 32.0;

/// Fixed physics step in seconds.
pub const FIXED_STEP: f32 = 1.0 / 60.0;

/// Wall-clock cadence of the session loop.
pub const TICK_INTERVAL_MS: u64 = 16;

// Collision categories. Cars switch between CAR_GROUND and CAR_BRIDGE.
pub const COLLISION_FLOOR: u32 = 0x0001;
pub const COLLISION_BRIDGE: u32 = 0x0002;
pub const COLLISION_UNDER: u32 = 0x0004;
pub const SENSOR_START_BRIDGE: u32 = 0x0008;
pub const SENSOR_END_BRIDGE: u32 = 0x0010;
pub const CAR_GROUND: u32 = 0x0020;
pub const CAR_BRIDGE: u32 = 0x0040;

/// What a car on the ground collides with.
pub const CAR_GROUND_MASK: u32 =
    COLLISION_FLOOR | CAR_GROUND | SENSOR_START_BRIDGE | SENSOR_END_BRIDGE;

/// What a car on a bridge collides with.
pub const CAR_BRIDGE_MASK: u32 = COLLISION_BRIDGE
    | COLLISION_UNDER
    | COLLISION_FLOOR
    | CAR_BRIDGE
    | SENSOR_START_BRIDGE
    | SENSOR_END_BRIDGE;

/// Rounds per championship.
pub const TOTAL_ROUNDS: usize = 3;

/// Round time limit; also the penalty charged on disqualification or timeout.
pub const ROUND_TIME_LIMIT_MS: u32 = 10 * 60 * 1000;

/// Countdown before each round, in seconds.
pub const STARTING_COUNTDOWN_SECS: u64 = 10;

/// Checkpoints sent ahead of the player for path guidance.
pub const CHECKPOINT_LOOKAHEAD: usize = 3;

/// Checkpoint sensor radius in pixels.
pub const CHECKPOINT_RADIUS_PX: f32 = 48.0;

/// Collision damage below this is treated as noise.
pub const MIN_COLLISION_DAMAGE: f32 = 0.5;

/// Both bodies must be faster than this (m/s) for a frontal hit.
pub const FRONTAL_SPEED_THRESHOLD: f32 = 1.0;

/// Upgrade caps and scaling.
pub const MAX_UPGRADES_PER_STAT: u8 = 3;
pub const SPEED_UPGRADE_MULTIPLIER: f32 = 1.1;
pub const ACCELERATION_UPGRADE_MULTIPLIER: f32 = 1.1;
pub const HANDLING_UPGRADE_MULTIPLIER: f32 = 1.1;
pub const DURABILITY_UPGRADE_MULTIPLIER: f32 = 0.9;
pub const UPGRADE_PENALTY_MS: u32 = 5_000;

/// NPC traversal tuning (metres).
pub const NPC_ARRIVAL_THRESHOLD_M: f32 = 0.5;
pub const MIN_DISTANCE_FROM_PARKED_M: f32 = 1.0;
pub const MIN_DISTANCE_FROM_SPAWN_M: f32 = 3.0;
pub const NPC_DIRECTION_THRESHOLD: f32 = 0.05;
pub const NPC_WIDTH_PX: f32 = 22.0;
pub const NPC_HEIGHT_PX: f32 = 28.0;
pub const NPC_CAR_TYPE: &str = "npc";
pub const NPC_DISPLAY_HP: f32 = 100.0;

/// Forward speed (m/s) above which reversing counts as braking.
pub const BRAKE_SPEED_THRESHOLD: f32 = 1.0;

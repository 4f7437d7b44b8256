//! Encounter configuration loaded by adapters and consumed by the world.

use std::time::Duration;

use glam::Vec3;
use serde::{Deserialize, Serialize};

const DEFAULT_GRID_HALF_SIZE: f32 = 2000.0;
const DEFAULT_POINT_SPACING: f32 = 200.0;
const DEFAULT_TOKEN_CAPACITY: u32 = 5;
const DEFAULT_TOKEN_RELEASE_DELAY_SECS: f32 = 2.0;
const DEFAULT_TEARDOWN_DELAY_SECS: f32 = 45.0;
const DEFAULT_FODDER_RESPAWN_DELAY_SECS: f32 = 2.0;
const DEFAULT_RNG_SEED: u64 = 0x5eed_c0a7_71e5_0001;

/// Complete description of one combat encounter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncounterConfig {
    /// Centre of the arena and of the candidate grid.
    pub origin: Vec3,
    /// Half the side length of the square arena.
    pub grid_half_size: f32,
    /// Distance between neighbouring candidate points.
    pub point_spacing: f32,
    /// Number of tokens in the ranged-attack gate.
    pub token_capacity: u32,
    /// Seconds a returned token waits before becoming available again.
    pub token_release_delay_secs: f32,
    /// Seconds between the last main wave clearing and teardown.
    pub teardown_delay_secs: f32,
    /// Seconds between a wave reaching its threshold and the next wave spawning.
    pub advance_delay_secs: f32,
    /// Seconds before a fodder spawner replaces a fallen agent.
    pub fodder_respawn_delay_secs: f32,
    /// Engage as soon as the encounter exists instead of waiting for a trigger.
    pub engage_on_start: bool,
    /// Seed for fodder respawn position selection.
    pub rng_seed: u64,
    /// Main waves in spawn order.
    pub waves: Vec<WaveConfig>,
    /// Optional respawning filler wave.
    pub fodder: Option<WaveConfig>,
    /// Position scoring tunables.
    pub scoring: ScoringConfig,
    /// Position allocation tunables.
    pub allocation: AllocationConfig,
}

impl EncounterConfig {
    /// Delay applied to every token return.
    #[must_use]
    pub fn token_release_delay(&self) -> Duration {
        seconds(self.token_release_delay_secs)
    }

    /// Delay between arming and running the teardown.
    #[must_use]
    pub fn teardown_delay(&self) -> Duration {
        seconds(self.teardown_delay_secs)
    }

    /// Delay before a triggered wave spawns.
    #[must_use]
    pub fn advance_delay(&self) -> Duration {
        seconds(self.advance_delay_secs)
    }

    /// Delay before a fodder respawn.
    #[must_use]
    pub fn fodder_respawn_delay(&self) -> Duration {
        seconds(self.fodder_respawn_delay_secs)
    }
}

impl Default for EncounterConfig {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            grid_half_size: DEFAULT_GRID_HALF_SIZE,
            point_spacing: DEFAULT_POINT_SPACING,
            token_capacity: DEFAULT_TOKEN_CAPACITY,
            token_release_delay_secs: DEFAULT_TOKEN_RELEASE_DELAY_SECS,
            teardown_delay_secs: DEFAULT_TEARDOWN_DELAY_SECS,
            advance_delay_secs: 0.0,
            fodder_respawn_delay_secs: DEFAULT_FODDER_RESPAWN_DELAY_SECS,
            engage_on_start: false,
            rng_seed: DEFAULT_RNG_SEED,
            waves: Vec::new(),
            fodder: None,
            scoring: ScoringConfig::default(),
            allocation: AllocationConfig::default(),
        }
    }
}

/// Configuration of a single wave.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveConfig {
    /// Alive count at or below which the next wave is triggered.
    pub threshold_to_advance: usize,
    /// Spawners owned by the wave.
    pub spawners: Vec<SpawnerConfig>,
}

/// Configuration of a single spawner.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnerConfig {
    /// Spawn positions; one agent is produced per entry.
    pub positions: Vec<Vec3>,
}

/// Tunables of the position scorer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Standoff distance that scores a perfect 1.0.
    pub preferred_distance: f32,
    /// Vertical offset applied to candidate points before tracing sight lines.
    pub eye_height: f32,
    /// Multiplier of the preferred distance normalising too-close points.
    pub close_range_factor: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            preferred_distance: 1200.0,
            eye_height: 50.0,
            close_range_factor: 1.5,
        }
    }
}

/// Tunables of the position allocator.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// First score threshold tried.
    pub start_threshold: f32,
    /// Amount the threshold drops after an empty round.
    pub threshold_step: f32,
    /// Exclusive lower bound of the threshold ladder.
    pub threshold_floor: f32,
    /// Weight of the tactical score in the final rank; closeness gets the rest.
    pub score_weight: f32,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            start_threshold: 0.8,
            threshold_step: 0.2,
            threshold_floor: -0.1,
            score_weight: 0.85,
        }
    }
}

fn seconds(value: f32) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::try_from_secs_f32(value).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_encounter() {
        let config = EncounterConfig::default();
        assert_eq!(config.token_capacity, 5);
        assert_eq!(config.token_release_delay(), Duration::from_secs(2));
        assert_eq!(config.teardown_delay(), Duration::from_secs(45));
        assert_eq!(config.advance_delay(), Duration::ZERO);
        assert!((config.scoring.preferred_distance - 1200.0).abs() < f32::EPSILON);
        assert!((config.allocation.score_weight - 0.85).abs() < f32::EPSILON);
    }

    #[test]
    fn negative_delays_collapse_to_zero() {
        let config = EncounterConfig {
            teardown_delay_secs: -3.0,
            fodder_respawn_delay_secs: f32::NAN,
            ..EncounterConfig::default()
        };
        assert_eq!(config.teardown_delay(), Duration::ZERO);
        assert_eq!(config.fodder_respawn_delay(), Duration::ZERO);
    }

    #[test]
    fn oversized_delays_saturate() {
        let config: EncounterConfig =
            toml::from_str("teardown_delay_secs = 1e30").expect("valid encounter toml");
        assert_eq!(config.teardown_delay(), Duration::MAX);
        assert_eq!(config.token_release_delay(), Duration::from_secs(2));
    }

    #[test]
    fn partial_toml_fills_missing_fields_with_defaults() {
        let source = r#"
            token_capacity = 2
            engage_on_start = true

            [[waves]]
            threshold_to_advance = 1

            [[waves.spawners]]
            positions = [[0.0, 100.0, 0.0], [50.0, 100.0, 0.0]]

            [fodder]
            [[fodder.spawners]]
            positions = [[10.0, 10.0, 0.0]]

            [scoring]
            preferred_distance = 900.0
        "#;

        let config: EncounterConfig = toml::from_str(source).expect("valid encounter toml");
        assert_eq!(config.token_capacity, 2);
        assert!(config.engage_on_start);
        assert_eq!(config.waves.len(), 1);
        assert_eq!(config.waves[0].threshold_to_advance, 1);
        assert_eq!(config.waves[0].spawners[0].positions.len(), 2);
        assert_eq!(
            config.waves[0].spawners[0].positions[1],
            Vec3::new(50.0, 100.0, 0.0)
        );
        let fodder = config.fodder.as_ref().expect("fodder wave configured");
        assert_eq!(fodder.spawners.len(), 1);
        assert!((config.scoring.preferred_distance - 900.0).abs() < f32::EPSILON);
        assert!((config.scoring.eye_height - 50.0).abs() < f32::EPSILON);
        assert_eq!(config.teardown_delay(), Duration::from_secs(45));
    }
}

//! Engine tunables.
//!
//! Every field has a default; a JSON document only needs to name the values
//! it overrides.
//!
//! ```
//! use hivemind_logic::config::EngineConfig;
//!
//! let config = EngineConfig::from_json(r#"{"maxTransitionsPerTick": 6}"#).unwrap();
//! assert_eq!(config.max_transitions_per_tick, 6);
//! assert_eq!(config.claimer_lifetime, 600);
//! assert!(config.validate().is_empty());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One transition plus the re-dispatch that acts on it.
pub const MIN_TRANSITIONS_PER_TICK: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Re-entrancy guard: state transitions allowed per agent per tick.
    pub max_transitions_per_tick: u32,
    /// Lifetime of a worker body, in ticks.
    pub agent_lifetime: u32,
    /// Lifetime of a claim-capable body, the tightest budget on a mission.
    pub claimer_lifetime: u32,
    /// A mission is infeasible if fewer working ticks remain after travel.
    pub min_working_ticks: u32,
    /// Expected travel time per room crossed.
    pub ticks_per_room: u32,
    /// How long a planned route stays cached.
    pub route_ttl: u64,
    /// Share of harvest capacity reserved for the active phase's role.
    pub active_share_floor: f32,
    /// Fraction of its life an upgrader spends extracting.
    pub upgrader_extraction_fraction: f32,
    /// Fraction of its life a builder spends extracting.
    pub builder_extraction_fraction: f32,
    /// Energy per tick one occupied harvest slot draws from its source.
    pub slot_extraction_rate: f32,
    pub max_invaders: u32,
    /// Controller level that ends the upgrading phase.
    pub target_controller_level: u8,
    /// Controller progress per tick one pioneer upgrader contributes.
    pub upgrade_throughput: f32,
    /// Construction progress per tick one pioneer builder contributes.
    pub build_throughput: f32,
    /// A placement request with no resulting site is retried after this long.
    pub placement_retry_ticks: u64,
    /// A phase older than this raises a stall warning, repeated at this interval.
    pub stall_warning_ticks: u64,
    /// Walls and ramparts are not repaired beyond this many hits.
    pub wall_repair_ceiling: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_transitions_per_tick: 10,
            agent_lifetime: 1500,
            claimer_lifetime: 600,
            min_working_ticks: 50,
            ticks_per_room: 50,
            route_ttl: 1500,
            active_share_floor: 0.7,
            upgrader_extraction_fraction: 0.5,
            builder_extraction_fraction: 0.6,
            slot_extraction_rate: 2.0,
            max_invaders: 2,
            target_controller_level: 2,
            upgrade_throughput: 1.0,
            build_throughput: 2.5,
            placement_retry_ticks: 100,
            stall_warning_ticks: 5000,
            wall_repair_ceiling: 10_000,
        }
    }
}

/// A configuration value that cannot work.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("maxTransitionsPerTick must be at least 2, got {0}")]
    GuardTooSmall(u32),
    #[error("{name} must be in (0, 1], got {value}")]
    FractionOutOfRange { name: &'static str, value: f32 },
    #[error("{name} must be positive")]
    NotPositive { name: &'static str },
    #[error("claimerLifetime {claimer} exceeds agentLifetime {agent}")]
    LifetimeOrder { claimer: u32, agent: u32 },
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Every problem found, empty when the config is usable.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.max_transitions_per_tick < MIN_TRANSITIONS_PER_TICK {
            errors.push(ConfigError::GuardTooSmall(self.max_transitions_per_tick));
        }
        for (name, value) in [
            ("activeShareFloor", self.active_share_floor),
            ("upgraderExtractionFraction", self.upgrader_extraction_fraction),
            ("builderExtractionFraction", self.builder_extraction_fraction),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                errors.push(ConfigError::FractionOutOfRange { name, value });
            }
        }
        for (name, positive) in [
            ("agentLifetime", self.agent_lifetime > 0),
            ("claimerLifetime", self.claimer_lifetime > 0),
            ("ticksPerRoom", self.ticks_per_room > 0),
            ("slotExtractionRate", self.slot_extraction_rate > 0.0),
            ("upgradeThroughput", self.upgrade_throughput > 0.0),
            ("buildThroughput", self.build_throughput > 0.0),
            ("stallWarningTicks", self.stall_warning_ticks > 0),
        ] {
            if !positive {
                errors.push(ConfigError::NotPositive { name });
            }
        }
        if self.claimer_lifetime > self.agent_lifetime {
            errors.push(ConfigError::LifetimeOrder {
                claimer: self.claimer_lifetime,
                agent: self.agent_lifetime,
            });
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(EngineConfig::default().validate().is_empty());
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config = EngineConfig::from_json(r#"{"activeShareFloor":0.8,"maxInvaders":4}"#).unwrap();
        assert_eq!(config.active_share_floor, 0.8);
        assert_eq!(config.max_invaders, 4);
        assert_eq!(config.max_transitions_per_tick, 10);
    }

    #[test]
    fn test_empty_object_is_default() {
        assert_eq!(EngineConfig::from_json("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let config = EngineConfig {
            max_transitions_per_tick: 1,
            active_share_floor: 1.5,
            ticks_per_room: 0,
            ..EngineConfig::default()
        };
        let errors = config.validate();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ConfigError::GuardTooSmall(1)));
        assert!(errors.contains(&ConfigError::NotPositive { name: "ticksPerRoom" }));
    }

    #[test]
    fn test_lifetime_order() {
        let config = EngineConfig {
            claimer_lifetime: 2000,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate().as_slice(), [ConfigError::LifetimeOrder { .. }]));
    }
}

// Copyright 2025 Cowboy AI, LLC.

//! Configuration of a composition run

use crate::errors::{CompositionError, CompositionResult};
use crate::identifiers::StateId;
use crate::system_service::DEFAULT_CACHE_CAPACITY;
use indexmap::IndexSet;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Discount factor used when none is configured
pub const DEFAULT_GAMMA: f64 = 0.9;

/// Explored-state ceiling used when none is configured
pub const DEFAULT_MAX_STATES: usize = 5_000_000;

/// Which system-service states seed the goal-automaton composition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SeedStrategy {
    /// Only the tuple of service initial states
    #[default]
    InitialOnly,
    /// The initial tuple plus every tuple whose components are all idle
    ///
    /// Lets the orchestrator start from any quiescent configuration of the
    /// community, e.g. with some machines broken.
    IdleConfigurations {
        /// Component state labels regarded as idle
        #[schemars(with = "Vec<String>")]
        idle_states: IndexSet<StateId>,
    },
}

impl SeedStrategy {
    /// Seed from every configuration made of the given idle states
    pub fn idle<I, S>(idle_states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StateId>,
    {
        SeedStrategy::IdleConfigurations {
            idle_states: idle_states.into_iter().map(Into::into).collect(),
        }
    }
}

/// Configuration for a composition run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CompositionConfig {
    /// Discount factor of the produced MDP, in `(0, 1]`
    pub gamma: f64,
    /// Maximum number of composite states explored before giving up
    pub max_states: usize,
    /// Number of composite system states whose transitions are cached
    pub cache_capacity: usize,
    /// Seeding of the goal-automaton variant
    pub seed: SeedStrategy,
    /// Trim the goal automaton before composing
    pub trim_goal: bool,
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self {
            gamma: DEFAULT_GAMMA,
            max_states: DEFAULT_MAX_STATES,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            seed: SeedStrategy::default(),
            trim_goal: true,
        }
    }
}

impl CompositionConfig {
    /// Default configuration with another discount factor
    pub fn with_gamma(gamma: f64) -> Self {
        Self {
            gamma,
            ..Self::default()
        }
    }

    /// Parse and validate a JSON configuration document
    pub fn from_json_str(json: &str) -> CompositionResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration before a run
    pub fn validate(&self) -> CompositionResult<()> {
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            return Err(CompositionError::InvalidDiscount { gamma: self.gamma });
        }
        if self.max_states == 0 {
            return Err(CompositionError::InvalidConfiguration(
                "max_states must be positive".to_string(),
            ));
        }
        if self.cache_capacity == 0 {
            return Err(CompositionError::InvalidConfiguration(
                "cache_capacity must be positive".to_string(),
            ));
        }
        if let SeedStrategy::IdleConfigurations { idle_states } = &self.seed {
            if idle_states.is_empty() {
                return Err(CompositionError::InvalidConfiguration(
                    "idle seeding needs at least one idle state".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// JSON Schema of the configuration document
    pub fn json_schema() -> CompositionResult<serde_json::Value> {
        let schema = schemars::schema_for!(CompositionConfig);
        Ok(serde_json::to_value(schema)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_defaults_are_valid() {
        let config = CompositionConfig::default();
        assert_eq!(config.gamma, 0.9);
        assert_eq!(config.seed, SeedStrategy::InitialOnly);
        assert!(config.trim_goal);
        config.validate().unwrap();
    }

    #[test_case(0.0 ; "zero")]
    #[test_case(-0.5 ; "negative")]
    #[test_case(1.5 ; "above one")]
    #[test_case(f64::NAN ; "not a number")]
    fn test_invalid_gamma(gamma: f64) {
        let err = CompositionConfig::with_gamma(gamma).validate().unwrap_err();
        assert!(matches!(err, CompositionError::InvalidDiscount { .. }));
    }

    #[test]
    fn test_gamma_of_one_is_valid() {
        CompositionConfig::with_gamma(1.0).validate().unwrap();
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = CompositionConfig::from_json_str(
            r#"{"gamma": 0.5, "seed": {"kind": "idle_configurations", "idle_states": ["ready", "broken"]}}"#,
        )
        .unwrap();
        assert_eq!(config.gamma, 0.5);
        assert_eq!(config.max_states, DEFAULT_MAX_STATES);
        assert_eq!(config.seed, SeedStrategy::idle(["ready", "broken"]));
    }

    #[test]
    fn test_from_json_rejects_empty_idle_set() {
        let err = CompositionConfig::from_json_str(
            r#"{"seed": {"kind": "idle_configurations", "idle_states": []}}"#,
        )
        .unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_json_schema_lists_fields() {
        let schema = CompositionConfig::json_schema().unwrap();
        assert!(schema.is_object());
        let properties = &schema["properties"];
        assert!(properties.get("gamma").is_some());
        assert!(properties.get("max_states").is_some());
        assert!(properties.get("seed").is_some());
    }
}

//! Coordinator configuration.
//!
//! A config is a single value replaced atomically as a whole: in-flight
//! searches keep whatever [`CoordinatorConfig`] they read at dispatch and
//! never observe a partial update. Loading order mirrors the usual stack:
//! built-in defaults, then an optional TOML file, then `FANOUT_*` environment
//! overrides.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::cluster::balance::LoadBalanceStrategy;
use crate::coordinator::merge::MergeStrategy;
use crate::error::CoordinatorError;

/// Runtime knobs for the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Per-attempt budget for one node call, in milliseconds.
    pub timeout_ms: u64,

    /// Additional attempts after the first on timeout/transport failure.
    /// Each attempt gets its own full `timeout_ms` budget.
    pub max_retries: u32,

    /// How per-node result sets are combined.
    pub merge_strategy: MergeStrategy,

    /// How nodes are ordered for a search round.
    pub load_balancing: LoadBalanceStrategy,

    /// Delay between health probe rounds, in milliseconds.
    pub health_check_interval_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_retries: 1,
            merge_strategy: MergeStrategy::ScoreDesc,
            load_balancing: LoadBalanceStrategy::Broadcast,
            health_check_interval_ms: 30_000,
        }
    }
}

impl CoordinatorConfig {
    /// Reject values the coordinator cannot run with.
    pub fn validate(&self) -> Result<(), CoordinatorError> {
        if self.timeout_ms == 0 {
            return Err(CoordinatorError::InvalidConfig(
                "timeout_ms must be greater than 0".into(),
            ));
        }
        if self.health_check_interval_ms == 0 {
            return Err(CoordinatorError::InvalidConfig(
                "health_check_interval_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Parse a config from TOML text. Unknown keys are ignored; missing keys
    /// fall back to defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, CoordinatorError> {
        let config: Self = toml::from_str(text)
            .map_err(|e| CoordinatorError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, CoordinatorError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoordinatorError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Apply `FANOUT_*` environment overrides on top of `self`.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(val) = dotenvy::var("FANOUT_TIMEOUT_MS")
            && let Ok(ms) = val.parse()
        {
            cfg.timeout_ms = ms;
        }

        if let Ok(val) = dotenvy::var("FANOUT_MAX_RETRIES")
            && let Ok(n) = val.parse()
        {
            cfg.max_retries = n;
        }

        if let Ok(val) = dotenvy::var("FANOUT_MERGE_STRATEGY")
            && let Ok(strategy) = val.parse()
        {
            cfg.merge_strategy = strategy;
        }

        if let Ok(val) = dotenvy::var("FANOUT_LB_STRATEGY")
            && let Ok(strategy) = val.parse()
        {
            cfg.load_balancing = strategy;
        }

        if let Ok(val) = dotenvy::var("FANOUT_HEALTH_CHECK_INTERVAL_MS")
            && let Ok(ms) = val.parse()
        {
            cfg.health_check_interval_ms = ms;
        }

        cfg
    }
}

/// Shared, atomically replaceable config handle.
///
/// Readers get an `Arc` to a complete value; `store` swaps the whole thing.
/// Cheap to clone — clones share the same slot.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<Arc<CoordinatorConfig>>>,
}

impl SharedConfig {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Current config. The returned `Arc` stays self-consistent even if a
    /// `store` happens immediately after.
    pub fn load(&self) -> Arc<CoordinatorConfig> {
        Arc::clone(&self.inner.read())
    }

    /// Replace the whole config.
    pub fn store(&self, config: CoordinatorConfig) {
        *self.inner.write() = Arc::new(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(CoordinatorConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_timeout_rejected() {
        let cfg = CoordinatorConfig {
            timeout_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(CoordinatorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn zero_interval_rejected() {
        let cfg = CoordinatorConfig {
            health_check_interval_ms: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn toml_partial_keys_fall_back_to_defaults() {
        let cfg = CoordinatorConfig::from_toml_str(
            r#"
            timeout_ms = 750
            merge_strategy = "round_robin"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.timeout_ms, 750);
        assert_eq!(cfg.merge_strategy, MergeStrategy::RoundRobin);
        assert_eq!(cfg.max_retries, CoordinatorConfig::default().max_retries);
    }

    #[test]
    fn toml_invalid_value_rejected() {
        assert!(CoordinatorConfig::from_toml_str("timeout_ms = 0").is_err());
        assert!(CoordinatorConfig::from_toml_str("merge_strategy = \"best\"").is_err());
    }

    #[test]
    fn env_overrides_apply() {
        // set_var is unsafe in edition 2024; this test is the only writer of
        // these keys.
        unsafe {
            std::env::set_var("FANOUT_TIMEOUT_MS", "123");
            std::env::set_var("FANOUT_LB_STRATEGY", "round_robin");
        }
        let cfg = CoordinatorConfig::from_env();
        unsafe {
            std::env::remove_var("FANOUT_TIMEOUT_MS");
            std::env::remove_var("FANOUT_LB_STRATEGY");
        }
        assert_eq!(cfg.timeout_ms, 123);
        assert_eq!(cfg.load_balancing, LoadBalanceStrategy::RoundRobin);
    }

    #[test]
    fn shared_config_swaps_whole_value() {
        let shared = SharedConfig::new(CoordinatorConfig::default());
        let before = shared.load();
        shared.store(CoordinatorConfig {
            timeout_ms: 42,
            ..Default::default()
        });
        // The old Arc is untouched; the new one is complete.
        assert_eq!(before.timeout_ms, 5_000);
        assert_eq!(shared.load().timeout_ms, 42);
    }
}

//! Search configuration
//!
//! All cost constants of the search live here and are passed explicitly to
//! [`TherapyOptimizer::new`](crate::TherapyOptimizer::new).
//!
//! ```rust
//! use safetherapy_core::SearchConfig;
//!
//! let config = SearchConfig::from_json(r#"{ "max_expansions": 5000 }"#).unwrap();
//! assert_eq!(config.max_expansions, Some(5000));
//! assert_eq!(config.polypharmacy_base, 20.0);
//! ```

use crate::knowledge::TherapeuticTier;
use crate::{read_json_file, ConfigError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding [`SearchConfig::max_expansions`] (`0` disables the cap)
pub const ENV_MAX_EXPANSIONS: &str = "SAFETHERAPY_MAX_EXPANSIONS";

/// Environment variable overriding [`SearchConfig::time_limit_ms`] (`0` disables the limit)
pub const ENV_TIME_LIMIT_MS: &str = "SAFETHERAPY_TIME_LIMIT_MS";

/// Guideline tier costs added when a new drug resolves a disease
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierCosts {
    pub first: f64,
    pub second: f64,
    pub third: f64,
    /// Unknown or unapproved pairing
    pub unknown: f64,
}

impl Default for TierCosts {
    fn default() -> Self {
        Self {
            first: 0.0,
            second: 2000.0,
            third: 4000.0,
            unknown: 10000.0,
        }
    }
}

impl TierCosts {
    pub fn cost(&self, tier: TherapeuticTier) -> f64 {
        match tier {
            TherapeuticTier::First => self.first,
            TherapeuticTier::Second => self.second,
            TherapeuticTier::Third => self.third,
            TherapeuticTier::Unknown => self.unknown,
        }
    }
}

/// Cost constants and budget of one optimiser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Fixed cost of prescribing any additional drug; also the heuristic value
    pub polypharmacy_base: f64,
    pub tier_costs: TierCosts,
    /// Added once per medium-severity pair
    pub medium_interaction_penalty: f64,
    /// Multiplier turning an adverse-event probability into cost
    pub risk_scale: f64,
    /// Score used when an oracle fails
    pub neutral_score: f64,
    /// Cap on expanded states; `None` means unbounded
    pub max_expansions: Option<usize>,
    /// Wall-clock limit per search in milliseconds
    pub time_limit_ms: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            polypharmacy_base: 20.0,
            tier_costs: TierCosts::default(),
            medium_interaction_penalty: 500.0,
            risk_scale: 1000.0,
            neutral_score: 0.5,
            max_expansions: Some(100_000),
            time_limit_ms: None,
        }
    }
}

impl SearchConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            what: "search config",
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file and validate it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = read_json_file(path.as_ref(), "search config")?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SAFETHERAPY_*` environment overrides
    pub fn apply_env_overrides(mut self) -> Self {
        if let Some(max) = env_u64(ENV_MAX_EXPANSIONS) {
            self.max_expansions = (max > 0).then_some(max as usize);
        }
        if let Some(ms) = env_u64(ENV_TIME_LIMIT_MS) {
            self.time_limit_ms = (ms > 0).then_some(ms);
        }
        self
    }

    /// Reject cost settings that would break the optimality guarantee
    pub fn validate(&self) -> Result<(), ConfigError> {
        // h = polypharmacy_base must stay a lower bound on any new prescription
        if !(self.polypharmacy_base.is_finite() && self.polypharmacy_base > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "polypharmacy_base must be positive and finite, got {}",
                self.polypharmacy_base
            )));
        }

        let costs = [
            ("tier_costs.first", self.tier_costs.first),
            ("tier_costs.second", self.tier_costs.second),
            ("tier_costs.third", self.tier_costs.third),
            ("tier_costs.unknown", self.tier_costs.unknown),
            ("medium_interaction_penalty", self.medium_interaction_penalty),
            ("risk_scale", self.risk_scale),
        ];
        for (name, value) in costs {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be non-negative and finite, got {}",
                    name, value
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.neutral_score) {
            return Err(ConfigError::Invalid(format!(
                "neutral_score must lie in [0, 1], got {}",
                self.neutral_score
            )));
        }

        Ok(())
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_ms.map(Duration::from_millis)
    }

    pub fn with_polypharmacy_base(mut self, base: f64) -> Self {
        self.polypharmacy_base = base;
        self
    }

    pub fn with_tier_costs(mut self, tier_costs: TierCosts) -> Self {
        self.tier_costs = tier_costs;
        self
    }

    pub fn with_medium_interaction_penalty(mut self, penalty: f64) -> Self {
        self.medium_interaction_penalty = penalty;
        self
    }

    pub fn with_risk_scale(mut self, scale: f64) -> Self {
        self.risk_scale = scale;
        self
    }

    pub fn with_max_expansions(mut self, max: Option<usize>) -> Self {
        self.max_expansions = max;
        self
    }

    pub fn with_time_limit_ms(mut self, ms: Option<u64>) -> Self {
        self.time_limit_ms = ms;
        self
    }
}

fn env_u64(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring non-numeric environment override");
            None
        }
    }
}

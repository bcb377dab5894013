//! Engine configuration.
//!
//! The iteration caps, tolerances, and the pivot regularization epsilon are
//! empirical tunables rather than load-bearing constants. The defaults below
//! reproduce the values the estimation procedure was validated with.

use serde::{Deserialize, Serialize};

/// Controls one Newton-Raphson run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Hard cap on iterations. Hitting it yields an unconverged result.
    pub max_iterations: usize,
    /// The run converges once the step norm falls below this value.
    pub tolerance: f64,
    /// Substituted for exact-zero pivots during Gauss-Jordan elimination.
    pub pivot_epsilon: f64,
}

impl SolverOptions {
    /// Options for the one-dimensional ability solve.
    pub fn ability() -> Self {
        Self {
            max_iterations: 1500,
            tolerance: 1e-3,
            pivot_epsilon: 1e-10,
        }
    }

    /// Options for the multi-dimensional item-parameter solve.
    pub fn item() -> Self {
        Self {
            max_iterations: 50,
            tolerance: 1e-3,
            pivot_epsilon: 1e-10,
        }
    }
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self::ability()
    }
}

/// Configuration of the parameter estimators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimationConfig {
    pub ability: SolverOptions,
    pub item: SolverOptions,
    /// Ability estimates beyond this magnitude are treated as evidence of an
    /// ill-posed problem rather than as valid measurements.
    pub ability_bound: f64,
    /// Starting point of the ability solve and the ability assumed for
    /// examinees without an estimate.
    pub start_ability: f64,
    /// Starting value for every free parameter of an item solve.
    pub item_start_value: f64,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            ability: SolverOptions::ability(),
            item: SolverOptions::item(),
            ability_bound: 10.0,
            start_ability: 0.0,
            item_start_value: 0.5,
        }
    }
}

/// Per-attempt policy thresholds consumed by the selection pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttemptSettings {
    /// Maximum questions per attempt; 0 disables the cap.
    pub max_questions: u32,
    /// Minimum questions before the attempt may stop on a converged ability.
    pub min_questions: u32,
    /// An ability update smaller than this counts as unchanged.
    pub update_threshold: f64,
    /// Probability of restricting a fetch to pilot questions.
    pub pilot_ratio: f64,
    /// Seed for the pilot draw, so attempts replay deterministically.
    pub pilot_seed: u64,
    /// Window in seconds within which a recently played question is penalized.
    pub penalty_window: i64,
    /// Scales measured below this standard error stop receiving questions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standard_error_threshold: Option<f64>,
}

impl Default for AttemptSettings {
    fn default() -> Self {
        Self {
            max_questions: 25,
            min_questions: 3,
            update_threshold: 1e-3,
            pilot_ratio: 0.0,
            pilot_seed: 0,
            penalty_window: 86_400,
            standard_error_threshold: None,
        }
    }
}

/// Top-level configuration, loadable from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub estimation: EstimationConfig,
    pub attempt: AttemptSettings,
}

impl EngineConfig {
    pub fn from_toml(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_the_validated_tunables() {
        let config = EngineConfig::default();
        assert_eq!(config.estimation.ability.max_iterations, 1500);
        assert_eq!(config.estimation.item.max_iterations, 50);
        assert_eq!(config.estimation.ability.pivot_epsilon, 1e-10);
        assert_eq!(config.attempt.update_threshold, 1e-3);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config = EngineConfig::from_toml(
            "[attempt]\nmax_questions = 10\n[estimation.ability]\nmax_iterations = 200\n",
        )
        .unwrap();
        assert_eq!(config.attempt.max_questions, 10);
        assert_eq!(config.attempt.min_questions, 3);
        assert_eq!(config.estimation.ability.max_iterations, 200);
        assert_eq!(config.estimation.ability.tolerance, 1e-3);
    }
}

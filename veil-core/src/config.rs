//! Engine configuration.
//!
//! Configuration mistakes are caller bugs, not content issues, so every
//! engine validates its config eagerly at construction and refuses to start
//! rather than surfacing a broken value mid-playthrough.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A configuration value the engines refuse to run with.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("rare chance {0} is outside [0, 1]")]
    RareChanceOutOfRange(f64),

    #[error("decline step {0} is negative")]
    NegativeDeclineStep(i32),

    #[error("success floor {0} is outside [0, 100]")]
    FloorOutOfRange(i32),

    #[error("base rate {0} is outside [0, 100]")]
    BaseRateOutOfRange(i32),

    #[error("specificity bonus setting {name} is negative: {value}")]
    NegativeBonus { name: &'static str, value: i32 },

    #[error("detection setting {name} is negative: {value}")]
    NegativeDetectionTerm { name: &'static str, value: i32 },

    #[error("detection cap {cap} is below base detection {base}")]
    DetectionCapBelowBase { cap: i32, base: i32 },

    #[error("detection cap {0} is outside [0, 100]")]
    DetectionCapOutOfRange(i32),

    #[error("penalty step set is empty")]
    EmptyPenaltySteps,

    #[error("penalty step {0} is not positive")]
    NonPositivePenaltyStep(i32),

    #[error("base trust {0} is outside [0, 100]")]
    BaseTrustOutOfRange(i32),

    #[error("base resistance {0} is outside [0, 100]")]
    BaseResistanceOutOfRange(i32),

    #[error("history cap must be at least 1")]
    ZeroHistoryCap,
}

/// Whether a lower tier may be tried when a higher one has nothing eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FallthroughMode {
    /// Walk tiers from highest rank down, re-checking conditions at each.
    #[default]
    Cascade,
    /// Examine only the highest-ranked tier that has any candidates; if none
    /// of them are eligible, nothing fires.
    Isolate,
}

/// Whether `evidence_count` conditions see the whole playthrough or only the
/// current scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EvidenceScope {
    #[default]
    Playthrough,
    Scene,
}

/// Configuration for the trigger selection engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Probability that an eligible rare trigger preempts the regular pool.
    pub rare_chance: f64,
    pub fallthrough: FallthroughMode,
    pub evidence_scope: EvidenceScope,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            rare_chance: 0.15,
            fallthrough: FallthroughMode::default(),
            evidence_scope: EvidenceScope::default(),
        }
    }
}

impl SelectionConfig {
    pub fn with_rare_chance(mut self, rare_chance: f64) -> Self {
        self.rare_chance = rare_chance;
        self
    }

    pub fn with_fallthrough(mut self, fallthrough: FallthroughMode) -> Self {
        self.fallthrough = fallthrough;
        self
    }

    pub fn with_evidence_scope(mut self, scope: EvidenceScope) -> Self {
        self.evidence_scope = scope;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.rare_chance) {
            return Err(ConfigError::RareChanceOutOfRange(self.rare_chance));
        }
        Ok(())
    }
}

/// Configuration for the spell resolution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionConfig {
    pub base_rate_safe: i32,
    pub base_rate_restricted: i32,
    /// Bonus per present instruction marker (target or intent phrase).
    pub bonus_per_marker: i32,
    /// Specificity cap for safe actions.
    pub max_bonus: i32,
    /// Specificity cap for restricted actions (intent marker only).
    pub restricted_max_bonus: i32,
    /// Per-repeat-attempt subtraction from the success rate.
    pub decline_step: i32,
    /// The success rate never declines below this.
    pub floor: i32,
    pub base_detection: i32,
    /// Scales target resistance into the detection rate.
    pub skill_scale: i32,
    /// Added once the target has previously detected the player.
    pub repeat_penalty: i32,
    pub detection_cap: i32,
    /// When true, detection is rolled only for restricted actions that
    /// themselves succeeded; when false it is rolled on every restricted
    /// attempt.
    pub detect_only_on_success: bool,
    /// Discrete trust penalty magnitudes drawn from uniformly on detection.
    pub penalty_steps: Vec<i32>,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            base_rate_safe: 70,
            base_rate_restricted: 30,
            bonus_per_marker: 10,
            max_bonus: 20,
            restricted_max_bonus: 30,
            decline_step: 10,
            floor: 10,
            base_detection: 20,
            skill_scale: 30,
            repeat_penalty: 20,
            detection_cap: 80,
            detect_only_on_success: true,
            penalty_steps: vec![5, 10, 15, 20],
        }
    }
}

impl ResolutionConfig {
    pub fn with_decline_step(mut self, step: i32) -> Self {
        self.decline_step = step;
        self
    }

    pub fn with_floor(mut self, floor: i32) -> Self {
        self.floor = floor;
        self
    }

    pub fn with_base_rates(mut self, safe: i32, restricted: i32) -> Self {
        self.base_rate_safe = safe;
        self.base_rate_restricted = restricted;
        self
    }

    pub fn with_detection(mut self, base: i32, cap: i32) -> Self {
        self.base_detection = base;
        self.detection_cap = cap;
        self
    }

    pub fn with_detect_only_on_success(mut self, only_on_success: bool) -> Self {
        self.detect_only_on_success = only_on_success;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.decline_step < 0 {
            return Err(ConfigError::NegativeDeclineStep(self.decline_step));
        }
        if !(0..=100).contains(&self.floor) {
            return Err(ConfigError::FloorOutOfRange(self.floor));
        }
        for rate in [self.base_rate_safe, self.base_rate_restricted] {
            if !(0..=100).contains(&rate) {
                return Err(ConfigError::BaseRateOutOfRange(rate));
            }
        }
        for (name, value) in [
            ("bonus_per_marker", self.bonus_per_marker),
            ("max_bonus", self.max_bonus),
            ("restricted_max_bonus", self.restricted_max_bonus),
        ] {
            if value < 0 {
                return Err(ConfigError::NegativeBonus { name, value });
            }
        }
        for (name, value) in [
            ("base_detection", self.base_detection),
            ("skill_scale", self.skill_scale),
            ("repeat_penalty", self.repeat_penalty),
        ] {
            if value < 0 {
                return Err(ConfigError::NegativeDetectionTerm { name, value });
            }
        }
        if !(0..=100).contains(&self.detection_cap) {
            return Err(ConfigError::DetectionCapOutOfRange(self.detection_cap));
        }
        if self.detection_cap < self.base_detection {
            return Err(ConfigError::DetectionCapBelowBase {
                cap: self.detection_cap,
                base: self.base_detection,
            });
        }
        if self.penalty_steps.is_empty() {
            return Err(ConfigError::EmptyPenaltySteps);
        }
        if let Some(&step) = self.penalty_steps.iter().find(|&&s| s <= 0) {
            return Err(ConfigError::NonPositivePenaltyStep(step));
        }
        Ok(())
    }
}

/// Configuration for the entity state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Trust a freshly created entity starts with.
    pub base_trust: i32,
    /// Resistance a freshly created entity starts with.
    pub base_resistance: i32,
    /// Maximum retained history entries per entity.
    pub history_cap: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_trust: 50,
            base_resistance: 50,
            history_cap: 50,
        }
    }
}

impl StoreConfig {
    pub fn with_base_trust(mut self, trust: i32) -> Self {
        self.base_trust = trust;
        self
    }

    pub fn with_base_resistance(mut self, resistance: i32) -> Self {
        self.base_resistance = resistance;
        self
    }

    pub fn with_history_cap(mut self, cap: usize) -> Self {
        self.history_cap = cap;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0..=100).contains(&self.base_trust) {
            return Err(ConfigError::BaseTrustOutOfRange(self.base_trust));
        }
        if !(0..=100).contains(&self.base_resistance) {
            return Err(ConfigError::BaseResistanceOutOfRange(self.base_resistance));
        }
        if self.history_cap == 0 {
            return Err(ConfigError::ZeroHistoryCap);
        }
        Ok(())
    }
}

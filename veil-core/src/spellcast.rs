//! Spell resolution.
//!
//! Resolves one normalized casting instruction into a success/detection
//! outcome plus state deltas. The pipeline is a single linear pass per call:
//! specificity bonus from the instruction markers, success roll against a
//! rate that declines with repeat attempts on the same scope/action pair,
//! an optional detection roll for restricted actions, and the detection
//! consequence (trust penalty plus the `previously_detected` flag). The
//! engine produces no prose; the outcome object is handed to the narration
//! service as-is.

use crate::config::{ConfigError, ResolutionConfig};
use crate::state::{ActionId, AttemptKey, EntityState, ScopeId};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Flag set on a target that has caught the player casting at it.
pub const FLAG_PREVIOUSLY_DETECTED: &str = "previously_detected";

/// Whether an action risks detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionClass {
    Safe,
    Restricted,
}

/// A casting instruction as produced by the upstream classifier.
///
/// The engine never sees raw player text; by the time an instruction reaches
/// it, the classifier has reduced the text to an action id plus optional
/// target and intent phrase markers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedInstruction {
    pub action: ActionId,
    pub target_phrase: Option<String>,
    pub intent_phrase: Option<String>,
}

impl NormalizedInstruction {
    pub fn new(action: impl Into<ActionId>) -> Self {
        Self {
            action: action.into(),
            target_phrase: None,
            intent_phrase: None,
        }
    }

    pub fn with_target_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.target_phrase = Some(phrase.into());
        self
    }

    pub fn with_intent_phrase(mut self, phrase: impl Into<String>) -> Self {
        self.intent_phrase = Some(phrase.into());
        self
    }

    fn has_target_marker(&self) -> bool {
        self.target_phrase.as_deref().is_some_and(|p| !p.is_empty())
    }

    fn has_intent_marker(&self) -> bool {
        self.intent_phrase.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// Full record of one resolution call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpellAttempt {
    pub action: ActionId,
    pub scope: ScopeId,
    pub specificity_bonus: i32,
    /// How many earlier attempts the same scope/action pair had seen.
    pub attempt_index: u32,
    pub success: bool,
    /// `None` when detection was not evaluated (safe action, or a failed
    /// restricted action under detect-only-on-success).
    pub detected: Option<bool>,
    /// The trust change that actually took effect, clamping included.
    pub trust_delta: i32,
}

impl SpellAttempt {
    /// The compact view handed to the narration service.
    pub fn outcome(&self) -> ResolutionOutcome {
        ResolutionOutcome {
            succeeded: self.success,
            detected: self.detected,
            trust_delta: self.trust_delta,
        }
    }
}

/// What a resolution call produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    pub succeeded: bool,
    /// Always `None` for safe actions.
    pub detected: Option<bool>,
    pub trust_delta: i32,
}

/// Computes probabilistic success and detection outcomes for castings.
pub struct ResolutionEngine {
    config: ResolutionConfig,
}

impl ResolutionEngine {
    pub fn new(config: ResolutionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ResolutionConfig {
        &self.config
    }

    /// Additive bonus for a well-targeted, well-intentioned instruction.
    ///
    /// Safe actions earn the per-marker bonus for each of the target and
    /// intent phrases. Restricted actions address their target directly, so
    /// only the intent phrase counts, under the restricted cap.
    pub fn specificity_bonus(
        &self,
        class: ActionClass,
        instruction: &NormalizedInstruction,
    ) -> i32 {
        match class {
            ActionClass::Safe => {
                let mut bonus = 0;
                if instruction.has_target_marker() {
                    bonus += self.config.bonus_per_marker;
                }
                if instruction.has_intent_marker() {
                    bonus += self.config.bonus_per_marker;
                }
                bonus.min(self.config.max_bonus)
            }
            ActionClass::Restricted => {
                let bonus = if instruction.has_intent_marker() {
                    self.config.bonus_per_marker
                } else {
                    0
                };
                bonus.min(self.config.restricted_max_bonus)
            }
        }
    }

    /// Success rate for the given bonus after `attempts` earlier tries.
    ///
    /// Monotonically non-increasing in `attempts`, never below the floor,
    /// never above 100.
    pub fn success_rate(&self, class: ActionClass, specificity_bonus: i32, attempts: u32) -> i32 {
        let base = match class {
            ActionClass::Safe => self.config.base_rate_safe,
            ActionClass::Restricted => self.config.base_rate_restricted,
        };
        let declined = base + specificity_bonus - attempts as i32 * self.config.decline_step;
        declined.clamp(self.config.floor, 100)
    }

    /// Detection rate for a restricted casting at this target.
    ///
    /// Always within `[base_detection, detection_cap]`: the resistance and
    /// repeat terms are non-negative by config validation.
    pub fn detection_rate(&self, target: &EntityState) -> i32 {
        let skill_bonus = target.resistance() * self.config.skill_scale / 100;
        let repeat = if target.has_flag(FLAG_PREVIOUSLY_DETECTED) {
            self.config.repeat_penalty
        } else {
            0
        };
        (self.config.base_detection + skill_bonus + repeat).clamp(0, self.config.detection_cap)
    }

    /// Resolve one casting and return the compact outcome.
    pub fn resolve<R: Rng>(
        &self,
        class: ActionClass,
        instruction: &NormalizedInstruction,
        scope: &ScopeId,
        target: &mut EntityState,
        rng: &mut R,
    ) -> ResolutionOutcome {
        self.resolve_attempt(class, instruction, scope, target, rng)
            .outcome()
    }

    /// Resolve one casting and return the full attempt record.
    ///
    /// The attempt counter for this scope/action pair increments on every
    /// call, success or failure; decline applies to the next attempt either
    /// way. There is no retry inside a call — a new player action is a new,
    /// independent call.
    pub fn resolve_attempt<R: Rng>(
        &self,
        class: ActionClass,
        instruction: &NormalizedInstruction,
        scope: &ScopeId,
        target: &mut EntityState,
        rng: &mut R,
    ) -> SpellAttempt {
        let specificity_bonus = self.specificity_bonus(class, instruction);
        let key = AttemptKey::new(scope.clone(), instruction.action.clone());
        let attempt_index = target.attempts(&key);
        let rate = self.success_rate(class, specificity_bonus, attempt_index);
        target.bump_attempts(key);

        let success = rng.gen_range(0..100) < rate;

        let mut detected = None;
        let mut trust_delta = 0;
        if class == ActionClass::Restricted
            && (success || !self.config.detect_only_on_success)
        {
            let detection = self.detection_rate(target);
            let noticed = rng.gen_range(0..100) < detection;
            detected = Some(noticed);
            if noticed {
                if let Some(&penalty) = self.config.penalty_steps.choose(rng) {
                    trust_delta = target.adjust_trust(-penalty);
                }
                target.set_flag(FLAG_PREVIOUSLY_DETECTED);
            }
        }

        debug!(
            action = %instruction.action,
            scope = %scope,
            rate,
            success,
            ?detected,
            trust_delta,
            "casting resolved"
        );

        SpellAttempt {
            action: instruction.action.clone(),
            scope: scope.clone(),
            specificity_bonus,
            attempt_index,
            success,
            detected,
            trust_delta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::state::{EntityId, EntityStateStore};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn engine(config: ResolutionConfig) -> ResolutionEngine {
        ResolutionEngine::new(config).unwrap()
    }

    fn target() -> (EntityStateStore, EntityId) {
        let store = EntityStateStore::new(StoreConfig::default()).unwrap();
        (store, EntityId::from("medium"))
    }

    #[test]
    fn test_specificity_bonus_safe_caps_at_max() {
        let engine = engine(ResolutionConfig::default());
        let bare = NormalizedInstruction::new("candle_reading");
        let full = NormalizedInstruction::new("candle_reading")
            .with_target_phrase("the cellar door")
            .with_intent_phrase("to find what was hidden");

        assert_eq!(engine.specificity_bonus(ActionClass::Safe, &bare), 0);
        assert_eq!(engine.specificity_bonus(ActionClass::Safe, &full), 20);
    }

    #[test]
    fn test_specificity_bonus_restricted_ignores_target_marker() {
        let engine = engine(ResolutionConfig::default());
        let targeted_only =
            NormalizedInstruction::new("compulsion").with_target_phrase("the butler");
        let intended = NormalizedInstruction::new("compulsion")
            .with_intent_phrase("to make him confess");

        assert_eq!(
            engine.specificity_bonus(ActionClass::Restricted, &targeted_only),
            0
        );
        assert_eq!(
            engine.specificity_bonus(ActionClass::Restricted, &intended),
            10
        );
    }

    #[test]
    fn test_empty_marker_phrases_do_not_count() {
        let engine = engine(ResolutionConfig::default());
        let hollow = NormalizedInstruction::new("candle_reading")
            .with_target_phrase("")
            .with_intent_phrase("");
        assert_eq!(engine.specificity_bonus(ActionClass::Safe, &hollow), 0);
    }

    #[test]
    fn test_success_rate_documented_scenarios() {
        let engine = engine(ResolutionConfig::default());
        // base 70, bonus 20: fresh attempt 90, two repeats bring it to 70.
        assert_eq!(engine.success_rate(ActionClass::Safe, 20, 0), 90);
        assert_eq!(engine.success_rate(ActionClass::Safe, 20, 2), 70);
        // base 30, bonus 30, three repeats: 30+30-30 = 30, above the floor.
        assert_eq!(engine.success_rate(ActionClass::Restricted, 30, 3), 30);
    }

    #[test]
    fn test_success_rate_monotone_and_floored() {
        let engine = engine(ResolutionConfig::default());
        let mut previous = i32::MAX;
        for attempts in 0..20 {
            let rate = engine.success_rate(ActionClass::Restricted, 10, attempts);
            assert!(rate <= previous);
            assert!(rate >= engine.config().floor);
            previous = rate;
        }
        assert_eq!(
            engine.success_rate(ActionClass::Restricted, 0, 50),
            engine.config().floor
        );
    }

    #[test]
    fn test_success_rate_caps_at_hundred() {
        let config = ResolutionConfig::default().with_base_rates(95, 30);
        let engine = engine(config);
        assert_eq!(engine.success_rate(ActionClass::Safe, 20, 0), 100);
    }

    #[test]
    fn test_detection_rate_scenario() {
        let engine = engine(ResolutionConfig::default());
        let (mut store, id) = target();
        let state = store.entity_mut(&id);

        // base 20 + 50 * 30 / 100 = 35 with no repeat flag.
        assert_eq!(engine.detection_rate(state), 35);

        state.set_flag(FLAG_PREVIOUSLY_DETECTED);
        assert_eq!(engine.detection_rate(state), 55);
    }

    #[test]
    fn test_detection_rate_respects_cap() {
        let engine = engine(ResolutionConfig::default());
        let (mut store, id) = target();
        let state = store.entity_mut(&id);
        state.set_resistance(100);
        state.set_flag(FLAG_PREVIOUSLY_DETECTED);

        // 20 + 30 + 20 = 70, under the default cap of 80.
        assert_eq!(engine.detection_rate(state), 70);

        let tight = ResolutionConfig::default().with_detection(20, 40);
        let engine = ResolutionEngine::new(tight).unwrap();
        assert_eq!(engine.detection_rate(state), 40);
    }

    #[test]
    fn test_counter_increments_on_failure_too() {
        // Rate pinned to zero: every attempt fails, the counter still grows.
        let config = ResolutionConfig::default()
            .with_base_rates(0, 0)
            .with_floor(0)
            .with_decline_step(0);
        let engine = engine(config);
        let (mut store, id) = target();
        let state = store.entity_mut(&id);
        let mut rng = StdRng::seed_from_u64(3);

        let scope = ScopeId::from("parlor");
        let instruction = NormalizedInstruction::new("candle_reading");
        for expected in 0..4 {
            let attempt =
                engine.resolve_attempt(ActionClass::Safe, &instruction, &scope, state, &mut rng);
            assert!(!attempt.success);
            assert_eq!(attempt.attempt_index, expected);
        }
        assert_eq!(
            state.attempts(&AttemptKey::new("parlor", "candle_reading")),
            4
        );
    }

    #[test]
    fn test_safe_actions_never_report_detection() {
        let engine = engine(ResolutionConfig::default());
        let (mut store, id) = target();
        let state = store.entity_mut(&id);
        let mut rng = StdRng::seed_from_u64(5);

        let scope = ScopeId::from("parlor");
        let instruction = NormalizedInstruction::new("candle_reading");
        for _ in 0..10 {
            let outcome =
                engine.resolve(ActionClass::Safe, &instruction, &scope, state, &mut rng);
            assert_eq!(outcome.detected, None);
            assert_eq!(outcome.trust_delta, 0);
        }
    }

    #[test]
    fn test_certain_detection_applies_consequence() {
        // Detection pinned to 100 and rolled on every attempt.
        let config = ResolutionConfig::default()
            .with_detection(100, 100)
            .with_detect_only_on_success(false);
        let engine = engine(config);
        let (mut store, id) = target();
        let state = store.entity_mut(&id);
        let mut rng = StdRng::seed_from_u64(9);

        let trust_before = state.trust();
        let scope = ScopeId::from("medium");
        let instruction = NormalizedInstruction::new("compulsion");
        let attempt =
            engine.resolve_attempt(ActionClass::Restricted, &instruction, &scope, state, &mut rng);

        assert_eq!(attempt.detected, Some(true));
        assert!(attempt.trust_delta < 0);
        assert!(engine
            .config()
            .penalty_steps
            .contains(&-attempt.trust_delta));
        assert_eq!(state.trust(), trust_before + attempt.trust_delta);
        assert!(state.has_flag(FLAG_PREVIOUSLY_DETECTED));
    }

    #[test]
    fn test_failed_restricted_attempt_skips_detection_by_default() {
        // Success pinned to zero, detection certain, detect_only_on_success
        // left at the default: detection must not be evaluated at all.
        let config = ResolutionConfig::default()
            .with_base_rates(0, 0)
            .with_floor(0)
            .with_detection(100, 100);
        let engine = engine(config);
        let (mut store, id) = target();
        let state = store.entity_mut(&id);
        let mut rng = StdRng::seed_from_u64(1);

        let scope = ScopeId::from("medium");
        let instruction = NormalizedInstruction::new("compulsion");
        let attempt =
            engine.resolve_attempt(ActionClass::Restricted, &instruction, &scope, state, &mut rng);

        assert!(!attempt.success);
        assert_eq!(attempt.detected, None);
        assert_eq!(attempt.trust_delta, 0);
        assert!(!state.has_flag(FLAG_PREVIOUSLY_DETECTED));
    }

    #[test]
    fn test_trust_delta_reports_clamped_change() {
        let config = ResolutionConfig::default()
            .with_detection(100, 100)
            .with_detect_only_on_success(false);
        let engine = engine(config);
        let store_config = StoreConfig::default().with_base_trust(2);
        let mut store = EntityStateStore::new(store_config).unwrap();
        let id = EntityId::from("medium");
        let state = store.entity_mut(&id);
        let mut rng = StdRng::seed_from_u64(2);

        let scope = ScopeId::from("medium");
        let instruction = NormalizedInstruction::new("compulsion");
        let attempt =
            engine.resolve_attempt(ActionClass::Restricted, &instruction, &scope, state, &mut rng);

        // Penalties are at least 5 but only 2 points of trust existed.
        assert_eq!(attempt.detected, Some(true));
        assert_eq!(attempt.trust_delta, -2);
        assert_eq!(state.trust(), 0);
    }
}

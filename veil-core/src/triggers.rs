//! Tiered trigger content and the selection engine.
//!
//! Secret reveals and ambient commentary share one mechanism: a tiered pool
//! of conditionally-eligible triggers, filtered against the entity's state
//! and thinned by never-repeat semantics, with rare triggers winning a
//! probability gate over the regular pool. Tier rank decides which pool is
//! tried first; the condition alone decides eligibility. A tier that looks
//! reachable by rank but whose conditions do not hold contributes nothing.

use crate::condition::ConditionExpr;
use crate::config::{ConfigError, FallthroughMode, SelectionConfig};
use crate::state::{EntityState, EvaluationContext, HistoryKind, TriggerId};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, trace};

/// Opaque handle to a narration template. The engine never renders it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateRef(String);

impl TemplateRef {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TemplateRef {
    fn from(template: &str) -> Self {
        Self(template.to_string())
    }
}

impl From<String> for TemplateRef {
    fn from(template: String) -> Self {
        Self(template)
    }
}

impl fmt::Display for TemplateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An immutable content item competing for selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub id: TriggerId,
    /// Priority rank; higher tiers are attempted first.
    pub tier: i32,
    pub condition: ConditionExpr,
    /// Rare triggers are reserved for special content and preempt the
    /// regular pool only when the rare-chance gate passes.
    pub rare: bool,
    pub template: TemplateRef,
}

impl Trigger {
    /// Build a trigger from a raw condition string, compiling it once.
    pub fn new(
        id: impl Into<TriggerId>,
        tier: i32,
        condition: &str,
        template: impl Into<TemplateRef>,
    ) -> Self {
        Self {
            id: id.into(),
            tier,
            condition: ConditionExpr::parse(condition),
            rare: false,
            template: template.into(),
        }
    }

    pub fn rare(mut self) -> Self {
        self.rare = true;
        self
    }

    pub fn with_condition(mut self, condition: ConditionExpr) -> Self {
        self.condition = condition;
        self
    }
}

/// One priority rank's worth of triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerTier {
    pub rank: i32,
    pub triggers: Vec<Trigger>,
}

/// All triggers for one selection domain, grouped by tier and sorted from
/// highest rank to lowest. Built once at content-load time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerBook {
    tiers: Vec<TriggerTier>,
}

impl TriggerBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_triggers(triggers: impl IntoIterator<Item = Trigger>) -> Self {
        let mut book = Self::new();
        for trigger in triggers {
            book.push(trigger);
        }
        book
    }

    /// Insert a trigger into its tier, keeping tiers sorted by descending
    /// rank and preserving authored order within a tier.
    pub fn push(&mut self, trigger: Trigger) {
        match self.tiers.iter_mut().find(|t| t.rank == trigger.tier) {
            Some(tier) => tier.triggers.push(trigger),
            None => {
                let at = self
                    .tiers
                    .iter()
                    .position(|t| t.rank < trigger.tier)
                    .unwrap_or(self.tiers.len());
                self.tiers.insert(
                    at,
                    TriggerTier {
                        rank: trigger.tier,
                        triggers: vec![trigger],
                    },
                );
            }
        }
    }

    /// Tiers from highest rank to lowest.
    pub fn tiers(&self) -> &[TriggerTier] {
        &self.tiers
    }

    pub fn len(&self) -> usize {
        self.tiers.iter().map(|t| t.triggers.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.iter().all(|t| t.triggers.is_empty())
    }
}

/// Performs tiered, filtered, weighted random selection.
pub struct TriggerSelector {
    config: SelectionConfig,
}

impl TriggerSelector {
    pub fn new(config: SelectionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// Select at most one trigger for this turn.
    ///
    /// Walks tiers from highest rank down. Within a tier, a candidate is
    /// eligible iff its condition holds under `ctx` and it has not already
    /// fired for this entity. The first tier with an eligible candidate
    /// decides the outcome; when none has one the result is `None`, which is
    /// a normal quiet turn, not an error.
    ///
    /// On a hit the chosen id is recorded in `state.fired_triggers` and a
    /// history entry is appended; a `None` result leaves `state` untouched.
    pub fn select<R: Rng>(
        &self,
        book: &TriggerBook,
        ctx: &EvaluationContext,
        state: &mut EntityState,
        rng: &mut R,
    ) -> Option<Trigger> {
        let chosen = match self.config.fallthrough {
            FallthroughMode::Cascade => book
                .tiers()
                .iter()
                .find_map(|tier| self.pick_in_tier(tier, ctx, state, rng)),
            FallthroughMode::Isolate => book
                .tiers()
                .iter()
                .find(|tier| !tier.triggers.is_empty())
                .and_then(|tier| self.pick_in_tier(tier, ctx, state, rng)),
        }?;

        let chosen = chosen.clone();
        state.record_fired(chosen.id.clone());
        state.record(HistoryKind::Trigger, chosen.template.as_str());
        debug!(id = %chosen.id, tier = chosen.tier, rare = chosen.rare, "trigger fired");
        Some(chosen)
    }

    fn pick_in_tier<'a, R: Rng>(
        &self,
        tier: &'a TriggerTier,
        ctx: &EvaluationContext,
        state: &EntityState,
        rng: &mut R,
    ) -> Option<&'a Trigger> {
        let eligible: Vec<&Trigger> = tier
            .triggers
            .iter()
            .filter(|t| !state.has_fired(&t.id) && t.condition.evaluate(ctx))
            .collect();
        if eligible.is_empty() {
            trace!(rank = tier.rank, "no eligible candidate in tier");
            return None;
        }

        let (rare, regular): (Vec<&Trigger>, Vec<&Trigger>) =
            eligible.into_iter().partition(|t| t.rare);

        if !rare.is_empty() && rng.gen::<f64>() < self.config.rare_chance {
            return rare.choose(rng).copied();
        }
        if !regular.is_empty() {
            return regular.choose(rng).copied();
        }
        // Only rare candidates remain; a failed rare-chance roll must not
        // turn an eligible tier into a silent one.
        rare.choose(rng).copied()
    }
}

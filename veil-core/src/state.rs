//! Mutable per-entity state.
//!
//! Every addressable entity — a character, a location, or the global player
//! scope — owns one [`EntityState`]: trust, discovered evidence, fired
//! triggers, repeat-attempt counters, one-shot flags, and a bounded history
//! used only when the narration service builds its context window. States are
//! created on first reference and live for the whole playthrough.

use crate::config::StoreConfig;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id! {
    /// Identifies an addressable entity (character, location, or player scope).
    EntityId
}

string_id! {
    /// Identifies a piece of evidence declared by case content.
    EvidenceId
}

string_id! {
    /// Identifies a commentary or reveal trigger declared by case content.
    TriggerId
}

string_id! {
    /// The addressable unit repeat-attempt counters accumulate against.
    ScopeId
}

string_id! {
    /// Identifies a normalized action (spell id) from the upstream classifier.
    ActionId
}

/// Flat composite key for repeat-attempt counters.
///
/// Keeping scope and action in one key means a missing entry is simply a zero
/// count; there is no outer map whose absence could reset an inner one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttemptKey {
    pub scope: ScopeId,
    pub action: ActionId,
}

impl AttemptKey {
    pub fn new(scope: impl Into<ScopeId>, action: impl Into<ActionId>) -> Self {
        Self {
            scope: scope.into(),
            action: action.into(),
        }
    }
}

impl fmt::Display for AttemptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.action)
    }
}

// ============================================================================
// History
// ============================================================================

/// What produced a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryKind {
    /// A selected commentary or reveal trigger.
    Trigger,
    /// A player action, recorded by the caller.
    Action,
    /// Rendered prose, recorded by the narration service.
    Narration,
}

/// One line of an entity's bounded history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub kind: HistoryKind,
    pub summary: String,
}

// ============================================================================
// Entity state
// ============================================================================

/// Mutable record for one entity.
///
/// Trust stays clamped to `[0, 100]` through every mutation. Evidence, fired
/// triggers, and attempt counters only ever grow; history is append-only with
/// oldest-first eviction past the configured cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityState {
    trust: i32,
    resistance: i32,
    discovered_evidence: HashSet<EvidenceId>,
    fired_triggers: HashSet<TriggerId>,
    #[serde(with = "counters_as_entries")]
    attempt_counters: HashMap<AttemptKey, u32>,
    flags: HashSet<String>,
    history: VecDeque<HistoryEntry>,
    history_cap: usize,
}

impl EntityState {
    pub(crate) fn new(config: &StoreConfig) -> Self {
        Self {
            trust: config.base_trust,
            resistance: config.base_resistance,
            discovered_evidence: HashSet::new(),
            fired_triggers: HashSet::new(),
            attempt_counters: HashMap::new(),
            flags: HashSet::new(),
            history: VecDeque::new(),
            history_cap: config.history_cap,
        }
    }

    pub fn trust(&self) -> i32 {
        self.trust
    }

    /// Static per-entity resistance consumed by detection; never mutated by
    /// the engines.
    pub fn resistance(&self) -> i32 {
        self.resistance
    }

    pub fn set_resistance(&mut self, resistance: i32) {
        self.resistance = resistance.clamp(0, 100);
    }

    /// Apply a trust delta, clamped to `[0, 100]`.
    ///
    /// Returns the delta that actually took effect, which may be smaller in
    /// magnitude than the requested one when clamping kicks in.
    pub fn adjust_trust(&mut self, delta: i32) -> i32 {
        let before = self.trust;
        self.trust = (self.trust + delta).clamp(0, 100);
        self.trust - before
    }

    /// Record a discovered piece of evidence. Returns true if it was new.
    pub fn discover_evidence(&mut self, id: impl Into<EvidenceId>) -> bool {
        self.discovered_evidence.insert(id.into())
    }

    pub fn evidence_count(&self) -> u32 {
        self.discovered_evidence.len() as u32
    }

    pub fn discovered_evidence(&self) -> &HashSet<EvidenceId> {
        &self.discovered_evidence
    }

    pub fn has_fired(&self, id: &TriggerId) -> bool {
        self.fired_triggers.contains(id)
    }

    /// Permanently exclude a trigger from future selection for this entity.
    pub fn record_fired(&mut self, id: TriggerId) {
        self.fired_triggers.insert(id);
    }

    pub fn fired_triggers(&self) -> &HashSet<TriggerId> {
        &self.fired_triggers
    }

    /// Attempts so far for a scope/action pair; zero when never attempted.
    pub fn attempts(&self, key: &AttemptKey) -> u32 {
        self.attempt_counters.get(key).copied().unwrap_or(0)
    }

    /// Increment the counter for a scope/action pair, returning the new count.
    pub fn bump_attempts(&mut self, key: AttemptKey) -> u32 {
        let count = self.attempt_counters.entry(key).or_insert(0);
        *count += 1;
        *count
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.contains(name)
    }

    pub fn set_flag(&mut self, name: impl Into<String>) {
        self.flags.insert(name.into());
    }

    pub fn flags(&self) -> &HashSet<String> {
        &self.flags
    }

    /// Append a history entry, evicting the oldest past the cap.
    pub fn record(&mut self, kind: HistoryKind, summary: impl Into<String>) {
        self.history.push_back(HistoryEntry {
            kind,
            summary: summary.into(),
        });
        while self.history.len() > self.history_cap {
            self.history.pop_front();
        }
    }

    /// Recent history, oldest first. Consumed by narration context building
    /// only; engine logic never reads it.
    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    pub(crate) fn retrim_history(&mut self, cap: usize) {
        self.history_cap = cap;
        while self.history.len() > cap {
            self.history.pop_front();
        }
    }
}

/// Attempt counters serialize as a sorted entry list; JSON maps cannot key on
/// a composite struct.
mod counters_as_entries {
    use super::AttemptKey;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::HashMap;

    pub fn serialize<S: Serializer>(
        map: &HashMap<AttemptKey, u32>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut entries: Vec<(&AttemptKey, &u32)> = map.iter().collect();
        entries.sort();
        entries.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<HashMap<AttemptKey, u32>, D::Error> {
        let entries = Vec::<(AttemptKey, u32)>::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}

// ============================================================================
// Evaluation context
// ============================================================================

/// Read-only snapshot a condition tree is evaluated against.
///
/// Owned rather than borrowed so that a selector can hold the snapshot while
/// it mutates the entity state it was taken from.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    pub trust: i32,
    pub evidence_count: u32,
    pub discovered_evidence: HashSet<EvidenceId>,
    pub flags: HashSet<String>,
}

impl EvaluationContext {
    /// Snapshot an entity. `evidence_count` covers the whole playthrough;
    /// callers running scene-scoped counting override it with
    /// [`EvaluationContext::with_evidence_count`].
    pub fn for_entity(state: &EntityState) -> Self {
        Self {
            trust: state.trust,
            evidence_count: state.evidence_count(),
            discovered_evidence: state.discovered_evidence.clone(),
            flags: state.flags.clone(),
        }
    }

    pub fn with_evidence_count(mut self, count: u32) -> Self {
        self.evidence_count = count;
        self
    }
}

impl From<&EntityState> for EvaluationContext {
    fn from(state: &EntityState) -> Self {
        Self::for_entity(state)
    }
}

// ============================================================================
// Store
// ============================================================================

/// Holds every entity state in a playthrough.
///
/// States are created lazily on first reference with the configured base
/// values. The store hands out one mutable borrow per call; callers are
/// responsible for serializing access per entity.
#[derive(Debug)]
pub struct EntityStateStore {
    config: StoreConfig,
    playthrough_id: Uuid,
    entities: HashMap<EntityId, EntityState>,
}

impl EntityStateStore {
    pub fn new(config: StoreConfig) -> Result<Self, crate::config::ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            playthrough_id: Uuid::new_v4(),
            entities: HashMap::new(),
        })
    }

    pub(crate) fn restore(
        config: StoreConfig,
        playthrough_id: Uuid,
        mut entities: HashMap<EntityId, EntityState>,
    ) -> Result<Self, crate::config::ConfigError> {
        config.validate()?;
        for state in entities.values_mut() {
            state.retrim_history(config.history_cap);
        }
        Ok(Self {
            config,
            playthrough_id,
            entities,
        })
    }

    /// Identity of this playthrough, carried into snapshots.
    pub fn playthrough_id(&self) -> Uuid {
        self.playthrough_id
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Look up an entity without creating it.
    pub fn entity(&self, id: &EntityId) -> Option<&EntityState> {
        self.entities.get(id)
    }

    /// Look up an entity, creating it on first reference.
    pub fn entity_mut(&mut self, id: &EntityId) -> &mut EntityState {
        self.entities
            .entry(id.clone())
            .or_insert_with(|| EntityState::new(&self.config))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &EntityState)> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub(crate) fn entities(&self) -> &HashMap<EntityId, EntityState> {
        &self.entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    fn store() -> EntityStateStore {
        EntityStateStore::new(StoreConfig::default()).unwrap()
    }

    #[test]
    fn test_entity_created_on_first_reference() {
        let mut store = store();
        let id = EntityId::from("mrs_holloway");
        assert!(store.entity(&id).is_none());

        let state = store.entity_mut(&id);
        assert_eq!(state.trust(), StoreConfig::default().base_trust);
        assert_eq!(state.evidence_count(), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_trust_clamps_both_ends() {
        let mut store = store();
        let state = store.entity_mut(&EntityId::from("caretaker"));

        assert_eq!(state.adjust_trust(1000), 50);
        assert_eq!(state.trust(), 100);
        assert_eq!(state.adjust_trust(-1000), -100);
        assert_eq!(state.trust(), 0);
        assert_eq!(state.adjust_trust(-5), 0);
    }

    #[test]
    fn test_attempt_counters_default_to_zero_and_grow() {
        let mut store = store();
        let state = store.entity_mut(&EntityId::from("player"));
        let key = AttemptKey::new("library", "scrying");

        assert_eq!(state.attempts(&key), 0);
        assert_eq!(state.bump_attempts(key.clone()), 1);
        assert_eq!(state.bump_attempts(key.clone()), 2);
        assert_eq!(state.attempts(&key), 2);

        // A different action in the same scope counts separately.
        let other = AttemptKey::new("library", "warding");
        assert_eq!(state.attempts(&other), 0);
    }

    #[test]
    fn test_evidence_is_deduplicated() {
        let mut store = store();
        let state = store.entity_mut(&EntityId::from("player"));

        assert!(state.discover_evidence("torn_letter"));
        assert!(!state.discover_evidence("torn_letter"));
        assert_eq!(state.evidence_count(), 1);
    }

    #[test]
    fn test_history_evicts_oldest_past_cap() {
        let config = StoreConfig::default().with_history_cap(3);
        let mut store = EntityStateStore::new(config).unwrap();
        let state = store.entity_mut(&EntityId::from("player"));

        for i in 0..5 {
            state.record(HistoryKind::Action, format!("turn {i}"));
        }

        let entries: Vec<_> = state.history().map(|e| e.summary.clone()).collect();
        assert_eq!(entries, vec!["turn 2", "turn 3", "turn 4"]);
    }

    #[test]
    fn test_context_snapshot_is_independent() {
        let mut store = store();
        let state = store.entity_mut(&EntityId::from("medium"));
        state.discover_evidence("seance_photo");

        let ctx = EvaluationContext::for_entity(state);
        state.discover_evidence("ash_circle");

        assert_eq!(ctx.evidence_count, 1);
        assert_eq!(state.evidence_count(), 2);
    }

    #[test]
    fn test_counters_survive_serde() {
        let mut store = store();
        let state = store.entity_mut(&EntityId::from("player"));
        state.bump_attempts(AttemptKey::new("study", "scrying"));
        state.bump_attempts(AttemptKey::new("study", "scrying"));
        state.set_flag("previously_detected");

        let json = serde_json::to_string(&*state).unwrap();
        let back: EntityState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.attempts(&AttemptKey::new("study", "scrying")), 2);
        assert!(back.has_flag("previously_detected"));
    }
}

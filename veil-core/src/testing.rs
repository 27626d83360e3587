//! Testing utilities.
//!
//! Provides a deterministic fixture for integration tests: a seeded RNG,
//! canned trigger content, default-configured engines, and assertion helpers
//! for verifying entity state.

use crate::config::{EvidenceScope, ResolutionConfig, SelectionConfig, StoreConfig};
use crate::spellcast::{ActionClass, NormalizedInstruction, ResolutionEngine, ResolutionOutcome};
use crate::state::{EntityId, EntityState, EntityStateStore, EvaluationContext, ScopeId, TriggerId};
use crate::triggers::{Trigger, TriggerBook, TriggerSelector};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// A reproducible random source for tests.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// A self-contained case setup: store, trigger book, engines, seeded RNG.
pub struct CaseFixture {
    pub store: EntityStateStore,
    pub book: TriggerBook,
    pub selector: TriggerSelector,
    pub resolver: ResolutionEngine,
    pub rng: StdRng,
    scene_evidence: Option<u32>,
}

impl CaseFixture {
    /// Default configs and a fixed seed.
    pub fn new() -> Self {
        Self::with_seed(7)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_configs(
            seed,
            StoreConfig::default(),
            SelectionConfig::default(),
            ResolutionConfig::default(),
        )
    }

    pub fn with_configs(
        seed: u64,
        store: StoreConfig,
        selection: SelectionConfig,
        resolution: ResolutionConfig,
    ) -> Self {
        Self {
            store: EntityStateStore::new(store).expect("store config is valid"),
            book: TriggerBook::new(),
            selector: TriggerSelector::new(selection).expect("selection config is valid"),
            resolver: ResolutionEngine::new(resolution).expect("resolution config is valid"),
            rng: seeded_rng(seed),
            scene_evidence: None,
        }
    }

    /// Add a regular trigger to the book.
    pub fn trigger(&mut self, id: &str, tier: i32, condition: &str) -> &mut Self {
        self.book
            .push(Trigger::new(id, tier, condition, format!("tpl.{id}")));
        self
    }

    /// Add a rare trigger to the book.
    pub fn rare_trigger(&mut self, id: &str, tier: i32, condition: &str) -> &mut Self {
        self.book
            .push(Trigger::new(id, tier, condition, format!("tpl.{id}")).rare());
        self
    }

    /// Pin the scene-scoped evidence count used when the selection config
    /// asks for [`EvidenceScope::Scene`].
    pub fn set_scene_evidence(&mut self, count: u32) {
        self.scene_evidence = Some(count);
    }

    /// Run one selection turn for an entity.
    pub fn select_for(&mut self, entity: &str) -> Option<Trigger> {
        let id = EntityId::from(entity);
        let scope = self.selector.config().evidence_scope;
        let state = self.store.entity_mut(&id);
        let mut ctx = EvaluationContext::for_entity(state);
        if scope == EvidenceScope::Scene {
            ctx = ctx.with_evidence_count(self.scene_evidence.unwrap_or(0));
        }
        self.selector.select(&self.book, &ctx, state, &mut self.rng)
    }

    /// Resolve one casting against an entity, with the entity as the scope.
    pub fn cast(
        &mut self,
        class: ActionClass,
        instruction: &NormalizedInstruction,
        target: &str,
    ) -> ResolutionOutcome {
        let id = EntityId::from(target);
        let scope = ScopeId::from(target);
        let state = self.store.entity_mut(&id);
        self.resolver
            .resolve(class, instruction, &scope, state, &mut self.rng)
    }

    pub fn entity(&mut self, id: &str) -> &mut EntityState {
        self.store.entity_mut(&EntityId::from(id))
    }

    pub fn trust_of(&mut self, id: &str) -> i32 {
        self.entity(id).trust()
    }
}

impl Default for CaseFixture {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert an entity's trust value.
#[track_caller]
pub fn assert_trust(fixture: &mut CaseFixture, entity: &str, expected: i32) {
    let actual = fixture.trust_of(entity);
    assert_eq!(actual, expected, "expected {entity} trust {expected}, got {actual}");
}

/// Assert that a trigger has fired for an entity.
#[track_caller]
pub fn assert_fired(fixture: &mut CaseFixture, entity: &str, trigger: &str) {
    assert!(
        fixture.entity(entity).has_fired(&TriggerId::from(trigger)),
        "expected trigger '{trigger}' to have fired for {entity}"
    );
}

/// Assert that a trigger has NOT fired for an entity.
#[track_caller]
pub fn assert_not_fired(fixture: &mut CaseFixture, entity: &str, trigger: &str) {
    assert!(
        !fixture.entity(entity).has_fired(&TriggerId::from(trigger)),
        "expected trigger '{trigger}' to not have fired for {entity}"
    );
}

/// Assert that an entity carries a flag.
#[track_caller]
pub fn assert_flag(fixture: &mut CaseFixture, entity: &str, flag: &str) {
    assert!(
        fixture.entity(entity).has_flag(flag),
        "expected {entity} to carry flag '{flag}'"
    );
}

//! Condition & resolution engine for the Veil investigation game.
//!
//! This crate provides the deterministic rules core shared by three game
//! features:
//! - character secret reveals and tiered ambient commentary, via a compact
//!   condition language and a tiered, never-repeat trigger selector;
//! - spell casting, via probabilistic success/detection resolution with
//!   monotonically declining success on repetition.
//!
//! Everything around it — the narration service that renders prose, the
//! persistence layer that stores snapshots, the classifier that turns raw
//! player text into normalized instructions — is an external collaborator.
//! The engine performs no I/O and holds no global state; random sources are
//! passed in explicitly so outcomes are reproducible under test.
//!
//! # Quick Start
//!
//! ```ignore
//! use veil_core::{ActionClass, CaseFixture, NormalizedInstruction};
//!
//! let mut fixture = CaseFixture::new();
//! fixture.trigger("first_doubt", 2, "trust>=60 AND evidence:torn_letter");
//! fixture.trigger("small_talk", 1, "");
//!
//! fixture.entity("mrs_holloway").discover_evidence("torn_letter");
//! if let Some(trigger) = fixture.select_for("mrs_holloway") {
//!     println!("narrate with template {}", trigger.template);
//! }
//!
//! let casting = NormalizedInstruction::new("candle_reading")
//!     .with_intent_phrase("to find what was hidden");
//! let outcome = fixture.cast(ActionClass::Safe, &casting, "mrs_holloway");
//! println!("succeeded: {}", outcome.succeeded);
//! ```

pub mod condition;
pub mod config;
pub mod persist;
pub mod spellcast;
pub mod state;
pub mod testing;
pub mod triggers;

// Primary public API
pub use condition::{Atom, Comparison, ConditionExpr};
pub use config::{
    ConfigError, EvidenceScope, FallthroughMode, ResolutionConfig, SelectionConfig, StoreConfig,
};
pub use persist::{PersistError, SavedState};
pub use spellcast::{
    ActionClass, NormalizedInstruction, ResolutionEngine, ResolutionOutcome, SpellAttempt,
    FLAG_PREVIOUSLY_DETECTED,
};
pub use state::{
    ActionId, AttemptKey, EntityId, EntityState, EntityStateStore, EvaluationContext, EvidenceId,
    HistoryEntry, HistoryKind, ScopeId, TriggerId,
};
pub use testing::CaseFixture;
pub use triggers::{TemplateRef, Trigger, TriggerBook, TriggerSelector, TriggerTier};

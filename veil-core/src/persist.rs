//! Versioned snapshot shapes for the persistence collaborator.
//!
//! The engine never touches files or records itself; it defines the
//! serializable snapshot the external persistence layer stores and hands
//! back, keyed by playthrough.

use crate::config::{ConfigError, StoreConfig};
use crate::state::{EntityId, EntityState, EntityStateStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Current snapshot format version.
const SNAPSHOT_VERSION: u32 = 1;

/// Errors from snapshot encoding and decoding.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("invalid store config: {0}")]
    Config(#[from] ConfigError),
}

/// A complete, versioned snapshot of every entity state in a playthrough.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedState {
    pub version: u32,
    pub playthrough_id: Uuid,
    pub entities: HashMap<EntityId, EntityState>,
}

impl SavedState {
    pub fn from_store(store: &EntityStateStore) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            playthrough_id: store.playthrough_id(),
            entities: store.entities().clone(),
        }
    }

    /// Rebuild a store from this snapshot, re-applying the given config.
    ///
    /// Histories are re-trimmed against the configured cap so a lowered cap
    /// takes effect on load.
    pub fn into_store(self, config: StoreConfig) -> Result<EntityStateStore, PersistError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                found: self.version,
            });
        }
        Ok(EntityStateStore::restore(
            config,
            self.playthrough_id,
            self.entities,
        )?)
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PersistError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AttemptKey, HistoryKind};

    #[test]
    fn test_snapshot_round_trip() {
        let mut store = EntityStateStore::new(StoreConfig::default()).unwrap();
        let id = EntityId::from("mrs_holloway");
        let state = store.entity_mut(&id);
        state.adjust_trust(20);
        state.discover_evidence("torn_letter");
        state.record_fired("first_doubt".into());
        state.bump_attempts(AttemptKey::new("library", "scrying"));
        state.record(HistoryKind::Action, "asked about the letter");

        let json = SavedState::from_store(&store).to_json().unwrap();
        let restored = SavedState::from_json(&json)
            .unwrap()
            .into_store(StoreConfig::default())
            .unwrap();

        assert_eq!(restored.playthrough_id(), store.playthrough_id());
        let back = restored.entity(&id).unwrap();
        assert_eq!(back.trust(), 70);
        assert_eq!(back.evidence_count(), 1);
        assert!(back.has_fired(&"first_doubt".into()));
        assert_eq!(back.attempts(&AttemptKey::new("library", "scrying")), 1);
        assert_eq!(back.history().count(), 1);
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let store = EntityStateStore::new(StoreConfig::default()).unwrap();
        let mut snapshot = SavedState::from_store(&store);
        snapshot.version = 99;

        assert!(matches!(
            snapshot.into_store(StoreConfig::default()),
            Err(PersistError::VersionMismatch {
                expected: 1,
                found: 99
            })
        ));
    }

    #[test]
    fn test_lowered_history_cap_trims_on_load() {
        let mut store = EntityStateStore::new(StoreConfig::default()).unwrap();
        let id = EntityId::from("player");
        let state = store.entity_mut(&id);
        for i in 0..10 {
            state.record(HistoryKind::Narration, format!("line {i}"));
        }

        let restored = SavedState::from_store(&store)
            .into_store(StoreConfig::default().with_history_cap(4))
            .unwrap();
        assert_eq!(restored.entity(&id).unwrap().history().count(), 4);
    }
}

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

use crate::models::{Matchbox, MatchingNight, Participant, Penalty, ProbabilityInput};
use crate::services::import::ImportedData;

/// Errors that can occur when reading from a store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Read-only view of the tracker's persisted collections
///
/// Implementations hand out owned copies; the engine never holds on to the
/// store while it computes.
pub trait AytoStore: Send + Sync {
    fn participants(&self) -> Result<Vec<Participant>, StoreError>;
    fn matching_nights(&self) -> Result<Vec<MatchingNight>, StoreError>;
    fn matchboxes(&self) -> Result<Vec<Matchbox>, StoreError>;
    fn penalties(&self) -> Result<Vec<Penalty>, StoreError>;
}

/// Take a by-value snapshot for one probability run
pub fn snapshot<S: AytoStore + ?Sized>(store: &S) -> Result<ProbabilityInput, StoreError> {
    Ok(ProbabilityInput {
        participants: store.participants()?,
        matching_nights: store.matching_nights()?,
        matchboxes: store.matchboxes()?,
    })
}

#[derive(Debug, Default)]
struct Collections {
    participants: Vec<Participant>,
    matching_nights: Vec<MatchingNight>,
    matchboxes: Vec<Matchbox>,
    penalties: Vec<Penalty>,
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled from an imported export
    pub fn from_import(data: ImportedData) -> Self {
        Self {
            data: RwLock::new(Collections {
                participants: data.participants,
                matching_nights: data.matching_nights,
                matchboxes: data.matchboxes,
                penalties: data.penalties,
            }),
        }
    }

    pub fn add_participant(&self, participant: Participant) -> Result<(), StoreError> {
        self.write()?.participants.push(participant);
        Ok(())
    }

    pub fn add_matching_night(&self, night: MatchingNight) -> Result<(), StoreError> {
        self.write()?.matching_nights.push(night);
        Ok(())
    }

    pub fn add_matchbox(&self, matchbox: Matchbox) -> Result<(), StoreError> {
        self.write()?.matchboxes.push(matchbox);
        Ok(())
    }

    pub fn add_penalty(&self, penalty: Penalty) -> Result<(), StoreError> {
        self.write()?.penalties.push(penalty);
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Collections>, StoreError> {
        self.data
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Collections>, StoreError> {
        self.data
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }
}

impl AytoStore for MemoryStore {
    fn participants(&self) -> Result<Vec<Participant>, StoreError> {
        Ok(self.read()?.participants.clone())
    }

    fn matching_nights(&self) -> Result<Vec<MatchingNight>, StoreError> {
        Ok(self.read()?.matching_nights.clone())
    }

    fn matchboxes(&self) -> Result<Vec<Matchbox>, StoreError> {
        Ok(self.read()?.matchboxes.clone())
    }

    fn penalties(&self) -> Result<Vec<Penalty>, StoreError> {
        Ok(self.read()?.penalties.clone())
    }
}

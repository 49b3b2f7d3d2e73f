use crate::CoreError;
use keel_schema::VolumeId;
use std::collections::HashSet;
use std::sync::{Condvar, Mutex, PoisonError};

/// Per-identity mutual exclusion.
///
/// A volume identity is "held" while an [`IdentityGuard`] for it is alive.
/// Callers for the same identity queue behind the holder; callers for other
/// identities never wait. Entries are dropped with their guard, so the table
/// only ever contains identities that are currently being mutated.
#[derive(Debug, Default)]
pub struct IdentityLocks {
    held: Mutex<HashSet<VolumeId>>,
    released: Condvar,
}

impl IdentityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `id` is free, then hold it until the guard drops.
    pub fn lock(&self, id: &VolumeId) -> Result<IdentityGuard<'_>, CoreError> {
        let mut held = self
            .held
            .lock()
            .map_err(|e| CoreError::Poisoned(e.to_string()))?;
        while held.contains(id) {
            held = self
                .released
                .wait(held)
                .map_err(|e| CoreError::Poisoned(e.to_string()))?;
        }
        held.insert(id.clone());
        Ok(IdentityGuard {
            locks: self,
            id: id.clone(),
        })
    }

    pub fn is_locked(&self, id: &VolumeId) -> bool {
        self.held
            .lock()
            .map(|held| held.contains(id))
            .unwrap_or(false)
    }
}

pub struct IdentityGuard<'a> {
    locks: &'a IdentityLocks,
    id: VolumeId,
}

impl IdentityGuard<'_> {
    pub fn id(&self) -> &VolumeId {
        &self.id
    }
}

impl Drop for IdentityGuard<'_> {
    fn drop(&mut self) {
        // Releasing must happen even after a panic elsewhere, or waiters hang.
        let mut held = self
            .locks
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        held.remove(&self.id);
        drop(held);
        self.locks.released.notify_all();
    }
}

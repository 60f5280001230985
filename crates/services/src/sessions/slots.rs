use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use listen_core::model::{DeckId, Session, StudentId};
use storage::repository::StorageError;
use tokio::task::AbortHandle;

/// Live state owned by one (student, deck) pair.
///
/// Every operation on the pair runs while holding the slot's async lock.
#[derive(Default)]
pub(crate) struct SessionSlot {
    pub(crate) session: Option<Session>,
    advance: Option<AbortHandle>,
    /// Bumped whenever a pending auto-advance becomes stale.
    pub(crate) epoch: u64,
}

impl SessionSlot {
    /// Abort the pending auto-advance, if any. Safe to call repeatedly.
    pub(crate) fn cancel_advance(&mut self) {
        if let Some(handle) = self.advance.take() {
            handle.abort();
        }
        self.epoch = self.epoch.wrapping_add(1);
    }

    pub(crate) fn set_advance(&mut self, handle: AbortHandle) {
        self.advance = Some(handle);
    }

    /// Called by the auto-advance task once it owns the slot.
    pub(crate) fn clear_advance(&mut self) {
        self.advance = None;
    }

    pub(crate) fn has_pending_advance(&self) -> bool {
        self.advance.is_some()
    }

    /// Drop the session and any pending timer, leaving the pair idle.
    pub(crate) fn reset(&mut self) {
        self.cancel_advance();
        self.session = None;
    }
}

pub(crate) type SharedSlot = Arc<tokio::sync::Mutex<SessionSlot>>;

/// Keyed single-owner slots, one per (student, deck) pair.
#[derive(Default)]
pub(crate) struct SessionSlots {
    inner: Mutex<HashMap<(StudentId, DeckId), SharedSlot>>,
}

impl SessionSlots {
    pub(crate) fn slot(&self, student: StudentId, deck_id: DeckId) -> Result<SharedSlot, StorageError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(Arc::clone(guard.entry((student, deck_id)).or_default()))
    }

    pub(crate) fn for_deck(&self, deck_id: DeckId) -> Result<Vec<SharedSlot>, StorageError> {
        let guard = self
            .inner
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .iter()
            .filter(|((_, deck), _)| *deck == deck_id)
            .map(|(_, slot)| Arc::clone(slot))
            .collect())
    }
}

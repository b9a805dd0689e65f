//! In-flight lock rejecting overlapping exports.

use std::cell::Cell;
use std::rc::Rc;

use crate::types::PipelineError;

/// Shared flag marking an export as running.
///
/// Clones share the same flag, so a UI component can hold one clone and
/// hand another to each export. Single-threaded by construction.
#[derive(Debug, Clone, Default)]
pub struct ExportLock {
    busy: Rc<Cell<bool>>,
}

impl ExportLock {
    /// Create an unlocked lock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an export currently holds the lock.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }

    /// Take the lock for the lifetime of the returned token.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Busy`] if another token is alive.
    pub fn try_acquire(&self) -> Result<InFlight, PipelineError> {
        if self.busy.replace(true) {
            return Err(PipelineError::Busy);
        }
        Ok(InFlight {
            busy: Rc::clone(&self.busy),
        })
    }
}

/// Proof that the holder owns the [`ExportLock`]. Releases on drop.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the token is dropped"]
pub struct InFlight {
    busy: Rc<Cell<bool>>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.busy.set(false);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_busy() {
        let lock = ExportLock::new();
        let token = lock.try_acquire().unwrap();
        assert!(lock.is_busy());
        assert_eq!(lock.try_acquire().unwrap_err(), PipelineError::Busy);
        drop(token);
        assert!(!lock.is_busy());
        let _again = lock.try_acquire().unwrap();
    }

    #[test]
    fn clones_share_state() {
        let lock = ExportLock::new();
        let ui_copy = lock.clone();
        let _token = lock.try_acquire().unwrap();
        assert!(ui_copy.is_busy());
        assert!(ui_copy.try_acquire().is_err());
    }
}

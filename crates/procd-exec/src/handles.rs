//! Table of detached processes.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::{Mutex, MutexGuard, PoisonError};

use procd_protocol::Handle;
use tracing::debug;

use crate::action::ProcessAction;

const HANDLES_TARGET: &str = "procd_exec::handles";

#[derive(Debug)]
struct HandleTable {
    next: NonZeroU64,
    actions: HashMap<Handle, ProcessAction>,
}

/// Detached processes keyed by handle.
///
/// Handles start at 1, increase monotonically and are never reused for the
/// lifetime of the registry. Allocation and removal happen under one lock,
/// so a handle can be redeemed exactly once.
#[derive(Debug)]
pub struct HandleRegistry {
    table: Mutex<HandleTable>,
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HandleTable {
                next: NonZeroU64::MIN,
                actions: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HandleTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a running action under a fresh handle.
    pub fn store(&self, action: ProcessAction) -> Handle {
        let mut table = self.lock();
        let handle = Handle::from(table.next);
        table.next = table.next.saturating_add(1);
        debug!(
            target: HANDLES_TARGET,
            %handle,
            process = action.name(),
            "stored detached process"
        );
        table.actions.insert(handle, action);
        handle
    }

    /// Removes and returns the action stored under `handle`.
    pub fn remove(&self, handle: Handle) -> Option<ProcessAction> {
        self.lock().actions.remove(&handle)
    }

    /// Removes every detached process; dropping them kills the children.
    ///
    /// Returns how many processes were discarded.
    pub fn clear(&self) -> usize {
        let drained: Vec<ProcessAction> = {
            let mut table = self.lock();
            table.actions.drain().map(|(_, action)| action).collect()
        };
        let count = drained.len();
        if count > 0 {
            debug!(target: HANDLES_TARGET, count, "discarding detached processes");
        }
        drop(drained);
        count
    }

    /// Number of detached processes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().actions.len()
    }

    /// Returns `true` when nothing is detached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().actions.is_empty()
    }
}

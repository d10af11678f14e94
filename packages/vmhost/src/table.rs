//! Thread registration table.
//!
//! Maps each host thread to its runtime context and the number of active
//! users of that context on the thread. The first user attaches the thread;
//! the last one to leave detaches it and removes the entry.
//!
//! ```text
//! ABSENT ──resolve──▶ PRESENT(0) ──register──▶ PRESENT(n ≥ 1)
//!    ▲                                               │
//!    └──────────── unregister (n reaches 0) ─────────┘
//! ```
//!
//! Attach and detach are called with the table lock held. They act only on
//! the calling thread, so no other synchronization is needed.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use crate::backend::{ContextPtr, LiveVm};
use crate::error::{HostError, Result};

#[derive(Debug, Clone, Copy)]
struct Slot {
    context: ContextPtr,
    users: usize,
}

/// Per-thread contexts and user counts.
///
/// Owned by a [`RuntimeFactory`](crate::RuntimeFactory) and read through
/// [`RuntimeFactory::threads`](crate::RuntimeFactory::threads).
#[derive(Debug)]
pub struct ThreadTable {
    entries: Mutex<HashMap<ThreadId, Slot>>,
}

impl ThreadTable {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    // Every critical section leaves the map consistent, so a panic while
    // holding the lock cannot corrupt it.
    fn lock(&self) -> MutexGuard<'_, HashMap<ThreadId, Slot>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Context for the calling thread, attaching it if it has none.
    ///
    /// With `register` set the user count is incremented under the same lock.
    pub(crate) fn resolve(&self, vm: &dyn LiveVm, register: bool) -> Result<ContextPtr> {
        let thread = thread::current().id();
        let mut entries = self.lock();

        let slot = match entries.entry(thread) {
            Entry::Occupied(occupied) => occupied.into_mut(),
            Entry::Vacant(vacant) => {
                let context = vm.attach_current_thread().map_err(|code| {
                    tracing::error!(?thread, code, "failed to attach thread to the JVM");
                    HostError::AttachFailed(code)
                })?;
                tracing::debug!(?thread, "attached thread");
                vacant.insert(Slot { context, users: 0 })
            }
        };

        if register {
            slot.users += 1;
        }
        Ok(slot.context)
    }

    /// Add a user for the calling thread. Returns the new count.
    pub(crate) fn register(&self) -> Result<usize> {
        let thread = thread::current().id();
        let mut entries = self.lock();

        match entries.get_mut(&thread) {
            Some(slot) => {
                slot.users += 1;
                Ok(slot.users)
            }
            None => {
                tracing::error!(?thread, "registering a thread without an execution context");
                Err(HostError::InternalConsistency {
                    operation: "register",
                    thread,
                })
            }
        }
    }

    /// Remove a user for the calling thread, detaching on the last one.
    /// Returns the remaining count.
    pub(crate) fn unregister(&self, vm: &dyn LiveVm) -> Result<usize> {
        let thread = thread::current().id();
        let mut entries = self.lock();

        let remaining = match entries.get_mut(&thread) {
            Some(slot) if slot.users > 0 => {
                slot.users -= 1;
                slot.users
            }
            _ => {
                tracing::error!(?thread, "unregistering a thread without active users");
                return Err(HostError::InternalConsistency {
                    operation: "unregister",
                    thread,
                });
            }
        };

        if remaining == 0 {
            vm.detach_current_thread();
            entries.remove(&thread);
            tracing::debug!(?thread, "detached thread");
        }
        Ok(remaining)
    }

    /// Active users on `thread`, or `None` if it has no entry.
    pub fn users(&self, thread: ThreadId) -> Option<usize> {
        self.lock().get(&thread).map(|slot| slot.users)
    }

    /// The context stored for `thread`.
    pub fn context(&self, thread: ThreadId) -> Option<ContextPtr> {
        self.lock().get(&thread).map(|slot| slot.context)
    }

    /// Number of threads with an entry.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

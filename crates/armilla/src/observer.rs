//! The source observer: explicit reactive mirroring of snapshot fields.
//!
//! Instead of intercepting property writes, the engine hands out an
//! explicit handle whose `set`/`delete` calls mutate a pending copy of the
//! snapshot and schedule a batched re-entry into the pipeline on the next
//! frame tick. Multiple synchronous mutations within one frame coalesce
//! through a requested/handled counter pair: however many writes land
//! between ticks, the pipeline re-runs once.

use std::{cell::RefCell, rc::Rc};

use log::trace;
use serde_json::Value;

use crate::source::Snapshot;

#[derive(Debug)]
pub(crate) struct ObserverState {
    pub snapshot: Snapshot,
    pub requested: u64,
    pub handled: u64,
}

/// A handle for mutating the observed snapshot.
///
/// Paths are dot-separated: `kind.id.field` addresses a field,
/// `kind.id` addresses a whole record (delete only).
#[derive(Debug, Clone)]
pub struct SourceObserver {
    inner: Rc<RefCell<ObserverState>>,
}

impl SourceObserver {
    pub(crate) fn new(snapshot: Snapshot) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ObserverState {
                snapshot,
                requested: 0,
                handled: 0,
            })),
        }
    }

    pub(crate) fn shared(&self) -> Rc<RefCell<ObserverState>> {
        self.inner.clone()
    }

    /// Sets a field on a record, scheduling a re-render on the next tick.
    /// Returns false (and schedules nothing) when the path resolves to no
    /// record.
    pub fn set(&self, path: &str, value: Value) -> bool {
        let Some((kind, id, Some(field))) = split_path(path) else {
            return false;
        };
        let mut state = self.inner.borrow_mut();
        if state.snapshot.set_field(kind, id, field, value) {
            state.requested += 1;
            trace!(path = path, requested = state.requested; "Observer set");
            true
        } else {
            false
        }
    }

    /// Deletes a field (`kind.id.field`) or a whole record (`kind.id`),
    /// scheduling a re-render on the next tick.
    pub fn delete(&self, path: &str) -> bool {
        let Some((kind, id, field)) = split_path(path) else {
            return false;
        };
        let mut state = self.inner.borrow_mut();
        let removed = match field {
            Some(field) => state.snapshot.remove_field(kind, id, field),
            None => state.snapshot.remove_record(kind, id),
        };
        if removed {
            state.requested += 1;
            trace!(path = path, requested = state.requested; "Observer delete");
        }
        removed
    }

    /// True while mutations are waiting for the next tick.
    pub fn is_pending(&self) -> bool {
        let state = self.inner.borrow();
        state.requested != state.handled
    }
}

/// Splits `kind.id[.field]`. Ids containing dots are not addressable
/// through observer paths.
fn split_path(path: &str) -> Option<(&str, &str, Option<&str>)> {
    let mut parts = path.splitn(3, '.');
    let kind = parts.next().filter(|s| !s.is_empty())?;
    let id = parts.next().filter(|s| !s.is_empty())?;
    Some((kind, id, parts.next()))
}

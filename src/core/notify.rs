//! Observer plumbing for data-changed and selection-changed events.
//!
//! Notifications fire synchronously in the mutating caller's thread.
//! Listeners are registered as shared trait objects and removed by the
//! handle returned at registration.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::identity::EntityKey;

/// A data-changed event, scoped to the affected entity keys.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DataChange {
    pub keys: BTreeSet<EntityKey>,
}

impl DataChange {
    pub fn new(keys: BTreeSet<EntityKey>) -> Self {
        Self { keys }
    }
}

pub trait DataListener: Send + Sync {
    fn data_changed(&self, change: &DataChange);
}

pub trait SelectionListener: Send + Sync {
    fn selection_changed(&self, selection: &BTreeSet<EntityKey>);
}

/// Handle for deregistering a listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub(crate) struct Observers {
    next_id: u64,
    data: Vec<(ListenerId, Arc<dyn DataListener>)>,
    selection: Vec<(ListenerId, Arc<dyn SelectionListener>)>,
}

impl Observers {
    fn next(&mut self) -> ListenerId {
        self.next_id += 1;
        ListenerId(self.next_id)
    }

    pub fn add_data(&mut self, listener: Arc<dyn DataListener>) -> ListenerId {
        let id = self.next();
        self.data.push((id, listener));
        id
    }

    pub fn remove_data(&mut self, id: ListenerId) -> bool {
        let before = self.data.len();
        self.data.retain(|(lid, _)| *lid != id);
        self.data.len() != before
    }

    pub fn add_selection(&mut self, listener: Arc<dyn SelectionListener>) -> ListenerId {
        let id = self.next();
        self.selection.push((id, listener));
        id
    }

    pub fn remove_selection(&mut self, id: ListenerId) -> bool {
        let before = self.selection.len();
        self.selection.retain(|(lid, _)| *lid != id);
        self.selection.len() != before
    }

    pub fn notify_data(&self, change: &DataChange) {
        for (_, listener) in &self.data {
            listener.data_changed(change);
        }
    }

    pub fn notify_selection(&self, selection: &BTreeSet<EntityKey>) {
        for (_, listener) in &self.selection {
            listener.selection_changed(selection);
        }
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("data", &self.data.len())
            .field("selection", &self.selection.len())
            .finish()
    }
}

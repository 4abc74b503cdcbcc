//! One working copy: store, command log, and conflict registry together.
//!
//! There is no global instance. Each workspace is independent, which is
//! what makes multiple working copies (and tests) possible. The shared
//! handle serializes all mutation behind one mutex: the interactive thread
//! applying commands and the fetch thread running a merge never interleave.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::command::Command;
use crate::core::conflict::{Conflict, ConflictRegistry, Resolution};
use crate::core::error::{CommandError, StoreError};
use crate::core::history::CommandLog;
use crate::core::identity::EntityKey;
use crate::core::limits::Limits;
use crate::core::merge::{merge_fragment, Fragment, MergeReport};
use crate::core::notify::{DataListener, ListenerId, SelectionListener};
use crate::core::store::GraphStore;

/// A single working copy of the entity graph.
#[derive(Debug)]
pub struct Workspace {
    store: GraphStore,
    log: CommandLog,
    conflicts: ConflictRegistry,
    limits: Limits,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Workspace {
    pub fn new() -> Self {
        Self::with_limits(Limits::default())
    }

    pub fn with_limits(limits: Limits) -> Self {
        Self {
            store: GraphStore::new(),
            log: CommandLog::new(&limits),
            conflicts: ConflictRegistry::new(),
            limits,
        }
    }

    /// Read access to the store (lookups, snapshots, referrers).
    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    // =========================================================================
    // Editing surface
    // =========================================================================

    /// Apply a user edit through the command log.
    pub fn apply(&mut self, command: Command) -> Result<(), CommandError> {
        self.log.apply(&mut self.store, command)
    }

    /// Undo the most recent edit; `Ok(false)` when the log is empty.
    pub fn undo(&mut self) -> Result<bool, CommandError> {
        self.log.undo(&mut self.store)
    }

    /// Redo the most recently undone edit; `Ok(false)` when there is none.
    pub fn redo(&mut self) -> Result<bool, CommandError> {
        self.log.redo(&mut self.store)
    }

    pub fn can_undo(&self) -> bool {
        self.log.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.log.can_redo()
    }

    pub fn selection(&self) -> &BTreeSet<EntityKey> {
        self.store.selection()
    }

    pub fn set_selection(&mut self, selection: BTreeSet<EntityKey>) {
        self.store.set_selection(selection);
    }

    pub fn add_data_listener(&mut self, listener: Arc<dyn DataListener>) -> ListenerId {
        self.store.add_data_listener(listener)
    }

    pub fn remove_data_listener(&mut self, id: ListenerId) -> bool {
        self.store.remove_data_listener(id)
    }

    pub fn add_selection_listener(&mut self, listener: Arc<dyn SelectionListener>) -> ListenerId {
        self.store.add_selection_listener(listener)
    }

    pub fn remove_selection_listener(&mut self, id: ListenerId) -> bool {
        self.store.remove_selection_listener(id)
    }

    // =========================================================================
    // Fetch/merge surface
    // =========================================================================

    /// Reconcile a freshly-fetched fragment into this working copy.
    ///
    /// Bypasses the command log; divergent local edits become registered
    /// conflicts, never silent overwrites.
    pub fn merge_fragment(&mut self, fragment: Fragment) -> Result<MergeReport, StoreError> {
        merge_fragment(&mut self.store, &mut self.conflicts, fragment, &self.limits)
    }

    // =========================================================================
    // Conflict surface
    // =========================================================================

    pub fn conflicts(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts.list()
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Resolve one conflict; the chosen snapshot is applied as an undoable
    /// change and the registry entry is cleared.
    pub fn resolve_conflict(
        &mut self,
        key: EntityKey,
        resolution: Resolution,
    ) -> Result<(), CommandError> {
        self.conflicts
            .resolve(&mut self.store, &mut self.log, key, resolution)
    }
}

/// A workspace behind a mutex: the single-writer serialization point.
///
/// Clones share the same working copy. Lock poisoning is recovered by
/// taking the inner state as-is; every mutation either completes or rolls
/// back before unwinding, so the state a panicking writer leaves behind is
/// still consistent.
#[derive(Clone, Debug)]
pub struct SharedWorkspace {
    inner: Arc<Mutex<Workspace>>,
}

impl Default for SharedWorkspace {
    fn default() -> Self {
        Self::new(Workspace::new())
    }
}

impl SharedWorkspace {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            inner: Arc::new(Mutex::new(workspace)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Workspace> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Run `f` with exclusive access to the workspace.
    pub fn with<R>(&self, f: impl FnOnce(&mut Workspace) -> R) -> R {
        f(&mut self.lock())
    }
}

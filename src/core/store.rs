//! Layer 4: The Graph Store
//!
//! The authoritative entity set for one working copy.
//!
//! INVARIANT: every reference held by a stored entity resolves to a stored
//! entity (possibly a placeholder, never nothing). The reverse index in
//! `referrers` is derived state, maintained incrementally by every mutation
//! and never recomputed by full scan.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::trace;

use super::entity::{Body, Entity};
use super::error::StoreError;
use super::identity::{EntityKey, EntityNum, Kind};
use super::notify::{
    DataChange, DataListener, ListenerId, Observers, SelectionListener,
};

/// Indexed container of entities for one working copy.
///
/// There is deliberately no global instance: each store is an independent
/// working copy, passed explicitly to commands and the merge engine.
#[derive(Debug, Default)]
pub struct GraphStore {
    entities: BTreeMap<EntityKey, Entity>,
    /// target -> set of entities whose body references it.
    referrers: BTreeMap<EntityKey, BTreeSet<EntityKey>>,
    selection: BTreeSet<EntityKey>,
    fresh_seq: u64,
    observers: Observers,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// Hand out the next fresh key for `kind`. Fresh numbers are monotonic
    /// and never reused, even after the entity is deleted.
    pub fn allocate_fresh(&mut self, kind: Kind) -> EntityKey {
        self.fresh_seq += 1;
        let num = EntityNum::fresh(self.fresh_seq).unwrap_or_else(|| unreachable!());
        EntityKey::new(kind, num)
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn lookup(&self, key: EntityKey) -> Option<&Entity> {
        self.entities.get(&key)
    }

    pub fn contains(&self, key: EntityKey) -> bool {
        self.entities.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Snapshot of every entity, in key (kind-major) order.
    ///
    /// Copy-on-iterate: the snapshot is unaffected by later store mutation.
    pub fn all(&self) -> Vec<Entity> {
        self.entities.values().cloned().collect()
    }

    /// Snapshot of every entity of one kind, in key order.
    pub fn of_kind(&self, kind: Kind) -> Vec<Entity> {
        self.entities
            .values()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }

    /// Entities whose body currently references `key`, as a snapshot.
    pub fn referrers(&self, key: EntityKey) -> Vec<EntityKey> {
        self.referrers
            .get(&key)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    // =========================================================================
    // Mutations (enforce invariants)
    // =========================================================================

    /// Insert an entity.
    ///
    /// If an entry for the key already exists it must be a placeholder being
    /// filled; the fill happens in place, preserving the identity owners
    /// already reference. Anything else is `DuplicateId`. Every reference of
    /// the new entity must resolve (`NotFound` names the missing one).
    pub fn insert(&mut self, entity: Entity) -> Result<(), StoreError> {
        let key = entity.key();
        Self::require_well_formed(&entity)?;
        self.require_references(&entity)?;

        let filling = match self.entities.get(&key) {
            None => false,
            Some(existing) if existing.is_incomplete() && !entity.is_incomplete() => true,
            Some(_) => return Err(StoreError::DuplicateId { key }),
        };

        let references = entity.references();
        if filling {
            trace!(%key, "filling placeholder in place");
            if let Some(existing) = self.entities.get_mut(&key) {
                existing.fill_from(entity);
            }
        } else {
            self.entities.insert(key, entity);
        }
        self.index_add(key, &references);
        Ok(())
    }

    /// Insert an incomplete stub for a forward reference, if absent.
    pub(crate) fn insert_placeholder(&mut self, key: EntityKey) {
        self.entities
            .entry(key)
            .or_insert_with(|| Entity::placeholder(key));
    }

    /// Remove an entity.
    ///
    /// Fails with `StillReferenced` while any stored entity references it;
    /// callers strip or remove the referrers first (no implicit cascade at
    /// this level).
    pub fn remove(&mut self, key: EntityKey) -> Result<Entity, StoreError> {
        if !self.entities.contains_key(&key) {
            return Err(StoreError::NotFound { key });
        }
        if let Some(referrer) = self.referrers.get(&key).and_then(|s| s.iter().next()) {
            return Err(StoreError::StillReferenced {
                key,
                referrer: *referrer,
            });
        }
        let entity = self
            .entities
            .remove(&key)
            .unwrap_or_else(|| unreachable!());
        self.index_remove(key, &entity.references());
        self.referrers.remove(&key);
        let mut deselected = BTreeSet::new();
        deselected.insert(key);
        self.prune_selection(&deselected);
        Ok(entity)
    }

    /// Replace the full snapshot stored under `key`, returning the prior one.
    ///
    /// The primitive under `Change` and under merge overwrites. Reference
    /// integrity is enforced for the incoming snapshot.
    pub(crate) fn replace(&mut self, key: EntityKey, entity: Entity) -> Result<Entity, StoreError> {
        debug_assert_eq!(key, entity.key(), "replace must preserve the key");
        if !self.entities.contains_key(&key) {
            return Err(StoreError::NotFound { key });
        }
        Self::require_well_formed(&entity)?;
        self.require_references(&entity)?;

        let prior = self
            .entities
            .insert(key, entity)
            .unwrap_or_else(|| unreachable!());
        let next_refs = self.entities[&key].references();
        self.index_remove(key, &prior.references());
        self.index_add(key, &next_refs);
        Ok(prior)
    }

    /// A path must not list the same point twice: duplicates (and with
    /// them zero-length segments) are invalid topology.
    fn require_well_formed(entity: &Entity) -> Result<(), StoreError> {
        if let Some(Body::Path(points)) = entity.body() {
            let mut seen = BTreeSet::new();
            for point in points {
                if !seen.insert(*point) {
                    return Err(StoreError::DuplicatePathPoint {
                        key: entity.key(),
                        point: EntityKey::point(*point),
                    });
                }
            }
        }
        Ok(())
    }

    fn require_references(&self, entity: &Entity) -> Result<(), StoreError> {
        for reference in entity.references() {
            if reference != entity.key() && !self.entities.contains_key(&reference) {
                return Err(StoreError::NotFound { key: reference });
            }
        }
        Ok(())
    }

    fn index_add(&mut self, owner: EntityKey, references: &[EntityKey]) {
        for reference in references {
            self.referrers.entry(*reference).or_default().insert(owner);
        }
    }

    fn index_remove(&mut self, owner: EntityKey, references: &[EntityKey]) {
        for reference in references {
            if let Some(set) = self.referrers.get_mut(reference) {
                set.remove(&owner);
                if set.is_empty() {
                    self.referrers.remove(reference);
                }
            }
        }
    }

    // =========================================================================
    // Selection
    // =========================================================================

    pub fn selection(&self) -> &BTreeSet<EntityKey> {
        &self.selection
    }

    /// Replace the selection, firing selection-changed if it differs.
    pub fn set_selection(&mut self, selection: BTreeSet<EntityKey>) {
        if selection == self.selection {
            return;
        }
        self.selection = selection;
        self.observers.notify_selection(&self.selection);
    }

    pub fn clear_selection(&mut self) {
        self.set_selection(BTreeSet::new());
    }

    /// Drop the given keys from the selection, firing if anything changed.
    pub(crate) fn prune_selection(&mut self, keys: &BTreeSet<EntityKey>) {
        let before = self.selection.len();
        self.selection.retain(|k| !keys.contains(k));
        if self.selection.len() != before {
            self.observers.notify_selection(&self.selection);
        }
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    pub fn add_data_listener(&mut self, listener: Arc<dyn DataListener>) -> ListenerId {
        self.observers.add_data(listener)
    }

    pub fn remove_data_listener(&mut self, id: ListenerId) -> bool {
        self.observers.remove_data(id)
    }

    pub fn add_selection_listener(&mut self, listener: Arc<dyn SelectionListener>) -> ListenerId {
        self.observers.add_selection(listener)
    }

    pub fn remove_selection_listener(&mut self, id: ListenerId) -> bool {
        self.observers.remove_selection(id)
    }

    /// Fire a data-changed notification for the given keys.
    pub(crate) fn notify_data(&self, keys: BTreeSet<EntityKey>) {
        if keys.is_empty() {
            return;
        }
        self.observers.notify_data(&DataChange::new(keys));
    }
}

//! Layer 7: The conflict registry
//!
//! Divergent local/remote snapshot pairs the merge engine could not
//! reconcile automatically. Conflicts are data, not errors: they persist
//! until explicitly resolved, and resolution goes through the command log
//! so it participates in undo/redo.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::command::Command;
use super::entity::Entity;
use super::error::{CommandError, StoreError};
use super::history::CommandLog;
use super::identity::EntityKey;
use super::store::GraphStore;

/// A divergent pair for one entity: the local edit and the remote state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub mine: Entity,
    pub theirs: Entity,
}

impl Conflict {
    pub fn new(mine: Entity, theirs: Entity) -> Self {
        debug_assert_eq!(mine.key(), theirs.key(), "conflict pairs share a key");
        Self { mine, theirs }
    }

    pub fn key(&self) -> EntityKey {
        self.mine.key()
    }
}

/// The caller's verdict on a conflict.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Keep the local snapshot.
    Mine,
    /// Adopt the remote snapshot.
    Theirs,
    /// Apply a hand-merged snapshot.
    Merged(Entity),
}

/// Unresolved conflicts, keyed by entity.
///
/// INVARIANT: a registered key is present in the graph store in its "mine"
/// form until resolved.
#[derive(Debug, Default)]
pub struct ConflictRegistry {
    conflicts: BTreeMap<EntityKey, Conflict>,
}

impl ConflictRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn contains(&self, key: EntityKey) -> bool {
        self.conflicts.contains_key(&key)
    }

    pub fn get(&self, key: EntityKey) -> Option<&Conflict> {
        self.conflicts.get(&key)
    }

    pub fn list(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts.values()
    }

    /// Register a conflict. A repeat conflict for the same key keeps the
    /// registered `mine` (still the live local snapshot) and adopts the
    /// newer `theirs`.
    pub(crate) fn upsert(&mut self, conflict: Conflict) {
        match self.conflicts.get_mut(&conflict.key()) {
            Some(existing) => existing.theirs = conflict.theirs,
            None => {
                self.conflicts.insert(conflict.key(), conflict);
            }
        }
    }

    /// Resolve one conflict by applying the chosen snapshot through the
    /// command log.
    ///
    /// The applied snapshot carries `modified = false` and the remote
    /// version (the newest known base), whichever side was chosen. Fails
    /// with `NotFound` if the key is not registered or has left the store.
    pub fn resolve(
        &mut self,
        store: &mut GraphStore,
        log: &mut CommandLog,
        key: EntityKey,
        resolution: Resolution,
    ) -> Result<(), CommandError> {
        let conflict = self
            .conflicts
            .get(&key)
            .ok_or(StoreError::NotFound { key })?;
        if !store.contains(key) {
            return Err(StoreError::NotFound { key }.into());
        }

        let mut chosen = match resolution {
            Resolution::Mine => conflict.mine.clone(),
            Resolution::Theirs => conflict.theirs.clone(),
            Resolution::Merged(entity) => entity,
        };
        if chosen.key() != key {
            return Err(StoreError::NotFound { key: chosen.key() }.into());
        }
        chosen.modified = false;
        chosen.version = conflict.theirs.version;

        log.apply(store, Command::change_exact(chosen))?;
        self.conflicts.remove(&key);
        debug!(%key, "conflict resolved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entity::Coord;
    use crate::core::identity::EntityNum;
    use crate::core::limits::Limits;

    fn num(n: u64) -> EntityNum {
        EntityNum::assigned(n).unwrap()
    }

    fn mine() -> Entity {
        let mut e = Entity::point(num(5), Coord::new(2.0, 2.0)).at_version(4);
        e.modified = true;
        e
    }

    fn theirs() -> Entity {
        Entity::point(num(5), Coord::new(9.0, 9.0)).at_version(5)
    }

    fn setup() -> (GraphStore, CommandLog, ConflictRegistry) {
        let mut store = GraphStore::new();
        store.insert(mine()).unwrap();
        let mut registry = ConflictRegistry::new();
        registry.upsert(Conflict::new(mine(), theirs()));
        (store, CommandLog::new(&Limits::default()), registry)
    }

    #[test]
    fn resolving_theirs_adopts_the_remote_snapshot() {
        let (mut store, mut log, mut registry) = setup();
        let key = EntityKey::point(num(5));

        registry
            .resolve(&mut store, &mut log, key, Resolution::Theirs)
            .unwrap();

        let entity = store.lookup(key).unwrap();
        assert_eq!(entity.body(), theirs().body());
        assert_eq!(entity.version, 5);
        assert!(!entity.modified);
        assert!(registry.is_empty());
    }

    #[test]
    fn resolving_mine_keeps_content_but_clears_the_flag() {
        let (mut store, mut log, mut registry) = setup();
        let key = EntityKey::point(num(5));

        registry
            .resolve(&mut store, &mut log, key, Resolution::Mine)
            .unwrap();

        let entity = store.lookup(key).unwrap();
        assert_eq!(entity.body(), mine().body());
        assert_eq!(entity.version, 5);
        assert!(!entity.modified);
    }

    #[test]
    fn resolution_is_undoable() {
        let (mut store, mut log, mut registry) = setup();
        let key = EntityKey::point(num(5));

        registry
            .resolve(&mut store, &mut log, key, Resolution::Theirs)
            .unwrap();
        assert!(log.undo(&mut store).unwrap());

        let entity = store.lookup(key).unwrap();
        assert_eq!(entity.body(), mine().body());
        assert!(entity.modified);
        // The registry entry stays resolved; undo restores data only.
        assert!(registry.is_empty());
    }

    #[test]
    fn resolving_an_unregistered_key_fails() {
        let (mut store, mut log, mut registry) = setup();
        let key = EntityKey::point(num(99));
        let err = registry
            .resolve(&mut store, &mut log, key, Resolution::Mine)
            .unwrap_err();
        assert_eq!(err.root_cause(), &StoreError::NotFound { key });
    }

    #[test]
    fn repeat_conflicts_keep_mine_and_adopt_newer_theirs() {
        let mut registry = ConflictRegistry::new();
        registry.upsert(Conflict::new(mine(), theirs()));
        let newer = Entity::point(num(5), Coord::new(1.0, 1.0)).at_version(6);
        registry.upsert(Conflict::new(mine(), newer.clone()));

        let conflict = registry.get(EntityKey::point(num(5))).unwrap();
        assert_eq!(conflict.mine, mine());
        assert_eq!(conflict.theirs, newer);
        assert_eq!(registry.len(), 1);
    }
}

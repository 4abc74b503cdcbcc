//! Layer 7: The merge engine
//!
//! Reconciles a freshly-fetched foreign fragment into the graph store,
//! producing in-place updates or conflict records. Merge bypasses the
//! command log - it is not a user-undoable edit - and never discards an
//! unresolved local edit without an explicit resolution.
//!
//! Points are fully merged before any path, and paths before any grouping.
//! That ordering is required for referential integrity, not an
//! optimization: the fragment itself carries no ordering guarantee.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::conflict::{Conflict, ConflictRegistry};
use super::entity::Entity;
use super::error::StoreError;
use super::identity::EntityKey;
use super::limits::Limits;
use super::store::GraphStore;

/// A flat, unordered collection of foreign entities from the parser.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fragment {
    pub entities: Vec<Entity>,
}

impl Fragment {
    pub fn new(entities: Vec<Entity>) -> Self {
        Self { entities }
    }

    pub fn push(&mut self, entity: Entity) {
        self.entities.push(entity);
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl FromIterator<Entity> for Fragment {
    fn from_iter<T: IntoIterator<Item = Entity>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// What one merge invocation did to the store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    /// Entities newly inserted (including filled placeholders).
    pub added: Vec<EntityKey>,
    /// Entities overwritten, stripped, or removed in place.
    pub updated: Vec<EntityKey>,
    /// Entities left untouched pending explicit resolution.
    pub conflicts: Vec<EntityKey>,
}

impl MergeReport {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.conflicts.is_empty()
    }

    fn normalize(&mut self) {
        self.added.sort_unstable();
        self.added.dedup();
        self.updated.sort_unstable();
        self.updated.dedup();
        self.conflicts.sort_unstable();
        self.conflicts.dedup();
    }
}

enum Verdict {
    Insert,
    Skip,
    Overwrite,
    AcceptConverged,
    Conflict(Entity),
}

/// Merge a foreign fragment into the store.
///
/// Errors only on a cascade that fails to terminate within
/// [`Limits::max_cascade_steps`]; a legitimate divergent edit is never an
/// error, it becomes a registered conflict.
pub fn merge_fragment(
    store: &mut GraphStore,
    registry: &mut ConflictRegistry,
    fragment: Fragment,
    limits: &Limits,
) -> Result<MergeReport, StoreError> {
    let mut incoming = fragment.entities;
    // Stable kind-major sort: the mandatory topological order.
    incoming.sort_by_key(Entity::key);

    let mut report = MergeReport::default();
    let mut touched: BTreeSet<EntityKey> = BTreeSet::new();

    for mut foreign in incoming {
        // Foreign state is authoritative and clean by definition.
        foreign.modified = false;
        foreign.deleted = false;
        let key = foreign.key();

        if !foreign.visible {
            merge_tombstone(store, registry, foreign, limits, &mut report, &mut touched)?;
            continue;
        }
        if foreign.is_incomplete() {
            trace!(%key, "fragment carried a bodiless entity, skipping");
            continue;
        }

        let verdict = match store.lookup(key) {
            None => Verdict::Insert,
            Some(local) if local.is_incomplete() => Verdict::Insert,
            Some(local) if !local.modified => {
                if local.same_content(&foreign) && local.version == foreign.version {
                    Verdict::Skip
                } else {
                    Verdict::Overwrite
                }
            }
            Some(local) => {
                // A pending local deletion against a live remote update is
                // divergence even when the content matches; dropping the
                // deletion is the user's call, not the merge's.
                if !local.deleted && local.same_content(&foreign) {
                    Verdict::AcceptConverged
                } else {
                    Verdict::Conflict(local.clone())
                }
            }
        };

        match verdict {
            Verdict::Skip => {}
            Verdict::Insert => {
                ensure_reference_placeholders(store, &foreign, &mut touched);
                store.insert(foreign)?;
                report.added.push(key);
                touched.insert(key);
            }
            Verdict::Overwrite => {
                ensure_reference_placeholders(store, &foreign, &mut touched);
                store.replace(key, foreign)?;
                report.updated.push(key);
                touched.insert(key);
            }
            Verdict::AcceptConverged => {
                // The local edit arrived at the same result; adopt the
                // remote version silently.
                let mut accepted = foreign;
                accepted.modified = false;
                store.replace(key, accepted)?;
                report.updated.push(key);
                touched.insert(key);
            }
            Verdict::Conflict(local) => {
                trace!(%key, "divergent local edit, recording conflict");
                registry.upsert(Conflict::new(local, foreign));
                report.conflicts.push(key);
            }
        }
    }

    report.normalize();
    store.notify_data(touched);
    debug!(
        added = report.added.len(),
        updated = report.updated.len(),
        conflicts = report.conflicts.len(),
        "merge complete"
    );
    Ok(report)
}

fn merge_tombstone(
    store: &mut GraphStore,
    registry: &mut ConflictRegistry,
    foreign: Entity,
    limits: &Limits,
    report: &mut MergeReport,
    touched: &mut BTreeSet<EntityKey>,
) -> Result<(), StoreError> {
    let key = foreign.key();
    let Some(local) = store.lookup(key) else {
        // Never seen locally; nothing to delete.
        return Ok(());
    };

    if local.modified && !local.deleted {
        trace!(%key, "remote tombstone against local edit, recording conflict");
        registry.upsert(Conflict::new(local.clone(), foreign));
        report.conflicts.push(key);
        return Ok(());
    }

    // Unmodified, a bare placeholder, or a convergent local deletion:
    // remove, stripping references first (same policy as Delete).
    cascade_remove(store, key, limits, report, touched)
}

/// Create placeholders for forward references the store cannot yet resolve.
fn ensure_reference_placeholders(
    store: &mut GraphStore,
    entity: &Entity,
    touched: &mut BTreeSet<EntityKey>,
) {
    for reference in entity.references() {
        if !store.contains(reference) {
            trace!(%reference, "forward reference, inserting placeholder");
            store.insert_placeholder(reference);
            touched.insert(reference);
        }
    }
}

/// Remove `root` and any placeholder left unreferenced by the removal.
///
/// Traversal carries a visited set, so membership cycles terminate; the
/// step bound from `Limits` is the last-resort guard.
fn cascade_remove(
    store: &mut GraphStore,
    root: EntityKey,
    limits: &Limits,
    report: &mut MergeReport,
    touched: &mut BTreeSet<EntityKey>,
) -> Result<(), StoreError> {
    let mut visited: BTreeSet<EntityKey> = BTreeSet::new();
    let mut queue = vec![root];
    let mut steps = 0usize;

    while let Some(key) = queue.pop() {
        if !visited.insert(key) {
            continue;
        }
        if !store.contains(key) {
            continue;
        }

        for referrer in store.referrers(key) {
            steps += 1;
            if steps > limits.max_cascade_steps {
                return Err(StoreError::ReferentialCycle { key: root });
            }
            let mut next = store
                .lookup(referrer)
                .cloned()
                .ok_or(StoreError::NotFound { key: referrer })?;
            next.strip_reference(key);
            store.replace(referrer, next)?;
            report.updated.push(referrer);
            touched.insert(referrer);
        }

        let entity = store.remove(key)?;
        report.updated.push(key);
        touched.insert(key);

        // Placeholders exist only to back references; collect any this
        // removal orphaned.
        for reference in entity.references() {
            steps += 1;
            if steps > limits.max_cascade_steps {
                return Err(StoreError::ReferentialCycle { key: root });
            }
            if let Some(target) = store.lookup(reference) {
                if target.is_incomplete() && store.referrers(reference).is_empty() {
                    queue.push(reference);
                }
            }
        }
    }
    Ok(())
}

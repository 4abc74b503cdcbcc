//! Layer 5: Reversible commands
//!
//! Every user edit is a command applied to the graph store. Each command
//! records the state it needs to invert itself on apply, so the log can
//! undo and redo without consulting anything else. Re-applying a command
//! recomputes its recorded state from the store, which at that moment is
//! bit-identical to the state at first apply.

use std::collections::{BTreeMap, BTreeSet};

use tracing::error;

use super::entity::{Body, Entity};
use super::error::{CommandError, StoreError};
use super::identity::EntityKey;
use super::store::GraphStore;
use super::tags::Tags;

/// A new entity without identity: the store assigns a fresh key on apply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Draft {
    pub tags: Tags,
    pub body: Body,
}

impl Draft {
    pub fn new(body: Body) -> Self {
        Self {
            tags: Tags::new(),
            body,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key, value);
        self
    }
}

#[derive(Clone, Debug)]
enum AddSeed {
    /// Identity assigned by the store on first apply.
    Draft(Draft),
    /// Caller supplied a fully-keyed entity.
    Entity(Entity),
}

/// Insert one new entity.
#[derive(Clone, Debug)]
pub struct AddCommand {
    seed: AddSeed,
    /// Recorded on first apply so redo reuses the same key.
    key: Option<EntityKey>,
}

impl AddCommand {
    fn apply(&mut self, store: &mut GraphStore) -> Result<(), CommandError> {
        let entity = match &self.seed {
            AddSeed::Draft(draft) => {
                let key = match self.key {
                    Some(key) => key,
                    None => store.allocate_fresh(draft.body.kind()),
                };
                self.key = Some(key);
                let mut entity = match draft.body.clone() {
                    Body::Point(coord) => Entity::point(key.num, coord),
                    Body::Path(points) => Entity::path(key.num, points),
                    Body::Grouping(members) => Entity::grouping(key.num, members),
                };
                entity.tags = draft.tags.clone();
                entity.modified = true;
                entity
            }
            AddSeed::Entity(entity) => {
                self.key = Some(entity.key());
                let mut entity = entity.clone();
                entity.modified = true;
                entity
            }
        };
        store.insert(entity)?;
        Ok(())
    }

    fn revert(&mut self, store: &mut GraphStore) -> Result<(), CommandError> {
        debug_assert!(self.key.is_some(), "revert of an unapplied add");
        if let Some(key) = self.key {
            store.remove(key)?;
        }
        Ok(())
    }

    fn affected(&self, keys: &mut BTreeSet<EntityKey>) {
        if let Some(key) = self.key {
            keys.insert(key);
        }
    }
}

/// Replace the full snapshot of an existing entity, keeping its key.
#[derive(Clone, Debug)]
pub struct ChangeCommand {
    key: EntityKey,
    next: Entity,
    /// Snapshot recorded on apply; the inverse.
    prior: Option<Entity>,
    /// User edits mark the result modified; conflict resolutions apply the
    /// snapshot verbatim.
    mark_modified: bool,
}

impl ChangeCommand {
    pub(crate) fn new(next: Entity) -> Self {
        Self {
            key: next.key(),
            next,
            prior: None,
            mark_modified: true,
        }
    }

    pub(crate) fn exact(next: Entity) -> Self {
        Self {
            key: next.key(),
            next,
            prior: None,
            mark_modified: false,
        }
    }

    pub fn key(&self) -> EntityKey {
        self.key
    }

    fn apply(&mut self, store: &mut GraphStore) -> Result<(), CommandError> {
        let current = store
            .lookup(self.key)
            .ok_or(StoreError::NotFound { key: self.key })?;
        if current.is_incomplete() {
            // Incomplete entities are not user-editable until filled.
            return Err(StoreError::NotFound { key: self.key }.into());
        }
        let prior = current.clone();
        let mut next = self.next.clone();
        if self.mark_modified {
            next.modified = true;
        }
        store.replace(self.key, next)?;
        self.prior = Some(prior);
        Ok(())
    }

    fn revert(&mut self, store: &mut GraphStore) -> Result<(), CommandError> {
        debug_assert!(self.prior.is_some(), "revert of an unapplied change");
        if let Some(prior) = self.prior.clone() {
            store.replace(self.key, prior)?;
        }
        Ok(())
    }
}

/// Delete a set of entities.
///
/// Remote-assigned entities stay in the store flagged `deleted` so the
/// deletion can be communicated upstream; fresh entities vanish outright.
/// With `cascade` each dangling reference strip is recorded as an implicit
/// change so a single undo restores both the entities and every reference
/// list they appeared in.
#[derive(Clone, Debug)]
pub struct DeleteCommand {
    keys: BTreeSet<EntityKey>,
    cascade: bool,
    strips: Vec<ChangeCommand>,
    marks: Vec<ChangeCommand>,
    vanished: Vec<Entity>,
}

impl DeleteCommand {
    fn apply(&mut self, store: &mut GraphStore) -> Result<(), CommandError> {
        // Recomputed wholesale on each apply; at redo time the store is
        // bit-identical to the state at first apply.
        self.strips.clear();
        self.marks.clear();
        self.vanished.clear();

        for key in &self.keys {
            match store.lookup(*key) {
                None => return Err(StoreError::NotFound { key: *key }.into()),
                Some(entity) if entity.is_incomplete() => {
                    return Err(StoreError::NotFound { key: *key }.into());
                }
                Some(_) => {}
            }
        }

        // Plan reference strips. References to a vanishing fresh target are
        // stripped even from co-deleted survivors, or the store would be
        // left holding a dangling reference.
        let mut plan: BTreeMap<EntityKey, BTreeSet<EntityKey>> = BTreeMap::new();
        for target in &self.keys {
            for referrer in store.referrers(*target) {
                if !self.keys.contains(&referrer) {
                    if !self.cascade {
                        return Err(StoreError::StillReferenced {
                            key: *target,
                            referrer,
                        }
                        .into());
                    }
                    plan.entry(referrer).or_default().insert(*target);
                } else if target.num.is_fresh() {
                    plan.entry(referrer).or_default().insert(*target);
                }
            }
        }

        for (referrer, targets) in plan {
            let mut next = match store.lookup(referrer) {
                Some(entity) => entity.clone(),
                None => return Err(StoreError::NotFound { key: referrer }.into()),
            };
            for target in targets {
                next.strip_reference(target);
            }
            let mut strip = ChangeCommand::new(next);
            strip.apply(store)?;
            self.strips.push(strip);
        }

        // Groupings before paths before points, so a co-deleted referrer is
        // gone before its referent.
        for key in self.keys.iter().rev() {
            if key.num.is_fresh() {
                self.vanished.push(store.remove(*key)?);
            } else {
                let mut next = match store.lookup(*key) {
                    Some(entity) => entity.clone(),
                    None => return Err(StoreError::NotFound { key: *key }.into()),
                };
                next.deleted = true;
                next.modified = true;
                let mut mark = ChangeCommand::exact(next);
                mark.apply(store)?;
                self.marks.push(mark);
            }
        }

        store.prune_selection(&self.keys);
        Ok(())
    }

    fn revert(&mut self, store: &mut GraphStore) -> Result<(), CommandError> {
        for entity in self.vanished.iter().rev() {
            store.insert(entity.clone())?;
        }
        for mark in self.marks.iter_mut().rev() {
            mark.revert(store)?;
        }
        for strip in self.strips.iter_mut().rev() {
            strip.revert(store)?;
        }
        Ok(())
    }

    fn affected(&self, keys: &mut BTreeSet<EntityKey>) {
        keys.extend(self.keys.iter().copied());
        keys.extend(self.strips.iter().map(ChangeCommand::key));
    }
}

/// Ordered composite with all-or-nothing semantics.
#[derive(Clone, Debug)]
pub struct SequenceCommand {
    label: String,
    children: Vec<Command>,
}

impl SequenceCommand {
    fn apply(&mut self, store: &mut GraphStore) -> Result<(), CommandError> {
        for index in 0..self.children.len() {
            if let Err(source) = self.children[index].apply(store) {
                for child in self.children[..index].iter_mut().rev() {
                    if let Err(rollback) = child.revert(store) {
                        error!(%rollback, "rollback failed while recovering a sequence");
                    }
                }
                return Err(CommandError::Sequence {
                    label: self.label.clone(),
                    index,
                    source: Box::new(source),
                });
            }
        }
        Ok(())
    }

    fn revert(&mut self, store: &mut GraphStore) -> Result<(), CommandError> {
        for child in self.children.iter_mut().rev() {
            child.revert(store)?;
        }
        Ok(())
    }
}

/// A reversible edit operation over the graph store.
#[derive(Clone, Debug)]
pub enum Command {
    Add(AddCommand),
    Change(ChangeCommand),
    Delete(DeleteCommand),
    Sequence(SequenceCommand),
}

impl Command {
    /// Add a new entity; the store assigns a fresh key on apply.
    pub fn add(draft: Draft) -> Self {
        Command::Add(AddCommand {
            seed: AddSeed::Draft(draft),
            key: None,
        })
    }

    /// Add a fully-keyed entity (fails `DuplicateId` if the key is taken).
    pub fn add_entity(entity: Entity) -> Self {
        Command::Add(AddCommand {
            seed: AddSeed::Entity(entity),
            key: None,
        })
    }

    /// Replace the snapshot of the entity keyed like `next`.
    pub fn change(next: Entity) -> Self {
        Command::Change(ChangeCommand::new(next))
    }

    /// Apply a snapshot verbatim, without marking it modified. Used by
    /// conflict resolution.
    pub(crate) fn change_exact(next: Entity) -> Self {
        Command::Change(ChangeCommand::exact(next))
    }

    /// Delete the given entities, optionally cascading reference strips.
    pub fn delete(keys: impl IntoIterator<Item = EntityKey>, cascade: bool) -> Self {
        Command::Delete(DeleteCommand {
            keys: keys.into_iter().collect(),
            cascade,
            strips: Vec::new(),
            marks: Vec::new(),
            vanished: Vec::new(),
        })
    }

    /// Compose commands into one all-or-nothing undo step.
    pub fn sequence(label: impl Into<String>, children: Vec<Command>) -> Self {
        Command::Sequence(SequenceCommand {
            label: label.into(),
            children,
        })
    }

    pub(crate) fn apply(&mut self, store: &mut GraphStore) -> Result<(), CommandError> {
        match self {
            Command::Add(c) => c.apply(store),
            Command::Change(c) => c.apply(store),
            Command::Delete(c) => c.apply(store),
            Command::Sequence(c) => c.apply(store),
        }
    }

    pub(crate) fn revert(&mut self, store: &mut GraphStore) -> Result<(), CommandError> {
        match self {
            Command::Add(c) => c.revert(store),
            Command::Change(c) => c.revert(store),
            Command::Delete(c) => c.revert(store),
            Command::Sequence(c) => c.revert(store),
        }
    }

    /// Keys touched by the last apply, for change notifications.
    pub fn affected(&self) -> BTreeSet<EntityKey> {
        let mut keys = BTreeSet::new();
        self.collect_affected(&mut keys);
        keys
    }

    fn collect_affected(&self, keys: &mut BTreeSet<EntityKey>) {
        match self {
            Command::Add(c) => c.affected(keys),
            Command::Change(c) => {
                keys.insert(c.key);
            }
            Command::Delete(c) => c.affected(keys),
            Command::Sequence(c) => {
                for child in &c.children {
                    child.collect_affected(keys);
                }
            }
        }
    }

    /// Human-readable description, suitable for an undo menu entry.
    pub fn describe(&self) -> String {
        match self {
            Command::Add(c) => match c.key {
                Some(key) => format!("add {key}"),
                None => "add entity".to_string(),
            },
            Command::Change(c) => format!("change {}", c.key),
            Command::Delete(c) => format!("delete {} entities", c.keys.len()),
            Command::Sequence(c) => c.label.clone(),
        }
    }
}

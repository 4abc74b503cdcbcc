//! Layer 6: The command log
//!
//! One linear undo/redo timeline per store. A new edit invalidates the
//! previously-redoable future; arbitrarily deep undo/redo cycling restores
//! store states bit-identically, because commands re-record their inverse
//! from the store on every re-apply.

use std::collections::VecDeque;

use tracing::debug;

use super::command::Command;
use super::error::CommandError;
use super::limits::Limits;
use super::store::GraphStore;

/// Twin-stack undo/redo log.
///
/// The undo side is a deque so capped eviction drops the oldest entry
/// without shifting the rest.
#[derive(Debug, Default)]
pub struct CommandLog {
    undo_stack: VecDeque<Command>,
    redo_stack: Vec<Command>,
    max_undo_steps: usize,
}

impl CommandLog {
    pub fn new(limits: &Limits) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_undo_steps: limits.max_undo_steps,
        }
    }

    /// Apply a new command and push it onto the undo stack.
    ///
    /// Clears the redo stack on success. The store is untouched on failure
    /// (commands guarantee no partial effects).
    pub fn apply(
        &mut self,
        store: &mut GraphStore,
        mut command: Command,
    ) -> Result<(), CommandError> {
        command.apply(store)?;
        debug!(command = %command.describe(), "applied");

        self.redo_stack.clear();
        let affected = command.affected();
        self.undo_stack.push_back(command);
        if self.max_undo_steps > 0 && self.undo_stack.len() > self.max_undo_steps {
            self.undo_stack.pop_front();
        }
        store.notify_data(affected);
        Ok(())
    }

    /// Undo the most recent command. `Ok(false)` if there is nothing to undo.
    pub fn undo(&mut self, store: &mut GraphStore) -> Result<bool, CommandError> {
        let Some(mut command) = self.undo_stack.pop_back() else {
            return Ok(false);
        };
        if let Err(err) = command.revert(store) {
            self.undo_stack.push_back(command);
            return Err(err);
        }
        debug!(command = %command.describe(), "undone");
        let affected = command.affected();
        self.redo_stack.push(command);
        store.notify_data(affected);
        Ok(true)
    }

    /// Redo the most recently undone command. `Ok(false)` if there is
    /// nothing to redo.
    pub fn redo(&mut self, store: &mut GraphStore) -> Result<bool, CommandError> {
        let Some(mut command) = self.redo_stack.pop() else {
            return Ok(false);
        };
        if let Err(err) = command.apply(store) {
            self.redo_stack.push(command);
            return Err(err);
        }
        debug!(command = %command.describe(), "redone");
        let affected = command.affected();
        self.undo_stack.push_back(command);
        store.notify_data(affected);
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Description of the command `undo` would revert, for menu labels.
    pub fn undo_description(&self) -> Option<String> {
        self.undo_stack.back().map(Command::describe)
    }

    /// Description of the command `redo` would re-apply.
    pub fn redo_description(&self) -> Option<String> {
        self.redo_stack.last().map(Command::describe)
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::command::Draft;
    use crate::core::entity::{Body, Coord, Entity};
    use crate::core::identity::{EntityKey, EntityNum};

    fn num(n: u64) -> EntityNum {
        EntityNum::assigned(n).unwrap()
    }

    fn log() -> CommandLog {
        CommandLog::new(&Limits::default())
    }

    #[test]
    fn undo_and_redo_walk_the_same_timeline() {
        let mut store = GraphStore::new();
        let mut log = log();

        log.apply(
            &mut store,
            Command::add_entity(Entity::point(num(1), Coord::new(0.0, 0.0))),
        )
        .unwrap();
        let empty = Vec::<Entity>::new();
        let one = store.all();

        log.apply(
            &mut store,
            Command::change(Entity::point(num(1), Coord::new(2.0, 2.0))),
        )
        .unwrap();
        let two = store.all();

        for _ in 0..5 {
            assert!(log.undo(&mut store).unwrap());
            assert_eq!(store.all(), one);
            assert!(log.undo(&mut store).unwrap());
            assert_eq!(store.all(), empty);
            assert!(!log.undo(&mut store).unwrap());

            assert!(log.redo(&mut store).unwrap());
            assert_eq!(store.all(), one);
            assert!(log.redo(&mut store).unwrap());
            assert_eq!(store.all(), two);
            assert!(!log.redo(&mut store).unwrap());
        }
    }

    #[test]
    fn a_new_edit_clears_the_redo_stack() {
        let mut store = GraphStore::new();
        let mut log = log();

        log.apply(
            &mut store,
            Command::add(Draft::new(Body::Point(Coord::new(0.0, 0.0)))),
        )
        .unwrap();
        log.undo(&mut store).unwrap();
        assert!(log.can_redo());

        log.apply(
            &mut store,
            Command::add(Draft::new(Body::Point(Coord::new(1.0, 1.0)))),
        )
        .unwrap();
        assert!(!log.can_redo());
        assert!(log.can_undo());
    }

    #[test]
    fn failed_commands_are_not_recorded() {
        let mut store = GraphStore::new();
        let mut log = log();

        let missing = Command::change(Entity::point(num(9), Coord::new(0.0, 0.0)));
        assert!(log.apply(&mut store, missing).is_err());
        assert!(!log.can_undo());
    }

    #[test]
    fn undo_depth_is_capped() {
        let mut store = GraphStore::new();
        let limits = Limits {
            max_undo_steps: 2,
            ..Limits::default()
        };
        let mut log = CommandLog::new(&limits);

        for n in 1..=3 {
            log.apply(
                &mut store,
                Command::add_entity(Entity::point(num(n), Coord::new(0.0, 0.0))),
            )
            .unwrap();
        }

        assert!(log.undo(&mut store).unwrap());
        assert!(log.undo(&mut store).unwrap());
        assert!(!log.undo(&mut store).unwrap());
        // The oldest add fell off the log; its entity survives.
        assert_eq!(store.all().len(), 1);
    }

    #[test]
    fn descriptions_follow_the_stacks() {
        let mut store = GraphStore::new();
        let mut log = log();

        log.apply(
            &mut store,
            Command::add_entity(Entity::point(num(1), Coord::new(0.0, 0.0))),
        )
        .unwrap();
        assert_eq!(log.undo_description().as_deref(), Some("add point 1"));
        assert_eq!(log.redo_description(), None);

        log.undo(&mut store).unwrap();
        assert_eq!(log.undo_description(), None);
        assert_eq!(log.redo_description().as_deref(), Some("add point 1"));
    }
}

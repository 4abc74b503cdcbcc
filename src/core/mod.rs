//! Core domain types for the versioned entity store.
//!
//! Module hierarchy follows type dependency order:
//! - identity: Kind, EntityNum, EntityKey (Layer 1)
//! - tags: Tags (Layer 2)
//! - entity: Coord, Member, Body, Entity (Layer 3)
//! - store: GraphStore (Layer 4)
//! - command: reversible commands (Layer 5)
//! - history: CommandLog (Layer 6)
//! - merge / conflict: merge engine and conflict registry (Layer 7)
//! - error, notify, limits: taxonomy, observers, bounds

pub mod command;
pub mod conflict;
pub mod entity;
pub mod error;
pub mod history;
pub mod identity;
pub mod limits;
pub mod merge;
pub mod notify;
pub mod store;
pub mod tags;

pub use command::{Command, Draft};
pub use conflict::{Conflict, ConflictRegistry, Resolution};
pub use entity::{Body, Coord, Entity, Member};
pub use error::{CommandError, StoreError};
pub use history::CommandLog;
pub use identity::{EntityKey, EntityNum, Kind};
pub use limits::Limits;
pub use merge::{merge_fragment, Fragment, MergeReport};
pub use notify::{DataChange, DataListener, ListenerId, SelectionListener};
pub use store::GraphStore;
pub use tags::Tags;

//! Versioned map-entity store with reversible editing and conflict-aware
//! merge.
//!
//! One [`Workspace`] is one working copy: a [`GraphStore`] of points, paths
//! and groupings, a [`CommandLog`] making every edit undoable, and a
//! [`ConflictRegistry`] holding whatever a merge could not reconcile.
//! Editing tools construct [`Command`]s and push them through the log;
//! background fetches hand [`Fragment`]s to the merge engine, which mutates
//! the store directly and records conflicts instead of destroying local
//! work.

#![forbid(unsafe_code)]

pub mod core;
pub mod workspace;

pub use crate::core::{
    merge_fragment, Body, Command, CommandError, CommandLog, Conflict, ConflictRegistry, Coord,
    DataChange, DataListener, Draft, Entity, EntityKey, EntityNum, Fragment, GraphStore, Kind,
    Limits, ListenerId, Member, MergeReport, Resolution, SelectionListener, StoreError, Tags,
};
pub use crate::workspace::{SharedWorkspace, Workspace};

pub type Result<T> = std::result::Result<T, CommandError>;

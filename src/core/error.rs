//! Error taxonomy.
//!
//! All variants are local, recoverable refusal states returned to the
//! caller; none is fatal to the process. Conflicts are not errors - they are
//! data held by the conflict registry.

use thiserror::Error;

use super::identity::EntityKey;

/// Refusal states of the graph store and cascade logic.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{key} already exists")]
    DuplicateId { key: EntityKey },

    #[error("{key} does not exist")]
    NotFound { key: EntityKey },

    #[error("{key} is still referenced by {referrer}")]
    StillReferenced {
        key: EntityKey,
        referrer: EntityKey,
    },

    #[error("{key} lists {point} more than once")]
    DuplicatePathPoint { key: EntityKey, point: EntityKey },

    #[error("cascade around {key} exceeded its step bound; membership cycle left unresolved")]
    ReferentialCycle { key: EntityKey },
}

/// Failure of a command application.
///
/// A failed `Sequence` child is surfaced as a single error after the
/// sequence has rolled back its own partial effects; there is no
/// partial-success state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("sequence `{label}` failed at step {index}: {source}")]
    Sequence {
        label: String,
        index: usize,
        source: Box<CommandError>,
    },
}

impl CommandError {
    /// The innermost store refusal, unwrapping sequence nesting.
    pub fn root_cause(&self) -> &StoreError {
        match self {
            CommandError::Store(e) => e,
            CommandError::Sequence { source, .. } => source.root_cause(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::EntityNum;

    #[test]
    fn root_cause_unwraps_nested_sequences() {
        let key = EntityKey::point(EntityNum::assigned(1).unwrap());
        let inner = CommandError::Store(StoreError::NotFound { key });
        let err = CommandError::Sequence {
            label: "outer".into(),
            index: 2,
            source: Box::new(CommandError::Sequence {
                label: "inner".into(),
                index: 0,
                source: Box::new(inner),
            }),
        };
        assert_eq!(err.root_cause(), &StoreError::NotFound { key });
        assert!(err.to_string().contains("outer"));
    }
}

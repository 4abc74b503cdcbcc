//! Layer 1: Identity atoms
//!
//! Kind: the three entity kinds, ordered by merge precedence
//! EntityNum: remote-assigned vs. locally-fresh identity
//! EntityKey: (kind, num) - the true primary key

use std::fmt;
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

/// Entity kind.
///
/// The derived ordering (Point < Path < Grouping) is the topological merge
/// order: Paths reference Points, Groupings reference both.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Point,
    Path,
    Grouping,
}

impl Kind {
    pub fn label(self) -> &'static str {
        match self {
            Kind::Point => "point",
            Kind::Path => "path",
            Kind::Grouping => "grouping",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Entity number - one of two disjoint id spaces.
///
/// `Assigned` numbers come from the remote authority and are positive and
/// stable. `Fresh` numbers come from the per-store local sequence and are
/// never reused once handed out, even after the entity is promoted or
/// deleted.
///
/// The two spaces never mix: there is no signed sentinel and no id zero.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityNum {
    /// Assigned by the remote authority.
    Assigned(NonZeroU64),
    /// Drawn from the local sequence, not yet uploaded.
    Fresh(NonZeroU64),
}

impl EntityNum {
    pub fn assigned(n: u64) -> Option<Self> {
        NonZeroU64::new(n).map(EntityNum::Assigned)
    }

    pub fn fresh(n: u64) -> Option<Self> {
        NonZeroU64::new(n).map(EntityNum::Fresh)
    }

    /// Map a raw wire id to an identity.
    ///
    /// Remote authorities hand out strictly positive ids; zero and negative
    /// raw values have no canonical meaning and map to `None`.
    pub fn from_wire(raw: i64) -> Option<Self> {
        u64::try_from(raw).ok().and_then(Self::assigned)
    }

    pub fn is_assigned(self) -> bool {
        matches!(self, EntityNum::Assigned(_))
    }

    pub fn is_fresh(self) -> bool {
        matches!(self, EntityNum::Fresh(_))
    }
}

impl fmt::Debug for EntityNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityNum::Assigned(n) => write!(f, "Assigned({n})"),
            EntityNum::Fresh(n) => write!(f, "Fresh({n})"),
        }
    }
}

impl fmt::Display for EntityNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityNum::Assigned(n) => write!(f, "{n}"),
            EntityNum::Fresh(n) => write!(f, "new:{n}"),
        }
    }
}

/// Primary key of an entity: kind plus number.
///
/// Kinds share the store but not the id space, so `(kind, num)` is the only
/// safe lookup key. The derived ordering is kind-major, which makes ordered
/// iteration over a keyed map topological for free.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub kind: Kind,
    pub num: EntityNum,
}

impl EntityKey {
    pub fn new(kind: Kind, num: EntityNum) -> Self {
        Self { kind, num }
    }

    pub fn point(num: EntityNum) -> Self {
        Self::new(Kind::Point, num)
    }

    pub fn path(num: EntityNum) -> Self {
        Self::new(Kind::Path, num)
    }

    pub fn grouping(num: EntityNum) -> Self {
        Self::new(Kind::Grouping, num)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.num)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_order_is_topological() {
        assert!(Kind::Point < Kind::Path);
        assert!(Kind::Path < Kind::Grouping);
    }

    #[test]
    fn wire_ids_must_be_positive() {
        assert_eq!(EntityNum::from_wire(17), EntityNum::assigned(17));
        assert_eq!(EntityNum::from_wire(0), None);
        assert_eq!(EntityNum::from_wire(-42), None);
    }

    #[test]
    fn assigned_and_fresh_never_compare_equal() {
        assert_ne!(EntityNum::assigned(5), EntityNum::fresh(5));
    }

    #[test]
    fn key_display_names_kind_and_num() {
        let key = EntityKey::point(EntityNum::assigned(17).unwrap());
        assert_eq!(key.to_string(), "point 17");
        let key = EntityKey::path(EntityNum::fresh(3).unwrap());
        assert_eq!(key.to_string(), "path new:3");
    }
}

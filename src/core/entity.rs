//! Layer 3: The Entity
//!
//! Coord: bit-exact geographic coordinate
//! Member: role-tagged grouping membership
//! Body: closed union over the three kinds of topology
//! Entity: identity + version + flags + tags + optional body

use std::fmt;

use serde::{Deserialize, Serialize};

use super::identity::{EntityKey, EntityNum, Kind};
use super::tags::Tags;

/// Geographic coordinate in degrees.
///
/// Equality and hashing compare the raw bit patterns: undo/redo must restore
/// state bit-identically, so two coordinates are equal only if they are the
/// same floats, NaN payloads included.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

impl Coord {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl PartialEq for Coord {
    fn eq(&self, other: &Self) -> bool {
        self.lat.to_bits() == other.lat.to_bits() && self.lon.to_bits() == other.lon.to_bits()
    }
}

impl Eq for Coord {}

impl std::hash::Hash for Coord {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.lat.to_bits().hash(state);
        self.lon.to_bits().hash(state);
    }
}

/// One membership slot of a Grouping.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    pub role: String,
    pub key: EntityKey,
}

impl Member {
    pub fn new(role: impl Into<String>, key: EntityKey) -> Self {
        Self {
            role: role.into(),
            key,
        }
    }
}

/// Kind-specific topology.
///
/// A closed union, so every consumer matches all three kinds exhaustively.
/// Path elements are point numbers (the kind is implied); Grouping members
/// may name any kind, including another Grouping - membership cycles are
/// legal data and traversals over them must stay non-recursive.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Body {
    Point(Coord),
    Path(Vec<EntityNum>),
    Grouping(Vec<Member>),
}

impl Body {
    pub fn kind(&self) -> Kind {
        match self {
            Body::Point(_) => Kind::Point,
            Body::Path(_) => Kind::Path,
            Body::Grouping(_) => Kind::Grouping,
        }
    }

    /// Direct outgoing references. Non-recursive by design.
    pub fn references(&self) -> Vec<EntityKey> {
        match self {
            Body::Point(_) => Vec::new(),
            Body::Path(points) => points.iter().map(|n| EntityKey::point(*n)).collect(),
            Body::Grouping(members) => members.iter().map(|m| m.key).collect(),
        }
    }

    /// Drop every reference to `target`, returning whether anything changed.
    pub fn strip_reference(&mut self, target: EntityKey) -> bool {
        match self {
            Body::Point(_) => false,
            Body::Path(points) => {
                if target.kind != Kind::Point {
                    return false;
                }
                let before = points.len();
                points.retain(|n| *n != target.num);
                points.len() != before
            }
            Body::Grouping(members) => {
                let before = members.len();
                members.retain(|m| m.key != target);
                members.len() != before
            }
        }
    }
}

fn default_visible() -> bool {
    true
}

/// A versioned map entity.
///
/// `body == None` is the incomplete placeholder state: a stub that exists
/// only because something references its key, carrying no attributes until
/// the real data arrives and fills it in place. Owners hold [`EntityKey`]s,
/// so the filled entity keeps the identity the owners already reference.
///
/// `deleted` is the local deletion flag; `visible == false` is the remote
/// tombstone state. The two are distinct: a locally deleted,
/// previously-published entity stays in the store so the deletion can be
/// communicated upstream, while a remote tombstone is grounds for removal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    key: EntityKey,
    #[serde(default)]
    pub version: u64,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub modified: bool,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    body: Option<Body>,
}

impl Entity {
    fn full(key: EntityKey, body: Body) -> Self {
        debug_assert_eq!(key.kind, body.kind(), "body kind must match key kind");
        Self {
            key,
            version: 0,
            visible: true,
            deleted: false,
            modified: false,
            tags: Tags::new(),
            body: Some(body),
        }
    }

    pub fn point(num: EntityNum, coord: Coord) -> Self {
        Self::full(EntityKey::point(num), Body::Point(coord))
    }

    pub fn path(num: EntityNum, points: Vec<EntityNum>) -> Self {
        Self::full(EntityKey::path(num), Body::Path(points))
    }

    pub fn grouping(num: EntityNum, members: Vec<Member>) -> Self {
        Self::full(EntityKey::grouping(num), Body::Grouping(members))
    }

    /// An incomplete stub: key only, no attributes, pending download.
    pub fn placeholder(key: EntityKey) -> Self {
        Self {
            key,
            version: 0,
            visible: true,
            deleted: false,
            modified: false,
            tags: Tags::new(),
            body: None,
        }
    }

    /// Builder convenience for version-stamped remote entities.
    pub fn at_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Builder convenience for tagging.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key, value);
        self
    }

    /// Builder convenience for a remote tombstone.
    pub fn tombstoned(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn key(&self) -> EntityKey {
        self.key
    }

    pub fn kind(&self) -> Kind {
        self.key.kind
    }

    pub fn num(&self) -> EntityNum {
        self.key.num
    }

    pub fn is_incomplete(&self) -> bool {
        self.body.is_none()
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Direct outgoing references; empty for points and placeholders.
    pub fn references(&self) -> Vec<EntityKey> {
        self.body.as_ref().map(Body::references).unwrap_or_default()
    }

    /// Drop every reference to `target`, returning whether anything changed.
    pub fn strip_reference(&mut self, target: EntityKey) -> bool {
        match self.body.as_mut() {
            Some(body) => body.strip_reference(target),
            None => false,
        }
    }

    /// Fill a placeholder in place from arrived data, preserving identity.
    pub(crate) fn fill_from(&mut self, arrived: Entity) {
        debug_assert_eq!(self.key, arrived.key, "fill requires same key");
        debug_assert!(self.is_incomplete(), "fill target must be a placeholder");
        self.version = arrived.version;
        self.visible = arrived.visible;
        self.deleted = arrived.deleted;
        self.modified = arrived.modified;
        self.tags = arrived.tags;
        self.body = arrived.body;
    }

    /// Attribute-and-topology equality: tags, body, and visibility.
    ///
    /// Version and the local bookkeeping flags are deliberately excluded -
    /// this is the comparison that decides whether a local edit converged on
    /// the same result as a remote one.
    pub fn same_content(&self, other: &Entity) -> bool {
        self.key == other.key
            && self.visible == other.visible
            && self.tags == other.tags
            && self.body == other.body
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.key, self.version)?;
        if self.is_incomplete() {
            write!(f, " (incomplete)")?;
        }
        if self.deleted {
            write!(f, " (deleted)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: u64) -> EntityNum {
        EntityNum::assigned(n).unwrap()
    }

    #[test]
    fn path_references_are_point_keys() {
        let path = Entity::path(num(10), vec![num(1), num(2)]);
        assert_eq!(
            path.references(),
            vec![EntityKey::point(num(1)), EntityKey::point(num(2))]
        );
    }

    #[test]
    fn strip_reference_removes_the_target() {
        let mut path = Entity::path(num(10), vec![num(1), num(2)]);
        assert!(path.strip_reference(EntityKey::point(num(1))));
        assert_eq!(path.body(), Some(&Body::Path(vec![num(2)])));
        assert!(!path.strip_reference(EntityKey::point(num(1))));
    }

    #[test]
    fn strip_ignores_key_of_wrong_kind() {
        let mut path = Entity::path(num(10), vec![num(1)]);
        assert!(!path.strip_reference(EntityKey::path(num(1))));
        assert_eq!(path.references().len(), 1);
    }

    #[test]
    fn same_content_ignores_version_and_flags() {
        let a = Entity::point(num(5), Coord::new(1.0, 2.0)).at_version(3);
        let mut b = a.clone().at_version(7);
        b.modified = true;
        assert!(a.same_content(&b));

        let c = Entity::point(num(5), Coord::new(1.0, 2.5)).at_version(3);
        assert!(!a.same_content(&c));
    }

    #[test]
    fn fill_preserves_key_and_adopts_data() {
        let key = EntityKey::point(num(9));
        let mut stub = Entity::placeholder(key);
        assert!(stub.is_incomplete());

        stub.fill_from(Entity::point(num(9), Coord::new(4.0, 5.0)).at_version(2));
        assert!(!stub.is_incomplete());
        assert_eq!(stub.key(), key);
        assert_eq!(stub.version, 2);
    }

    #[test]
    fn coord_equality_is_bit_exact() {
        assert_eq!(Coord::new(0.1, 0.2), Coord::new(0.1, 0.2));
        assert_ne!(Coord::new(0.0, 0.0), Coord::new(-0.0, 0.0));
    }
}

//! Raw OSM-style primitives, exactly as the source decoder hands them over.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct NodeID(pub i64);
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct WayID(pub i64);
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct RelationID(pub i64);

impl fmt::Display for NodeID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "https://www.openstreetmap.org/node/{}", self.0)
    }
}
impl fmt::Display for WayID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "https://www.openstreetmap.org/way/{}", self.0)
    }
}
impl fmt::Display for RelationID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "https://www.openstreetmap.org/relation/{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub enum OsmID {
    Node(NodeID),
    Way(WayID),
    Relation(RelationID),
}

impl OsmID {
    pub fn inner(self) -> i64 {
        match self {
            OsmID::Node(n) => n.0,
            OsmID::Way(w) => w.0,
            OsmID::Relation(r) => r.0,
        }
    }
}

impl fmt::Display for OsmID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OsmID::Node(n) => write!(f, "{}", n),
            OsmID::Way(w) => write!(f, "{}", w),
            OsmID::Relation(r) => write!(f, "{}", r),
        }
    }
}

/// Convenience functions around a string->string map.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    pub fn new(map: BTreeMap<String, String>) -> Tags {
        Tags(map)
    }

    pub fn get(&self, k: &str) -> Option<&String> {
        self.0.get(k)
    }

    pub fn contains_key(&self, k: &str) -> bool {
        self.0.contains_key(k)
    }

    pub fn is(&self, k: &str, v: &str) -> bool {
        self.0.get(k) == Some(&v.to_string())
    }

    pub fn is_any(&self, k: &str, values: Vec<&str>) -> bool {
        if let Some(v) = self.0.get(k) {
            values.contains(&v.as_ref())
        } else {
            false
        }
    }

    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, k: K, v: V) {
        self.0.insert(k.into(), v.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn inner(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

/// One primitive from the geographic source. Immutable once constructed; each
/// pipeline clone works on its own copy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RawElement {
    Node {
        id: NodeID,
        lon: f64,
        lat: f64,
        tags: Tags,
    },
    Way {
        id: WayID,
        nodes: Vec<NodeID>,
        tags: Tags,
    },
    Relation {
        id: RelationID,
        /// (member, role)
        members: Vec<(OsmID, String)>,
        tags: Tags,
    },
}

impl RawElement {
    pub fn id(&self) -> OsmID {
        match self {
            RawElement::Node { id, .. } => OsmID::Node(*id),
            RawElement::Way { id, .. } => OsmID::Way(*id),
            RawElement::Relation { id, .. } => OsmID::Relation(*id),
        }
    }

    pub fn tags(&self) -> &Tags {
        match self {
            RawElement::Node { tags, .. } => tags,
            RawElement::Way { tags, .. } => tags,
            RawElement::Relation { tags, .. } => tags,
        }
    }

    pub fn tags_mut(&mut self) -> &mut Tags {
        match self {
            RawElement::Node { tags, .. } => tags,
            RawElement::Way { tags, .. } => tags,
            RawElement::Relation { tags, .. } => tags,
        }
    }
}

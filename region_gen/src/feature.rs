//! The mutable in-flight representation of one renderable/searchable object.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use geom::{Bounds, LonLat, Ring};

use crate::classif::Class;
use crate::element::OsmID;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GeomKind {
    Point,
    Line,
    Area,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FeatureGeometry {
    Point(LonLat),
    Line(Vec<LonLat>),
    Area { outer: Ring, holes: Vec<Ring> },
}

impl FeatureGeometry {
    pub fn kind(&self) -> GeomKind {
        match self {
            FeatureGeometry::Point(_) => GeomKind::Point,
            FeatureGeometry::Line(_) => GeomKind::Line,
            FeatureGeometry::Area { .. } => GeomKind::Area,
        }
    }

    pub fn get_bounds(&self) -> Bounds {
        match self {
            FeatureGeometry::Point(pt) => Bounds::from(&[*pt]),
            FeatureGeometry::Line(pts) => Bounds::from(pts),
            FeatureGeometry::Area { outer, .. } => outer.get_bounds(),
        }
    }

    /// True if the predicate holds for any vertex of the geometry. Holes
    /// count; a vertex on a hole boundary still anchors the feature to a
    /// region.
    pub fn any_vertex<F: FnMut(LonLat) -> bool>(&self, mut f: F) -> bool {
        match self {
            FeatureGeometry::Point(pt) => f(*pt),
            FeatureGeometry::Line(pts) => pts.iter().any(|pt| f(*pt)),
            FeatureGeometry::Area { outer, holes } => {
                outer.points().iter().any(|pt| f(*pt))
                    || holes.iter().any(|h| h.points().iter().any(|pt| f(*pt)))
            }
        }
    }
}

/// The pipeline's work unit. Created by the feature maker, mutated in place
/// down the stage chain, serialized when it reaches the affiliation router.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DraftFeature {
    pub geometry: FeatureGeometry,
    pub classes: BTreeSet<Class>,
    /// Keyed by language code; "default" for the bare name tag.
    pub names: BTreeMap<String, String>,
    pub metadata: BTreeMap<String, String>,
    pub source: OsmID,
}

impl DraftFeature {
    pub fn new(geometry: FeatureGeometry, classes: BTreeSet<Class>, source: OsmID) -> DraftFeature {
        DraftFeature {
            geometry,
            classes,
            names: BTreeMap::new(),
            metadata: BTreeMap::new(),
            source,
        }
    }

    pub fn kind(&self) -> GeomKind {
        self.geometry.kind()
    }

    pub fn get_bounds(&self) -> Bounds {
        self.geometry.get_bounds()
    }

    /// The region-file record payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).with_context(|| format!("serializing feature {}", self.source))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<DraftFeature> {
        bincode::deserialize(bytes).context("deserializing feature record")
    }
}

//! Turns one raw element into zero or more draft features, resolving way and
//! relation geometry through the intermediate cache.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use geom::{LonLat, Ring};

use crate::cache::IntermediateCache;
use crate::classif;
use crate::element::{OsmID, RawElement, Tags};
use crate::feature::{DraftFeature, FeatureGeometry};
use crate::layers::LogBuffer;

const STAGE: &str = "feature_maker";

/// Tag values copied verbatim into feature metadata.
const METADATA_KEYS: &[&str] = &[
    "website",
    "phone",
    "opening_hours",
    "wikipedia",
    "population",
];

pub struct FeatureMaker {
    cache: Arc<dyn IntermediateCache>,
    ready: VecDeque<DraftFeature>,
    pub log: LogBuffer,
}

impl FeatureMaker {
    pub fn new(cache: Arc<dyn IntermediateCache>) -> FeatureMaker {
        FeatureMaker {
            cache,
            ready: VecDeque::new(),
            log: LogBuffer::default(),
        }
    }

    /// Fresh ready-queue and log, same cache.
    pub fn clone_unit(&self) -> FeatureMaker {
        FeatureMaker::new(self.cache.clone())
    }

    pub fn merge(&mut self, other: FeatureMaker) {
        self.log.merge(other.log);
    }

    /// Queues the drafts this element materializes into. The caller must
    /// drain with `take_next` before the next `add`.
    pub fn add(&mut self, elem: &RawElement) -> usize {
        let before = self.ready.len();
        match elem {
            RawElement::Node { id, lon, lat, tags } => {
                self.make_point(OsmID::Node(*id), LonLat::new(*lon, *lat), tags);
            }
            RawElement::Way { id, nodes, tags } => {
                self.make_from_way(OsmID::Way(*id), nodes, tags);
            }
            RawElement::Relation { id, members, tags } => {
                self.make_from_relation(OsmID::Relation(*id), members, tags);
            }
        }
        self.ready.len() - before
    }

    pub fn take_next(&mut self) -> Option<DraftFeature> {
        self.ready.pop_front()
    }

    fn make_point(&mut self, id: OsmID, pt: LonLat, tags: &Tags) {
        let classes = classif::registry().classes_for_tags(tags);
        if classes.is_empty() {
            return;
        }
        self.push(id, FeatureGeometry::Point(pt), classes, tags);
    }

    fn make_from_way(&mut self, id: OsmID, nodes: &[crate::element::NodeID], tags: &Tags) {
        let classes = classif::registry().classes_for_tags(tags);
        if classes.is_empty() {
            return;
        }
        let mut pts = Vec::new();
        for n in nodes {
            match self.cache.node(*n) {
                Some(pt) => pts.push(pt),
                None => {
                    self.log.append(STAGE, id, "unresolved node reference");
                    return;
                }
            }
        }
        if pts.len() < 2 {
            self.log.append(STAGE, id, "way with fewer than 2 points");
            return;
        }

        let closed = pts[0] == *pts.last().unwrap();
        let geometry = if closed {
            match Ring::deduping_new(pts) {
                Ok(outer) => FeatureGeometry::Area {
                    outer,
                    holes: Vec::new(),
                },
                Err(_) => {
                    self.log.append(STAGE, id, "degenerate closed way");
                    return;
                }
            }
        } else {
            FeatureGeometry::Line(pts)
        };
        self.push(id, geometry, classes, tags);
    }

    fn make_from_relation(&mut self, id: OsmID, members: &[(OsmID, String)], tags: &Tags) {
        if !tags.is("type", "multipolygon") && !tags.is("type", "boundary") {
            return;
        }
        let classes = classif::registry().classes_for_tags(tags);
        if classes.is_empty() {
            return;
        }

        let mut outer_chunks = Vec::new();
        let mut inner_chunks = Vec::new();
        for (member, role) in members {
            let way = match member {
                OsmID::Way(w) => *w,
                // Nested relations and node members don't contribute geometry.
                _ => continue,
            };
            let pts = match self.resolve_way_pts(way) {
                Some(pts) => pts,
                None => {
                    self.log.append(STAGE, id, "unresolved member way");
                    continue;
                }
            };
            // The cache contract doesn't promise well-formed ways.
            if pts.len() < 2 {
                self.log.append(STAGE, id, "degenerate member way");
                continue;
            }
            match role.as_str() {
                "outer" | "" => outer_chunks.push(pts),
                "inner" => inner_chunks.push(pts),
                _ => {
                    self.log.append(STAGE, id, "unhandled member role");
                }
            }
        }

        let outers = close_into_rings(glue_chains(outer_chunks));
        if outers.is_empty() {
            self.log.append(STAGE, id, "no closed outer ring");
            return;
        }
        let holes = close_into_rings(glue_chains(inner_chunks));

        // One draft per disjoint outer ring, holes attached to the outer
        // containing them.
        for outer in outers {
            let my_holes: Vec<Ring> = holes
                .iter()
                .filter(|h| outer.contains_pt(h.points()[0]))
                .cloned()
                .collect();
            self.push(
                id,
                FeatureGeometry::Area {
                    outer,
                    holes: my_holes,
                },
                classes.clone(),
                tags,
            );
        }
    }

    fn resolve_way_pts(&self, way: crate::element::WayID) -> Option<Vec<LonLat>> {
        let nodes = self.cache.way_nodes(way)?;
        let mut pts = Vec::new();
        for n in nodes {
            pts.push(self.cache.node(*n)?);
        }
        Some(pts)
    }

    fn push(
        &mut self,
        id: OsmID,
        geometry: FeatureGeometry,
        classes: BTreeSet<crate::classif::Class>,
        tags: &Tags,
    ) {
        let mut f = DraftFeature::new(geometry, classes, id);
        for (k, v) in tags.inner() {
            if k == "name" {
                f.names.insert("default".to_string(), v.clone());
            } else if let Some(lang) = k.strip_prefix("name:") {
                f.names.insert(lang.to_string(), v.clone());
            } else if METADATA_KEYS.contains(&k.as_str()) {
                f.metadata.insert(k.clone(), v.clone());
            }
        }
        self.ready.push_back(f);
    }
}

/// Stitches chunks into maximal chains by matching endpoints, reversing the
/// work-in-progress once before giving up on a chunk. Already-closed chunks
/// pass through untouched.
pub(crate) fn glue_chains(mut chunks: Vec<Vec<LonLat>>) -> Vec<Vec<LonLat>> {
    let mut done = Vec::new();
    // A chunk without two points can't glue to anything.
    chunks.retain(|pts| pts.len() >= 2);
    chunks.retain(|pts| {
        if pts.len() >= 3 && pts[0] == *pts.last().unwrap() {
            done.push(pts.clone());
            false
        } else {
            true
        }
    });

    while let Some(mut result) = chunks.pop() {
        let mut reversed = false;
        loop {
            if result[0] == *result.last().unwrap() {
                break;
            }
            let glue_pt = *result.last().unwrap();
            if let Some(idx) = chunks
                .iter()
                .position(|pts| pts[0] == glue_pt || *pts.last().unwrap() == glue_pt)
            {
                let mut append = chunks.remove(idx);
                if append[0] != glue_pt {
                    append.reverse();
                }
                result.pop();
                result.extend(append);
            } else if !reversed {
                reversed = true;
                result.reverse();
                // Try again from the other end.
            } else {
                break;
            }
        }
        done.push(result);
    }
    done
}

fn close_into_rings(chains: Vec<Vec<LonLat>>) -> Vec<Ring> {
    chains
        .into_iter()
        .filter(|pts| pts.len() >= 4 && pts[0] == *pts.last().unwrap())
        .filter_map(|pts| Ring::deduping_new(pts).ok())
        .collect()
}

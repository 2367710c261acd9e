//! Decides which region files a draft feature belongs to.

use std::collections::BTreeSet;

use rstar::{RTree, RTreeObject, AABB};

use geom::{LonLat, Polygon};

use crate::feature::{DraftFeature, FeatureGeometry};

pub trait Affiliation: Send + Sync {
    /// The set of region names the feature's geometry belongs to, sorted and
    /// deduplicated. Empty means the feature has no destination and must be
    /// dropped by the caller; 2+ names mean deliberate replication across a
    /// border.
    fn resolve(&self, feature: &DraftFeature) -> Vec<String>;
}

/// One named region: a country (or similar) described by one or more
/// boundary polygons.
pub struct Region {
    pub name: String,
    pub polygons: Vec<Polygon>,
}

impl Region {
    pub fn contains(&self, pt: LonLat) -> bool {
        self.polygons.iter().any(|p| p.contains_pt(pt))
    }
}

/// One rtree leaf per region polygon; regions with scattered territories get
/// several envelopes, so candidate lists must dedupe by region index.
struct Envelope {
    aabb: AABB<[f64; 2]>,
    region: usize,
}

impl RTreeObject for Envelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> AABB<[f64; 2]> {
        self.aabb
    }
}

pub struct RegionTreeAffiliation {
    regions: Vec<Region>,
    tree: RTree<Envelope>,
    /// When the border set covers the whole world, a bounding-box hit with no
    /// competitors is accepted without the exact containment test. With a
    /// partial border set that shortcut would misfile features that only
    /// graze a bounding box, so it stays off.
    have_borders_for_whole_world: bool,
}

impl RegionTreeAffiliation {
    pub fn new(regions: Vec<Region>, have_borders_for_whole_world: bool) -> RegionTreeAffiliation {
        let mut envelopes = Vec::new();
        for (idx, region) in regions.iter().enumerate() {
            for polygon in &region.polygons {
                envelopes.push(Envelope {
                    aabb: polygon.get_bounds().as_aabb(),
                    region: idx,
                });
            }
        }
        RegionTreeAffiliation {
            regions,
            tree: RTree::bulk_load(envelopes),
            have_borders_for_whole_world,
        }
    }

    pub fn has_region(&self, name: &str) -> bool {
        self.regions.iter().any(|r| r.name == name)
    }

    fn candidates(&self, feature: &DraftFeature) -> BTreeSet<usize> {
        self.tree
            .locate_in_envelope_intersecting(&feature.get_bounds().as_aabb())
            .map(|e| e.region)
            .collect()
    }
}

impl Affiliation for RegionTreeAffiliation {
    fn resolve(&self, feature: &DraftFeature) -> Vec<String> {
        let candidates = self.candidates(feature);

        if self.have_borders_for_whole_world && candidates.len() == 1 {
            let idx = *candidates.iter().next().unwrap();
            return vec![self.regions[idx].name.clone()];
        }

        let mut names = Vec::new();
        for idx in candidates {
            let region = &self.regions[idx];
            let hit = match &feature.geometry {
                FeatureGeometry::Point(pt) => region.contains(*pt),
                // A line or area straddling a border legitimately lands in
                // every region holding at least one of its vertices.
                _ => feature.geometry.any_vertex(|pt| region.contains(pt)),
            };
            if hit {
                names.push(region.name.clone());
            }
        }
        names.sort();
        names.dedup();
        names
    }
}

/// Always routes to one fixed region, for single-output targets like the
/// world-wide or coastline-only files.
pub struct SingleRegionAffiliation {
    name: String,
}

impl SingleRegionAffiliation {
    pub fn new(name: &str) -> SingleRegionAffiliation {
        SingleRegionAffiliation {
            name: name.to_string(),
        }
    }
}

impl Affiliation for SingleRegionAffiliation {
    fn resolve(&self, _: &DraftFeature) -> Vec<String> {
        vec![self.name.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classif;
    use crate::element::{NodeID, OsmID};
    use geom::Ring;
    use std::collections::BTreeSet;

    fn square_region(name: &str, x1: f64, y1: f64, x2: f64, y2: f64) -> Region {
        let ring = Ring::new(vec![
            LonLat::new(x1, y1),
            LonLat::new(x2, y1),
            LonLat::new(x2, y2),
            LonLat::new(x1, y2),
            LonLat::new(x1, y1),
        ])
        .unwrap();
        Region {
            name: name.to_string(),
            polygons: vec![Polygon::new(ring)],
        }
    }

    fn point_feature(lon: f64, lat: f64) -> DraftFeature {
        let mut classes = BTreeSet::new();
        classes.insert(classif::registry().class("place|town"));
        DraftFeature::new(
            FeatureGeometry::Point(LonLat::new(lon, lat)),
            classes,
            OsmID::Node(NodeID(1)),
        )
    }

    fn line_feature(pts: Vec<(f64, f64)>) -> DraftFeature {
        let mut classes = BTreeSet::new();
        classes.insert(classif::registry().class("highway|secondary"));
        DraftFeature::new(
            FeatureGeometry::Line(pts.into_iter().map(|(x, y)| LonLat::new(x, y)).collect()),
            classes,
            OsmID::Node(NodeID(2)),
        )
    }

    fn two_adjacent_squares() -> RegionTreeAffiliation {
        RegionTreeAffiliation::new(
            vec![
                square_region("A", 0.0, 0.0, 1.0, 1.0),
                square_region("B", 1.0, 0.0, 2.0, 1.0),
            ],
            false,
        )
    }

    #[test]
    fn interior_point_hits_one_region() {
        let aff = two_adjacent_squares();
        assert_eq!(aff.resolve(&point_feature(0.25, 0.25)), vec!["A"]);
        assert_eq!(aff.resolve(&point_feature(1.5, 0.5)), vec!["B"]);
    }

    #[test]
    fn straddling_line_hits_both() {
        let aff = two_adjacent_squares();
        assert_eq!(
            aff.resolve(&line_feature(vec![(0.5, 0.5), (1.5, 0.5)])),
            vec!["A", "B"]
        );
    }

    #[test]
    fn outside_everything_is_empty() {
        let aff = two_adjacent_squares();
        assert!(aff.resolve(&point_feature(5.0, 5.0)).is_empty());
    }

    #[test]
    fn resolve_is_deterministic() {
        let aff = two_adjacent_squares();
        let f = line_feature(vec![(0.5, 0.5), (1.5, 0.5)]);
        assert_eq!(aff.resolve(&f), aff.resolve(&f));
    }

    #[test]
    fn whole_world_shortcut_skips_containment() {
        // The point is outside A's exact boundary but inside its bounding
        // box competitor-free zone; with the whole-world flag the bbox hit
        // wins.
        let diamond = Ring::new(vec![
            LonLat::new(0.5, 0.0),
            LonLat::new(1.0, 0.5),
            LonLat::new(0.5, 1.0),
            LonLat::new(0.0, 0.5),
            LonLat::new(0.5, 0.0),
        ])
        .unwrap();
        let region = Region {
            name: "A".to_string(),
            polygons: vec![Polygon::new(diamond)],
        };
        let corner = point_feature(0.05, 0.05);

        let strict = RegionTreeAffiliation::new(
            vec![Region {
                name: region.name.clone(),
                polygons: region.polygons.clone(),
            }],
            false,
        );
        assert!(strict.resolve(&corner).is_empty());

        let relaxed = RegionTreeAffiliation::new(vec![region], true);
        assert_eq!(relaxed.resolve(&corner), vec!["A"]);
    }
}

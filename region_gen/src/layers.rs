//! The processing chain: an ordered list of stages that reshape, enrich,
//! drop, or split draft features before the affiliation router ships them
//! off. Each worker thread runs its own clone of the chain; per-clone skip
//! logs are merged back together when translation finishes.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use crossbeam_channel::Sender;

use geom::LonLat;

use crate::affiliation::Affiliation;
use crate::classif;
use crate::element::OsmID;
use crate::feature::{DraftFeature, FeatureGeometry, GeomKind};
use crate::writer::{FeatureBatch, OutputItem};

/// Tab-separated skip diagnostics: stage, element, reason. One per worker
/// clone; merging clones' buffers reproduces a single-threaded run's log as
/// a multiset.
#[derive(Clone, Debug, Default)]
pub struct LogBuffer {
    lines: Vec<String>,
}

impl LogBuffer {
    pub fn append(&mut self, stage: &str, id: impl fmt::Display, reason: &str) {
        self.lines.push(format!("{}\t{}\t{}", stage, id, reason));
    }

    pub fn merge(&mut self, other: LogBuffer) {
        self.lines.extend(other.lines);
    }

    pub fn lines(&self) -> &Vec<String> {
        &self.lines
    }

    pub fn dump(&self, path: &Path) -> Result<()> {
        fs_err::write(path, self.lines.join("\n"))?;
        Ok(())
    }
}

/// The known stage set is small and fixed per target, so stages are a closed
/// enum dispatched in one match, not trait objects.
#[derive(Clone)]
pub enum Layer {
    /// Chooses the representation (area, line, point, or an area plus an
    /// independent line) a draft deserves, from its classes and geometry.
    Representation,
    /// Strips classes useless for the geometry kind, fixes coastline/land
    /// class pairs, and drops names with no searchable value.
    Prepare,
    /// Tags city-like features on the allow-list with the promo class.
    PromoCatalog { cities: Arc<HashSet<OsmID>> },
    /// Keeps only features prominent enough for the world-wide output.
    WorldFilter { popular: Arc<HashSet<OsmID>> },
    /// Representation rules for the coastline target: ways only.
    RepresentationCoastline,
    /// Forces the class set to exactly the coastline class.
    PrepareCoastline,
}

impl Layer {
    fn name(&self) -> &'static str {
        match self {
            Layer::Representation => "representation",
            Layer::Prepare => "prepare",
            Layer::PromoCatalog { .. } => "promo_catalog",
            Layer::WorldFilter { .. } => "world_filter",
            Layer::RepresentationCoastline => "representation_coastline",
            Layer::PrepareCoastline => "prepare_coastline",
        }
    }

    /// Forwards 0..N derived drafts downstream. A draft not forwarded is a
    /// stage-local drop; only malformed input gets a log line.
    fn handle(&self, feature: DraftFeature, out: &mut Vec<DraftFeature>, log: &mut LogBuffer) {
        let c = classif::registry();
        match self {
            Layer::Representation => match feature.source {
                OsmID::Node(_) => out.push(feature),
                OsmID::Way(_) => match feature.kind() {
                    GeomKind::Area => {
                        // A closed way with line semantics (a fenced park)
                        // additionally becomes an independent line feature.
                        let line = if feature.classes.iter().any(|cl| c.supports(*cl, GeomKind::Line))
                        {
                            Some(line_from_area(&feature))
                        } else {
                            None
                        };
                        handle_area(feature, out);
                        if let Some(line) = line {
                            out.push(line);
                        }
                    }
                    GeomKind::Line | GeomKind::Point => out.push(feature),
                },
                OsmID::Relation(_) => match feature.kind() {
                    GeomKind::Area => handle_area(feature, out),
                    _ => log.append(self.name(), feature.source, "non-area relation geometry"),
                },
            },
            Layer::Prepare => {
                let mut feature = feature;
                let kind = feature.kind();
                feature.classes.retain(|cl| c.supports(*cl, kind));
                if feature.classes.contains(&c.coastline()) {
                    // A feature that is the coastline must not also carry the
                    // generic land classes.
                    feature.classes.remove(&c.land());
                    feature.classes.remove(&c.coastline_area());
                } else if feature.classes.contains(&c.island()) && kind == GeomKind::Area {
                    feature.classes.insert(c.land());
                }
                feature.names.retain(|_, v| v.chars().count() > 1);
                if !feature.classes.is_empty() {
                    out.push(feature);
                }
            }
            Layer::PromoCatalog { cities } => {
                let mut feature = feature;
                if c.is_city_town_or_village(&feature.classes) && cities.contains(&feature.source) {
                    feature.classes.insert(c.promo_catalog());
                }
                out.push(feature);
            }
            Layer::WorldFilter { popular } => {
                if feature.classes.iter().any(|cl| c.world_visible(*cl))
                    || popular.contains(&feature.source)
                {
                    out.push(feature);
                }
            }
            Layer::RepresentationCoastline => match feature.source {
                OsmID::Way(_) => match feature.kind() {
                    GeomKind::Area | GeomKind::Line => out.push(feature),
                    GeomKind::Point => {
                        log.append(self.name(), feature.source, "point geometry from way")
                    }
                },
                // Nodes and relations never contribute to the coastline.
                _ => {}
            },
            Layer::PrepareCoastline => {
                let mut feature = feature;
                feature.classes.clear();
                feature.classes.insert(c.coastline());
                feature.names.clear();
                out.push(feature);
            }
        }
    }
}

fn handle_area(feature: DraftFeature, out: &mut Vec<DraftFeature>) {
    let c = classif::registry();
    if feature.classes.iter().any(|cl| c.supports(*cl, GeomKind::Area)) {
        out.push(feature);
    } else if feature.classes.iter().any(|cl| c.supports(*cl, GeomKind::Point)) {
        out.push(point_from_area(feature));
    }
    // Neither representation works: stage-local drop.
}

fn point_from_area(mut feature: DraftFeature) -> DraftFeature {
    let center = feature.get_bounds().center();
    feature.geometry = FeatureGeometry::Point(center);
    feature
}

fn line_from_area(feature: &DraftFeature) -> DraftFeature {
    let pts: Vec<LonLat> = match &feature.geometry {
        FeatureGeometry::Area { outer, .. } => outer.points().clone(),
        _ => unreachable!("line_from_area on non-area geometry"),
    };
    let mut line = feature.clone();
    line.geometry = FeatureGeometry::Line(pts);
    line
}

/// The terminal stage: serialize, resolve affiliation, push batches into the
/// shared queue. Never forwards further.
pub struct AffiliationRouter {
    affiliation: Arc<dyn Affiliation>,
    tx: Sender<FeatureBatch>,
    buffer: FeatureBatch,
}

const ROUTER_BATCH: usize = 64;

impl AffiliationRouter {
    pub fn new(affiliation: Arc<dyn Affiliation>, tx: Sender<FeatureBatch>) -> AffiliationRouter {
        AffiliationRouter {
            affiliation,
            tx,
            buffer: Vec::new(),
        }
    }

    fn route(&mut self, feature: DraftFeature) -> Result<()> {
        let regions = self.affiliation.resolve(&feature);
        if regions.is_empty() {
            // Geographically outside every known region; not an error.
            return Ok(());
        }
        let bytes = feature.to_bytes()?;
        self.buffer.push(OutputItem { bytes, regions });
        if self.buffer.len() >= ROUTER_BATCH {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if !self.buffer.is_empty() {
            self.tx
                .send(std::mem::take(&mut self.buffer))
                .map_err(|_| anyhow!("the output queue is disconnected"))?;
        }
        Ok(())
    }

    fn clone_unit(&self) -> AffiliationRouter {
        AffiliationRouter::new(self.affiliation.clone(), self.tx.clone())
    }
}

/// An ordered stage list ending in the affiliation router.
pub struct LayerChain {
    layers: Vec<Layer>,
    router: AffiliationRouter,
    log: LogBuffer,
}

impl LayerChain {
    pub fn new(layers: Vec<Layer>, router: AffiliationRouter) -> LayerChain {
        LayerChain {
            layers,
            router,
            log: LogBuffer::default(),
        }
    }

    pub fn handle(&mut self, feature: DraftFeature) -> Result<()> {
        let mut current = vec![feature];
        for layer in &self.layers {
            let mut next = Vec::new();
            for f in current {
                layer.handle(f, &mut next, &mut self.log);
            }
            if next.is_empty() {
                return Ok(());
            }
            current = next;
        }
        for f in current {
            self.router.route(f)?;
        }
        Ok(())
    }

    /// Same stage configuration, fresh empty log, independent router buffer.
    pub fn clone_unit(&self) -> LayerChain {
        LayerChain {
            layers: self.layers.clone(),
            router: self.router.clone_unit(),
            log: LogBuffer::default(),
        }
    }

    /// Folds a finished clone's diagnostics into this chain.
    pub fn merge(&mut self, other: LayerChain) {
        self.log.merge(other.log);
    }

    pub fn finish(&mut self) -> Result<()> {
        self.router.flush()
    }

    pub fn log(&self) -> &LogBuffer {
        &self.log
    }

    pub fn take_log(&mut self) -> LogBuffer {
        std::mem::take(&mut self.log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{NodeID, WayID};
    use geom::Ring;
    use std::collections::BTreeSet;

    fn area_feature(classes: Vec<&str>, source: OsmID) -> DraftFeature {
        let c = classif::registry();
        let outer = Ring::new(vec![
            LonLat::new(0.0, 0.0),
            LonLat::new(1.0, 0.0),
            LonLat::new(1.0, 1.0),
            LonLat::new(0.0, 1.0),
            LonLat::new(0.0, 0.0),
        ])
        .unwrap();
        DraftFeature::new(
            FeatureGeometry::Area {
                outer,
                holes: Vec::new(),
            },
            classes.into_iter().map(|p| c.class(p)).collect(),
            source,
        )
    }

    fn run_layer(layer: Layer, feature: DraftFeature) -> Vec<DraftFeature> {
        let mut out = Vec::new();
        let mut log = LogBuffer::default();
        layer.handle(feature, &mut out, &mut log);
        out
    }

    #[test]
    fn fenced_playground_splits_into_area_and_line() {
        let f = area_feature(
            vec!["leisure|playground", "barrier|fence"],
            OsmID::Way(WayID(1)),
        );
        let out = run_layer(Layer::Representation, f);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].kind(), GeomKind::Area);
        assert_eq!(out[1].kind(), GeomKind::Line);
    }

    #[test]
    fn area_without_area_classes_reduces_to_point() {
        let f = area_feature(vec!["amenity|cafe"], OsmID::Way(WayID(2)));
        let out = run_layer(Layer::Representation, f);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind(), GeomKind::Point);
    }

    #[test]
    fn prepare_strips_useless_classes_and_short_names() {
        let c = classif::registry();
        let mut f = area_feature(
            vec!["leisure|park", "highway|residential"],
            OsmID::Way(WayID(3)),
        );
        f.names.insert("default".to_string(), "Volkspark".to_string());
        f.names.insert("old".to_string(), "V".to_string());

        let out = run_layer(Layer::Prepare, f);
        assert_eq!(out.len(), 1);
        // A residential road class makes no sense on an area.
        assert!(!out[0].classes.contains(&c.class("highway|residential")));
        assert!(out[0].classes.contains(&c.class("leisure|park")));
        assert_eq!(out[0].names.len(), 1);
    }

    #[test]
    fn prepare_drops_featureless_drafts_silently() {
        let f = area_feature(vec!["barrier|fence"], OsmID::Way(WayID(4)));
        let out = run_layer(Layer::Prepare, f);
        assert!(out.is_empty());
    }

    #[test]
    fn coastline_feature_loses_land_classes() {
        let c = classif::registry();
        let mut f = area_feature(
            vec!["natural|coastline", "natural|land"],
            OsmID::Way(WayID(5)),
        );
        f.classes.insert(c.coastline_area());
        let out = run_layer(Layer::Prepare, f);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].classes.len(), 1);
        assert!(out[0].classes.contains(&c.coastline()));
    }

    #[test]
    fn island_area_gains_land() {
        let c = classif::registry();
        let f = area_feature(vec!["place|island"], OsmID::Way(WayID(6)));
        let out = run_layer(Layer::Prepare, f);
        assert!(out[0].classes.contains(&c.land()));
    }

    #[test]
    fn world_filter() {
        let c = classif::registry();
        let mut classes = BTreeSet::new();
        classes.insert(c.class("place|city"));
        let city = DraftFeature::new(
            FeatureGeometry::Point(LonLat::new(0.0, 0.0)),
            classes,
            OsmID::Node(NodeID(1)),
        );
        let mut classes = BTreeSet::new();
        classes.insert(c.class("place|hamlet"));
        let hamlet = DraftFeature::new(
            FeatureGeometry::Point(LonLat::new(0.0, 0.0)),
            classes,
            OsmID::Node(NodeID(2)),
        );

        let empty = Layer::WorldFilter {
            popular: Arc::new(HashSet::new()),
        };
        assert_eq!(run_layer(empty.clone(), city.clone()).len(), 1);
        assert!(run_layer(empty, hamlet.clone()).is_empty());

        // The popular-places allow-list rescues an otherwise invisible spot.
        let mut popular = HashSet::new();
        popular.insert(OsmID::Node(NodeID(2)));
        let with_list = Layer::WorldFilter {
            popular: Arc::new(popular),
        };
        assert_eq!(run_layer(with_list, hamlet).len(), 1);
    }

    #[test]
    fn coastline_representation_ignores_nodes() {
        let mut classes = BTreeSet::new();
        classes.insert(classif::registry().coastline());
        let node_feature = DraftFeature::new(
            FeatureGeometry::Point(LonLat::new(0.0, 0.0)),
            classes,
            OsmID::Node(NodeID(1)),
        );
        assert!(run_layer(Layer::RepresentationCoastline, node_feature).is_empty());
    }
}

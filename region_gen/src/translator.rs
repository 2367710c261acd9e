//! One translator binds an element filter, the feature maker, side-output
//! collectors, and a layer chain into a per-worker pipeline unit that can be
//! cloned across threads and merged back afterward.

use std::collections::HashSet;
use std::fmt;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;

use crate::affiliation::{Affiliation, SingleRegionAffiliation};
use crate::cache::IntermediateCache;
use crate::classif;
use crate::element::{NodeID, OsmID, RawElement};
use crate::feature::{DraftFeature, GeomKind};
use crate::layers::{AffiliationRouter, Layer, LayerChain, LogBuffer};
use crate::maker::FeatureMaker;
use crate::region_file::RegionFileWriter;
use crate::writer::FeatureBatch;

pub const WORLD_REGION: &str = "World";
pub const COASTS_REGION: &str = "WorldCoasts";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Target {
    Country,
    World,
    Coastline,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Country => write!(f, "country"),
            Target::World => write!(f, "world"),
            Target::Coastline => write!(f, "coastline"),
        }
    }
}

/// Cheap element-level rejection, before any geometry is materialized.
#[derive(Clone)]
enum ElementFilter {
    /// Anything that could become a feature.
    Planet,
    /// Only coastline ways.
    Coastline,
}

impl ElementFilter {
    fn keep_element(&self, elem: &RawElement) -> bool {
        match self {
            ElementFilter::Planet => match elem {
                RawElement::Node { tags, .. } | RawElement::Way { tags, .. } => !tags.is_empty(),
                RawElement::Relation { tags, .. } => {
                    tags.is("type", "multipolygon") || tags.is("type", "boundary")
                }
            },
            ElementFilter::Coastline => {
                matches!(elem, RawElement::Way { .. }) && elem.tags().is("natural", "coastline")
            }
        }
    }

    fn keep_feature(&self, feature: &DraftFeature) -> bool {
        match self {
            ElementFilter::Planet => true,
            ElementFilter::Coastline => {
                feature.classes.contains(&classif::registry().coastline())
            }
        }
    }
}

/// Collects city/town area features into a side file during country
/// translation; the country final pass folds them back in.
pub struct CityAreaCollector {
    path: PathBuf,
    features: Vec<DraftFeature>,
}

impl CityAreaCollector {
    pub fn new(path: PathBuf) -> CityAreaCollector {
        CityAreaCollector {
            path,
            features: Vec::new(),
        }
    }

    fn collect(&mut self, feature: &DraftFeature) {
        if feature.kind() == GeomKind::Area
            && classif::registry().is_city_town_or_village(&feature.classes)
        {
            self.features.push(feature.clone());
        }
    }

    fn clone_unit(&self) -> CityAreaCollector {
        CityAreaCollector::new(self.path.clone())
    }

    fn merge(&mut self, other: CityAreaCollector) {
        self.features.extend(other.features);
    }

    /// Only the merged accumulator writes the file.
    fn finish(&mut self) -> Result<()> {
        let mut writer = RegionFileWriter::create(&self.path)?;
        for f in &self.features {
            writer.write_feature(f)?;
        }
        writer.close()
    }
}

pub struct Translator {
    target: Target,
    filter: ElementFilter,
    maker: FeatureMaker,
    chain: LayerChain,
    city_areas: Option<CityAreaCollector>,
    cache: Arc<dyn IntermediateCache>,
}

impl Translator {
    pub fn country(
        cache: Arc<dyn IntermediateCache>,
        affiliation: Arc<dyn Affiliation>,
        queue: Sender<FeatureBatch>,
        city_areas_path: PathBuf,
        promo_cities_path: Option<&Path>,
    ) -> Result<Translator> {
        let mut layers = vec![Layer::Representation, Layer::Prepare];
        if let Some(path) = promo_cities_path {
            layers.push(Layer::PromoCatalog {
                cities: Arc::new(load_id_list(path).context("loading the promo city list")?),
            });
        }
        Ok(Translator {
            target: Target::Country,
            filter: ElementFilter::Planet,
            maker: FeatureMaker::new(cache.clone()),
            chain: LayerChain::new(layers, AffiliationRouter::new(affiliation, queue)),
            city_areas: Some(CityAreaCollector::new(city_areas_path)),
            cache,
        })
    }

    pub fn world(
        cache: Arc<dyn IntermediateCache>,
        queue: Sender<FeatureBatch>,
        popular_places_path: Option<&Path>,
    ) -> Result<Translator> {
        let popular = match popular_places_path {
            Some(path) => load_id_list(path).context("loading the popular place list")?,
            None => HashSet::new(),
        };
        let layers = vec![
            Layer::Representation,
            Layer::Prepare,
            Layer::WorldFilter {
                popular: Arc::new(popular),
            },
        ];
        let router = AffiliationRouter::new(
            Arc::new(SingleRegionAffiliation::new(WORLD_REGION)),
            queue,
        );
        Ok(Translator {
            target: Target::World,
            filter: ElementFilter::Planet,
            maker: FeatureMaker::new(cache.clone()),
            chain: LayerChain::new(layers, router),
            city_areas: None,
            cache,
        })
    }

    pub fn coastline(
        cache: Arc<dyn IntermediateCache>,
        queue: Sender<FeatureBatch>,
    ) -> Translator {
        let layers = vec![Layer::RepresentationCoastline, Layer::PrepareCoastline];
        let router = AffiliationRouter::new(
            Arc::new(SingleRegionAffiliation::new(COASTS_REGION)),
            queue,
        );
        Translator {
            target: Target::Coastline,
            filter: ElementFilter::Coastline,
            maker: FeatureMaker::new(cache.clone()),
            chain: LayerChain::new(layers, router),
            city_areas: None,
            cache,
        }
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn emit(&mut self, elem: &RawElement) -> Result<()> {
        let mut elem = elem.clone();
        self.preprocess(&mut elem);
        if !self.filter.keep_element(&elem) {
            return Ok(());
        }
        self.maker.add(&elem);
        while let Some(feature) = self.maker.take_next() {
            if !self.filter.keep_feature(&feature) {
                continue;
            }
            if let Some(collector) = &mut self.city_areas {
                collector.collect(&feature);
            }
            self.chain
                .handle(feature)
                .with_context(|| format!("{} translator failed", self.target))?;
        }
        Ok(())
    }

    /// Unnamed ways inherit a name from a boundary or route relation that
    /// references them.
    fn preprocess(&self, elem: &mut RawElement) {
        if self.target != Target::Country {
            return;
        }
        if !matches!(elem, RawElement::Way { .. }) || elem.tags().contains_key("name") {
            return;
        }
        for rel in self.cache.relations_referencing(elem.id()) {
            if let Some(rel_tags) = self.cache.relation_tags(rel) {
                if rel_tags.is_any("type", vec!["boundary", "route"]) {
                    if let Some(name) = rel_tags.get("name") {
                        let name = name.clone();
                        elem.tags_mut().insert("name", name);
                        return;
                    }
                }
            }
        }
    }

    /// Pushes any output still buffered in the router onto the queue. Every
    /// clone must flush before it is merged away, or its residue is lost.
    pub fn flush(&mut self) -> Result<()> {
        self.chain
            .finish()
            .with_context(|| format!("{} translator failed to flush", self.target))
    }

    /// Flushes buffered state and writes the side outputs. A failure here
    /// aborts the whole raw-generation stage.
    pub fn finish(&mut self) -> Result<()> {
        self.flush()?;
        if let Some(collector) = &mut self.city_areas {
            collector
                .finish()
                .with_context(|| format!("{} translator failed to write city areas", self.target))?;
        }
        Ok(())
    }

    pub fn clone_unit(&self) -> Translator {
        Translator {
            target: self.target,
            filter: self.filter.clone(),
            maker: self.maker.clone_unit(),
            chain: self.chain.clone_unit(),
            city_areas: self.city_areas.as_ref().map(|c| c.clone_unit()),
            cache: self.cache.clone(),
        }
    }

    pub fn merge(&mut self, other: Translator) {
        self.maker.merge(other.maker);
        self.chain.merge(other.chain);
        match (&mut self.city_areas, other.city_areas) {
            (Some(mine), Some(theirs)) => mine.merge(theirs),
            _ => {}
        }
    }

    /// Drains this translator's accumulated skip diagnostics.
    pub fn take_log(&mut self) -> LogBuffer {
        let mut log = std::mem::take(&mut self.maker.log);
        log.merge(self.chain.take_log());
        log
    }
}

/// All enabled targets together; every raw element is offered to each.
pub struct Translators(pub Vec<Translator>);

impl Translators {
    pub fn emit(&mut self, elem: &RawElement) -> Result<()> {
        for t in &mut self.0 {
            t.emit(elem)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        for t in &mut self.0 {
            t.flush()?;
        }
        Ok(())
    }

    pub fn finish(&mut self) -> Result<()> {
        for t in &mut self.0 {
            t.finish()?;
        }
        Ok(())
    }

    pub fn clone_unit(&self) -> Translators {
        Translators(self.0.iter().map(|t| t.clone_unit()).collect())
    }

    pub fn merge(&mut self, other: Translators) {
        for (mine, theirs) in self.0.iter_mut().zip(other.0) {
            mine.merge(theirs);
        }
    }

    pub fn take_log(&mut self) -> LogBuffer {
        let mut log = LogBuffer::default();
        for t in &mut self.0 {
            log.merge(t.take_log());
        }
        log
    }
}

/// One numeric OSM node id per line; blank lines and #-comments allowed.
fn load_id_list(path: &Path) -> Result<HashSet<OsmID>> {
    let mut ids = HashSet::new();
    for line in BufReader::new(fs_err::File::open(path)?).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let id: i64 = line
            .parse()
            .with_context(|| format!("bad id {:?} in {}", line, path.display()))?;
        ids.insert(OsmID::Node(NodeID(id)));
    }
    Ok(ids)
}

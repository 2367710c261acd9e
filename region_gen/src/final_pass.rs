//! Whole-dataset correction passes that run after translation completes,
//! ordered by priority. Passes sharing a priority are independent and run
//! concurrently; a tier must fully finish before the next starts.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::info;

use geom::{LonLat, Ring};

use crate::affiliation::{Affiliation, RegionTreeAffiliation};
use crate::classif;
use crate::feature::{DraftFeature, FeatureGeometry};
use crate::maker::glue_chains;
use crate::region_file::{read_region_file, region_file_path, RegionFileWriter};
use crate::translator::{COASTS_REGION, WORLD_REGION};

/// Lower runs first. Coastline stitching has to complete before the
/// per-region rewrites, which share the next tier because they touch
/// disjoint files.
pub const PRIORITY_COASTLINE: usize = 0;
pub const PRIORITY_REGIONS: usize = 1;

pub trait FinalPass: Send {
    fn name(&self) -> &'static str;
    fn priority(&self) -> usize;
    fn process(&mut self) -> Result<()>;
}

/// Runs each priority tier on a bounded worker pool. The first failing pass
/// aborts the remaining tiers; completed tiers' output stays on disk.
pub fn run_final_passes(mut passes: Vec<Box<dyn FinalPass>>, threads: usize) -> Result<()> {
    passes.sort_by_key(|p| p.priority());
    let mut pool = scoped_threadpool::Pool::new(threads.max(1) as u32);

    let mut remaining = passes.into_iter().peekable();
    while let Some(first) = remaining.next() {
        let tier_priority = first.priority();
        let mut tier = vec![first];
        while remaining
            .peek()
            .map(|p| p.priority() == tier_priority)
            .unwrap_or(false)
        {
            tier.push(remaining.next().unwrap());
        }
        info!(
            "Running {} final pass(es) at priority {}",
            tier.len(),
            tier_priority
        );

        let (tx, rx) = mpsc::channel();
        pool.scoped(|scope| {
            for mut pass in tier {
                let tx = tx.clone();
                scope.execute(move || {
                    let name = pass.name();
                    let result = catch_unwind(AssertUnwindSafe(|| pass.process()))
                        .unwrap_or_else(|_| Err(anyhow!("the pass panicked")));
                    // The receiver outlives the scope; ignore send failures
                    // during teardown.
                    let _ = tx.send((name, result));
                });
            }
        });
        drop(tx);

        for (name, result) in rx {
            result.with_context(|| format!("final pass {} failed", name))?;
        }
    }
    Ok(())
}

/// Stitches coastline fragments into closed rings where the endpoints meet,
/// rewriting the coastline-only file in place.
pub struct CoastlineFinalPass {
    tmp_dir: PathBuf,
}

impl CoastlineFinalPass {
    pub fn new(tmp_dir: PathBuf) -> CoastlineFinalPass {
        CoastlineFinalPass { tmp_dir }
    }
}

impl FinalPass for CoastlineFinalPass {
    fn name(&self) -> &'static str {
        "coastline"
    }

    fn priority(&self) -> usize {
        PRIORITY_COASTLINE
    }

    fn process(&mut self) -> Result<()> {
        let path = region_file_path(&self.tmp_dir, COASTS_REGION);
        if !path.exists() {
            // The coastline target saw no coastline at all; nothing to do.
            return Ok(());
        }
        let features = read_region_file(&path)?;

        let mut finished = Vec::new();
        let mut fragments: Vec<Vec<LonLat>> = Vec::new();
        // Fragment provenance dissolves when chains merge; the stitched
        // output carries the first contributing element's id.
        let mut source = None;
        for f in features {
            match f.geometry {
                FeatureGeometry::Line(pts) => {
                    source.get_or_insert(f.source);
                    fragments.push(pts);
                }
                FeatureGeometry::Area { .. } | FeatureGeometry::Point(_) => finished.push(f),
            }
        }
        let fragment_count = fragments.len();

        let coast = classif::registry().coastline();
        let mut classes = std::collections::BTreeSet::new();
        classes.insert(coast);
        for chain in glue_chains(fragments) {
            let source = match source {
                Some(id) => id,
                None => break,
            };
            let geometry = if chain.len() >= 4 && chain[0] == *chain.last().unwrap() {
                match Ring::deduping_new(chain) {
                    Ok(outer) => FeatureGeometry::Area {
                        outer,
                        holes: Vec::new(),
                    },
                    Err(_) => continue,
                }
            } else {
                // An unclosed chain is kept as-is; the planet is allowed to
                // be clipped.
                FeatureGeometry::Line(chain)
            };
            finished.push(DraftFeature::new(geometry, classes.clone(), source));
        }

        let mut writer = RegionFileWriter::create(&path)?;
        for f in &finished {
            writer.write_feature(f)?;
        }
        writer.close()?;
        info!(
            "Stitched {} coastline fragments into {} features",
            fragment_count,
            finished.len()
        );
        Ok(())
    }
}

/// Folds the city-areas side dataset back into every region file whose
/// boundary contains it.
pub struct CountryFinalPass {
    tmp_dir: PathBuf,
    city_areas: PathBuf,
    affiliation: Arc<RegionTreeAffiliation>,
    threads: usize,
}

impl CountryFinalPass {
    pub fn new(
        tmp_dir: PathBuf,
        city_areas: PathBuf,
        affiliation: Arc<RegionTreeAffiliation>,
        threads: usize,
    ) -> CountryFinalPass {
        CountryFinalPass {
            tmp_dir,
            city_areas,
            affiliation,
            threads,
        }
    }
}

impl FinalPass for CountryFinalPass {
    fn name(&self) -> &'static str {
        "country"
    }

    fn priority(&self) -> usize {
        PRIORITY_REGIONS
    }

    fn process(&mut self) -> Result<()> {
        if !self.city_areas.exists() {
            return Ok(());
        }
        let cities = read_region_file(&self.city_areas)?;
        if cities.is_empty() {
            return Ok(());
        }

        // Re-resolve affiliation per city, in parallel; the spatial index is
        // immutable and shared.
        let mut pool = scoped_threadpool::Pool::new(self.threads.max(1) as u32);
        let affiliation = &self.affiliation;
        let affiliations: Vec<Vec<String>> = pool.scoped(|scope| {
            let (tx, rx) = mpsc::channel();
            for (idx, city) in cities.iter().enumerate() {
                let tx = tx.clone();
                scope.execute(move || {
                    tx.send((idx, affiliation.resolve(city))).unwrap();
                });
            }
            drop(tx);
            let mut results = vec![Vec::new(); cities.len()];
            for (idx, regions) in rx {
                results[idx] = regions;
            }
            results
        });

        let mut per_region: std::collections::BTreeMap<String, Vec<&DraftFeature>> =
            std::collections::BTreeMap::new();
        for (city, regions) in cities.iter().zip(affiliations) {
            for region in regions {
                per_region.entry(region).or_default().push(city);
            }
        }

        for (region, mut features) in per_region {
            // No cross-feature ordering exists in region files; the batch
            // gets an explicit sort before appending.
            features.sort_by_key(|f| f.source);
            let mut writer =
                RegionFileWriter::append(&region_file_path(&self.tmp_dir, &region))?;
            for f in features {
                writer.write_feature(f)?;
            }
            writer.close()?;
        }
        Ok(())
    }
}

/// Rewrites the world-wide file, dropping anything below world prominence
/// that slipped through translation.
pub struct WorldFinalPass {
    tmp_dir: PathBuf,
}

impl WorldFinalPass {
    pub fn new(tmp_dir: PathBuf) -> WorldFinalPass {
        WorldFinalPass { tmp_dir }
    }
}

impl FinalPass for WorldFinalPass {
    fn name(&self) -> &'static str {
        "world"
    }

    fn priority(&self) -> usize {
        PRIORITY_REGIONS
    }

    fn process(&mut self) -> Result<()> {
        let path = region_file_path(&self.tmp_dir, WORLD_REGION);
        if !path.exists() {
            return Ok(());
        }
        let c = classif::registry();
        let features = read_region_file(&path)?;
        let total = features.len();
        let keep: Vec<DraftFeature> = features
            .into_iter()
            .filter(|f| f.classes.iter().any(|cl| c.world_visible(*cl)))
            .collect();

        let mut writer = RegionFileWriter::create(&path)?;
        for f in &keep {
            writer.write_feature(f)?;
        }
        writer.close()?;
        info!("World file: kept {} of {} features", keep.len(), total);
        Ok(())
    }
}

//! Batch compiler from raw OSM elements to per-region feature files. The
//! pipeline runs in two stages: parallel translation (elements to routed
//! draft features, demultiplexed into region files by one writer thread),
//! then prioritized whole-dataset final passes over those files.

#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

use std::mem;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};

pub mod affiliation;
pub mod borders;
pub mod cache;
pub mod classif;
pub mod element;
pub mod feature;
pub mod final_pass;
pub mod layers;
pub mod maker;
pub mod pool;
pub mod reader;
pub mod region_file;
pub mod translator;
pub mod writer;

use crate::affiliation::RegionTreeAffiliation;
use crate::cache::IntermediateCache;
use crate::element::RawElement;
use crate::final_pass::{
    run_final_passes, CoastlineFinalPass, CountryFinalPass, FinalPass, WorldFinalPass,
};
use crate::pool::TranslatorsPool;
use crate::translator::{Translator, Translators};
use crate::writer::{feature_queue, FeatureBatch, RawGeneratorWriter};

/// Everything the generation run needs to know up front.
pub struct GenerateInfo {
    /// Region files and side datasets land here.
    pub tmp_dir: PathBuf,
    /// Directory of osmosis .poly region boundaries.
    pub borders_dir: PathBuf,
    pub promo_cities_path: Option<PathBuf>,
    pub popular_places_path: Option<PathBuf>,
    pub threads: usize,
    /// Raw elements per dispatched batch.
    pub chunk_size: usize,
    /// When the border set tiles the planet, a single boundary-box candidate
    /// needs no exact polygon test.
    pub have_borders_for_whole_world: bool,
}

impl GenerateInfo {
    pub fn new(tmp_dir: PathBuf, borders_dir: PathBuf) -> GenerateInfo {
        GenerateInfo {
            tmp_dir,
            borders_dir,
            promo_cities_path: None,
            popular_places_path: None,
            threads: num_cpus::get(),
            chunk_size: 1024,
            have_borders_for_whole_world: false,
        }
    }

    pub fn city_areas_path(&self) -> PathBuf {
        self.tmp_dir.join("city_areas.tmp")
    }
}

/// Assembles the enabled targets, then runs the whole pipeline over one pass
/// of the raw elements.
pub struct RawGenerator {
    info: GenerateInfo,
    cache: Arc<dyn IntermediateCache>,
    queue_tx: Option<Sender<FeatureBatch>>,
    queue_rx: Option<Receiver<FeatureBatch>>,
    translators: Vec<Translator>,
    final_passes: Vec<Box<dyn FinalPass>>,
}

impl RawGenerator {
    pub fn new(info: GenerateInfo, cache: Arc<dyn IntermediateCache>) -> RawGenerator {
        let (tx, rx) = feature_queue();
        RawGenerator {
            info,
            cache,
            queue_tx: Some(tx),
            queue_rx: Some(rx),
            translators: Vec::new(),
            final_passes: Vec::new(),
        }
    }

    fn queue_sender(&self) -> Sender<FeatureBatch> {
        self.queue_tx.as_ref().unwrap().clone()
    }

    /// Per-region output driven by the .poly borders, plus the city-areas
    /// side dataset and its fold-back final pass.
    pub fn generate_countries(&mut self) -> Result<()> {
        let regions = borders::load_regions(&self.info.borders_dir)?;
        let affiliation = Arc::new(RegionTreeAffiliation::new(
            regions,
            self.info.have_borders_for_whole_world,
        ));
        self.translators.push(Translator::country(
            self.cache.clone(),
            affiliation.clone(),
            self.queue_sender(),
            self.info.city_areas_path(),
            self.info.promo_cities_path.as_deref(),
        )?);
        self.final_passes.push(Box::new(CountryFinalPass::new(
            self.info.tmp_dir.clone(),
            self.info.city_areas_path(),
            affiliation,
            self.info.threads,
        )));
        Ok(())
    }

    pub fn generate_world(&mut self) -> Result<()> {
        self.translators.push(Translator::world(
            self.cache.clone(),
            self.queue_sender(),
            self.info.popular_places_path.as_deref(),
        )?);
        self.final_passes
            .push(Box::new(WorldFinalPass::new(self.info.tmp_dir.clone())));
        Ok(())
    }

    pub fn generate_coasts(&mut self) {
        self.translators
            .push(Translator::coastline(self.cache.clone(), self.queue_sender()));
        self.final_passes.push(Box::new(CoastlineFinalPass::new(
            self.info.tmp_dir.clone(),
        )));
    }

    /// One pass over the raw elements. Translation runs on a worker pool
    /// feeding the single writer thread; the final passes only start after
    /// every translator flushed and the writer drained.
    pub fn execute(mut self, elements: impl IntoIterator<Item = RawElement>) -> Result<()> {
        if self.translators.is_empty() {
            bail!("no targets enabled; nothing to generate");
        }
        fs_err::create_dir_all(&self.info.tmp_dir)?;

        let writer = RawGeneratorWriter::run(self.queue_rx.take().unwrap(), &self.info.tmp_dir);
        let pool = TranslatorsPool::new(
            Translators(mem::take(&mut self.translators)),
            self.info.threads,
        );

        let translated = Self::translate(pool, elements, self.info.chunk_size);
        // Both sender sides have to go away before the writer will drain.
        drop(self.queue_tx.take());
        match translated {
            Ok(mut merged) => {
                let log = merged.take_log();
                // The merged translators still hold queue senders; they have
                // to go before the writer will see a closed channel.
                drop(merged);
                let names = writer.shutdown_and_join()?;
                info!("Translation produced {} region files", names.len());

                let log_path = self.info.tmp_dir.join("skipped_elements.txt");
                log.dump(&log_path)
                    .context("writing the skipped-element log")?;
                info!(
                    "{} skipped elements logged to {}",
                    log.lines().len(),
                    log_path.display()
                );

                run_final_passes(self.final_passes, self.info.threads)
            }
            Err(err) => {
                // Let the writer drain whatever made it onto the queue, but
                // the translation error is the one to report.
                let _ = writer.shutdown_and_join();
                Err(err).context("the translation stage failed")
            }
        }
    }

    fn translate(
        pool: TranslatorsPool,
        elements: impl IntoIterator<Item = RawElement>,
        chunk_size: usize,
    ) -> Result<Translators> {
        let chunk_size = chunk_size.max(1);
        let mut batch = Vec::with_capacity(chunk_size);
        let mut total = 0;
        for elem in elements {
            batch.push(elem);
            total += 1;
            if batch.len() == chunk_size {
                pool.emit(mem::replace(&mut batch, Vec::with_capacity(chunk_size)))?;
            }
        }
        if !batch.is_empty() {
            pool.emit(batch)?;
        }
        info!("Dispatched {} raw elements", total);
        pool.finish()
    }
}

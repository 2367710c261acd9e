//! The output queue and the single writer thread that demultiplexes feature
//! batches into per-region files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use log::info;

use crate::region_file::{region_file_path, RegionFileWriter};

/// Serialized feature bytes plus the regions that get a verbatim copy.
pub struct OutputItem {
    pub bytes: Vec<u8>,
    pub regions: Vec<String>,
}

pub type FeatureBatch = Vec<OutputItem>;

/// Bounded so a slow disk backpressures the translation workers.
const QUEUE_CAPACITY: usize = 128;

pub fn feature_queue() -> (Sender<FeatureBatch>, Receiver<FeatureBatch>) {
    bounded(QUEUE_CAPACITY)
}

/// Owns every region-file handle for the duration of the translation phase;
/// workers never touch files directly.
pub struct RawGeneratorWriter {
    handle: thread::JoinHandle<Result<Vec<String>>>,
}

impl RawGeneratorWriter {
    pub fn run(rx: Receiver<FeatureBatch>, dir: &Path) -> RawGeneratorWriter {
        let dir = dir.to_path_buf();
        let handle = thread::Builder::new()
            .name("region-writer".to_string())
            .spawn(move || write_loop(rx, dir))
            .expect("spawning the writer thread");
        RawGeneratorWriter { handle }
    }

    /// Every producer must have dropped its sender first; the closed channel
    /// is the shutdown signal. Returns the sorted names of regions that
    /// received at least one feature.
    pub fn shutdown_and_join(self) -> Result<Vec<String>> {
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow!("the writer thread panicked")),
        }
    }
}

fn write_loop(rx: Receiver<FeatureBatch>, dir: PathBuf) -> Result<Vec<String>> {
    let mut files: HashMap<String, RegionFileWriter> = HashMap::new();
    for batch in rx {
        for item in batch {
            for region in &item.regions {
                if !files.contains_key(region) {
                    files.insert(
                        region.clone(),
                        RegionFileWriter::create(&region_file_path(&dir, region))?,
                    );
                }
                files.get_mut(region).unwrap().write_bytes(&item.bytes)?;
            }
        }
    }

    let mut names: Vec<String> = files.keys().cloned().collect();
    names.sort();
    for (_, file) in files {
        file.close()?;
    }
    info!("Writer flushed {} region files", names.len());
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classif;
    use crate::element::{NodeID, OsmID};
    use crate::feature::{DraftFeature, FeatureGeometry};
    use crate::region_file::read_region_file;
    use geom::LonLat;
    use std::collections::BTreeSet;

    #[test]
    fn demultiplexes_and_drains() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = feature_queue();
        let writer = RawGeneratorWriter::run(rx, dir.path());

        let mut classes = BTreeSet::new();
        classes.insert(classif::registry().class("place|town"));
        let f = DraftFeature::new(
            FeatureGeometry::Point(LonLat::new(0.5, 0.5)),
            classes,
            OsmID::Node(NodeID(7)),
        );
        let bytes = f.to_bytes().unwrap();

        tx.send(vec![
            OutputItem {
                bytes: bytes.clone(),
                regions: vec!["A".to_string(), "B".to_string()],
            },
            OutputItem {
                bytes: bytes.clone(),
                regions: vec!["A".to_string()],
            },
        ])
        .unwrap();
        drop(tx);

        let names = writer.shutdown_and_join().unwrap();
        assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(
            read_region_file(&region_file_path(dir.path(), "A"))
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            read_region_file(&region_file_path(dir.path(), "B"))
                .unwrap()
                .len(),
            1
        );
    }
}

//! Region files: an append-only sequence of length-prefixed serialized draft
//! features. The layout is an internal contract with the downstream indexing
//! stack; only set/multiset membership per file is promised.

use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::feature::DraftFeature;

/// Files get a .tmp suffix: they're intermediate input for the final passes
/// and the downstream indexer, not a finished product.
pub fn region_file_path(dir: &Path, region: &str) -> PathBuf {
    dir.join(format!("{}.tmp", region))
}

pub struct RegionFileWriter {
    writer: BufWriter<fs_err::File>,
    path: PathBuf,
}

impl RegionFileWriter {
    pub fn create(path: &Path) -> Result<RegionFileWriter> {
        Ok(RegionFileWriter {
            writer: BufWriter::new(fs_err::File::create(path)?),
            path: path.to_path_buf(),
        })
    }

    pub fn append(path: &Path) -> Result<RegionFileWriter> {
        let file = fs_err::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(RegionFileWriter {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_u32::<LittleEndian>(bytes.len() as u32)?;
        self.writer.write_all(bytes)?;
        Ok(())
    }

    pub fn write_feature(&mut self, feature: &DraftFeature) -> Result<()> {
        self.write_bytes(&feature.to_bytes()?)
    }

    pub fn close(mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("flushing {}", self.path.display()))
    }
}

/// Reads a whole region file back. A short read partway through a record
/// means the file is truncated, which is an error, not EOF.
pub fn read_region_file(path: &Path) -> Result<Vec<DraftFeature>> {
    let mut reader = BufReader::new(
        fs_err::File::open(path).with_context(|| format!("opening {}", path.display()))?,
    );
    let mut features = Vec::new();
    loop {
        let len = match reader.read_u32::<LittleEndian>() {
            Ok(len) => len,
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err.into()),
        };
        let mut buf = vec![0; len as usize];
        reader
            .read_exact(&mut buf)
            .with_context(|| format!("truncated record in {}", path.display()))?;
        features.push(DraftFeature::from_bytes(&buf)?);
    }
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classif;
    use crate::element::{NodeID, OsmID};
    use crate::feature::FeatureGeometry;
    use geom::LonLat;
    use std::collections::BTreeSet;

    fn feature(id: i64) -> DraftFeature {
        let mut classes = BTreeSet::new();
        classes.insert(classif::registry().class("place|village"));
        DraftFeature::new(
            FeatureGeometry::Point(LonLat::new(id as f64, 0.0)),
            classes,
            OsmID::Node(NodeID(id)),
        )
    }

    #[test]
    fn write_append_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = region_file_path(dir.path(), "Ruritania");

        let mut w = RegionFileWriter::create(&path).unwrap();
        w.write_feature(&feature(1)).unwrap();
        w.write_feature(&feature(2)).unwrap();
        w.close().unwrap();

        let mut w = RegionFileWriter::append(&path).unwrap();
        w.write_feature(&feature(3)).unwrap();
        w.close().unwrap();

        let features = read_region_file(&path).unwrap();
        assert_eq!(features.len(), 3);
        assert_eq!(features[2], feature(3));
    }

    #[test]
    fn truncated_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = region_file_path(dir.path(), "Torn");
        let mut w = RegionFileWriter::create(&path).unwrap();
        w.write_feature(&feature(1)).unwrap();
        w.close().unwrap();

        let bytes = fs_err::read(&path).unwrap();
        fs_err::write(&path, &bytes[..bytes.len() - 2]).unwrap();
        assert!(read_region_file(&path).is_err());
    }
}

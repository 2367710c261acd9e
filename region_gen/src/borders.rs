//! Loads the region boundary set: a directory of osmosis .poly files, one
//! per region, loaded once at startup.

use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use log::info;

use geom::{LonLat, Polygon, Ring};

use crate::affiliation::Region;

/// Reads every `.poly` file in the directory. An unreadable directory or a
/// malformed file is a configuration error, detected before any worker
/// starts.
pub fn load_regions(dir: &Path) -> Result<Vec<Region>> {
    let mut regions = Vec::new();
    for entry in fs_err::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("poly") {
            continue;
        }
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow!("bad border filename {}", path.display()))?
            .to_string();
        let polygons = read_poly_file(&path)
            .with_context(|| format!("loading border file {}", path.display()))?;
        regions.push(Region { name, polygons });
    }
    if regions.is_empty() {
        bail!("no .poly border files in {}", dir.display());
    }
    regions.sort_by(|a, b| a.name.cmp(&b.name));
    info!("Loaded {} region boundaries from {}", regions.len(), dir.display());
    Ok(regions)
}

/// The osmosis polygon filter format: a name line, then sections of
/// whitespace-separated "lon lat" lines each closed by END, with a final END.
/// Sections whose header starts with '!' are holes in the preceding outer.
fn read_poly_file(path: &Path) -> Result<Vec<Polygon>> {
    let mut outers: Vec<Ring> = Vec::new();
    let mut holes_per_outer: Vec<Vec<Ring>> = Vec::new();

    let mut lines = BufReader::new(fs_err::File::open(path)?).lines();
    // The first line repeats the region name; nothing uses it.
    lines.next().transpose()?;

    loop {
        let header = match lines.next().transpose()? {
            Some(line) => line,
            None => break,
        };
        let header = header.trim().to_string();
        if header.is_empty() {
            continue;
        }
        if header == "END" {
            break;
        }
        let is_hole = header.starts_with('!');

        let mut pts = Vec::new();
        loop {
            let line = lines
                .next()
                .transpose()?
                .ok_or_else(|| anyhow!("unterminated section"))?;
            let line = line.trim().to_string();
            if line == "END" {
                break;
            }
            let mut parts = line.split_whitespace();
            let lon: f64 = parts
                .next()
                .ok_or_else(|| anyhow!("missing longitude"))?
                .parse()?;
            let lat: f64 = parts
                .next()
                .ok_or_else(|| anyhow!("missing latitude"))?
                .parse()?;
            pts.push(LonLat::new(lon, lat));
        }
        let ring = Ring::deduping_new(pts)?;

        if is_hole {
            match holes_per_outer.last_mut() {
                Some(holes) => holes.push(ring),
                None => bail!("hole section before any outer section"),
            }
        } else {
            outers.push(ring);
            holes_per_outer.push(Vec::new());
        }
    }

    if outers.is_empty() {
        bail!("no polygon sections");
    }
    Ok(outers
        .into_iter()
        .zip(holes_per_outer)
        .map(|(outer, holes)| Polygon::with_holes(outer, holes))
        .collect())
}

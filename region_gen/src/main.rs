use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use structopt::StructOpt;

use region_gen::cache::MemoryCache;
use region_gen::{classif, reader, GenerateInfo, RawGenerator};

#[derive(StructOpt, Debug)]
#[structopt(name = "region_gen")]
struct Flags {
    /// OSM XML file to read
    #[structopt(long = "osm")]
    osm: PathBuf,

    /// Directory of osmosis .poly files, one per output region
    #[structopt(long = "borders")]
    borders: PathBuf,

    /// Directory where the per-region files land
    #[structopt(long = "output")]
    output: PathBuf,

    /// Also produce the World overview file
    #[structopt(long = "world")]
    world: bool,

    /// Also produce the WorldCoasts file
    #[structopt(long = "coasts")]
    coasts: bool,

    /// File of node ids allowed to carry the promo catalog class
    #[structopt(long = "promo_cities")]
    promo_cities: Option<PathBuf>,

    /// File of node ids kept in the World file regardless of prominence
    #[structopt(long = "popular_places")]
    popular_places: Option<PathBuf>,

    /// The .poly set covers the whole planet, enabling a faster
    /// single-candidate region lookup
    #[structopt(long = "whole_world_borders")]
    whole_world_borders: bool,

    /// Translation worker threads; defaults to the number of cores
    #[structopt(long = "threads")]
    threads: Option<usize>,

    /// Raw elements per dispatched batch
    #[structopt(long = "chunk_size", default_value = "1024")]
    chunk_size: usize,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let flags = Flags::from_args();
    classif::init();

    let mut info = GenerateInfo::new(flags.output, flags.borders);
    info.promo_cities_path = flags.promo_cities;
    info.popular_places_path = flags.popular_places;
    info.have_borders_for_whole_world = flags.whole_world_borders;
    info.chunk_size = flags.chunk_size;
    if let Some(threads) = flags.threads {
        info.threads = threads;
    }

    let elements = reader::read_osm(&flags.osm)?;
    let cache = Arc::new(MemoryCache::build(&elements));

    let mut generator = RawGenerator::new(info, cache);
    generator.generate_countries()?;
    if flags.world {
        generator.generate_world()?;
    }
    if flags.coasts {
        generator.generate_coasts();
    }
    generator.execute(elements)
}

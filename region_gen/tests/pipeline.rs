//! Runs the whole pipeline over a tiny synthetic planet: two unit-square
//! regions side by side, a road straddling the shared border, a town, a
//! village area, and a square island coastline off to the side.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use region_gen::cache::MemoryCache;
use region_gen::feature::{DraftFeature, GeomKind};
use region_gen::reader::parse_osm;
use region_gen::region_file::{read_region_file, region_file_path};
use region_gen::translator::{COASTS_REGION, WORLD_REGION};
use region_gen::{classif, GenerateInfo, RawGenerator};

fn write_borders(dir: &Path) {
    let mut f = fs_err::File::create(dir.join("A.poly")).unwrap();
    writeln!(
        f,
        "A\n1\n  0.0  0.0\n  1.0  0.0\n  1.0  1.0\n  0.0  1.0\n  0.0  0.0\nEND\nEND"
    )
    .unwrap();
    let mut f = fs_err::File::create(dir.join("B.poly")).unwrap();
    writeln!(
        f,
        "B\n1\n  1.0  0.0\n  2.0  0.0\n  2.0  1.0\n  1.0  1.0\n  1.0  0.0\nEND\nEND"
    )
    .unwrap();
}

const PLANET: &str = r#"<osm>
    <node id="1" lon="0.25" lat="0.25"><tag k="place" v="town"/><tag k="name" v="Townton"/></node>
    <node id="2" lon="0.5" lat="0.5"/>
    <node id="3" lon="1.5" lat="0.5"/>
    <way id="10"><nd ref="2"/><nd ref="3"/><tag k="highway" v="residential"/><tag k="name" v="Border Road"/></way>

    <node id="4" lon="0.1" lat="0.6"/>
    <node id="5" lon="0.4" lat="0.6"/>
    <node id="6" lon="0.4" lat="0.9"/>
    <node id="7" lon="0.1" lat="0.9"/>
    <way id="11">
        <nd ref="4"/><nd ref="5"/><nd ref="6"/><nd ref="7"/><nd ref="4"/>
        <tag k="place" v="village"/><tag k="landuse" v="grass"/><tag k="name" v="Greenham"/>
    </way>

    <node id="20" lon="10.0" lat="10.0"/>
    <node id="21" lon="11.0" lat="10.0"/>
    <node id="22" lon="11.0" lat="11.0"/>
    <node id="23" lon="10.0" lat="11.0"/>
    <way id="30"><nd ref="20"/><nd ref="21"/><nd ref="22"/><tag k="natural" v="coastline"/></way>
    <way id="31"><nd ref="22"/><nd ref="23"/><nd ref="20"/><tag k="natural" v="coastline"/></way>
</osm>"#;

fn run(tmp: &Path) {
    classif::init();
    let borders = tmp.join("borders");
    fs_err::create_dir_all(&borders).unwrap();
    write_borders(&borders);

    let elements = parse_osm(PLANET).unwrap();
    let cache = Arc::new(MemoryCache::build(&elements));

    let mut info = GenerateInfo::new(tmp.join("out"), borders);
    info.threads = 2;
    info.chunk_size = 3;
    let mut generator = RawGenerator::new(info, cache);
    generator.generate_countries().unwrap();
    generator.generate_world().unwrap();
    generator.generate_coasts();
    generator.execute(elements).unwrap();
}

fn features(tmp: &Path, region: &str) -> Vec<DraftFeature> {
    read_region_file(&region_file_path(&tmp.join("out"), region)).unwrap()
}

#[test]
fn straddling_road_lands_in_both_regions_exactly_once() {
    let tmp = tempfile::tempdir().unwrap();
    run(tmp.path());

    let a = features(tmp.path(), "A");
    let b = features(tmp.path(), "B");

    let a_lines: Vec<&DraftFeature> = a.iter().filter(|f| f.kind() == GeomKind::Line).collect();
    assert_eq!(a_lines.len(), 1);
    let b_lines: Vec<&DraftFeature> = b.iter().filter(|f| f.kind() == GeomKind::Line).collect();
    assert_eq!(b_lines.len(), 1);
    // Verbatim copies, not re-derived geometry.
    assert_eq!(a_lines[0], b_lines[0]);
    assert_eq!(a_lines[0].names.get("default").unwrap(), "Border Road");

    // B only overlaps the road; everything else is in A.
    assert_eq!(b.len(), 1);
}

#[test]
fn town_point_stays_out_of_the_wrong_region() {
    let tmp = tempfile::tempdir().unwrap();
    run(tmp.path());

    let a = features(tmp.path(), "A");
    let towns: Vec<&DraftFeature> = a
        .iter()
        .filter(|f| f.names.get("default").map(|n| n.as_str()) == Some("Townton"))
        .collect();
    assert_eq!(towns.len(), 1);
    assert_eq!(towns[0].kind(), GeomKind::Point);

    assert!(features(tmp.path(), "B")
        .iter()
        .all(|f| f.names.get("default").map(|n| n.as_str()) != Some("Townton")));
}

#[test]
fn city_area_is_folded_back_into_its_region() {
    let tmp = tempfile::tempdir().unwrap();
    run(tmp.path());

    let a = features(tmp.path(), "A");
    let c = classif::registry();
    // The rendered area (village class stripped, grass kept) plus the
    // appended raw city area both land in A.
    let village_copies: Vec<&DraftFeature> = a
        .iter()
        .filter(|f| f.classes.contains(&c.class("place|village")))
        .collect();
    assert_eq!(village_copies.len(), 1);
    assert_eq!(village_copies[0].kind(), GeomKind::Area);
    assert!(a
        .iter()
        .any(|f| f.classes.contains(&c.class("landuse|grass"))
            && !f.classes.contains(&c.class("place|village"))));
}

#[test]
fn world_keeps_only_prominent_features() {
    let tmp = tempfile::tempdir().unwrap();
    run(tmp.path());

    let world = features(tmp.path(), WORLD_REGION);
    assert_eq!(world.len(), 1);
    assert_eq!(world[0].names.get("default").unwrap(), "Townton");
}

#[test]
fn coastline_fragments_come_out_stitched() {
    let tmp = tempfile::tempdir().unwrap();
    run(tmp.path());

    let coasts = features(tmp.path(), COASTS_REGION);
    assert_eq!(coasts.len(), 1);
    assert_eq!(coasts[0].kind(), GeomKind::Area);
    let c = classif::registry();
    assert!(coasts[0].classes.contains(&c.coastline()));
}

#[test]
fn skipped_elements_log_is_written() {
    let tmp = tempfile::tempdir().unwrap();
    run(tmp.path());
    assert!(tmp.path().join("out").join("skipped_elements.txt").exists());
}

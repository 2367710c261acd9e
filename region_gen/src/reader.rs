//! Reads an .osm XML file into raw elements, in document order.
//!
//! Per https://wiki.openstreetmap.org/wiki/OSM_XML#Certainties_and_Uncertainties, elements
//! come ordered as nodes, ways, then relations. References to missing objects
//! are kept as-is; the translation stage logs and skips them.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::info;

use crate::element::{NodeID, OsmID, RawElement, RelationID, Tags, WayID};

pub fn read_osm(path: &Path) -> Result<Vec<RawElement>> {
    let raw_string = fs_err::read_to_string(path)?;
    let elements =
        parse_osm(&raw_string).with_context(|| format!("parsing {}", path.display()))?;
    info!("Read {} raw elements from {}", elements.len(), path.display());
    Ok(elements)
}

pub fn parse_osm(raw_string: &str) -> Result<Vec<RawElement>> {
    let tree = roxmltree::Document::parse(raw_string)?;

    let mut elements = Vec::new();
    let mut seen = HashSet::new();
    for obj in tree.descendants() {
        if !obj.is_element() {
            continue;
        }
        match obj.tag_name().name() {
            "node" => {
                let id = NodeID(attribute(obj, "id")?.parse::<i64>()?);
                if !seen.insert(OsmID::Node(id)) {
                    bail!("Duplicate {}, your .osm is corrupt", id);
                }
                elements.push(RawElement::Node {
                    id,
                    lon: attribute(obj, "lon")?.parse::<f64>()?,
                    lat: attribute(obj, "lat")?.parse::<f64>()?,
                    tags: read_tags(obj),
                });
            }
            "way" => {
                let id = WayID(attribute(obj, "id")?.parse::<i64>()?);
                if !seen.insert(OsmID::Way(id)) {
                    bail!("Duplicate {}, your .osm is corrupt", id);
                }
                let mut nodes = Vec::new();
                for child in obj.children() {
                    if child.tag_name().name() == "nd" {
                        nodes.push(NodeID(attribute(child, "ref")?.parse::<i64>()?));
                    }
                }
                if !nodes.is_empty() {
                    elements.push(RawElement::Way {
                        id,
                        nodes,
                        tags: read_tags(obj),
                    });
                }
            }
            "relation" => {
                let id = RelationID(attribute(obj, "id")?.parse::<i64>()?);
                if !seen.insert(OsmID::Relation(id)) {
                    bail!("Duplicate {}, your .osm is corrupt", id);
                }
                let mut members = Vec::new();
                for child in obj.children() {
                    if child.tag_name().name() == "member" {
                        let reference = attribute(child, "ref")?.parse::<i64>()?;
                        let member = match attribute(child, "type")? {
                            "node" => OsmID::Node(NodeID(reference)),
                            "way" => OsmID::Way(WayID(reference)),
                            "relation" => OsmID::Relation(RelationID(reference)),
                            _ => continue,
                        };
                        members.push((member, attribute(child, "role")?.to_string()));
                    }
                }
                elements.push(RawElement::Relation {
                    id,
                    members,
                    tags: read_tags(obj),
                });
            }
            _ => {}
        }
    }
    Ok(elements)
}

fn attribute<'a>(obj: roxmltree::Node<'a, '_>, name: &str) -> Result<&'a str> {
    obj.attribute(name)
        .with_context(|| format!("<{}> is missing the {} attribute", obj.tag_name().name(), name))
}

fn read_tags(obj: roxmltree::Node) -> Tags {
    let mut tags = Tags::new(BTreeMap::new());
    for child in obj.children() {
        if child.tag_name().name() == "tag" {
            if let (Some(key), Some(value)) = (child.attribute("k"), child.attribute("v")) {
                // Filter out really useless data
                if key.starts_with("tiger:") || key.starts_with("old_name:") {
                    continue;
                }
                tags.insert(key, value);
            }
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_three_element_kinds() {
        let xml = r#"<osm>
            <node id="1" lon="0.5" lat="0.5"><tag k="place" v="town"/><tag k="name" v="Exampleton"/></node>
            <node id="2" lon="0.6" lat="0.5"/>
            <way id="10"><nd ref="1"/><nd ref="2"/><tag k="highway" v="residential"/></way>
            <relation id="20">
                <member type="way" ref="10" role="outer"/>
                <tag k="type" v="multipolygon"/>
            </relation>
        </osm>"#;
        let elements = parse_osm(xml).unwrap();
        assert_eq!(elements.len(), 4);
        match &elements[0] {
            RawElement::Node { id, tags, .. } => {
                assert_eq!(*id, NodeID(1));
                assert_eq!(tags.get("name").unwrap(), "Exampleton");
            }
            _ => panic!("expected a node first"),
        }
        match &elements[3] {
            RawElement::Relation { members, tags, .. } => {
                assert_eq!(members, &vec![(OsmID::Way(WayID(10)), "outer".to_string())]);
                assert!(tags.is("type", "multipolygon"));
            }
            _ => panic!("expected a relation last"),
        }
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let xml = r#"<osm>
            <node id="1" lon="0.0" lat="0.0"/>
            <node id="1" lon="1.0" lat="1.0"/>
        </osm>"#;
        assert!(parse_osm(xml).is_err());
    }

    #[test]
    fn empty_ways_are_dropped() {
        let xml = r#"<osm><way id="10"><tag k="highway" v="residential"/></way></osm>"#;
        assert!(parse_osm(xml).unwrap().is_empty());
    }
}

//! The intermediate node/way/relation cache. The real deployment backs this
//! with an on-disk store; the pipeline only depends on the lookup contract.
//! Lookups that miss mean "unresolvable, drop with a diagnostic", never a
//! fatal error.

use std::collections::HashMap;

use geom::LonLat;

use crate::element::{NodeID, OsmID, RawElement, RelationID, Tags, WayID};

pub trait IntermediateCache: Send + Sync {
    fn node(&self, id: NodeID) -> Option<LonLat>;
    fn way_nodes(&self, id: WayID) -> Option<&Vec<NodeID>>;
    fn relation_tags(&self, id: RelationID) -> Option<&Tags>;
    /// Relations that directly reference the given element as a member.
    fn relations_referencing(&self, id: OsmID) -> Vec<RelationID>;
}

/// Everything held in memory, built from one scan over the element stream.
#[derive(Default)]
pub struct MemoryCache {
    nodes: HashMap<NodeID, LonLat>,
    ways: HashMap<WayID, Vec<NodeID>>,
    relation_tags: HashMap<RelationID, Tags>,
    member_to_relations: HashMap<OsmID, Vec<RelationID>>,
}

impl MemoryCache {
    pub fn build(elements: &[RawElement]) -> MemoryCache {
        let mut cache = MemoryCache::default();
        for elem in elements {
            match elem {
                RawElement::Node { id, lon, lat, .. } => {
                    cache.nodes.insert(*id, LonLat::new(*lon, *lat));
                }
                RawElement::Way { id, nodes, .. } => {
                    cache.ways.insert(*id, nodes.clone());
                }
                RawElement::Relation { id, members, tags } => {
                    cache.relation_tags.insert(*id, tags.clone());
                    for (member, _) in members {
                        cache
                            .member_to_relations
                            .entry(*member)
                            .or_insert_with(Vec::new)
                            .push(*id);
                    }
                }
            }
        }
        cache
    }
}

impl IntermediateCache for MemoryCache {
    fn node(&self, id: NodeID) -> Option<LonLat> {
        self.nodes.get(&id).copied()
    }

    fn way_nodes(&self, id: WayID) -> Option<&Vec<NodeID>> {
        self.ways.get(&id)
    }

    fn relation_tags(&self, id: RelationID) -> Option<&Tags> {
        self.relation_tags.get(&id)
    }

    fn relations_referencing(&self, id: OsmID) -> Vec<RelationID> {
        self.member_to_relations
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }
}

//! The classification registry: every renderable/searchable kind of object
//! gets a `Class`, with rules about which geometry kinds it makes sense for
//! and whether it's prominent enough for the world-wide output.
//!
//! Loaded once at startup into process-wide read-only state; safe to share
//! across worker threads without synchronization.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::element::Tags;
use crate::feature::GeomKind;

/// An interned index into the classification registry.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Class(u16);

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", registry().path(*self))
    }
}

struct ClassDef {
    path: &'static str,
    point: bool,
    line: bool,
    area: bool,
    /// Prominent enough to keep in the world-wide output.
    world: bool,
}

pub struct Classificator {
    defs: Vec<ClassDef>,
    by_path: HashMap<&'static str, Class>,
}

// (path, point, line, area, world)
#[rustfmt::skip]
const RULES: &[(&str, bool, bool, bool, bool)] = &[
    ("natural|coastline",       false, true,  true,  false),
    ("natural|coastline_area",  false, false, true,  false),
    ("natural|land",            false, false, true,  false),
    ("natural|water",           false, false, true,  true),
    ("natural|wood",            false, false, true,  false),
    ("place|city",              true,  false, false, true),
    ("place|town",              true,  false, false, true),
    ("place|village",           true,  false, false, false),
    ("place|hamlet",            true,  false, false, false),
    ("place|island",            true,  false, true,  false),
    ("highway|motorway",        false, true,  false, true),
    ("highway|trunk",           false, true,  false, true),
    ("highway|primary",         false, true,  false, true),
    ("highway|secondary",       false, true,  false, false),
    ("highway|residential",     false, true,  false, false),
    ("highway|unclassified",    false, true,  false, false),
    ("highway|service",         false, true,  false, false),
    ("highway|footway",         false, true,  false, false),
    ("railway|rail",            false, true,  false, false),
    ("waterway|river",          false, true,  false, false),
    ("waterway|stream",         false, true,  false, false),
    ("building",                true,  false, true,  false),
    ("leisure|park",            true,  false, true,  false),
    ("leisure|playground",      true,  false, true,  false),
    ("leisure|golf_course",     false, false, true,  false),
    ("landuse|cemetery",        false, false, true,  false),
    ("landuse|forest",          false, false, true,  false),
    ("landuse|grass",           false, false, true,  false),
    ("barrier|fence",           false, true,  false, false),
    ("barrier|wall",            false, true,  false, false),
    ("barrier|hedge",           false, true,  false, false),
    ("amenity|school",          true,  false, true,  false),
    ("amenity|hospital",        true,  false, true,  false),
    ("amenity|parking",         true,  false, true,  false),
    ("amenity|cafe",            true,  false, false, false),
    ("amenity|restaurant",      true,  false, false, false),
    ("amenity|bank",            true,  false, false, false),
    // Not produced from tags; attached by the promo catalog stage.
    ("sponsored|promo_catalog", true,  false, true,  false),
];

impl Classificator {
    fn with_default_rules() -> Classificator {
        let mut defs = Vec::new();
        let mut by_path = HashMap::new();
        for (path, point, line, area, world) in RULES {
            by_path.insert(*path, Class(defs.len() as u16));
            defs.push(ClassDef {
                path,
                point: *point,
                line: *line,
                area: *area,
                world: *world,
            });
        }
        Classificator { defs, by_path }
    }

    /// Panics on an unknown path; only call with the literal paths in RULES.
    pub fn class(&self, path: &str) -> Class {
        match self.by_path.get(path) {
            Some(c) => *c,
            None => panic!("unknown classification {}", path),
        }
    }

    pub fn path(&self, class: Class) -> &'static str {
        self.defs[class.0 as usize].path
    }

    pub fn supports(&self, class: Class, kind: GeomKind) -> bool {
        let def = &self.defs[class.0 as usize];
        match kind {
            GeomKind::Point => def.point,
            GeomKind::Line => def.line,
            GeomKind::Area => def.area,
        }
    }

    pub fn world_visible(&self, class: Class) -> bool {
        self.defs[class.0 as usize].world
    }

    /// Maps an element's tags to its set of classes. Unknown tags are simply
    /// ignored; an empty result means the element carries nothing we render
    /// or search.
    pub fn classes_for_tags(&self, tags: &Tags) -> BTreeSet<Class> {
        let mut classes = BTreeSet::new();
        for (k, v) in tags.inner() {
            if k == "building" {
                classes.insert(self.class("building"));
                continue;
            }
            if let Some(c) = self.by_path.get(format!("{}|{}", k, v).as_str()) {
                classes.insert(*c);
            }
        }
        classes
    }

    pub fn coastline(&self) -> Class {
        self.class("natural|coastline")
    }

    pub fn coastline_area(&self) -> Class {
        self.class("natural|coastline_area")
    }

    pub fn land(&self) -> Class {
        self.class("natural|land")
    }

    pub fn island(&self) -> Class {
        self.class("place|island")
    }

    pub fn promo_catalog(&self) -> Class {
        self.class("sponsored|promo_catalog")
    }

    pub fn is_city_town_or_village(&self, classes: &BTreeSet<Class>) -> bool {
        classes.iter().any(|c| {
            matches!(
                self.path(*c),
                "place|city" | "place|town" | "place|village" | "place|hamlet"
            )
        })
    }
}

lazy_static! {
    static ref REGISTRY: Classificator = Classificator::with_default_rules();
}

/// Forces the registry to load. Call once at startup, before any worker
/// threads exist.
pub fn init() {
    lazy_static::initialize(&REGISTRY);
}

pub fn registry() -> &'static Classificator {
    &REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn tags(pairs: Vec<(&str, &str)>) -> Tags {
        let mut map = BTreeMap::new();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.to_string());
        }
        Tags::new(map)
    }

    #[test]
    fn extraction() {
        let c = registry();
        let classes = c.classes_for_tags(&tags(vec![
            ("leisure", "playground"),
            ("barrier", "fence"),
            ("name", "Hilltop"),
        ]));
        assert_eq!(classes.len(), 2);
        assert!(classes.contains(&c.class("leisure|playground")));
        assert!(classes.contains(&c.class("barrier|fence")));

        assert!(c
            .classes_for_tags(&tags(vec![("building", "yes")]))
            .contains(&c.class("building")));
        assert!(c
            .classes_for_tags(&tags(vec![("highway", "proposed")]))
            .is_empty());
    }

    #[test]
    fn geometry_rules() {
        let c = registry();
        assert!(c.supports(c.class("leisure|playground"), GeomKind::Area));
        assert!(c.supports(c.class("leisure|playground"), GeomKind::Point));
        assert!(!c.supports(c.class("leisure|playground"), GeomKind::Line));
        assert!(c.supports(c.class("barrier|fence"), GeomKind::Line));
        assert!(!c.supports(c.class("barrier|fence"), GeomKind::Area));
        assert!(c.world_visible(c.class("place|city")));
        assert!(!c.world_visible(c.class("place|hamlet")));
    }
}

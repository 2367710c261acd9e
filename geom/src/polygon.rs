use serde::{Deserialize, Serialize};

use crate::{Bounds, LonLat, Ring};

/// An area with an outer boundary and any number of interior holes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    outer: Ring,
    holes: Vec<Ring>,
}

impl Polygon {
    pub fn new(outer: Ring) -> Polygon {
        Polygon {
            outer,
            holes: Vec::new(),
        }
    }

    pub fn with_holes(outer: Ring, holes: Vec<Ring>) -> Polygon {
        Polygon { outer, holes }
    }

    pub fn outer(&self) -> &Ring {
        &self.outer
    }

    pub fn holes(&self) -> &Vec<Ring> {
        &self.holes
    }

    pub fn get_bounds(&self) -> Bounds {
        self.outer.get_bounds()
    }

    pub fn contains_pt(&self, pt: LonLat) -> bool {
        self.outer.contains_pt(pt) && !self.holes.iter().any(|h| h.contains_pt(pt))
    }
}

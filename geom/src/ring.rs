use std::fmt;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::{Bounds, LonLat};

/// A closed loop of points. The first and last point are equal, and there are
/// at least three distinct points.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ring {
    pts: Vec<LonLat>,
}

impl Ring {
    pub fn new(pts: Vec<LonLat>) -> Result<Ring> {
        if pts.len() < 4 {
            bail!("Can't make a ring with only {} points", pts.len());
        }
        if pts[0] != *pts.last().unwrap() {
            bail!("Can't make a ring with mismatching first/last points");
        }
        Ok(Ring { pts })
    }

    /// Removes adjacent duplicate points, and closes the loop if the input
    /// doesn't repeat its first point.
    pub fn deduping_new(mut pts: Vec<LonLat>) -> Result<Ring> {
        pts.dedup();
        if !pts.is_empty() && pts[0] != *pts.last().unwrap() {
            pts.push(pts[0]);
        }
        Ring::new(pts)
    }

    /// The closed loop, with the first point repeated at the end.
    pub fn points(&self) -> &Vec<LonLat> {
        &self.pts
    }

    pub fn into_points(self) -> Vec<LonLat> {
        self.pts
    }

    pub fn get_bounds(&self) -> Bounds {
        Bounds::from(&self.pts)
    }

    /// Even-odd ray casting. Points exactly on an edge may go either way; the
    /// callers treat borders as ambiguous anyway.
    pub fn contains_pt(&self, pt: LonLat) -> bool {
        let mut inside = false;
        for pair in self.pts.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if (a.y() > pt.y()) != (b.y() > pt.y()) {
                let x_cross = a.x() + (pt.y() - a.y()) / (b.y() - a.y()) * (b.x() - a.x());
                if pt.x() < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }
}

impl fmt::Display for Ring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Ring::new(vec![")?;
        for pt in &self.pts {
            writeln!(f, "  LonLat::new({}, {}),", pt.x(), pt.y())?;
        }
        write!(f, "])")
    }
}

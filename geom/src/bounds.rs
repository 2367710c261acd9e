use serde::{Deserialize, Serialize};

use crate::LonLat;

/// An axis-aligned bounding rectangle in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn new() -> Bounds {
        Bounds {
            min_x: f64::MAX,
            min_y: f64::MAX,
            max_x: f64::MIN,
            max_y: f64::MIN,
        }
    }

    pub fn from(pts: &[LonLat]) -> Bounds {
        let mut b = Bounds::new();
        for pt in pts {
            b.update(*pt);
        }
        b
    }

    pub fn update(&mut self, pt: LonLat) {
        self.min_x = self.min_x.min(pt.x());
        self.min_y = self.min_y.min(pt.y());
        self.max_x = self.max_x.max(pt.x());
        self.max_y = self.max_y.max(pt.y());
    }

    pub fn union(&mut self, other: Bounds) {
        self.update(LonLat::new(other.min_x, other.min_y));
        self.update(LonLat::new(other.max_x, other.max_y));
    }

    pub fn contains(&self, pt: LonLat) -> bool {
        pt.x() >= self.min_x && pt.x() <= self.max_x && pt.y() >= self.min_y && pt.y() <= self.max_y
    }

    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    pub fn center(&self) -> LonLat {
        LonLat::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn as_aabb(&self) -> rstar::AABB<[f64; 2]> {
        rstar::AABB::from_corners([self.min_x, self.min_y], [self.max_x, self.max_y])
    }
}

impl Default for Bounds {
    fn default() -> Bounds {
        Bounds::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_and_contains() {
        let mut b = Bounds::new();
        b.update(LonLat::new(0.0, 0.0));
        b.update(LonLat::new(2.0, 1.0));
        assert!(b.contains(LonLat::new(1.0, 0.5)));
        assert!(b.contains(LonLat::new(2.0, 1.0)));
        assert!(!b.contains(LonLat::new(2.1, 0.5)));
    }

    #[test]
    fn intersects() {
        let a = Bounds::from(&[LonLat::new(0.0, 0.0), LonLat::new(1.0, 1.0)]);
        let b = Bounds::from(&[LonLat::new(1.0, 0.0), LonLat::new(2.0, 1.0)]);
        let c = Bounds::from(&[LonLat::new(3.0, 3.0), LonLat::new(4.0, 4.0)]);
        // Shared edge counts.
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }
}

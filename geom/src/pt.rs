use std::fmt;

use serde::{Deserialize, Serialize};

/// A longitude/latitude pair in degrees.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct LonLat {
    longitude: f64,
    latitude: f64,
}

impl LonLat {
    pub fn new(lon: f64, lat: f64) -> LonLat {
        LonLat {
            longitude: lon,
            latitude: lat,
        }
    }

    pub fn x(self) -> f64 {
        self.longitude
    }

    pub fn y(self) -> f64 {
        self.latitude
    }

    /// Comparing floats directly is icky, but the pipeline only ever needs to
    /// ask "is this vertex the same vertex" on points that came from the same
    /// source, so exact equality is the right notion.
    pub fn approx_eq(self, other: LonLat) -> bool {
        self == other
    }
}

impl fmt::Display for LonLat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LonLat({}, {})", self.x(), self.y())
    }
}

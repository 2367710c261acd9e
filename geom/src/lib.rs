//! Geometry primitives for the region compiler. Everything works directly in
//! WGS84 degrees; at the precision the pipeline needs (point-in-polygon and
//! bounding rectangles), plain Cartesian math on lon/lat is fine.

mod bounds;
mod polygon;
mod pt;
mod ring;

pub use crate::bounds::Bounds;
pub use crate::polygon::Polygon;
pub use crate::pt::LonLat;
pub use crate::ring::Ring;

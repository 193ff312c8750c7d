//! Coordinate and geometry types shared by the tiler, residency and dispatch code.
//!
//! Canonical space:
//! - Integer pixels, origin top-left
//! - +X right, +Y down
//! - Boxes are half-open: `[x1, x2) × [y1, y2)`
//!
//! Everything inside the engine works on 64-bit coordinates. The 16-bit host
//! form only appears at the boundary through [`WireBox`].

mod color;
mod ibox;
mod region;
mod transform;

pub use color::Color;
pub use ibox::{IBox, WireBox};
pub use region::Region;
pub use transform::Transform;

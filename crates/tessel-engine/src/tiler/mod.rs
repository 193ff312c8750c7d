//! Large-pixmap tiler.
//!
//! Splits regions across the blocks of a tiled pixmap under each sampling
//! mode, bounds the footprint of transformed reads, and merges footprints
//! that straddle blocks into one temporary surface.

mod clip;
mod grid;
mod merge;
mod repeat;
mod sample;
mod transform;

pub use clip::{
    ClipDirection, ClippedRegion, Mirror, RepeatMode, compute_clipped_regions,
    compute_clipped_regions_ext,
};
pub use grid::BlockGrid;
pub use sample::{Sample, resolve_sample};
pub use transform::{compute_transform_clipped_regions, transform_block_size, transform_extent};

use bitflags::bitflags;

use crate::coords::{IBox, Region, Transform};

use super::BlockGrid;

/// Policy for source coordinates outside the pixmap.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum RepeatMode {
    /// Outside reads as transparent.
    #[default]
    None,
    /// Outside reads the nearest edge pixel.
    Pad,
    /// Periodic repeat.
    Normal,
    /// Periodic repeat, mirrored on every odd period.
    Reflect,
}

bitflags! {
    /// Block visiting order, so overlapping copies never read a block
    /// that the same pass already wrote.
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct ClipDirection: u8 {
        /// Columns right to left.
        const REVERSE     = 1 << 0;
        /// Rows bottom to top.
        const UPSIDE_DOWN = 1 << 1;
    }
}

bitflags! {
    /// Axes on which an entry reads its block flipped.
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct Mirror: u8 {
        const X = 1 << 0;
        const Y = 1 << 1;
    }
}

/// One (sub-region, block) pair produced by clipping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClippedRegion {
    /// Pixels in the caller's coordinates.
    pub region: Region,
    /// The same pixels in pixmap coordinates, folded into the base tile.
    pub source: Region,
    pub block: usize,
    /// Periodic copy the entry belongs to; `(0, 0)` for the base tile.
    pub period: (i64, i64),
    pub mirror: Mirror,
    /// Wrap the sampler applies on axes where `region` runs past the block.
    /// Set when the pixmap is a single block along an axis, in which case
    /// the entry covers every period on that axis at once.
    pub sampler_repeat: RepeatMode,
}

impl ClippedRegion {
    pub(crate) fn direct(region: Region, block: usize) -> Self {
        Self {
            source: region.clone(),
            region,
            block,
            period: (0, 0),
            mirror: Mirror::empty(),
            sampler_repeat: RepeatMode::None,
        }
    }

    /// Maps caller coordinates to texel coordinates inside the entry's block.
    pub fn to_block(&self, grid: &BlockGrid) -> Transform {
        let b = grid.block_box(self.block);
        let w = grid.width() as f64;
        let h = grid.height() as f64;
        let (px, py) = (self.period.0 as f64, self.period.1 as f64);
        let (sx, tx) = if self.mirror.contains(Mirror::X) {
            (-1.0, (px + 1.0) * w - b.x1 as f64)
        } else {
            (1.0, -(px * w) - b.x1 as f64)
        };
        let (sy, ty) = if self.mirror.contains(Mirror::Y) {
            (-1.0, (py + 1.0) * h - b.y1 as f64)
        } else {
            (1.0, -(py * h) - b.y1 as f64)
        };
        Transform::from_rows([[sx, 0.0, tx], [0.0, sy, ty], [0.0, 0.0, 1.0]])
    }
}

/// Splits `region` into per-block pieces under `mode`.
///
/// For `None` the result partitions `region ∩ bounds`. `Pad` first widens
/// boxes lying entirely past an edge to include that edge pixel. The
/// repeating modes enumerate every periodic copy of every block `region`
/// touches, however far outside the base tile it lies. An axis with a
/// single block yields one entry per block along it and leaves the wrap to
/// the sampler through [`ClippedRegion::sampler_repeat`].
pub fn compute_clipped_regions(
    grid: &BlockGrid,
    region: &Region,
    mode: RepeatMode,
    dir: ClipDirection,
) -> Vec<ClippedRegion> {
    match mode {
        RepeatMode::None => clip_to_blocks(grid, region, dir),
        RepeatMode::Pad => {
            let padded = pad_convert(region, grid.width() as i64, grid.height() as i64);
            clip_to_blocks(grid, &padded, dir)
        }
        RepeatMode::Normal => super::repeat::clip_repeat(grid, region, false, dir),
        RepeatMode::Reflect => super::repeat::clip_repeat(grid, region, true, dir),
    }
}

/// Two-round clipping: against the pixmap's blocks, then each block against
/// an `inner_w × inner_h` grid anchored at the block origin.
pub fn compute_clipped_regions_ext(
    grid: &BlockGrid,
    region: &Region,
    inner_w: u32,
    inner_h: u32,
    dir: ClipDirection,
) -> Vec<ClippedRegion> {
    let outer = clip_to_blocks(grid, region, dir);
    let (bw, bh) = grid.block_size();
    if inner_w >= bw && inner_h >= bh {
        return outer;
    }

    let mut out = Vec::new();
    for entry in outer {
        let b = grid.block_box(entry.block);
        let inner = BlockGrid::new(b.width() as u32, b.height() as u32, inner_w, inner_h);
        let local = entry.region.translated(-b.x1, -b.y1);
        for piece in clip_to_blocks(&inner, &local, dir) {
            out.push(ClippedRegion::direct(
                piece.region.translated(b.x1, b.y1),
                entry.block,
            ));
        }
    }
    out
}

pub(crate) fn clip_to_blocks(
    grid: &BlockGrid,
    region: &Region,
    dir: ClipDirection,
) -> Vec<ClippedRegion> {
    let Some(area) = region.extents().and_then(|e| e.intersect(grid.bounds())) else {
        return Vec::new();
    };

    if !grid.is_large() {
        let r = region.intersect_box(grid.bounds());
        return vec![ClippedRegion::direct(r, 0)];
    }

    let (c0, r0) = grid.locate(area.x1, area.y1);
    let (c1, r1) = grid.locate(area.x2 - 1, area.y2 - 1);
    let mut rows: Vec<u32> = (r0..=r1).collect();
    let mut cols: Vec<u32> = (c0..=c1).collect();
    if dir.contains(ClipDirection::UPSIDE_DOWN) {
        rows.reverse();
    }
    if dir.contains(ClipDirection::REVERSE) {
        cols.reverse();
    }

    let mut out = Vec::with_capacity(rows.len() * cols.len());
    for &row in &rows {
        for &col in &cols {
            let clipped = region.intersect_box(grid.cell(col, row));
            if !clipped.is_empty() {
                out.push(ClippedRegion::direct(clipped, grid.block_index(col, row)));
            }
        }
    }
    out
}

/// Widens boxes lying wholly past an edge so they keep that edge pixel.
pub(crate) fn pad_convert(region: &Region, width: i64, height: i64) -> Region {
    Region::from_boxes(region.boxes().iter().map(|b| {
        let mut b: IBox = *b;
        if b.x1 < 0 && b.x2 <= 0 {
            b.x2 = 1;
        } else if b.x1 >= width && b.x2 > width {
            b.x1 = width - 1;
        }
        if b.y1 < 0 && b.y2 <= 0 {
            b.y2 = 1;
        } else if b.y1 >= height && b.y2 > height {
            b.y1 = height - 1;
        }
        b
    }))
}

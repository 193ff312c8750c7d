use crate::coords::{IBox, Region, Transform};

use super::{BlockGrid, ClipDirection, ClippedRegion, RepeatMode, compute_clipped_regions};

/// Source box read when `b` is sampled through `t`.
///
/// All four corners are mapped and the bounding box is rounded outward by
/// one pixel so filtered edge reads stay inside. `None` when a corner maps to
/// infinity.
pub fn transform_extent(b: IBox, t: &Transform) -> Option<IBox> {
    let corners = [
        (b.x1 as f64, b.y1 as f64),
        (b.x2 as f64, b.y1 as f64),
        (b.x1 as f64, b.y2 as f64),
        (b.x2 as f64, b.y2 as f64),
    ];
    let mut min = (f64::INFINITY, f64::INFINITY);
    let mut max = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for (x, y) in corners {
        let (tx, ty) = t.map_point(x, y)?;
        min = (min.0.min(tx), min.1.min(ty));
        max = (max.0.max(tx), max.1.max(ty));
    }
    Some(IBox::new(
        min.0.floor() as i64 - 1,
        min.1.floor() as i64 - 1,
        max.0.ceil() as i64 + 1,
        max.1.ceil() as i64 + 1,
    ))
}

/// Largest square destination block whose footprint through `t` fits one
/// `bw × bh` source block. `None` for transforms that shrink it to nothing.
pub fn transform_block_size(t: &Transform, bw: u32, bh: u32) -> Option<(u32, u32)> {
    let m = t.rows();
    let (a, b, c, d) = (m[0][0], m[0][1], m[1][0], m[1][1]);
    let scale = m[2][2];
    let (width, block_w) = if bw > 2048 {
        let q = bw / 4;
        (q, q * 4)
    } else {
        (bw.saturating_sub(2), bw)
    };
    let width = (width as f64 * scale).floor();
    let e = (block_w as f64).min(width / (a + b).abs().max((a - b).abs()));
    let f = (bh as f64).min(width / (c + d).abs().max((c - d).abs()));
    let size = e.min(f).floor() - 1.0;
    if !(size > 0.0) {
        return None;
    }
    let size = size as u32;
    Some((size, size))
}

/// Clips the transformed footprint of a destination region.
///
/// `region` is in destination coordinates and `(dx, dy)` moves it into the
/// picture's space before `t` applies. With [`RepeatMode::None`] the
/// footprint is first clamped to the pixmap.
pub fn compute_transform_clipped_regions(
    grid: &BlockGrid,
    t: &Transform,
    region: &Region,
    dx: i64,
    dy: i64,
    mode: RepeatMode,
    dir: ClipDirection,
) -> Vec<ClippedRegion> {
    let Some(ext) = region.extents() else {
        return Vec::new();
    };
    let Some(mut src) = transform_extent(ext.translate(dx, dy), t) else {
        return Vec::new();
    };
    if mode == RepeatMode::None {
        match src.intersect(grid.bounds()) {
            Some(b) => src = b,
            None => return Vec::new(),
        }
    }
    compute_clipped_regions(grid, &Region::from_box(src), mode, dir)
}

use super::{BlockGrid, RepeatMode};

/// Where a continuous sample coordinate lands in a tiled pixmap.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Sample {
    /// Folded coordinate in pixmap space.
    pub x: f64,
    pub y: f64,
    /// Pixel holding the sample.
    pub pixel: (i64, i64),
    pub block: usize,
    /// Coordinate relative to the block origin.
    pub local: (f64, f64),
}

fn fold(c: f64, size: f64, mode: RepeatMode) -> Option<f64> {
    match mode {
        RepeatMode::None => (c >= 0.0 && c < size).then_some(c),
        RepeatMode::Pad => Some(c.clamp(0.0, size)),
        RepeatMode::Normal => Some(c.rem_euclid(size)),
        RepeatMode::Reflect => {
            let m = c.rem_euclid(2.0 * size);
            Some(if m > size { 2.0 * size - m } else { m })
        }
    }
}

/// Resolves `(x, y)` to a block and block-relative coordinate under `mode`.
///
/// `None` when the sample falls outside a non-repeating pixmap.
pub fn resolve_sample(grid: &BlockGrid, mode: RepeatMode, x: f64, y: f64) -> Option<Sample> {
    let w = grid.width() as f64;
    let h = grid.height() as f64;
    let fx = fold(x, w, mode)?;
    let fy = fold(y, h, mode)?;
    let px = (fx.floor() as i64).clamp(0, grid.width() as i64 - 1);
    let py = (fy.floor() as i64).clamp(0, grid.height() as i64 - 1);
    let (col, row) = grid.locate(px, py);
    let block = grid.block_index(col, row);
    let b = grid.block_box(block);
    Some(Sample {
        x: fx,
        y: fy,
        pixel: (px, py),
        block,
        local: (fx - b.x1 as f64, fy - b.y1 as f64),
    })
}

use crate::coords::IBox;

/// Row-major partition of a pixmap into texture-sized blocks.
///
/// Blocks in the last column and row may be narrower. An axis that fits the
/// limit has exactly one block spanning the whole extent.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BlockGrid {
    width: u32,
    height: u32,
    block_w: u32,
    block_h: u32,
    cols: u32,
    rows: u32,
}

impl BlockGrid {
    /// `block_w`/`block_h` must be non-zero.
    pub fn new(width: u32, height: u32, block_w: u32, block_h: u32) -> Self {
        let block_w = block_w.max(1);
        let block_h = block_h.max(1);
        Self {
            width,
            height,
            block_w,
            block_h,
            cols: width.div_ceil(block_w).max(1),
            rows: height.div_ceil(block_h).max(1),
        }
    }

    /// One block covering the whole pixmap.
    pub fn single(width: u32, height: u32) -> Self {
        Self::new(width, height, width, height)
    }

    /// Blocks of at most `limit` on each axis.
    pub fn for_limit(width: u32, height: u32, limit: u32) -> Self {
        let bw = if width <= limit { width } else { limit };
        let bh = if height <= limit { height } else { limit };
        Self::new(width, height, bw, bh)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn block_size(&self) -> (u32, u32) {
        (self.block_w, self.block_h)
    }

    #[inline]
    pub fn cols(&self) -> u32 {
        self.cols
    }

    #[inline]
    pub fn rows(&self) -> u32 {
        self.rows
    }

    #[inline]
    pub fn block_count(&self) -> usize {
        (self.cols * self.rows) as usize
    }

    /// More than one block on either axis.
    #[inline]
    pub fn is_large(&self) -> bool {
        self.cols > 1 || self.rows > 1
    }

    #[inline]
    pub fn bounds(&self) -> IBox {
        IBox::from_size(self.width, self.height)
    }

    #[inline]
    pub fn block_index(&self, col: u32, row: u32) -> usize {
        (row * self.cols + col) as usize
    }

    pub fn block_box(&self, index: usize) -> IBox {
        let col = index as u32 % self.cols;
        let row = index as u32 / self.cols;
        self.cell(col, row)
    }

    pub(crate) fn cell(&self, col: u32, row: u32) -> IBox {
        let x1 = (col * self.block_w) as i64;
        let y1 = (row * self.block_h) as i64;
        IBox::new(
            x1,
            y1,
            (x1 + self.block_w as i64).min(self.width as i64),
            (y1 + self.block_h as i64).min(self.height as i64),
        )
    }

    /// Column and row of the block holding pixel `(x, y)`, clamped to the grid.
    pub fn locate(&self, x: i64, y: i64) -> (u32, u32) {
        let col = (x.max(0) / self.block_w as i64).min(self.cols as i64 - 1);
        let row = (y.max(0) / self.block_h as i64).min(self.rows as i64 - 1);
        (col as u32, row as u32)
    }

    pub fn boxes(&self) -> impl Iterator<Item = IBox> + '_ {
        (0..self.block_count()).map(|i| self.block_box(i))
    }
}

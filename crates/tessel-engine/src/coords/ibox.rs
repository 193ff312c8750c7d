/// Half-open integer box `[x1, x2) × [y1, y2)` in pixels.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct IBox {
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
}

impl IBox {
    #[inline]
    pub const fn new(x1: i64, y1: i64, x2: i64, y2: i64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    #[inline]
    pub const fn from_xywh(x: i64, y: i64, w: i64, h: i64) -> Self {
        Self::new(x, y, x + w, y + h)
    }

    /// Box covering `[0, w) × [0, h)`.
    #[inline]
    pub const fn from_size(w: u32, h: u32) -> Self {
        Self::new(0, 0, w as i64, h as i64)
    }

    #[inline]
    pub const fn width(self) -> i64 {
        self.x2 - self.x1
    }

    #[inline]
    pub const fn height(self) -> i64 {
        self.y2 - self.y1
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.x1 >= self.x2 || self.y1 >= self.y2
    }

    #[inline]
    pub fn area(self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width() * self.height()
        }
    }

    #[inline]
    pub fn contains_point(self, x: i64, y: i64) -> bool {
        x >= self.x1 && x < self.x2 && y >= self.y1 && y < self.y2
    }

    #[inline]
    pub fn contains_box(self, other: IBox) -> bool {
        other.is_empty()
            || (other.x1 >= self.x1
                && other.y1 >= self.y1
                && other.x2 <= self.x2
                && other.y2 <= self.y2)
    }

    #[inline]
    pub fn intersect(self, other: IBox) -> Option<IBox> {
        let b = IBox::new(
            self.x1.max(other.x1),
            self.y1.max(other.y1),
            self.x2.min(other.x2),
            self.y2.min(other.y2),
        );
        if b.is_empty() { None } else { Some(b) }
    }

    #[inline]
    pub fn translate(self, dx: i64, dy: i64) -> IBox {
        IBox::new(self.x1 + dx, self.y1 + dy, self.x2 + dx, self.y2 + dy)
    }

    /// Smallest box containing both. Empty operands are ignored.
    #[inline]
    pub fn union_extent(self, other: IBox) -> IBox {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        IBox::new(
            self.x1.min(other.x1),
            self.y1.min(other.y1),
            self.x2.max(other.x2),
            self.y2.max(other.y2),
        )
    }

    /// Disjoint pieces of `self` not covered by `other` (at most four).
    pub fn subtract(self, other: IBox) -> Vec<IBox> {
        let Some(i) = self.intersect(other) else {
            return if self.is_empty() { Vec::new() } else { vec![self] };
        };

        let mut out = Vec::with_capacity(4);
        if self.y1 < i.y1 {
            out.push(IBox::new(self.x1, self.y1, self.x2, i.y1));
        }
        if self.x1 < i.x1 {
            out.push(IBox::new(self.x1, i.y1, i.x1, i.y2));
        }
        if i.x2 < self.x2 {
            out.push(IBox::new(i.x2, i.y1, self.x2, i.y2));
        }
        if i.y2 < self.y2 {
            out.push(IBox::new(self.x1, i.y2, self.x2, self.y2));
        }
        out
    }

    /// Narrows to the 16-bit host form.
    ///
    /// Each coordinate is clamped to `i16` range. This is the only place a
    /// coordinate is narrowed.
    #[inline]
    pub fn to_wire(self) -> WireBox {
        WireBox {
            x1: clamp_i16(self.x1),
            y1: clamp_i16(self.y1),
            x2: clamp_i16(self.x2),
            y2: clamp_i16(self.y2),
        }
    }
}

#[inline]
fn clamp_i16(v: i64) -> i16 {
    v.clamp(i16::MIN as i64, i16::MAX as i64) as i16
}

/// Box in the host protocol's 16-bit coordinate format.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct WireBox {
    pub x1: i16,
    pub y1: i16,
    pub x2: i16,
    pub y2: i16,
}

impl WireBox {
    #[inline]
    pub const fn to_ibox(self) -> IBox {
        IBox::new(self.x1 as i64, self.y1 as i64, self.x2 as i64, self.y2 as i64)
    }
}

impl From<WireBox> for IBox {
    fn from(b: WireBox) -> Self {
        b.to_ibox()
    }
}

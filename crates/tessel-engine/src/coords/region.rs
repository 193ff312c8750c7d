use super::IBox;

/// Ordered set of disjoint, non-empty boxes.
///
/// Boxes are kept sorted by `(y1, x1)`. The box list is not canonical: two
/// regions may cover the same pixels with different decompositions, so
/// coverage is compared with [`Region::same_coverage`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Region {
    boxes: Vec<IBox>,
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_box(b: IBox) -> Self {
        if b.is_empty() {
            Self::new()
        } else {
            Self { boxes: vec![b] }
        }
    }

    /// Builds a region from possibly overlapping boxes.
    pub fn from_boxes<I: IntoIterator<Item = IBox>>(boxes: I) -> Self {
        let mut r = Self::new();
        for b in boxes {
            r.add_box(b);
        }
        r
    }

    #[inline]
    pub fn boxes(&self) -> &[IBox] {
        &self.boxes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Adds the part of `b` not already covered.
    pub fn add_box(&mut self, b: IBox) {
        if b.is_empty() {
            return;
        }
        let mut pieces = vec![b];
        for existing in &self.boxes {
            pieces = pieces
                .into_iter()
                .flat_map(|p| p.subtract(*existing))
                .collect();
            if pieces.is_empty() {
                return;
            }
        }
        self.boxes.extend(pieces);
        self.sort();
    }

    pub fn union(&self, other: &Region) -> Region {
        let mut out = self.clone();
        for b in &other.boxes {
            out.add_box(*b);
        }
        out
    }

    pub fn intersect_box(&self, clip: IBox) -> Region {
        let mut boxes: Vec<IBox> = self
            .boxes
            .iter()
            .filter_map(|b| b.intersect(clip))
            .collect();
        boxes.sort_by_key(|b| (b.y1, b.x1));
        Region { boxes }
    }

    pub fn intersect(&self, other: &Region) -> Region {
        let mut boxes = Vec::new();
        for a in &self.boxes {
            for b in &other.boxes {
                if let Some(i) = a.intersect(*b) {
                    boxes.push(i);
                }
            }
        }
        boxes.sort_by_key(|b| (b.y1, b.x1));
        Region { boxes }
    }

    pub fn subtract_box(&self, cut: IBox) -> Region {
        let mut boxes: Vec<IBox> = self.boxes.iter().flat_map(|b| b.subtract(cut)).collect();
        boxes.sort_by_key(|b| (b.y1, b.x1));
        Region { boxes }
    }

    pub fn subtract(&self, other: &Region) -> Region {
        let mut out = self.clone();
        for b in &other.boxes {
            if out.is_empty() {
                break;
            }
            out = out.subtract_box(*b);
        }
        out
    }

    pub fn translated(&self, dx: i64, dy: i64) -> Region {
        Region {
            boxes: self.boxes.iter().map(|b| b.translate(dx, dy)).collect(),
        }
    }

    /// Bounding box, `None` when empty.
    pub fn extents(&self) -> Option<IBox> {
        let first = *self.boxes.first()?;
        Some(self.boxes.iter().fold(first, |acc, b| acc.union_extent(*b)))
    }

    pub fn area(&self) -> i64 {
        self.boxes.iter().map(|b| b.area()).sum()
    }

    pub fn contains_point(&self, x: i64, y: i64) -> bool {
        self.boxes.iter().any(|b| b.contains_point(x, y))
    }

    /// True when both regions cover exactly the same pixels.
    pub fn same_coverage(&self, other: &Region) -> bool {
        self.area() == other.area() && self.subtract(other).is_empty()
    }

    fn sort(&mut self) {
        self.boxes.sort_by_key(|b| (b.y1, b.x1));
    }
}

impl From<IBox> for Region {
    fn from(b: IBox) -> Self {
        Region::from_box(b)
    }
}

impl FromIterator<IBox> for Region {
    fn from_iter<I: IntoIterator<Item = IBox>>(iter: I) -> Self {
        Region::from_boxes(iter)
    }
}

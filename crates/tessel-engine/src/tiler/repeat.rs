use crate::coords::{IBox, Region};

use super::{BlockGrid, ClipDirection, ClippedRegion, Mirror, RepeatMode};

/// Whole tiles to shift by so that `min` ends up non-negative.
fn tile_shift(min: i64, size: i64, even: bool) -> i64 {
    if min >= 0 {
        return 0;
    }
    let mut n = (-min + size - 1) / size;
    // An even shift keeps mirrored periods mirrored.
    if even && n % 2 != 0 {
        n += 1;
    }
    n
}

/// Span of block `[b1, b2)` within period `p` of a tile of `size`.
#[inline]
fn plane_span(b1: i64, b2: i64, p: i64, size: i64, mirrored: bool) -> (i64, i64) {
    if mirrored {
        ((p + 1) * size - b2, (p + 1) * size - b1)
    } else {
        (p * size + b1, p * size + b2)
    }
}

/// Inverse of [`plane_span`] for a sub-span inside the period.
#[inline]
fn fold_span(x1: i64, x2: i64, p: i64, size: i64, mirrored: bool) -> (i64, i64) {
    if mirrored {
        ((p + 1) * size - x2, (p + 1) * size - x1)
    } else {
        (x1 - p * size, x2 - p * size)
    }
}

/// Folds `[a1, a2)` of the plane into the tile when the sampler wraps it.
fn fold_wrapped(a1: i64, a2: i64, size: i64, reflect: bool) -> Vec<(i64, i64)> {
    let period = if reflect { 2 * size } else { size };
    if a2 - a1 >= period {
        return vec![(0, size)];
    }
    let s = a1.rem_euclid(period);
    let e = s + (a2 - a1);
    let raw = if e <= period {
        vec![(s, e)]
    } else {
        vec![(s, period), (0, e - period)]
    };
    if !reflect {
        return raw;
    }
    let mut out = Vec::with_capacity(raw.len() * 2);
    for (s, e) in raw {
        if s < size {
            out.push((s, e.min(size)));
        }
        if e > size {
            out.push((2 * size - e, 2 * size - s.max(size)));
        }
    }
    out
}

/// One periodic copy of one block along an axis, in shifted plane coordinates.
struct Span {
    period: i64,
    cell: u32,
    lo: i64,
    hi: i64,
    mirrored: bool,
    /// The whole extent on a single-block axis; the sampler wraps it.
    wrapped: bool,
}

impl Span {
    fn fold(&self, a1: i64, a2: i64, size: i64, reflect: bool) -> Vec<(i64, i64)> {
        if self.wrapped {
            fold_wrapped(a1, a2, size, reflect)
        } else {
            vec![fold_span(a1, a2, self.period, size, self.mirrored)]
        }
    }
}

/// Spans along one axis and the whole-tile shift applied to the region.
///
/// `cells` holds `(index, start, end)` of each block on the axis.
fn axis_spans(
    lo: i64,
    hi: i64,
    size: i64,
    cells: &[(u32, i64, i64)],
    reflect: bool,
    reverse: bool,
) -> (i64, Vec<Span>) {
    if let [(cell, _, _)] = cells {
        let span = Span {
            period: 0,
            cell: *cell,
            lo,
            hi,
            mirrored: false,
            wrapped: true,
        };
        return (0, vec![span]);
    }

    let shift = tile_shift(lo, size, reflect);
    let (lo, hi) = (lo + shift * size, hi + shift * size);
    let mut periods: Vec<i64> = (lo / size..=(hi - 1) / size).collect();
    let mut cells = cells.to_vec();
    if reverse {
        periods.reverse();
        cells.reverse();
    }
    let mut out = Vec::with_capacity(periods.len() * cells.len());
    for &p in &periods {
        let mirrored = reflect && p % 2 == 1;
        for &(cell, b1, b2) in &cells {
            let (s1, s2) = plane_span(b1, b2, p, size, mirrored);
            out.push(Span {
                period: p,
                cell,
                lo: s1,
                hi: s2,
                mirrored,
                wrapped: false,
            });
        }
    }
    (shift, out)
}

pub(crate) fn clip_repeat(
    grid: &BlockGrid,
    region: &Region,
    reflect: bool,
    dir: ClipDirection,
) -> Vec<ClippedRegion> {
    let Some(ext) = region.extents() else {
        return Vec::new();
    };
    let w = grid.width() as i64;
    let h = grid.height() as i64;
    let xcells: Vec<(u32, i64, i64)> = (0..grid.cols())
        .map(|c| {
            let b = grid.cell(c, 0);
            (c, b.x1, b.x2)
        })
        .collect();
    let ycells: Vec<(u32, i64, i64)> = (0..grid.rows())
        .map(|r| {
            let b = grid.cell(0, r);
            (r, b.y1, b.y2)
        })
        .collect();
    let reverse = dir.contains(ClipDirection::REVERSE);
    let upside_down = dir.contains(ClipDirection::UPSIDE_DOWN);
    let (sx, xs) = axis_spans(ext.x1, ext.x2, w, &xcells, reflect, reverse);
    let (sy, ys) = axis_spans(ext.y1, ext.y2, h, &ycells, reflect, upside_down);
    let shifted = region.translated(sx * w, sy * h);
    let sampler = if reflect { RepeatMode::Reflect } else { RepeatMode::Normal };

    let mut out = Vec::new();
    for y in &ys {
        for x in &xs {
            let clipped = shifted.intersect_box(IBox::new(x.lo, y.lo, x.hi, y.hi));
            if clipped.is_empty() {
                continue;
            }

            let mut folded = Vec::new();
            for c in clipped.boxes() {
                let fy = y.fold(c.y1, c.y2, h, reflect);
                for (x1, x2) in x.fold(c.x1, c.x2, w, reflect) {
                    folded.extend(fy.iter().map(|&(y1, y2)| IBox::new(x1, y1, x2, y2)));
                }
            }
            let mut mirror = Mirror::empty();
            mirror.set(Mirror::X, x.mirrored);
            mirror.set(Mirror::Y, y.mirrored);

            out.push(ClippedRegion {
                region: clipped.translated(-sx * w, -sy * h),
                source: Region::from_boxes(folded),
                block: grid.block_index(x.cell, y.cell),
                period: (x.period - sx, y.period - sy),
                mirror,
                sampler_repeat: if x.wrapped || y.wrapped {
                    sampler
                } else {
                    RepeatMode::None
                },
            });
        }
    }
    out
}

//! Composite dispatcher.
//!
//! Picks the GPU→GPU, CPU→GPU or GPU→CPU path for copies, transfers and
//! composites, and drives the tiler when either side is a tiled pixmap.
//! Every `Err` tells the caller to redo the operation in software.

mod binding;
mod copy;
mod fill;
mod plan;
mod render;
mod transfer;

use crate::coords::{Color, Region, Transform};
use crate::pixmap::PixmapId;
use crate::program::CompositeOp;
use crate::tiler::RepeatMode;

pub(crate) use binding::{Binding, OperandSlot, TextureBinding, Wrap};
pub use copy::copy_needs_temp;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum PictureSource {
    Solid(Color),
    Pixmap(PixmapId),
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum Filter {
    #[default]
    Nearest,
    Bilinear,
}

/// A composite operand: a pixmap or a solid color, with its sampling state.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Picture {
    pub source: PictureSource,
    /// Maps picture coordinates to pixmap coordinates.
    pub transform: Option<Transform>,
    pub repeat: RepeatMode,
    pub filter: Filter,
    /// Masks only: each color channel carries its own alpha.
    pub component_alpha: bool,
}

impl Picture {
    pub fn solid(color: Color) -> Self {
        Self::new(PictureSource::Solid(color))
    }

    pub fn pixmap(id: PixmapId) -> Self {
        Self::new(PictureSource::Pixmap(id))
    }

    fn new(source: PictureSource) -> Self {
        Self {
            source,
            transform: None,
            repeat: RepeatMode::None,
            filter: Filter::Nearest,
            component_alpha: false,
        }
    }

    pub fn with_transform(mut self, t: Transform) -> Self {
        self.transform = (!t.is_identity()).then_some(t);
        self
    }

    pub fn with_repeat(mut self, repeat: RepeatMode) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_component_alpha(mut self, on: bool) -> Self {
        self.component_alpha = on;
        self
    }

    #[inline]
    pub fn pixmap_id(&self) -> Option<PixmapId> {
        match self.source {
            PictureSource::Pixmap(id) => Some(id),
            PictureSource::Solid(_) => None,
        }
    }
}

/// `dest = op(source × mask, dest)` over `region`.
///
/// Destination pixel `(x, y)` reads the source at picture coordinate
/// `(x + src_offset.0, y + src_offset.1)` and likewise for the mask.
#[derive(Debug, Clone, Copy)]
pub struct CompositeRequest<'a> {
    pub op: CompositeOp,
    pub source: &'a Picture,
    pub mask: Option<&'a Picture>,
    pub dest: PixmapId,
    pub region: &'a Region,
    pub src_offset: (i64, i64),
    pub mask_offset: (i64, i64),
}

use crate::coords::IBox;
use crate::device::PixelFormat;
use crate::error::{EngineError, Result};
use crate::fbo::Surface;
use crate::tiler::BlockGrid;

use super::{HostImage, PixmapUsage};

/// A logical pixel buffer and its GPU backing.
///
/// Unattached pixmaps have no surfaces. A small pixmap has one surface
/// covering its bounds; a large one has one surface per block of its grid,
/// in row-major order. While attached, exactly one block is current.
#[derive(Debug)]
pub struct Pixmap {
    width: u32,
    height: u32,
    depth: u8,
    format: Option<PixelFormat>,
    usage: PixmapUsage,
    pub(crate) grid: BlockGrid,
    pub(crate) surfaces: Vec<Surface>,
    pub(crate) current: usize,
    pub(crate) host: Option<HostImage>,
}

impl Pixmap {
    pub(crate) fn new(
        width: u32,
        height: u32,
        depth: u8,
        format: Option<PixelFormat>,
        usage: PixmapUsage,
    ) -> Self {
        Self {
            width,
            height,
            depth,
            format,
            usage,
            grid: BlockGrid::single(width, height),
            surfaces: Vec::new(),
            current: 0,
            host: None,
        }
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
    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// GPU format; `None` for depths without one.
    #[inline]
    pub fn format(&self) -> Option<PixelFormat> {
        self.format
    }

    #[inline]
    pub fn usage(&self) -> PixmapUsage {
        self.usage
    }

    #[inline]
    pub fn bounds(&self) -> IBox {
        IBox::from_size(self.width, self.height)
    }

    #[inline]
    pub fn is_resident(&self) -> bool {
        !self.surfaces.is_empty()
    }

    /// More than one block. Only meaningful while attached.
    #[inline]
    pub fn is_large(&self) -> bool {
        self.surfaces.len() > 1
    }

    /// Block layout of the current backing.
    #[inline]
    pub fn grid(&self) -> &BlockGrid {
        &self.grid
    }

    #[inline]
    pub fn block_count(&self) -> usize {
        self.surfaces.len()
    }

    pub fn block_box(&self, index: usize) -> Option<IBox> {
        (index < self.surfaces.len()).then(|| self.grid.block_box(index))
    }

    pub fn surface(&self, index: usize) -> Option<&Surface> {
        self.surfaces.get(index)
    }

    pub(crate) fn surface_mut(&mut self, index: usize) -> Option<&mut Surface> {
        self.surfaces.get_mut(index)
    }

    #[inline]
    pub fn current_block(&self) -> usize {
        self.current
    }

    pub fn current_surface(&self) -> Option<&Surface> {
        self.surfaces.get(self.current)
    }

    pub fn current_box(&self) -> Option<IBox> {
        self.block_box(self.current)
    }

    pub fn host(&self) -> Option<&HostImage> {
        self.host.as_ref()
    }

    pub fn host_mut(&mut self) -> Option<&mut HostImage> {
        self.host.as_mut()
    }

    /// Replaces the host copy. The image must match the pixmap's size.
    pub fn set_host(&mut self, image: Option<HostImage>) -> Result<()> {
        if let Some(img) = &image {
            if img.width() != self.width || img.height() != self.height {
                return Err(EngineError::InvalidArgument(format!(
                    "host image {}x{} for a {}x{} pixmap",
                    img.width(),
                    img.height(),
                    self.width,
                    self.height
                )));
            }
        }
        self.host = image;
        Ok(())
    }

    pub(crate) fn take_surfaces(&mut self) -> Vec<Surface> {
        self.current = 0;
        self.grid = BlockGrid::single(self.width, self.height);
        std::mem::take(&mut self.surfaces)
    }
}

use crate::context::RenderContext;
use crate::device::{Backend, PixelFormat, TextureId};
use crate::error::{EngineError, Result, fallback};
use crate::fbo::{FboAllocator, Surface};
use crate::tiler::BlockGrid;

use super::{HostImage, Pixmap, PixmapId, PixmapUsage, ResidencyHint};

/// Largest pixmap edge; boxes must stay addressable by the 16-bit host box.
pub const MAX_PIXMAP_EXTENT: u32 = i16::MAX as u32;

/// Tiles are never shrunk below this while recovering from exhaustion.
const MIN_FIXUP_TILE: u32 = 256;

/// Allocates one surface per block, releasing all of them if any fails.
fn allocate_blocks<B: Backend>(
    backend: &mut B,
    fbos: &mut FboAllocator,
    grid: &BlockGrid,
    format: PixelFormat,
    no_framebuffer: bool,
) -> Result<Vec<Surface>> {
    let mut surfaces = Vec::with_capacity(grid.block_count());
    for b in grid.boxes() {
        match fbos.create(backend, b.width() as u32, b.height() as u32, format, no_framebuffer) {
            Ok(s) => surfaces.push(s),
            Err(e) => {
                for s in surfaces {
                    fbos.discard(backend, s);
                }
                return Err(e);
            }
        }
    }
    Ok(surfaces)
}

impl<B: Backend> RenderContext<B> {
    /// Creates an unattached pixmap.
    ///
    /// CPU-only pixmaps get a zeroed host image when their depth has a pixel
    /// format.
    pub fn create_pixmap(
        &mut self,
        width: u32,
        height: u32,
        depth: u8,
        usage: PixmapUsage,
    ) -> Result<PixmapId> {
        if width == 0 || height == 0 {
            return Err(EngineError::InvalidSize { width, height });
        }
        let format = PixelFormat::for_depth(depth, &self.caps);
        let mut pm = Pixmap::new(width, height, depth, format, usage);
        if usage == PixmapUsage::CpuOnly {
            pm.host = format.map(|f| HostImage::new(width, height, f));
        }
        Ok(self.pixmaps.insert(pm))
    }

    /// Wraps a texture owned by someone else in a new pixmap.
    pub fn create_pixmap_from_texture(
        &mut self,
        texture: TextureId,
        width: u32,
        height: u32,
        depth: u8,
    ) -> Result<PixmapId> {
        let format =
            PixelFormat::for_depth(depth, &self.caps).ok_or(EngineError::UnsupportedDepth(depth))?;
        let limit = self.caps.max_texture_size;
        if width > limit || height > limit {
            return Err(EngineError::SizeLimit { width, height, limit });
        }
        let surface =
            self.fbos
                .create_from_existing_texture(&mut self.backend, texture, width, height, format)?;
        let mut pm = Pixmap::new(width, height, depth, Some(format), PixmapUsage::NoTexture);
        pm.surfaces.push(surface);
        Ok(self.pixmaps.insert(pm))
    }

    /// Makes a pixmap GPU resident.
    ///
    /// Resident pixmaps are left as they are, apart from attaching missing
    /// framebuffers. Otherwise every block is allocated or none is: on failure
    /// the pixmap stays unattached. New blocks receive the host image when
    /// there is one and are zero-filled otherwise.
    pub fn ensure_resident(&mut self, id: PixmapId, hint: ResidencyHint) -> Result<()> {
        let limit = self.tile_limit();
        let pm = self.pixmaps.get_mut(id)?;
        if pm.is_resident() {
            if !hint.contains(ResidencyHint::NO_FRAMEBUFFER) {
                for s in pm.surfaces.iter_mut() {
                    self.fbos.ensure_framebuffer(&mut self.backend, s)?;
                }
            }
            return Ok(());
        }

        match pm.usage() {
            PixmapUsage::CpuOnly => return Err(fallback("pixmap is CPU only")),
            PixmapUsage::NoTexture => return Err(fallback("pixmap has no texture attached")),
            PixmapUsage::Gpu => {}
        }
        let (width, height) = (pm.width(), pm.height());
        let format = pm.format().ok_or(EngineError::UnsupportedDepth(pm.depth()))?;
        if width > MAX_PIXMAP_EXTENT || height > MAX_PIXMAP_EXTENT {
            return Err(EngineError::SizeLimit { width, height, limit: MAX_PIXMAP_EXTENT });
        }
        let large = width > limit || height > limit;
        if large && hint.contains(ResidencyHint::NO_LARGE_TILING) {
            return Err(EngineError::SizeLimit { width, height, limit });
        }

        let no_fb = hint.contains(ResidencyHint::NO_FRAMEBUFFER);
        let fixup = hint.contains(ResidencyHint::FIXUP_ON_FAILURE);
        let mut tile = limit;
        let mut purged = false;
        let (grid, mut surfaces) = loop {
            let grid = BlockGrid::for_limit(width, height, tile);
            match allocate_blocks(&mut self.backend, &mut self.fbos, &grid, format, no_fb) {
                Ok(s) => break (grid, s),
                Err(e) if fixup && e.is_retryable() => {
                    if !purged {
                        purged = true;
                        if self.fbos.purge_pool(&mut self.backend) > 0 {
                            continue;
                        }
                    }
                    if large && tile / 2 >= MIN_FIXUP_TILE {
                        tile /= 2;
                        log::debug!("retrying {width}x{height} with {tile} pixel tiles");
                        continue;
                    }
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        };

        let pm = self.pixmaps.get_mut(id)?;
        let filled = match pm.host.as_ref() {
            Some(img) if img.format() != format => Err(EngineError::InvalidArgument(format!(
                "host image is {:?}, pixmap is {:?}",
                img.format(),
                format
            ))),
            Some(img) => surfaces.iter().enumerate().try_for_each(|(i, s)| {
                let b = grid.block_box(i);
                self.backend.upload(
                    s.texture(),
                    s.bounds(),
                    img.bytes_from(b.x1 as u32, b.y1 as u32),
                    img.stride(),
                )
            }),
            None => surfaces
                .iter_mut()
                .try_for_each(|s| self.fbos.clear(&mut self.backend, &mut self.programs, s)),
        };
        if let Err(e) = filled {
            for s in surfaces {
                self.fbos.discard(&mut self.backend, s);
            }
            return Err(e);
        }

        if grid.is_large() {
            log::debug!(
                "{width}x{height} pixmap resident as {}x{} blocks of {tile}",
                grid.cols(),
                grid.rows()
            );
        }
        // The GPU copy is authoritative from here on.
        pm.host = None;
        pm.grid = grid;
        pm.surfaces = surfaces;
        pm.current = 0;
        Ok(())
    }

    /// Gives a small pixmap `surface` as its backing, releasing any previous one.
    ///
    /// The surface must match the pixmap's size. On error it is released.
    pub fn attach(&mut self, id: PixmapId, surface: Surface) -> Result<()> {
        let pm = match self.pixmaps.get_mut(id) {
            Ok(pm) => pm,
            Err(e) => {
                self.fbos.destroy(&mut self.backend, Some(surface));
                return Err(e);
            }
        };
        let fits = surface.size() == (pm.width(), pm.height())
            && pm.format().is_none_or(|f| f == surface.format());
        if !fits {
            let err = EngineError::InvalidArgument(format!(
                "{}x{} {:?} surface for a {}x{} depth {} pixmap",
                surface.width(),
                surface.height(),
                surface.format(),
                pm.width(),
                pm.height(),
                pm.depth()
            ));
            self.fbos.destroy(&mut self.backend, Some(surface));
            return Err(err);
        }
        let old = pm.take_surfaces();
        pm.surfaces.push(surface);
        for s in old {
            self.fbos.destroy(&mut self.backend, Some(s));
        }
        Ok(())
    }

    /// Takes the backing away from a small pixmap, leaving it unattached.
    pub fn detach(&mut self, id: PixmapId) -> Result<Option<Surface>> {
        let pm = self.pixmaps.get_mut(id)?;
        if pm.is_large() {
            return Err(EngineError::InvalidArgument(
                "a tiled pixmap has no single surface to detach".into(),
            ));
        }
        Ok(pm.take_surfaces().pop())
    }

    /// Selects which block is current. Never allocates.
    pub fn set_current_block(&mut self, id: PixmapId, index: usize) -> Result<()> {
        let pm = self.pixmaps.get_mut(id)?;
        if index >= pm.block_count() {
            return Err(EngineError::InvalidArgument(format!(
                "block {index} of {}",
                pm.block_count()
            )));
        }
        pm.current = index;
        Ok(())
    }

    /// Exchanges the backing of two small pixmaps of the same size and format.
    pub fn swap_backing(&mut self, a: PixmapId, b: PixmapId) -> Result<()> {
        let (pa, pb) = self.pixmaps.get_pair_mut(a, b)?;
        if pa.is_large() || pb.is_large() {
            return Err(EngineError::InvalidArgument("cannot swap tiled backing".into()));
        }
        if (pa.width(), pa.height(), pa.format()) != (pb.width(), pb.height(), pb.format()) {
            return Err(EngineError::InvalidArgument(format!(
                "swap between {}x{} and {}x{}",
                pa.width(),
                pa.height(),
                pb.width(),
                pb.height()
            )));
        }
        std::mem::swap(&mut pa.surfaces, &mut pb.surfaces);
        pa.current = 0;
        pb.current = 0;
        Ok(())
    }

    /// Removes a pixmap and releases its surfaces.
    pub fn destroy_pixmap(&mut self, id: PixmapId) -> Result<()> {
        let mut pm = self.pixmaps.remove(id)?;
        for s in pm.take_surfaces() {
            self.fbos.destroy(&mut self.backend, Some(s));
        }
        Ok(())
    }
}

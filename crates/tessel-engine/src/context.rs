use crate::config::EngineConfig;
use crate::coords::{IBox, Region};
use crate::device::{Backend, Capabilities, FramebufferId};
use crate::error::{EngineError, Result};
use crate::fbo::FboAllocator;
use crate::pixmap::{Pixmap, PixmapArena, PixmapId};
use crate::program::{AlphaMode, Define, Facet, Program, ProgramCache};
use crate::tiler::{ClipDirection, ClippedRegion, RepeatMode, compute_clipped_regions};

/// The rendering context every entry point goes through.
///
/// Owns the device, the pixmaps, the surface pool and the program cache.
/// It is single-owner: nothing in here is shared or locked.
pub struct RenderContext<B: Backend> {
    pub(crate) backend: B,
    pub(crate) caps: Capabilities,
    pub(crate) config: EngineConfig,
    pub(crate) pixmaps: PixmapArena,
    pub(crate) fbos: FboAllocator,
    pub(crate) programs: ProgramCache,
}

/// Render target of one block, copied out so the pixmap borrow can end.
#[derive(Debug, Copy, Clone)]
pub(crate) struct BlockTarget {
    pub framebuffer: FramebufferId,
    pub bounds: IBox,
    pub alpha_in_red: bool,
}

impl<B: Backend> RenderContext<B> {
    pub fn new(backend: B, config: EngineConfig) -> Self {
        let caps = backend.capabilities().clone();
        log::info!(
            "render context: max texture {}, shading {}, extensions {:?}, tile limit {}",
            caps.max_texture_size,
            caps.shading_version,
            caps.extensions,
            config
                .max_tile_size
                .map_or(caps.max_texture_size, |t| t.min(caps.max_texture_size)),
        );
        Self {
            fbos: FboAllocator::new(config.surface_pool_per_key, config.surface_pool_bytes),
            backend,
            caps,
            config,
            pixmaps: PixmapArena::new(),
            programs: ProgramCache::new(),
        }
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[inline]
    pub fn caps(&self) -> &Capabilities {
        &self.caps
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pixmap(&self, id: PixmapId) -> Result<&Pixmap> {
        self.pixmaps.get(id)
    }

    pub fn pixmap_mut(&mut self, id: PixmapId) -> Result<&mut Pixmap> {
        self.pixmaps.get_mut(id)
    }

    pub fn pixmap_count(&self) -> usize {
        self.pixmaps.len()
    }

    /// Largest block edge: the device maximum, lowered by `max_tile_size`.
    pub fn tile_limit(&self) -> u32 {
        let max = self.caps.max_texture_size;
        self.config.max_tile_size.map_or(max, |t| t.clamp(1, max))
    }

    /// Program for `prim × fill` with normal alpha and no version floor.
    pub fn build_or_get_program(
        &mut self,
        prim: &Facet,
        fill: &Facet,
        defines: &[Define<'_>],
    ) -> Result<Program> {
        self.program(prim, fill, AlphaMode::Normal, 0, defines)
    }

    pub fn program(
        &mut self,
        prim: &Facet,
        fill: &Facet,
        alpha: AlphaMode,
        min_version: u32,
        defines: &[Define<'_>],
    ) -> Result<Program> {
        self.programs
            .build_or_get(&mut self.backend, prim, fill, alpha, min_version, defines)
    }

    #[inline]
    pub fn program_compile_count(&self) -> usize {
        self.programs.compile_count()
    }

    pub fn pooled_surfaces(&self) -> usize {
        self.fbos.pooled_count()
    }

    /// Per-block pieces of `region` on a pixmap's current block layout.
    pub fn compute_clipped_regions(
        &self,
        id: PixmapId,
        region: &Region,
        mode: RepeatMode,
        dir: ClipDirection,
    ) -> Result<Vec<ClippedRegion>> {
        let pm = self.pixmaps.get(id)?;
        Ok(compute_clipped_regions(pm.grid(), region, mode, dir))
    }

    /// Framebuffer of block `index`, attached on first use.
    pub(crate) fn block_target(&mut self, id: PixmapId, index: usize) -> Result<BlockTarget> {
        let pm = self.pixmaps.get_mut(id)?;
        let bounds = pm
            .block_box(index)
            .ok_or_else(|| EngineError::InvalidArgument(format!("no block {index}")))?;
        let surface = pm
            .surface_mut(index)
            .ok_or_else(|| EngineError::InvalidArgument(format!("no block {index}")))?;
        let framebuffer = self.fbos.ensure_framebuffer(&mut self.backend, surface)?;
        Ok(BlockTarget {
            framebuffer,
            bounds,
            alpha_in_red: surface.alpha_in_red(),
        })
    }

    /// Releases every pixmap surface, pooled surface and program.
    ///
    /// Pixmaps stay in the arena, unattached. Safe to call more than once.
    pub fn teardown(&mut self) {
        let mut released = 0;
        for id in self.pixmaps.ids() {
            let Ok(pm) = self.pixmaps.get_mut(id) else { continue };
            for surface in pm.take_surfaces() {
                self.fbos.discard(&mut self.backend, surface);
                released += 1;
            }
        }
        let pooled = self.fbos.purge_pool(&mut self.backend);
        let programs = self.programs.len();
        self.programs.release_all(&mut self.backend);
        if released + pooled + programs > 0 {
            log::debug!(
                "teardown: {released} surfaces, {pooled} pooled, {programs} programs released"
            );
        }
    }
}

impl<B: Backend> Drop for RenderContext<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}

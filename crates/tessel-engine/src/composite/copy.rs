use crate::config::SelfCopyPolicy;
use crate::context::RenderContext;
use crate::coords::{IBox, Region};
use crate::device::{Backend, Capabilities, DrawCall, Extensions};
use crate::error::{Result, fallback};
use crate::pixmap::{PixmapId, PixmapUsage, ResidencyHint};
use crate::program::{AlphaMode, Facet, Uniform, facets};
use crate::tiler::{ClipDirection, RepeatMode, compute_clipped_regions};

use super::transfer::{read_blocks, write_blocks};

/// True when a copy within one pixmap must be staged through a temporary.
///
/// `bounds` is the destination extent; the source extent is `bounds`
/// moved by `(dx, dy)`. In-place copies need a texture barrier, a single
/// block and disjoint source and destination.
pub fn copy_needs_temp(
    policy: SelfCopyPolicy,
    caps: &Capabilities,
    large: bool,
    bounds: IBox,
    dx: i64,
    dy: i64,
) -> bool {
    match policy {
        SelfCopyPolicy::AlwaysTemp => true,
        SelfCopyPolicy::BarrierWhenDisjoint => {
            !caps.has(Extensions::TEXTURE_BARRIER)
                || large
                || bounds.intersect(bounds.translate(dx, dy)).is_some()
        }
    }
}

impl<B: Backend> RenderContext<B> {
    /// Copies `region` of `dst` from `src`: destination pixel `p` receives
    /// source pixel `p + (dx, dy)`.
    ///
    /// The region is clipped to both pixmaps. `dir` orders the per-block
    /// pieces for callers that care about overlap order.
    pub fn copy_area(
        &mut self,
        src: PixmapId,
        dst: PixmapId,
        region: &Region,
        dx: i64,
        dy: i64,
        dir: ClipDirection,
    ) -> Result<()> {
        let sp = self.pixmaps.get(src)?;
        let dp = self.pixmaps.get(dst)?;
        let Some(clip) = dp.bounds().intersect(sp.bounds().translate(-dx, -dy)) else {
            return Ok(());
        };
        let region = region.intersect_box(clip);
        if region.is_empty() {
            return Ok(());
        }
        if sp.depth() != dp.depth() || sp.format() != dp.format() {
            return Err(fallback("copy between different depths"));
        }

        if src == dst {
            return self.copy_within(src, &region, dx, dy, dir);
        }

        let on_gpu = |usage: PixmapUsage, resident: bool| resident || usage == PixmapUsage::Gpu;
        let src_gpu = on_gpu(sp.usage(), sp.is_resident());
        let dst_gpu = on_gpu(dp.usage(), dp.is_resident());
        match (src_gpu, dst_gpu) {
            (true, true) => {
                self.ensure_resident(src, ResidencyHint::NO_FRAMEBUFFER)?;
                self.ensure_resident(dst, ResidencyHint::empty())?;
                self.copy_gpu(src, dst, &region, dx, dy, dir)
            }
            (false, true) => {
                self.ensure_resident(dst, ResidencyHint::NO_FRAMEBUFFER)?;
                let sp = self.pixmaps.get(src)?;
                let img = sp.host().ok_or_else(|| fallback("CPU source has no host image"))?;
                let dp = self.pixmaps.get(dst)?;
                write_blocks(&mut self.backend, dp, &region, (-dx, -dy), img.data(), img.stride())
            }
            (true, false) => {
                self.ensure_resident(src, ResidencyHint::NO_FRAMEBUFFER)?;
                let (sp, dp) = self.pixmaps.get_pair_mut(src, dst)?;
                let img = dp
                    .host_mut()
                    .ok_or_else(|| fallback("CPU destination has no host image"))?;
                let stride = img.stride();
                read_blocks(
                    &mut self.backend,
                    sp,
                    &region.translated(dx, dy),
                    (dx, dy),
                    img.bytes_from_mut(0, 0),
                    stride,
                )
            }
            (false, false) => Err(fallback("neither side of the copy is on the GPU")),
        }
    }

    fn copy_within(
        &mut self,
        id: PixmapId,
        region: &Region,
        dx: i64,
        dy: i64,
        dir: ClipDirection,
    ) -> Result<()> {
        let pm = self.pixmaps.get(id)?;
        if pm.usage() == PixmapUsage::CpuOnly {
            return Err(fallback("self copy of a CPU pixmap"));
        }
        let depth = pm.depth();
        self.ensure_resident(id, ResidencyHint::empty())?;
        let large = self.pixmaps.get(id)?.is_large();
        let Some(ext) = region.extents() else { return Ok(()) };

        if !copy_needs_temp(self.config.self_copy, &self.caps, large, ext, dx, dy) {
            self.backend.texture_barrier();
            return self.copy_gpu(id, id, region, dx, dy, dir);
        }

        let tmp = self.create_pixmap(ext.width() as u32, ext.height() as u32, depth, PixmapUsage::Gpu)?;
        let staged = self
            .ensure_resident(tmp, ResidencyHint::FIXUP_ON_FAILURE)
            .and_then(|()| {
                let local = region.translated(-ext.x1, -ext.y1);
                self.copy_gpu(id, tmp, &local, ext.x1 + dx, ext.y1 + dy, dir)
            })
            .and_then(|()| self.copy_gpu(tmp, id, region, -ext.x1, -ext.y1, dir));
        self.destroy_pixmap(tmp)?;
        staged
    }

    /// Block-by-block copy between resident pixmaps.
    fn copy_gpu(
        &mut self,
        src: PixmapId,
        dst: PixmapId,
        region: &Region,
        dx: i64,
        dy: i64,
        dir: ClipDirection,
    ) -> Result<()> {
        let program = self.program(&facets::COPY_AREA, &Facet::IDENTITY, AlphaMode::Normal, 0, &[])?;
        let src_grid = *self.pixmaps.get(src)?.grid();
        let dst_grid = *self.pixmaps.get(dst)?.grid();

        for de in compute_clipped_regions(&dst_grid, region, RepeatMode::None, dir) {
            let target = self.block_target(dst, de.block)?;
            let bd = target.bounds;
            let from = de.region.translated(dx, dy);
            for se in compute_clipped_regions(&src_grid, &from, RepeatMode::None, dir) {
                let texture = self
                    .pixmaps
                    .get(src)?
                    .surface(se.block)
                    .ok_or_else(|| fallback("copy source is not resident"))?
                    .texture();
                let bs = src_grid.block_box(se.block);
                let mut u = program.uniforms();
                u.set(
                    Uniform::TargetInfo,
                    [
                        bd.width() as f32,
                        bd.height() as f32,
                        if target.alpha_in_red { 1.0 } else { 0.0 },
                        0.0,
                    ],
                )
                .set(
                    Uniform::FillOffset,
                    [(bd.x1 + dx - bs.x1) as f32, (bd.y1 + dy - bs.y1) as f32, 0.0, 0.0],
                );
                let rects: Vec<IBox> = se
                    .region
                    .boxes()
                    .iter()
                    .map(|r| r.translate(-dx - bd.x1, -dy - bd.y1))
                    .collect();
                self.backend.draw(&DrawCall {
                    program: program.handle,
                    target: target.framebuffer,
                    blend: None,
                    scissor: Some(bs.translate(-dx - bd.x1, -dy - bd.y1)),
                    uniforms: u.as_bytes(),
                    source: Some(texture),
                    mask: None,
                    rects: &rects,
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::device::SoftBackend;
    use crate::error::ErrorKind;

    fn ctx_with(caps: Capabilities, policy: SelfCopyPolicy) -> RenderContext<SoftBackend> {
        let config = EngineConfig { self_copy: policy, ..EngineConfig::default() };
        RenderContext::new(SoftBackend::new(caps), config)
    }

    fn ctx(max: u32) -> RenderContext<SoftBackend> {
        let caps = Capabilities { max_texture_size: max, ..Capabilities::default() };
        ctx_with(caps, SelfCopyPolicy::AlwaysTemp)
    }

    /// `w × 1` pixmap whose pixel `x` has red `x + 1`.
    fn ramp(ctx: &mut RenderContext<SoftBackend>, w: u32, usage: PixmapUsage) -> PixmapId {
        let id = ctx.create_pixmap(w, 1, 32, usage).unwrap();
        let data: Vec<u8> = (0..w).flat_map(|x| [x as u8 + 1, 0, 0, 255]).collect();
        ctx.upload(id, &Region::from_box(IBox::from_size(w, 1)), &data, w as usize * 4)
            .unwrap();
        id
    }

    fn reds(ctx: &mut RenderContext<SoftBackend>, id: PixmapId) -> Vec<u8> {
        let w = ctx.pixmap(id).unwrap().width();
        let mut out = vec![0u8; w as usize * 4];
        ctx.download(id, &Region::from_box(IBox::from_size(w, 1)), &mut out, w as usize * 4)
            .unwrap();
        out.chunks(4).map(|p| p[0]).collect()
    }

    // ── temp decision ───────────────────────────────────────────────────

    #[test]
    fn in_place_needs_barrier_and_disjoint_boxes() {
        let with_barrier = Capabilities {
            extensions: Extensions::CLEAR_TEXTURE | Extensions::TEXTURE_BARRIER,
            ..Capabilities::default()
        };
        let b = IBox::new(0, 0, 10, 10);
        let policy = SelfCopyPolicy::BarrierWhenDisjoint;
        assert!(!copy_needs_temp(policy, &with_barrier, false, b, 20, 0));
        assert!(copy_needs_temp(policy, &with_barrier, false, b, 5, 5));
        assert!(copy_needs_temp(policy, &with_barrier, true, b, 20, 0));
        assert!(copy_needs_temp(policy, &Capabilities::default(), false, b, 20, 0));
        assert!(copy_needs_temp(SelfCopyPolicy::AlwaysTemp, &with_barrier, false, b, 20, 0));
    }

    // ── GPU to GPU ──────────────────────────────────────────────────────

    #[test]
    fn copy_between_tiled_pixmaps() {
        let mut ctx = ctx(4);
        let src = ramp(&mut ctx, 10, PixmapUsage::Gpu);
        let dst = ctx.create_pixmap(10, 1, 32, PixmapUsage::Gpu).unwrap();
        // dst[x] = src[x + 3] for x in 0..7.
        ctx.copy_area(src, dst, &Region::from_box(IBox::from_size(10, 1)), 3, 0, ClipDirection::empty())
            .unwrap();
        assert_eq!(reds(&mut ctx, dst), vec![4, 5, 6, 7, 8, 9, 10, 0, 0, 0]);
    }

    #[test]
    fn overlapping_self_copy_goes_through_a_temporary() {
        let mut ctx = ctx(4);
        let id = ramp(&mut ctx, 8, PixmapUsage::Gpu);
        let live = ctx.backend().live_textures();
        // Shift right by two: dst[x] = src[x - 2].
        ctx.copy_area(id, id, &Region::from_box(IBox::new(2, 0, 8, 1)), -2, 0, ClipDirection::empty())
            .unwrap();
        assert_eq!(reds(&mut ctx, id), vec![1, 2, 1, 2, 3, 4, 5, 6]);
        assert_eq!(ctx.backend().live_textures(), live + ctx.pooled_surfaces());
        assert_eq!(ctx.pixmap_count(), 1);
    }

    #[test]
    fn disjoint_self_copy_uses_the_barrier() {
        let caps = Capabilities {
            extensions: Extensions::CLEAR_TEXTURE | Extensions::TEXTURE_BARRIER,
            ..Capabilities::default()
        };
        let mut ctx = ctx_with(caps, SelfCopyPolicy::BarrierWhenDisjoint);
        let id = ramp(&mut ctx, 8, PixmapUsage::Gpu);
        ctx.copy_area(id, id, &Region::from_box(IBox::new(0, 0, 3, 1)), 4, 0, ClipDirection::empty())
            .unwrap();
        assert_eq!(reds(&mut ctx, id), vec![5, 6, 7, 4, 5, 6, 7, 8]);
        assert_eq!(ctx.backend().stats().barriers, 1);
        assert_eq!(ctx.pixmap_count(), 1);
    }

    // ── CPU paths ───────────────────────────────────────────────────────

    #[test]
    fn cpu_source_is_uploaded() {
        let mut ctx = ctx(4);
        let src = ramp(&mut ctx, 6, PixmapUsage::CpuOnly);
        let dst = ctx.create_pixmap(6, 1, 32, PixmapUsage::Gpu).unwrap();
        ctx.copy_area(src, dst, &Region::from_box(IBox::new(2, 0, 6, 1)), -2, 0, ClipDirection::empty())
            .unwrap();
        assert!(ctx.pixmap(dst).unwrap().is_resident());
        assert_eq!(reds(&mut ctx, dst), vec![0, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn cpu_destination_is_downloaded_into() {
        let mut ctx = ctx(4);
        let src = ramp(&mut ctx, 6, PixmapUsage::Gpu);
        let dst = ctx.create_pixmap(6, 1, 32, PixmapUsage::CpuOnly).unwrap();
        ctx.copy_area(src, dst, &Region::from_box(IBox::from_size(6, 1)), 1, 0, ClipDirection::empty())
            .unwrap();
        assert!(!ctx.pixmap(dst).unwrap().is_resident());
        assert_eq!(reds(&mut ctx, dst), vec![2, 3, 4, 5, 6, 0]);
    }

    #[test]
    fn depth_mismatch_falls_back() {
        let mut ctx = ctx(64);
        let a = ctx.create_pixmap(4, 4, 32, PixmapUsage::Gpu).unwrap();
        let b = ctx.create_pixmap(4, 4, 8, PixmapUsage::Gpu).unwrap();
        let err = ctx
            .copy_area(a, b, &Region::from_box(IBox::from_size(4, 4)), 0, 0, ClipDirection::empty())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }
}

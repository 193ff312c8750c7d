use crate::composite::{Filter, OperandSlot, TextureBinding, Wrap};
use crate::context::RenderContext;
use crate::coords::{IBox, Transform};
use crate::device::{Backend, DrawCall, TextureId};
use crate::error::{EngineError, Result};
use crate::fbo::Surface;
use crate::pixmap::PixmapId;
use crate::program::{AlphaMode, Uniform, facets};

use super::ClippedRegion;

/// Footprint of a tiled operand gathered into one surface.
#[derive(Debug)]
pub(crate) struct Merged {
    pub surface: Surface,
    /// Plane coordinate of texel `(0, 0)`.
    pub origin: (i64, i64),
}

struct Piece {
    texture: TextureId,
    size: (u32, u32),
    alpha_in_red: bool,
    wrap: Wrap,
    to_block: Transform,
    rects: Vec<IBox>,
}

impl<B: Backend> RenderContext<B> {
    /// Copies the pixels of `entries` into a temporary surface spanning their
    /// union, mirrored copies already flipped.
    ///
    /// Out-of-memory while allocating the temporary purges the surface pool
    /// and retries once; a second failure is reported as
    /// [`EngineError::MergeAllocation`]. Nothing is left allocated on failure.
    pub(crate) fn merge_clipped_regions(
        &mut self,
        id: PixmapId,
        entries: &[ClippedRegion],
    ) -> Result<Merged> {
        let ext = entries
            .iter()
            .filter_map(|e| e.region.extents())
            .reduce(IBox::union_extent)
            .ok_or_else(|| EngineError::InvalidArgument("merge of empty regions".into()))?;

        let pm = self.pixmaps.get(id)?;
        let format = pm.format().ok_or(EngineError::UnsupportedDepth(pm.depth()))?;
        let grid = *pm.grid();
        let mut covered = 0;
        let mut pieces = Vec::with_capacity(entries.len());
        for e in entries {
            let s = pm.surface(e.block).ok_or(EngineError::Fallback("merge source not resident"))?;
            covered += e.region.area();
            pieces.push(Piece {
                texture: s.texture(),
                size: s.size(),
                alpha_in_red: s.alpha_in_red(),
                wrap: Wrap::for_repeat(e.sampler_repeat),
                to_block: e.to_block(&grid),
                rects: e
                    .region
                    .boxes()
                    .iter()
                    .map(|b| b.translate(-ext.x1, -ext.y1))
                    .collect(),
            });
        }

        let (width, height) = (ext.width() as u32, ext.height() as u32);
        let created = match self.fbos.create(&mut self.backend, width, height, format, false) {
            Err(EngineError::OutOfMemory { .. }) if self.fbos.purge_pool(&mut self.backend) > 0 => {
                log::debug!("retrying {width}x{height} merge after purging the surface pool");
                self.fbos.create(&mut self.backend, width, height, format, false)
            }
            other => other,
        };
        let mut surface = created
            .map_err(|e| match e {
                EngineError::OutOfMemory { .. } => EngineError::MergeAllocation { width, height },
                other => other,
            })?;
        log::debug!("merging {} block pieces into {width}x{height}", pieces.len());

        let filled = self.draw_pieces(&mut surface, ext, covered < ext.area(), &pieces);
        match filled {
            Ok(()) => Ok(Merged {
                surface,
                origin: (ext.x1, ext.y1),
            }),
            Err(e) => {
                self.fbos.destroy(&mut self.backend, Some(surface));
                Err(e)
            }
        }
    }

    fn draw_pieces(
        &mut self,
        surface: &mut Surface,
        ext: IBox,
        needs_clear: bool,
        pieces: &[Piece],
    ) -> Result<()> {
        if needs_clear {
            self.fbos.clear(&mut self.backend, &mut self.programs, surface)?;
        }
        let program = self.program(
            &facets::COMPOSITE_RECT,
            &facets::RENDER_PICTURE,
            AlphaMode::Normal,
            0,
            &[],
        )?;
        let target = self.fbos.ensure_framebuffer(&mut self.backend, surface)?;
        let target_info = [
            surface.width() as f32,
            surface.height() as f32,
            if surface.alpha_in_red() { 1.0 } else { 0.0 },
            0.0,
        ];

        for p in pieces {
            let binding = TextureBinding {
                texture: p.texture,
                size: p.size,
                matrix: p.to_block,
                wrap: p.wrap,
                filter: Filter::Nearest,
                bounds: None,
                alpha_in_red: p.alpha_in_red,
            };
            let mut u = program.uniforms();
            u.set(Uniform::TargetInfo, target_info);
            binding.write(&mut u, OperandSlot::Source, (ext.x1, ext.y1));
            self.backend.draw(&DrawCall {
                program: program.handle,
                target,
                blend: None,
                scissor: None,
                uniforms: u.as_bytes(),
                source: Some(p.texture),
                mask: None,
                rects: &p.rects,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::context::RenderContext;
    use crate::coords::{IBox, Region};
    use crate::device::{Capabilities, PixelFormat, PixelTransfer, SoftBackend};
    use crate::error::EngineError;
    use crate::pixmap::{PixmapUsage, ResidencyHint};
    use crate::tiler::{ClipDirection, RepeatMode, compute_clipped_regions};

    /// 8x1 pixmap in 4-pixel blocks; pixel `x` has red `x * 10 + 10`.
    fn striped(ctx: &mut RenderContext<SoftBackend>) -> crate::pixmap::PixmapId {
        let id = ctx.create_pixmap(8, 1, 32, PixmapUsage::Gpu).unwrap();
        ctx.ensure_resident(id, ResidencyHint::empty()).unwrap();
        for block in 0..2 {
            let tex = ctx.pixmap(id).unwrap().surface(block).unwrap().texture();
            let px: Vec<u8> = (0..4)
                .flat_map(|i| [(block * 4 + i) as u8 * 10 + 10, 0, 0, 255])
                .collect();
            ctx.backend_mut().upload(tex, IBox::new(0, 0, 4, 1), &px, 16).unwrap();
        }
        id
    }

    fn ctx() -> RenderContext<SoftBackend> {
        let caps = Capabilities { max_texture_size: 4, ..Capabilities::default() };
        RenderContext::new(SoftBackend::new(caps), EngineConfig::default())
    }

    fn reds(ctx: &RenderContext<SoftBackend>, merged: &super::Merged) -> Vec<u8> {
        let tex = ctx.backend().texture(merged.surface.texture()).unwrap();
        (0..tex.width).map(|x| tex.texel_bytes(x, 0)[0]).collect()
    }

    #[test]
    fn straddling_footprint_is_gathered() {
        let mut ctx = ctx();
        let id = striped(&mut ctx);
        let grid = *ctx.pixmap(id).unwrap().grid();
        let entries = compute_clipped_regions(
            &grid,
            &Region::from_box(IBox::new(2, 0, 6, 1)),
            RepeatMode::None,
            ClipDirection::empty(),
        );
        assert_eq!(entries.len(), 2);

        let merged = ctx.merge_clipped_regions(id, &entries).unwrap();
        assert_eq!(merged.origin, (2, 0));
        assert_eq!(reds(&ctx, &merged), vec![30, 40, 50, 60]);
    }

    #[test]
    fn reflected_copies_are_written_flipped() {
        let mut ctx = ctx();
        let id = striped(&mut ctx);
        let grid = *ctx.pixmap(id).unwrap().grid();
        // Plane pixels 6..10: 6, 7 from the base tile, then 7, 6 mirrored.
        let entries = compute_clipped_regions(
            &grid,
            &Region::from_box(IBox::new(6, 0, 10, 1)),
            RepeatMode::Reflect,
            ClipDirection::empty(),
        );
        let merged = ctx.merge_clipped_regions(id, &entries).unwrap();
        assert_eq!(merged.origin, (6, 0));
        assert_eq!(reds(&ctx, &merged), vec![70, 80, 80, 70]);
    }

    #[test]
    fn exhausted_merge_is_a_partial_merge_error() {
        let mut ctx = ctx();
        let id = striped(&mut ctx);
        let grid = *ctx.pixmap(id).unwrap().grid();
        let entries = compute_clipped_regions(
            &grid,
            &Region::from_box(IBox::new(1, 0, 5, 1)),
            RepeatMode::None,
            ClipDirection::empty(),
        );
        let live = ctx.backend().live_textures();
        ctx.backend_mut().fail_next_allocations(1);
        let err = ctx.merge_clipped_regions(id, &entries).unwrap_err();
        assert!(matches!(err, EngineError::MergeAllocation { width: 4, height: 1 }));
        assert!(err.is_retryable());
        assert_eq!(ctx.backend().live_textures(), live);
    }

    #[test]
    fn merge_purges_the_pool_and_retries_once() {
        let mut ctx = ctx();
        let id = striped(&mut ctx);
        let spare = ctx.fbos.create(&mut ctx.backend, 2, 2, PixelFormat::Rgba8, true).unwrap();
        ctx.fbos.destroy(&mut ctx.backend, Some(spare));
        assert_eq!(ctx.fbos.pooled_count(), 1);

        let grid = *ctx.pixmap(id).unwrap().grid();
        let entries = compute_clipped_regions(
            &grid,
            &Region::from_box(IBox::new(1, 0, 5, 1)),
            RepeatMode::None,
            ClipDirection::empty(),
        );
        ctx.backend_mut().fail_next_allocations(1);
        let merged = ctx.merge_clipped_regions(id, &entries).unwrap();
        assert_eq!(ctx.fbos.pooled_count(), 0);
        assert_eq!(reds(&ctx, &merged), vec![20, 30, 40, 50]);
    }
}

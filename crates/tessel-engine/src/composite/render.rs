use crate::context::{BlockTarget, RenderContext};
use crate::coords::{Color, IBox, Region, Transform};
use crate::device::{Backend, DrawCall, Extensions, FramebufferId, PixelFormat, ProgramHandle, TextureId};
use crate::error::{Result, fallback};
use crate::fbo::Surface;
use crate::pixmap::ResidencyHint;
use crate::program::{
    AlphaMode, BlendState, CompositeOp, Uniform, blend_for, depth_has_alpha, facets,
};
use crate::tiler::{
    ClipDirection, RepeatMode, compute_clipped_regions, compute_clipped_regions_ext,
    transform_block_size,
};

use super::{Binding, CompositeRequest, Filter, OperandSlot, Picture, TextureBinding, Wrap};

/// A fully prepared draw; executing it cannot fail for planning reasons.
struct PreparedDraw {
    program: ProgramHandle,
    target: FramebufferId,
    blend: Option<BlendState>,
    uniforms: Vec<u8>,
    source: Option<TextureId>,
    mask: Option<TextureId>,
    rects: Vec<IBox>,
}

/// Source and mask over one destination piece, after folding.
struct Pair {
    target: BlockTarget,
    region: Region,
    source: Binding,
    mask: Option<TextureBinding>,
}

fn premultiplied_scale(c: Color, k: [f32; 4]) -> Color {
    Color::new(c.r * k[0], c.g * k[1], c.b * k[2], c.a * k[3])
}

impl<B: Backend> RenderContext<B> {
    /// `dest = op(source × mask, dest)` over `req.region`.
    ///
    /// Every leaf, merge and program is prepared before the first draw, so a
    /// failure leaves the destination untouched. Temporaries are released on
    /// every path.
    pub fn composite_region(&mut self, req: &CompositeRequest<'_>) -> Result<()> {
        if req.source.pixmap_id() == Some(req.dest)
            || req.mask.and_then(|m| m.pixmap_id()) == Some(req.dest)
        {
            return Err(fallback("composite reads its own destination"));
        }

        self.ensure_resident(req.dest, ResidencyHint::empty())?;
        for pic in std::iter::once(req.source).chain(req.mask) {
            if let Some(id) = pic.pixmap_id() {
                self.ensure_resident(id, ResidencyHint::NO_FRAMEBUFFER)?;
            }
        }

        let dest = self.pixmaps.get(req.dest)?;
        let dest_grid = *dest.grid();
        let dest_alpha = depth_has_alpha(dest.depth());
        let region = req.region.intersect_box(dest_grid.bounds());
        if region.is_empty() {
            return Ok(());
        }

        let passes = self.alpha_passes(req.op, req.mask)?;
        let (bw, bh) = dest_grid.block_size();
        let mut fixed = (bw, bh);
        for pic in std::iter::once(req.source).chain(req.mask) {
            if let Some(limit) = self.footprint_block(pic)? {
                fixed = (fixed.0.min(limit.0), fixed.1.min(limit.1));
            }
        }
        let dest_entries = if fixed != (bw, bh) {
            compute_clipped_regions_ext(&dest_grid, &region, fixed.0, fixed.1, ClipDirection::empty())
        } else {
            compute_clipped_regions(&dest_grid, &region, RepeatMode::None, ClipDirection::empty())
        };

        let mut temps = Vec::new();
        let prepared = self.prepare_composite(req, &dest_entries, &passes, dest_alpha, &mut temps);
        let result = prepared.and_then(|draws| {
            for d in &draws {
                self.backend.draw(&DrawCall {
                    program: d.program,
                    target: d.target,
                    blend: d.blend,
                    scissor: None,
                    uniforms: &d.uniforms,
                    source: d.source,
                    mask: d.mask,
                    rects: &d.rects,
                })?;
            }
            Ok(())
        });
        for s in temps {
            self.fbos.destroy(&mut self.backend, Some(s));
        }
        result
    }

    fn alpha_passes(&self, op: CompositeOp, mask: Option<&Picture>) -> Result<Vec<AlphaMode>> {
        if !mask.is_some_and(|m| m.component_alpha) {
            return Ok(vec![AlphaMode::Normal]);
        }
        if self.caps.has(Extensions::DUAL_SOURCE_BLEND) {
            Ok(vec![AlphaMode::DualBlend])
        } else if op == CompositeOp::Over {
            Ok(vec![AlphaMode::CaFirst, AlphaMode::CaSecond])
        } else {
            Err(fallback("component alpha needs dual-source blending for this operator"))
        }
    }

    /// Destination block size that keeps a tiled operand's footprint within
    /// one of its blocks, when the operand needs the footprint path.
    fn footprint_block(&self, pic: &Picture) -> Result<Option<(u32, u32)>> {
        let Some(id) = pic.pixmap_id() else { return Ok(None) };
        let pm = self.pixmaps.get(id)?;
        if !pm.is_large() || (pic.transform.is_none() && pic.repeat != RepeatMode::Pad) {
            return Ok(None);
        }
        let (bw, bh) = pm.grid().block_size();
        let t = pic.transform.unwrap_or(Transform::IDENTITY);
        transform_block_size(&t, bw, bh)
            .map(Some)
            .ok_or_else(|| fallback("transform leaves no usable block size"))
    }

    fn prepare_composite(
        &mut self,
        req: &CompositeRequest<'_>,
        dest_entries: &[crate::tiler::ClippedRegion],
        passes: &[AlphaMode],
        dest_alpha: bool,
        temps: &mut Vec<Surface>,
    ) -> Result<Vec<PreparedDraw>> {
        let ca = req.mask.is_some_and(|m| m.component_alpha);
        let mut pairs = Vec::new();
        for d in dest_entries {
            let target = self.block_target(req.dest, d.block)?;
            let sources = self.plan_operand(req.source, &d.region, req.src_offset, temps)?;
            let masks = match req.mask {
                Some(m) => Some(self.plan_operand(m, &d.region, req.mask_offset, temps)?),
                None => None,
            };
            for s in &sources {
                match &masks {
                    None => pairs.push(self.fold(target, s.region.clone(), s.binding, None, ca, temps)?),
                    Some(masks) => {
                        for m in masks {
                            let r = s.region.intersect(&m.region);
                            if !r.is_empty() {
                                pairs.push(self.fold(target, r, s.binding, Some(m.binding), ca, temps)?);
                            }
                        }
                    }
                }
            }
        }

        let mut draws = Vec::with_capacity(pairs.len() * passes.len());
        for p in &pairs {
            for &alpha in passes {
                draws.push(self.prepare_draw(req.op, p, alpha, dest_alpha)?);
            }
        }
        Ok(draws)
    }

    /// Replaces missing operands by transparency and folds solid masks.
    fn fold(
        &mut self,
        target: BlockTarget,
        region: Region,
        source: Binding,
        mask: Option<Binding>,
        component_alpha: bool,
        temps: &mut Vec<Surface>,
    ) -> Result<Pair> {
        let source = match source {
            Binding::Null => Binding::Solid(Color::TRANSPARENT),
            b => b,
        };
        let (source, mask) = match mask {
            None => (source, None),
            Some(Binding::Null) => (Binding::Solid(Color::TRANSPARENT), None),
            Some(Binding::Texture(m)) => (source, Some(m)),
            Some(Binding::Solid(mc)) => match source {
                Binding::Solid(sc) if !component_alpha => {
                    (Binding::Solid(premultiplied_scale(sc, [mc.a; 4])), None)
                }
                _ => (source, Some(self.solid_texture(mc, temps)?)),
            },
        };
        Ok(Pair { target, region, source, mask })
    }

    /// A 1x1 repeating texture holding `color`.
    fn solid_texture(&mut self, color: Color, temps: &mut Vec<Surface>) -> Result<TextureBinding> {
        let s = self.fbos.create(&mut self.backend, 1, 1, PixelFormat::Rgba8, true)?;
        let mut px = [0u8; 4];
        PixelFormat::Rgba8.encode(color.to_array(), &mut px);
        let binding = TextureBinding {
            texture: s.texture(),
            size: (1, 1),
            matrix: Transform::IDENTITY,
            wrap: Wrap::Repeat,
            filter: Filter::Nearest,
            bounds: None,
            alpha_in_red: false,
        };
        let uploaded = self.backend.upload(s.texture(), s.bounds(), &px, 4);
        temps.push(s);
        uploaded.map(|()| binding)
    }

    fn prepare_draw(
        &mut self,
        op: CompositeOp,
        p: &Pair,
        alpha: AlphaMode,
        dest_alpha: bool,
    ) -> Result<PreparedDraw> {
        let prim = if p.mask.is_some() {
            &facets::COMPOSITE_MASK_RECT
        } else {
            &facets::COMPOSITE_RECT
        };
        let fill = match &p.source {
            Binding::Texture(t) if t.is_1x1_repeat() => &facets::RENDER_1X1_PICTURE,
            Binding::Texture(_) => &facets::RENDER_PICTURE,
            _ => &facets::RENDER_SOLID,
        };
        let program = self.program(prim, fill, alpha, 0, &[])?;

        let b = p.target.bounds;
        let origin = (b.x1, b.y1);
        let mut u = program.uniforms();
        u.set(
            Uniform::TargetInfo,
            [
                b.width() as f32,
                b.height() as f32,
                if p.target.alpha_in_red { 1.0 } else { 0.0 },
                0.0,
            ],
        );
        let source = match &p.source {
            Binding::Texture(t) => {
                t.write(&mut u, OperandSlot::Source, origin);
                Some(t.texture)
            }
            Binding::Solid(c) => {
                u.set(Uniform::Fg, c.to_array());
                None
            }
            Binding::Null => None,
        };
        if let Some(m) = &p.mask {
            m.write(&mut u, OperandSlot::Mask, origin);
        }

        Ok(PreparedDraw {
            program: program.handle,
            target: p.target.framebuffer,
            blend: blend_for(op, alpha, dest_alpha, p.target.alpha_in_red),
            uniforms: u.as_bytes().to_vec(),
            source,
            mask: p.mask.map(|m| m.texture),
            rects: p.region.boxes().iter().map(|r| r.translate(-b.x1, -b.y1)).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::composite::{CompositeRequest, Filter, Picture};
    use crate::config::EngineConfig;
    use crate::context::RenderContext;
    use crate::coords::{Color, IBox, Region, Transform};
    use crate::device::{Capabilities, Extensions, SoftBackend};
    use crate::error::ErrorKind;
    use crate::pixmap::{PixmapId, PixmapUsage, ResidencyHint};
    use crate::program::CompositeOp;
    use crate::tiler::RepeatMode;

    fn ctx(caps: Capabilities) -> RenderContext<SoftBackend> {
        RenderContext::new(SoftBackend::new(caps), EngineConfig::default())
    }

    fn small() -> Capabilities {
        Capabilities { max_texture_size: 64, ..Capabilities::default() }
    }

    fn pixmap(ctx: &mut RenderContext<SoftBackend>, w: u32, h: u32, depth: u8) -> PixmapId {
        let id = ctx.create_pixmap(w, h, depth, PixmapUsage::Gpu).unwrap();
        ctx.ensure_resident(id, ResidencyHint::empty()).unwrap();
        id
    }

    fn fill(ctx: &mut RenderContext<SoftBackend>, id: PixmapId, px: [u8; 4]) {
        let pm = ctx.pixmap(id).unwrap();
        let (w, h) = (pm.width(), pm.height());
        let data: Vec<u8> = (0..w * h).flat_map(|_| px).collect();
        ctx.upload(id, &Region::from_box(IBox::from_size(w, h)), &data, w as usize * 4)
            .unwrap();
    }

    fn pixel(ctx: &mut RenderContext<SoftBackend>, id: PixmapId, x: i64, y: i64) -> [u8; 4] {
        let mut out = [0u8; 4];
        ctx.download(id, &Region::from_box(IBox::new(x, y, x + 1, y + 1)), &mut out, 4)
            .unwrap();
        out
    }

    fn request<'a>(
        op: CompositeOp,
        source: &'a Picture,
        mask: Option<&'a Picture>,
        dest: PixmapId,
        region: &'a Region,
    ) -> CompositeRequest<'a> {
        CompositeRequest {
            op,
            source,
            mask,
            dest,
            region,
            src_offset: (0, 0),
            mask_offset: (0, 0),
        }
    }

    // ── solid operands ─────────────────────────────────────────────────

    #[test]
    fn solid_over_blends() {
        let mut ctx = ctx(small());
        let dst = pixmap(&mut ctx, 4, 4, 32);
        fill(&mut ctx, dst, [0, 0, 255, 255]);
        let src = Picture::solid(Color::new(0.5, 0.0, 0.0, 0.5));
        let r = Region::from_box(IBox::new(1, 1, 3, 3));
        ctx.composite_region(&request(CompositeOp::Over, &src, None, dst, &r)).unwrap();
        assert_eq!(pixel(&mut ctx, dst, 1, 1), [128, 0, 128, 255]);
        assert_eq!(pixel(&mut ctx, dst, 0, 0), [0, 0, 255, 255]);
    }

    #[test]
    fn solid_mask_is_folded_into_solid_source() {
        let mut ctx = ctx(small());
        let dst = pixmap(&mut ctx, 2, 2, 32);
        let src = Picture::solid(Color::white());
        let mask = Picture::solid(Color::new(0.0, 0.0, 0.0, 0.5));
        let r = Region::from_box(IBox::from_size(2, 2));
        let live = ctx.backend().live_textures();
        ctx.composite_region(&request(CompositeOp::Src, &src, Some(&mask), dst, &r))
            .unwrap();
        assert_eq!(pixel(&mut ctx, dst, 1, 1), [128, 128, 128, 128]);
        assert_eq!(ctx.backend().live_textures(), live);
    }

    // ── texture operands ────────────────────────────────────────────────

    #[test]
    fn repeating_source_tiles_the_destination() {
        let mut ctx = ctx(small());
        let src = pixmap(&mut ctx, 2, 1, 32);
        let data = [10, 0, 0, 255, 20, 0, 0, 255];
        ctx.upload(src, &Region::from_box(IBox::from_size(2, 1)), &data, 8).unwrap();
        let dst = pixmap(&mut ctx, 6, 1, 32);
        let pic = Picture::pixmap(src).with_repeat(RepeatMode::Normal);
        let r = Region::from_box(IBox::from_size(6, 1));
        ctx.composite_region(&request(CompositeOp::Src, &pic, None, dst, &r)).unwrap();
        let reds: Vec<u8> = (0..6).map(|x| pixel(&mut ctx, dst, x, 0)[0]).collect();
        assert_eq!(reds, vec![10, 20, 10, 20, 10, 20]);
    }

    #[test]
    fn tiled_source_and_destination() {
        let caps = Capabilities { max_texture_size: 4, ..Capabilities::default() };
        let mut ctx = ctx(caps);
        let src = pixmap(&mut ctx, 8, 2, 32);
        let data: Vec<u8> = (0..16u8).flat_map(|i| [i * 10, 0, 0, 255]).collect();
        ctx.upload(src, &Region::from_box(IBox::from_size(8, 2)), &data, 32).unwrap();
        let dst = pixmap(&mut ctx, 8, 2, 32);
        let pic = Picture::pixmap(src).with_transform(Transform::translate(1.0, 0.0));
        let r = Region::from_box(IBox::from_size(7, 2));
        ctx.composite_region(&request(CompositeOp::Src, &pic, None, dst, &r)).unwrap();
        for x in 0..7 {
            assert_eq!(pixel(&mut ctx, dst, x, 1)[0], (8 + x as u8 + 1) * 10, "x = {x}");
        }
        // Merge temporaries went back to the pool or the device.
        assert_eq!(
            ctx.backend().live_textures(),
            2 * 2 + ctx.pooled_surfaces()
        );
    }

    #[test]
    fn alpha_mask_texture_modulates_source() {
        let mut ctx = ctx(small());
        let dst = pixmap(&mut ctx, 2, 1, 32);
        let mask = pixmap(&mut ctx, 2, 1, 8);
        ctx.upload(mask, &Region::from_box(IBox::from_size(2, 1)), &[255, 51], 2).unwrap();
        let src = Picture::solid(Color::new(0.0, 1.0, 0.0, 1.0));
        let m = Picture::pixmap(mask).with_filter(Filter::Nearest);
        let r = Region::from_box(IBox::from_size(2, 1));
        ctx.composite_region(&request(CompositeOp::Src, &src, Some(&m), dst, &r)).unwrap();
        assert_eq!(pixel(&mut ctx, dst, 0, 0), [0, 255, 0, 255]);
        assert_eq!(pixel(&mut ctx, dst, 1, 0), [0, 51, 0, 51]);
    }

    #[test]
    fn eight_bit_destination_keeps_alpha_in_red() {
        let mut ctx = ctx(small());
        let dst = pixmap(&mut ctx, 1, 1, 8);
        let src = Picture::solid(Color::new(0.2, 0.2, 0.2, 0.4));
        let r = Region::from_box(IBox::from_size(1, 1));
        ctx.composite_region(&request(CompositeOp::Src, &src, None, dst, &r)).unwrap();
        let mut out = [0u8; 1];
        ctx.download(dst, &r, &mut out, 1).unwrap();
        assert_eq!(out, [102]);
    }

    // ── component alpha ─────────────────────────────────────────────────

    fn ca_over(caps: Capabilities) -> [u8; 4] {
        let mut ctx = ctx(caps);
        let dst = pixmap(&mut ctx, 1, 1, 32);
        fill(&mut ctx, dst, [255, 255, 255, 255]);
        let mask = pixmap(&mut ctx, 1, 1, 32);
        fill(&mut ctx, mask, [255, 0, 0, 255]);
        let src = Picture::solid(Color::black());
        let m = Picture::pixmap(mask).with_component_alpha(true);
        let r = Region::from_box(IBox::from_size(1, 1));
        ctx.composite_region(&request(CompositeOp::Over, &src, Some(&m), dst, &r)).unwrap();
        pixel(&mut ctx, dst, 0, 0)
    }

    #[test]
    fn component_alpha_two_pass_and_dual_source_agree() {
        let two_pass = ca_over(small());
        let dual = ca_over(Capabilities {
            extensions: Extensions::CLEAR_TEXTURE | Extensions::DUAL_SOURCE_BLEND,
            ..small()
        });
        // Black through a red-only mask darkens only red.
        assert_eq!(two_pass, [0, 255, 255, 255]);
        assert_eq!(dual, two_pass);
    }

    #[test]
    fn component_alpha_needs_dual_source_for_other_ops() {
        let mut ctx = ctx(small());
        let dst = pixmap(&mut ctx, 1, 1, 32);
        let mask = pixmap(&mut ctx, 1, 1, 32);
        let src = Picture::solid(Color::black());
        let m = Picture::pixmap(mask).with_component_alpha(true);
        let r = Region::from_box(IBox::from_size(1, 1));
        let err = ctx
            .composite_region(&request(CompositeOp::Add, &src, Some(&m), dst, &r))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    // ── rejection and atomicity ─────────────────────────────────────────

    #[test]
    fn reading_the_destination_is_declined() {
        let mut ctx = ctx(small());
        let dst = pixmap(&mut ctx, 4, 4, 32);
        let pic = Picture::pixmap(dst);
        let r = Region::from_box(IBox::from_size(4, 4));
        let err = ctx
            .composite_region(&request(CompositeOp::Over, &pic, None, dst, &r))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn failed_merge_leaves_destination_untouched() {
        let caps = Capabilities { max_texture_size: 4, ..Capabilities::default() };
        let mut ctx = ctx(caps);
        // 4x4 blocks; the footprint of the translated 2x2 read straddles
        // the seam at x = 4, so the composite has to merge.
        let src = pixmap(&mut ctx, 8, 8, 32);
        fill(&mut ctx, src, [200, 0, 0, 255]);
        let dst = pixmap(&mut ctx, 2, 2, 32);
        fill(&mut ctx, dst, [1, 2, 3, 4]);
        let pic = Picture::pixmap(src).with_transform(Transform::translate(3.0, 0.0));
        let r = Region::from_box(IBox::from_size(2, 2));
        let draws = ctx.backend().stats().draws;

        ctx.backend_mut().fail_next_allocations(1);
        let err = ctx
            .composite_region(&request(CompositeOp::Src, &pic, None, dst, &r))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PartialMerge);
        assert_eq!(ctx.backend().stats().draws, draws);
        assert_eq!(pixel(&mut ctx, dst, 0, 0), [1, 2, 3, 4]);
        assert_eq!(pixel(&mut ctx, dst, 1, 1), [1, 2, 3, 4]);
    }
}

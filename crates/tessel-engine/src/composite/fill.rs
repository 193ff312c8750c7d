use crate::context::RenderContext;
use crate::coords::{Color, Region};
use crate::device::{Backend, DrawCall};
use crate::error::Result;
use crate::pixmap::{PixmapId, ResidencyHint};
use crate::program::{AlphaMode, Uniform, facets};
use crate::tiler::{ClipDirection, RepeatMode, compute_clipped_regions};

impl<B: Backend> RenderContext<B> {
    /// Writes `color` over `region`, unblended.
    pub fn fill_solid(&mut self, id: PixmapId, region: &Region, color: Color) -> Result<()> {
        self.ensure_resident(id, ResidencyHint::empty())?;
        let pm = self.pixmaps.get(id)?;
        let grid = *pm.grid();
        let region = region.intersect_box(grid.bounds());
        if region.is_empty() {
            return Ok(());
        }

        let prim = if self.caps.supports_instancing() {
            &facets::POLY_FILL_RECT
        } else {
            &facets::POLY_FILL_RECT_120
        };
        let program = self.program(prim, &facets::SOLID, AlphaMode::Normal, 0, &[])?;

        for e in compute_clipped_regions(&grid, &region, RepeatMode::None, ClipDirection::empty()) {
            let target = self.block_target(id, e.block)?;
            let b = target.bounds;
            let mut u = program.uniforms();
            u.set(
                Uniform::TargetInfo,
                [
                    b.width() as f32,
                    b.height() as f32,
                    if target.alpha_in_red { 1.0 } else { 0.0 },
                    0.0,
                ],
            )
            .set(Uniform::Fg, color.for_target(target.alpha_in_red).to_array());
            let rects: Vec<_> = e.region.boxes().iter().map(|r| r.translate(-b.x1, -b.y1)).collect();
            self.backend.draw(&DrawCall {
                program: program.handle,
                target: target.framebuffer,
                blend: None,
                scissor: None,
                uniforms: u.as_bytes(),
                source: None,
                mask: None,
                rects: &rects,
            })?;
        }
        Ok(())
    }
}

use crate::context::RenderContext;
use crate::coords::{IBox, Region, Transform};
use crate::device::Backend;
use crate::error::{Result, fallback};
use crate::fbo::Surface;
use crate::pixmap::PixmapId;
use crate::tiler::{
    BlockGrid, ClipDirection, ClippedRegion, RepeatMode, compute_clipped_regions,
    compute_transform_clipped_regions,
};

use super::{Binding, Picture, PictureSource, TextureBinding, Wrap};

/// One piece of the destination and what an operand supplies over it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Leaf {
    pub region: Region,
    pub binding: Binding,
}

impl Leaf {
    fn null(region: &Region) -> Self {
        Leaf {
            region: region.clone(),
            binding: Binding::Null,
        }
    }
}

/// Texture binding of one block entry, or a fallback when it is not resident.
fn block_binding(
    grid: &BlockGrid,
    surface: Option<&Surface>,
    entry: &ClippedRegion,
    to_plane: &Transform,
    picture: &Picture,
    bounded: bool,
) -> Result<TextureBinding> {
    let s = surface.ok_or_else(|| fallback("operand block is not resident"))?;
    Ok(TextureBinding {
        texture: s.texture(),
        size: s.size(),
        matrix: to_plane.then(&entry.to_block(grid)),
        wrap: Wrap::for_repeat(entry.sampler_repeat),
        filter: picture.filter,
        bounds: bounded.then(|| IBox::from_size(s.width(), s.height())),
        alpha_in_red: s.alpha_in_red(),
    })
}

impl<B: Backend> RenderContext<B> {
    /// Splits `region` (destination coordinates) by what `picture` supplies.
    ///
    /// The leaves partition `region`. A small pixmap is sampled directly with
    /// the wrap mode doing the repeat. A tiled one is clipped against its
    /// blocks; when a single leaf's footprint covers several blocks they are
    /// merged into a temporary, which is pushed to `temps`.
    pub(crate) fn plan_operand(
        &mut self,
        picture: &Picture,
        region: &Region,
        offset: (i64, i64),
        temps: &mut Vec<Surface>,
    ) -> Result<Vec<Leaf>> {
        let id = match picture.source {
            PictureSource::Solid(c) => {
                return Ok(vec![Leaf {
                    region: region.clone(),
                    binding: Binding::Solid(c),
                }]);
            }
            PictureSource::Pixmap(id) => id,
        };
        let pm = self.pixmaps.get(id)?;
        let grid = *pm.grid();
        let mode = picture.repeat;
        let to_picture = Transform::translate(offset.0 as f64, offset.1 as f64);
        let to_plane = match &picture.transform {
            Some(t) => to_picture.then(t),
            None => to_picture,
        };

        if !pm.is_large() {
            let s = pm.surface(0).ok_or_else(|| fallback("operand is not resident"))?;
            let wrap = Wrap::for_repeat(mode);
            let bounds = (mode == RepeatMode::None).then(|| grid.bounds());
            return Ok(vec![Leaf {
                region: region.clone(),
                binding: Binding::Texture(TextureBinding {
                    texture: s.texture(),
                    size: s.size(),
                    matrix: to_plane,
                    wrap,
                    filter: picture.filter,
                    bounds,
                    alpha_in_red: s.alpha_in_red(),
                }),
            }]);
        }

        // Pad needs the merge path so edge pixels extend past the pixmap.
        if picture.transform.is_none() && mode != RepeatMode::Pad {
            let src = region.translated(offset.0, offset.1);
            let entries = compute_clipped_regions(&grid, &src, mode, ClipDirection::empty());
            let mut leaves = Vec::with_capacity(entries.len() + 1);
            let mut covered = Region::new();
            for e in &entries {
                let binding = block_binding(&grid, pm.surface(e.block), e, &to_plane, picture, false)?;
                let r = e.region.translated(-offset.0, -offset.1);
                covered = covered.union(&r);
                leaves.push(Leaf {
                    region: r,
                    binding: Binding::Texture(binding),
                });
            }
            let rest = region.subtract(&covered);
            if !rest.is_empty() {
                leaves.push(Leaf::null(&rest));
            }
            return Ok(leaves);
        }

        let t = picture.transform.unwrap_or(Transform::IDENTITY);
        let entries = compute_transform_clipped_regions(
            &grid,
            &t,
            region,
            offset.0,
            offset.1,
            mode,
            ClipDirection::empty(),
        );
        let bounded = mode == RepeatMode::None;
        let binding = match entries.as_slice() {
            [] => return Ok(vec![Leaf::null(region)]),
            [e] => block_binding(&grid, pm.surface(e.block), e, &to_plane, picture, bounded)?,
            _ => self.merged_binding(id, &entries, &to_plane, picture, bounded, temps)?,
        };
        Ok(vec![Leaf {
            region: region.clone(),
            binding: Binding::Texture(binding),
        }])
    }

    fn merged_binding(
        &mut self,
        id: PixmapId,
        entries: &[ClippedRegion],
        to_plane: &Transform,
        picture: &Picture,
        bounded: bool,
        temps: &mut Vec<Surface>,
    ) -> Result<TextureBinding> {
        let merged = self.merge_clipped_regions(id, entries)?;
        let (ox, oy) = merged.origin;
        let s = &merged.surface;
        let binding = TextureBinding {
            texture: s.texture(),
            size: s.size(),
            matrix: to_plane.then(&Transform::translate(-ox as f64, -oy as f64)),
            wrap: Wrap::Clamp,
            filter: picture.filter,
            bounds: bounded.then(|| IBox::from_size(s.width(), s.height())),
            alpha_in_red: s.alpha_in_red(),
        };
        temps.push(merged.surface);
        Ok(binding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::coords::Color;
    use crate::device::{Capabilities, SoftBackend};
    use crate::pixmap::{PixmapUsage, ResidencyHint};

    fn ctx(max: u32) -> RenderContext<SoftBackend> {
        let caps = Capabilities { max_texture_size: max, ..Capabilities::default() };
        RenderContext::new(SoftBackend::new(caps), EngineConfig::default())
    }

    fn resident(ctx: &mut RenderContext<SoftBackend>, w: u32, h: u32) -> PixmapId {
        let id = ctx.create_pixmap(w, h, 32, PixmapUsage::Gpu).unwrap();
        ctx.ensure_resident(id, ResidencyHint::empty()).unwrap();
        id
    }

    fn area(leaves: &[Leaf]) -> i64 {
        leaves.iter().map(|l| l.region.area()).sum()
    }

    #[test]
    fn solid_covers_everything() {
        let mut ctx = ctx(64);
        let r = Region::from_box(IBox::new(0, 0, 5, 5));
        let leaves = ctx
            .plan_operand(&Picture::solid(Color::white()), &r, (3, 3), &mut Vec::new())
            .unwrap();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].binding, Binding::Solid(Color::white()));
    }

    #[test]
    fn small_pixmap_repeats_in_the_sampler() {
        let mut ctx = ctx(64);
        let id = resident(&mut ctx, 8, 8);
        let r = Region::from_box(IBox::new(0, 0, 40, 40));
        let pic = Picture::pixmap(id).with_repeat(RepeatMode::Reflect);
        let leaves = ctx.plan_operand(&pic, &r, (2, 0), &mut Vec::new()).unwrap();
        let Binding::Texture(t) = leaves[0].binding else { panic!("expected a texture") };
        assert_eq!(t.wrap, Wrap::Mirror);
        assert_eq!(t.bounds, None);
        assert_eq!(t.matrix.map_point(0.0, 0.0), Some((2.0, 0.0)));
    }

    #[test]
    fn tiled_source_without_repeat_leaves_transparent_rest() {
        let mut ctx = ctx(16);
        let id = resident(&mut ctx, 24, 8);
        // Destination [0, 30) reads source [4, 34): two blocks and 10 outside.
        let r = Region::from_box(IBox::new(0, 0, 30, 8));
        let leaves = ctx.plan_operand(&Picture::pixmap(id), &r, (4, 0), &mut Vec::new()).unwrap();
        assert_eq!(leaves.len(), 3);
        assert_eq!(area(&leaves), r.area());
        assert_eq!(leaves[2].binding, Binding::Null);
        assert_eq!(leaves[2].region, Region::from_box(IBox::new(20, 0, 30, 8)));
        let Binding::Texture(second) = leaves[1].binding else { panic!("expected a texture") };
        // Destination 12 reads source 16, texel 0 of the second block.
        assert_eq!(second.matrix.map_point(12.0, 0.0), Some((0.0, 0.0)));
    }

    #[test]
    fn single_row_tiled_source_wraps_vertically_in_the_sampler() {
        let mut ctx = ctx(16);
        let id = resident(&mut ctx, 24, 8);
        let pic = Picture::pixmap(id).with_repeat(RepeatMode::Normal);
        let r = Region::from_box(IBox::new(0, 0, 24, 4000));
        let leaves = ctx.plan_operand(&pic, &r, (0, 0), &mut Vec::new()).unwrap();
        assert_eq!(leaves.len(), 2);
        assert_eq!(area(&leaves), r.area());
        for l in &leaves {
            let Binding::Texture(t) = l.binding else { panic!("expected a texture") };
            assert_eq!(t.wrap, Wrap::Repeat);
        }
        let Binding::Texture(second) = leaves[1].binding else { panic!("expected a texture") };
        assert_eq!(second.matrix.map_point(16.0, 3990.0), Some((0.0, 3990.0)));
    }

    #[test]
    fn transformed_straddle_is_merged() {
        let mut ctx = ctx(16);
        let id = resident(&mut ctx, 24, 8);
        let pic = Picture::pixmap(id).with_transform(Transform::translate(14.0, 0.0));
        let r = Region::from_box(IBox::new(0, 0, 4, 4));
        let mut temps = Vec::new();
        let leaves = ctx.plan_operand(&pic, &r, (0, 0), &mut temps).unwrap();
        assert_eq!(leaves.len(), 1);
        assert_eq!(temps.len(), 1);
        let Binding::Texture(t) = leaves[0].binding else { panic!("expected a texture") };
        assert_eq!(t.texture, temps[0].texture());
        assert!(t.bounds.is_some());
        for s in temps {
            ctx.fbos.destroy(&mut ctx.backend, Some(s));
        }
    }

    #[test]
    fn footprint_outside_is_null() {
        let mut ctx = ctx(16);
        let id = resident(&mut ctx, 24, 8);
        let pic = Picture::pixmap(id).with_transform(Transform::translate(100.0, 0.0));
        let r = Region::from_box(IBox::new(0, 0, 4, 4));
        let leaves = ctx.plan_operand(&pic, &r, (0, 0), &mut Vec::new()).unwrap();
        assert_eq!(leaves, vec![Leaf::null(&r)]);
    }
}

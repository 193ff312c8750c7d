use crate::coords::{Color, IBox, Transform};
use crate::device::TextureId;
use crate::program::{Uniform, UniformBlock};
use crate::tiler::RepeatMode;

use super::Filter;

/// Out-of-range texel policy applied in the shader.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Wrap {
    Clamp = 0,
    Repeat = 1,
    Mirror = 2,
}

impl Wrap {
    /// Sampler wrap that realises `mode` on an untiled axis.
    pub fn for_repeat(mode: RepeatMode) -> Self {
        match mode {
            RepeatMode::None | RepeatMode::Pad => Wrap::Clamp,
            RepeatMode::Normal => Wrap::Repeat,
            RepeatMode::Reflect => Wrap::Mirror,
        }
    }
}

/// Which operand uniforms a binding fills.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum OperandSlot {
    Source,
    Mask,
}

impl OperandSlot {
    const fn uniforms(self) -> [Uniform; 6] {
        match self {
            OperandSlot::Source => [
                Uniform::SrcMatrix0,
                Uniform::SrcMatrix1,
                Uniform::SrcMatrix2,
                Uniform::SrcSize,
                Uniform::SrcBounds,
                Uniform::SrcFlags,
            ],
            OperandSlot::Mask => [
                Uniform::MaskMatrix0,
                Uniform::MaskMatrix1,
                Uniform::MaskMatrix2,
                Uniform::MaskSize,
                Uniform::MaskBounds,
                Uniform::MaskFlags,
            ],
        }
    }
}

/// A texture read by one operand of a draw.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct TextureBinding {
    pub texture: TextureId,
    pub size: (u32, u32),
    /// Maps destination pixel positions to texel coordinates.
    pub matrix: Transform,
    pub wrap: Wrap,
    pub filter: Filter,
    /// Texels outside read as transparent when set.
    pub bounds: Option<IBox>,
    pub alpha_in_red: bool,
}

impl TextureBinding {
    /// A 1x1 texture repeated everywhere.
    #[inline]
    pub fn is_1x1_repeat(&self) -> bool {
        self.size == (1, 1) && self.wrap == Wrap::Repeat
    }

    /// Fills `slot` for a draw into a target whose texel `(0, 0)` sits at
    /// destination position `origin`.
    pub fn write(&self, u: &mut UniformBlock, slot: OperandSlot, origin: (i64, i64)) {
        let [m0, m1, m2, size, bounds, flags] = slot.uniforms();
        let m = Transform::translate(origin.0 as f64, origin.1 as f64)
            .then(&self.matrix)
            .to_uniform_rows();
        let b = self
            .bounds
            .map_or([0.0; 4], |b| [b.x1 as f32, b.y1 as f32, b.x2 as f32, b.y2 as f32]);
        let flag = |on: bool| if on { 1.0 } else { 0.0 };
        u.set(m0, m[0])
            .set(m1, m[1])
            .set(m2, m[2])
            .set(size, [self.size.0 as f32, self.size.1 as f32, 0.0, 0.0])
            .set(bounds, b)
            .set(
                flags,
                [
                    self.wrap as i32 as f32,
                    flag(self.filter == Filter::Bilinear),
                    flag(self.bounds.is_some()),
                    flag(self.alpha_in_red),
                ],
            );
    }
}

/// What one operand contributes over a piece of the destination.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) enum Binding {
    Solid(Color),
    Texture(TextureBinding),
    /// Nothing: the operand reads as transparent.
    Null,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::UniformLayout;

    #[test]
    fn origin_is_folded_into_the_matrix() {
        let layout = UniformLayout::new(OperandSlot::Mask.uniforms());
        let mut u = UniformBlock::new(layout);
        let binding = TextureBinding {
            texture: TextureId(1),
            size: (4, 2),
            matrix: Transform::translate(-10.0, 0.0),
            wrap: Wrap::Mirror,
            filter: Filter::Bilinear,
            bounds: Some(IBox::new(0, 0, 4, 2)),
            alpha_in_red: true,
        };
        binding.write(&mut u, OperandSlot::Mask, (16, 8));
        assert_eq!(u.get(Uniform::MaskMatrix0), [1.0, 0.0, 6.0, 0.0]);
        assert_eq!(u.get(Uniform::MaskMatrix1), [0.0, 1.0, 8.0, 0.0]);
        assert_eq!(u.get(Uniform::MaskFlags), [2.0, 1.0, 1.0, 1.0]);
        assert_eq!(u.get(Uniform::MaskSize), [4.0, 2.0, 0.0, 0.0]);
        // Source slot is absent from this layout; writes vanish.
        binding.write(&mut u, OperandSlot::Source, (0, 0));
        assert_eq!(u.get(Uniform::SrcFlags), [0.0; 4]);
        assert_eq!(u.as_bytes().len(), 6 * 16);
    }
}

/// Every uniform a facet can declare.
///
/// Each occupies one `vec4<f32>` slot in the program's uniform block.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Uniform {
    /// `(width, height, alpha_in_red, 0)` of the render target.
    TargetInfo,
    Fg,
    Bg,
    /// `(dx, dy, 0, 0)` added to the fragment position before a fill lookup.
    FillOffset,
    /// `(width, height, 0, 0)` of the fill texture.
    FillSize,
    SrcMatrix0,
    SrcMatrix1,
    SrcMatrix2,
    SrcSize,
    SrcBounds,
    /// `(wrap, filter, bounds_check, alpha_in_red)`.
    SrcFlags,
    MaskMatrix0,
    MaskMatrix1,
    MaskMatrix2,
    MaskSize,
    MaskBounds,
    MaskFlags,
    FontInfo,
    Bitplane,
    Bitmul,
    DashLength,
    AtlasSize,
}

impl Uniform {
    pub const COUNT: usize = 22;

    pub const fn name(self) -> &'static str {
        match self {
            Uniform::TargetInfo => "target_info",
            Uniform::Fg => "fg",
            Uniform::Bg => "bg",
            Uniform::FillOffset => "fill_offset",
            Uniform::FillSize => "fill_size",
            Uniform::SrcMatrix0 => "src_matrix0",
            Uniform::SrcMatrix1 => "src_matrix1",
            Uniform::SrcMatrix2 => "src_matrix2",
            Uniform::SrcSize => "src_size",
            Uniform::SrcBounds => "src_bounds",
            Uniform::SrcFlags => "src_flags",
            Uniform::MaskMatrix0 => "mask_matrix0",
            Uniform::MaskMatrix1 => "mask_matrix1",
            Uniform::MaskMatrix2 => "mask_matrix2",
            Uniform::MaskSize => "mask_size",
            Uniform::MaskBounds => "mask_bounds",
            Uniform::MaskFlags => "mask_flags",
            Uniform::FontInfo => "font_info",
            Uniform::Bitplane => "bitplane",
            Uniform::Bitmul => "bitmul",
            Uniform::DashLength => "dash_length",
            Uniform::AtlasSize => "atlas_size",
        }
    }
}

const SLOT: u32 = 16;

/// Byte offset of every uniform present in a program.
///
/// A uniform's location is its offset in the block. Uniforms the program
/// does not declare have no location.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UniformLayout {
    offsets: [Option<u16>; Uniform::COUNT],
    order: [Option<Uniform>; Uniform::COUNT],
    size: u32,
}

impl UniformLayout {
    /// Assigns slots in iteration order; repeats keep their first slot.
    pub fn new<I: IntoIterator<Item = Uniform>>(uniforms: I) -> Self {
        let mut layout = UniformLayout {
            offsets: [None; Uniform::COUNT],
            order: [None; Uniform::COUNT],
            size: 0,
        };
        let mut n = 0;
        for u in uniforms {
            if layout.offsets[u as usize].is_some() {
                continue;
            }
            layout.offsets[u as usize] = Some((n as u32 * SLOT) as u16);
            layout.order[n] = Some(u);
            n += 1;
        }
        layout.size = n as u32 * SLOT;
        layout
    }

    #[inline]
    pub fn location(&self, u: Uniform) -> Option<u32> {
        self.offsets[u as usize].map(u32::from)
    }

    /// Block size in bytes.
    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Declared uniforms in slot order.
    pub fn fields(&self) -> impl Iterator<Item = Uniform> + '_ {
        self.order.iter().map_while(|u| *u)
    }

    /// Reads a slot back from a block; absent uniforms read as zero.
    pub fn read(&self, bytes: &[u8], u: Uniform) -> [f32; 4] {
        match self.location(u) {
            Some(off) => {
                let off = off as usize;
                match bytes.get(off..off + SLOT as usize) {
                    Some(slot) => bytemuck::pod_read_unaligned(slot),
                    None => [0.0; 4],
                }
            }
            None => [0.0; 4],
        }
    }
}

/// CPU-side copy of one program's uniform block.
#[derive(Debug, Clone)]
pub struct UniformBlock {
    layout: UniformLayout,
    bytes: Vec<u8>,
}

impl UniformBlock {
    pub fn new(layout: UniformLayout) -> Self {
        Self {
            layout,
            bytes: vec![0; layout.size() as usize],
        }
    }

    /// Writes a slot. Writes to undeclared uniforms are dropped.
    pub fn set(&mut self, u: Uniform, value: [f32; 4]) -> &mut Self {
        if let Some(off) = self.layout.location(u) {
            let off = off as usize;
            self.bytes[off..off + SLOT as usize].copy_from_slice(bytemuck::bytes_of(&value));
        }
        self
    }

    pub fn get(&self, u: Uniform) -> [f32; 4] {
        self.layout.read(&self.bytes, u)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_sixteen_bytes_in_declaration_order() {
        let layout = UniformLayout::new([Uniform::TargetInfo, Uniform::Fg, Uniform::TargetInfo]);
        assert_eq!(layout.location(Uniform::TargetInfo), Some(0));
        assert_eq!(layout.location(Uniform::Fg), Some(16));
        assert_eq!(layout.size(), 32);
        assert_eq!(layout.fields().collect::<Vec<_>>(), vec![Uniform::TargetInfo, Uniform::Fg]);
    }

    #[test]
    fn writes_to_absent_uniforms_are_ignored() {
        let mut block = UniformBlock::new(UniformLayout::new([Uniform::Fg]));
        block.set(Uniform::Bg, [1.0; 4]).set(Uniform::Fg, [0.5, 0.25, 0.0, 1.0]);
        assert_eq!(block.as_bytes().len(), 16);
        assert_eq!(block.get(Uniform::Fg), [0.5, 0.25, 0.0, 1.0]);
        assert_eq!(block.get(Uniform::Bg), [0.0; 4]);
    }
}

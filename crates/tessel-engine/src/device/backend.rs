use crate::coords::IBox;
use crate::error::Result;
use crate::program::{BlendState, ProgramSource};

use super::{Capabilities, PixelFormat};

/// Backend texture handle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// Render target bound to one texture.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub u64);

/// Compiled program handle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// One draw: a set of target-local rectangles shaded by one program.
#[derive(Debug, Clone, Copy)]
pub struct DrawCall<'a> {
    pub program: ProgramHandle,
    pub target: FramebufferId,

    /// `None` writes fragments unblended.
    pub blend: Option<BlendState>,

    /// Target-local scissor; `None` covers the whole target.
    pub scissor: Option<IBox>,

    /// Uniform block laid out by the program's uniform layout.
    pub uniforms: &'a [u8],

    /// Texture bound to the source slot.
    pub source: Option<TextureId>,

    /// Texture bound to the mask slot.
    pub mask: Option<TextureId>,

    /// Target-local rectangles.
    pub rects: &'a [IBox],
}

/// Bulk CPU ↔ GPU pixel transfer.
///
/// `data` starts at the first pixel of `rect` (texture-local) and rows are
/// `stride` bytes apart.
pub trait PixelTransfer {
    fn upload(&mut self, texture: TextureId, rect: IBox, data: &[u8], stride: usize) -> Result<()>;

    fn download(
        &mut self,
        texture: TextureId,
        rect: IBox,
        out: &mut [u8],
        stride: usize,
    ) -> Result<()>;
}

/// GPU device seam.
///
/// Calls complete on the caller's thread and execute in submission order.
/// Allocation failures caused by memory pressure are reported as
/// `EngineError::OutOfMemory`.
pub trait Backend: PixelTransfer {
    fn capabilities(&self) -> &Capabilities;

    fn create_texture(&mut self, desc: TextureDesc) -> Result<TextureId>;

    fn destroy_texture(&mut self, texture: TextureId);

    fn create_framebuffer(&mut self, texture: TextureId) -> Result<FramebufferId>;

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId);

    /// Zero-fills a texture without a draw.
    fn clear_texture(&mut self, texture: TextureId) -> Result<()>;

    fn compile_program(&mut self, source: &ProgramSource) -> Result<ProgramHandle>;

    fn destroy_program(&mut self, program: ProgramHandle);

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<()>;

    /// Orders earlier render-target writes before later samples of the same texture.
    fn texture_barrier(&mut self) {}
}

/// Bytes a transfer of `rect` needs with rows `stride` apart.
pub(crate) fn transfer_len(rect: IBox, stride: usize, bpp: usize) -> usize {
    if rect.is_empty() {
        return 0;
    }
    (rect.height() as usize - 1) * stride + rect.width() as usize * bpp
}

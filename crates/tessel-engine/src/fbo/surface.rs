use crate::coords::IBox;
use crate::device::{FramebufferId, PixelFormat, TextureId};

/// A GPU texture with an optional render-target attachment.
///
/// Owned by exactly one pixmap (or by a temporary) at a time; it is not
/// `Clone` so a surface can only be released once.
#[derive(Debug, PartialEq, Eq)]
pub struct Surface {
    pub(crate) texture: TextureId,
    pub(crate) framebuffer: Option<FramebufferId>,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) format: PixelFormat,
    pub(crate) foreign: bool,
}

impl Surface {
    #[inline]
    pub fn texture(&self) -> TextureId {
        self.texture
    }

    #[inline]
    pub fn framebuffer(&self) -> Option<FramebufferId> {
        self.framebuffer
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Alpha lives in the red channel of a single-channel texture.
    #[inline]
    pub fn alpha_in_red(&self) -> bool {
        self.format == PixelFormat::R8
    }

    /// Wraps a texture the engine did not allocate.
    #[inline]
    pub fn is_foreign(&self) -> bool {
        self.foreign
    }

    #[inline]
    pub fn bounds(&self) -> IBox {
        IBox::from_size(self.width, self.height)
    }
}

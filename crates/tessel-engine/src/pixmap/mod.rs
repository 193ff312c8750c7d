//! Pixmap resource manager.
//!
//! A pixmap is a logical pixel buffer. It becomes GPU resident lazily, as
//! one surface when it fits the device and as a grid of block surfaces when
//! it does not.

mod arena;
mod host;
#[allow(clippy::module_inception)]
mod pixmap;
mod residency;

use bitflags::bitflags;

pub use arena::{PixmapArena, PixmapId};
pub use host::HostImage;
pub use pixmap::Pixmap;

/// What a pixmap is allowed to become at creation.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum PixmapUsage {
    /// Made resident on demand.
    #[default]
    Gpu,
    /// Host memory only; every GPU path declines it.
    CpuOnly,
    /// A descriptor without storage until a surface is attached.
    NoTexture,
}

bitflags! {
    /// Options for [`ensure_resident`](crate::RenderContext::ensure_resident).
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct ResidencyHint: u8 {
        /// Textures only; framebuffers are attached on first render.
        const NO_FRAMEBUFFER    = 1 << 0;
        /// Purge the surface pool and shrink tiles before giving up.
        const FIXUP_ON_FAILURE  = 1 << 1;
        /// Fail instead of tiling a pixmap larger than one texture.
        const NO_LARGE_TILING   = 1 << 2;
    }
}

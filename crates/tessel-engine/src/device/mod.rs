//! GPU device abstraction.
//!
//! This module is responsible for:
//! - the immutable capability table queried once per context
//! - the [`Backend`] seam every GPU call goes through
//! - the headless wgpu backend and the software reference backend

mod backend;
mod caps;
mod format;
mod soft;
mod wgpu_backend;

pub use backend::{
    Backend, DrawCall, FramebufferId, PixelTransfer, ProgramHandle, TextureDesc, TextureId,
};
pub(crate) use backend::transfer_len;
pub use caps::{Capabilities, Extensions, SHADING_BASELINE, SHADING_INSTANCED, SHADING_MODERN};
pub use format::PixelFormat;
pub use soft::{SoftBackend, SoftStats, SoftTexture};
pub use wgpu_backend::{WgpuBackend, WgpuInit};

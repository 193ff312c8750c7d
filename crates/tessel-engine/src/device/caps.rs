use bitflags::bitflags;

/// Baseline shading profile. Everything the builtin facets need at minimum.
pub const SHADING_BASELINE: u32 = 120;
/// Profile with per-instance vertex attributes.
pub const SHADING_INSTANCED: u32 = 130;
/// Profile with the full modern feature set.
pub const SHADING_MODERN: u32 = 150;

bitflags! {
    /// Optional device features beyond the shading profile.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Extensions: u32 {
        /// Instanced attributes on a baseline profile.
        const GPU_SHADER4       = 1 << 0;
        /// Direct texture clear without a draw.
        const CLEAR_TEXTURE     = 1 << 1;
        /// Two fragment outputs feeding one blend equation.
        const DUAL_SOURCE_BLEND = 1 << 2;
        /// Sampling a texture while rendering into it, after a barrier.
        const TEXTURE_BARRIER   = 1 << 3;
    }
}

/// Immutable device capability table.
///
/// Queried once when a context is created and never refreshed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    /// Largest texture edge the device accepts, also the largest render target.
    pub max_texture_size: u32,

    /// Highest shading profile the device compiles natively.
    pub shading_version: u32,

    pub extensions: Extensions,

    /// Single-channel textures are available; 8-bit pixmaps keep alpha in red.
    pub alpha_in_red: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            max_texture_size: 8192,
            shading_version: SHADING_INSTANCED,
            extensions: Extensions::CLEAR_TEXTURE,
            alpha_in_red: true,
        }
    }
}

impl Capabilities {
    #[inline]
    pub fn has(&self, ext: Extensions) -> bool {
        self.extensions.contains(ext)
    }

    /// Instanced geometry is available natively or through `GPU_SHADER4`.
    #[inline]
    pub fn supports_instancing(&self) -> bool {
        self.shading_version >= SHADING_INSTANCED || self.has(Extensions::GPU_SHADER4)
    }
}

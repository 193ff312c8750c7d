use bitflags::bitflags;

use super::Uniform;

bitflags! {
    /// Named uniform/varying groups a facet needs.
    ///
    /// Requirements from both facets are merged on these bits, so a group
    /// requested twice is emitted once.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Locations: u16 {
        const TARGET       = 1 << 0;
        const FG           = 1 << 1;
        const BG           = 1 << 2;
        const FILL_SAMPLER = 1 << 3;
        const FILL_POS     = 1 << 4;
        const SOURCE       = 1 << 5;
        const MASK         = 1 << 6;
        const FONT         = 1 << 7;
        const BITPLANE     = 1 << 8;
        const DASH         = 1 << 9;
        const ATLAS        = 1 << 10;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct FacetFlags: u8 {
        /// Geometry comes from per-instance rectangles.
        const INSTANCED = 1 << 0;
        /// The facet produces `source_px`/`mask_px` for a combine step.
        const RENDER    = 1 << 1;
    }
}

/// Closed set of facet behaviours the software device can evaluate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FacetKind {
    Identity,
    CopyArea,
    PolyFillRect,
    CompositeRect,
    CompositeMaskRect,
    Solid,
    Tile,
    Stipple,
    OpaqueStipple,
    RenderSolid,
    RenderPicture,
    Render1x1,
    /// Supplied by the drawing layer; only GPU backends can run it.
    Custom,
}

/// How the fragment result feeds the blender.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AlphaMode {
    Normal,
    /// First pass of two-pass component alpha.
    CaFirst,
    /// Second pass of two-pass component alpha.
    CaSecond,
    DualBlend,
}

impl AlphaMode {
    pub(crate) const fn combine(self) -> &'static str {
        match self {
            AlphaMode::Normal => "    color = to_target(source_px * mask_px.a);\n",
            AlphaMode::CaFirst => "    color = to_target(source_px.a * mask_px);\n",
            AlphaMode::CaSecond => "    color = to_target(source_px * mask_px);\n",
            AlphaMode::DualBlend => {
                "    color = to_target(source_px * mask_px);\n    color1 = to_target(source_px.a * mask_px);\n"
            }
        }
    }
}

/// Declarative shader fragment: a primitive or a fill.
///
/// A program is one primitive facet plus one fill facet. Source snippets are
/// WGSL; `vs_exec` runs with `p` (target pixel position) and `vout` in scope,
/// `fs_exec` with `pos` (fragment position), `v` and `color`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Facet {
    pub name: &'static str,
    pub kind: FacetKind,
    pub version: u32,
    pub flags: FacetFlags,
    pub locations: Locations,
    pub vs_vars: &'static str,
    pub vs_exec: &'static str,
    pub fs_vars: &'static str,
    pub fs_exec: &'static str,
}

impl Facet {
    /// Fill that contributes nothing.
    pub const IDENTITY: Facet = Facet {
        name: "identity",
        kind: FacetKind::Identity,
        version: 0,
        flags: FacetFlags::empty(),
        locations: Locations::empty(),
        vs_vars: "",
        vs_exec: "",
        fs_vars: "",
        fs_exec: "",
    };
}

/// Compile-time constant injected into a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Define<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

/// What one location group brings into a program.
pub(crate) struct LocationVars {
    pub location: Locations,
    pub uniforms: &'static [Uniform],
    /// Varying field declared on the vertex output.
    pub varying: &'static str,
    pub fs_vars: &'static str,
}

const TARGET_FS: &str = "\
fn to_target(c: vec4<f32>) -> vec4<f32> {
    if (u.target_info.z > 0.5) {
        return vec4<f32>(c.a, 0.0, 0.0, c.a);
    }
    return c;
}
";

const FILL_SAMPLER_FS: &str = "\
fn fill_texel(p: vec2<f32>) -> vec4<f32> {
    let size = vec2<i32>(u.fill_size.xy);
    let i = vec2<i32>(floor(p));
    let q = ((i % size) + size) % size;
    return textureLoad(source_tex, q, 0);
}
";

const SOURCE_FS: &str = "\
fn source_texel(p: vec2<i32>) -> vec4<f32> {
    return operand_texel(source_tex, p, u.src_size, u.src_bounds, u.src_flags);
}

fn source_sample(pos: vec2<f32>) -> vec4<f32> {
    return operand_sample(source_tex, pos, u.src_matrix0, u.src_matrix1, u.src_matrix2,
                          u.src_size, u.src_bounds, u.src_flags);
}
";

const MASK_FS: &str = "\
fn mask_sample(pos: vec2<f32>) -> vec4<f32> {
    return operand_sample(mask_tex, pos, u.mask_matrix0, u.mask_matrix1, u.mask_matrix2,
                          u.mask_size, u.mask_bounds, u.mask_flags);
}
";

/// Shared by the source and mask helpers.
pub(crate) const OPERAND_FS: &str = "\
fn wrap_coord(i: i32, size: i32, mode: i32) -> i32 {
    if (mode == 1) {
        return ((i % size) + size) % size;
    }
    if (mode == 2) {
        let period = 2 * size;
        let m = ((i % period) + period) % period;
        if (m >= size) {
            return period - 1 - m;
        }
        return m;
    }
    return clamp(i, 0, size - 1);
}

fn operand_texel(tex: texture_2d<f32>, p: vec2<i32>, size: vec4<f32>, bounds: vec4<f32>,
                 flags: vec4<f32>) -> vec4<f32> {
    if (flags.z > 0.5) {
        let f = vec2<f32>(p);
        if (f.x < bounds.x || f.y < bounds.y || f.x >= bounds.z || f.y >= bounds.w) {
            return vec4<f32>(0.0);
        }
    }
    let mode = i32(flags.x);
    let sz = vec2<i32>(size.xy);
    let q = vec2<i32>(wrap_coord(p.x, sz.x, mode), wrap_coord(p.y, sz.y, mode));
    let c = textureLoad(tex, q, 0);
    if (flags.w > 0.5) {
        return vec4<f32>(0.0, 0.0, 0.0, c.r);
    }
    return c;
}

fn operand_sample(tex: texture_2d<f32>, pos: vec2<f32>, m0: vec4<f32>, m1: vec4<f32>,
                  m2: vec4<f32>, size: vec4<f32>, bounds: vec4<f32>,
                  flags: vec4<f32>) -> vec4<f32> {
    let h = vec3<f32>(pos, 1.0);
    let w = dot(m2.xyz, h);
    if (w == 0.0) {
        return vec4<f32>(0.0);
    }
    let s = vec2<f32>(dot(m0.xyz, h), dot(m1.xyz, h)) / w;
    if (flags.y < 0.5) {
        return operand_texel(tex, vec2<i32>(floor(s)), size, bounds, flags);
    }
    let t = s - vec2<f32>(0.5);
    let base = floor(t);
    let f = t - base;
    let i = vec2<i32>(base);
    let c00 = operand_texel(tex, i, size, bounds, flags);
    let c10 = operand_texel(tex, i + vec2<i32>(1, 0), size, bounds, flags);
    let c01 = operand_texel(tex, i + vec2<i32>(0, 1), size, bounds, flags);
    let c11 = operand_texel(tex, i + vec2<i32>(1, 1), size, bounds, flags);
    return mix(mix(c00, c10, f.x), mix(c01, c11, f.x), f.y);
}
";

pub(crate) const LOCATION_VARS: &[LocationVars] = &[
    LocationVars {
        location: Locations::TARGET,
        uniforms: &[Uniform::TargetInfo],
        varying: "",
        fs_vars: TARGET_FS,
    },
    LocationVars {
        location: Locations::FG,
        uniforms: &[Uniform::Fg],
        varying: "",
        fs_vars: "",
    },
    LocationVars {
        location: Locations::BG,
        uniforms: &[Uniform::Bg],
        varying: "",
        fs_vars: "",
    },
    LocationVars {
        location: Locations::FILL_SAMPLER,
        uniforms: &[Uniform::FillSize],
        varying: "",
        fs_vars: FILL_SAMPLER_FS,
    },
    LocationVars {
        location: Locations::FILL_POS,
        uniforms: &[Uniform::FillOffset],
        varying: "fill_pos: vec2<f32>",
        fs_vars: "",
    },
    LocationVars {
        location: Locations::SOURCE,
        uniforms: &[
            Uniform::SrcMatrix0,
            Uniform::SrcMatrix1,
            Uniform::SrcMatrix2,
            Uniform::SrcSize,
            Uniform::SrcBounds,
            Uniform::SrcFlags,
        ],
        varying: "",
        fs_vars: SOURCE_FS,
    },
    LocationVars {
        location: Locations::MASK,
        uniforms: &[
            Uniform::MaskMatrix0,
            Uniform::MaskMatrix1,
            Uniform::MaskMatrix2,
            Uniform::MaskSize,
            Uniform::MaskBounds,
            Uniform::MaskFlags,
        ],
        varying: "",
        fs_vars: MASK_FS,
    },
    LocationVars {
        location: Locations::FONT,
        uniforms: &[Uniform::FontInfo],
        varying: "",
        fs_vars: "",
    },
    LocationVars {
        location: Locations::BITPLANE,
        uniforms: &[Uniform::Bitplane, Uniform::Bitmul],
        varying: "",
        fs_vars: "",
    },
    LocationVars {
        location: Locations::DASH,
        uniforms: &[Uniform::DashLength],
        varying: "dash_offset: f32",
        fs_vars: "",
    },
    LocationVars {
        location: Locations::ATLAS,
        uniforms: &[Uniform::AtlasSize],
        varying: "",
        fs_vars: "",
    },
];

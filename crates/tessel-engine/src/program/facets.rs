//! Builtin facets.

use super::{Facet, FacetFlags, FacetKind, Locations};

const FILL_POS_VS: &str = "    vout.fill_pos = p + u.fill_offset.xy;\n";

/// Copies texels from the bound source texture at `pos + fill_offset`.
pub const COPY_AREA: Facet = Facet {
    name: "copy_area",
    kind: FacetKind::CopyArea,
    version: 120,
    flags: FacetFlags::empty(),
    locations: Locations::FILL_POS.union(Locations::FILL_SAMPLER),
    vs_vars: "",
    vs_exec: FILL_POS_VS,
    fs_vars: "",
    fs_exec: "    color = textureLoad(source_tex, vec2<i32>(floor(v.fill_pos)), 0);\n",
};

/// Instanced rectangles.
pub const POLY_FILL_RECT: Facet = Facet {
    name: "poly_fill_rect",
    kind: FacetKind::PolyFillRect,
    version: 130,
    flags: FacetFlags::INSTANCED,
    locations: Locations::empty(),
    vs_vars: "",
    vs_exec: "",
    fs_vars: "",
    fs_exec: "",
};

/// Rectangles as two triangles each, for devices without instancing.
pub const POLY_FILL_RECT_120: Facet = Facet {
    name: "poly_fill_rect_120",
    kind: FacetKind::PolyFillRect,
    version: 120,
    flags: FacetFlags::empty(),
    locations: Locations::empty(),
    vs_vars: "",
    vs_exec: "",
    fs_vars: "",
    fs_exec: "",
};

pub const COMPOSITE_RECT: Facet = Facet {
    name: "composite_rect",
    kind: FacetKind::CompositeRect,
    version: 120,
    flags: FacetFlags::RENDER,
    locations: Locations::empty(),
    vs_vars: "",
    vs_exec: "",
    fs_vars: "",
    fs_exec: "    let mask_px = vec4<f32>(1.0);\n",
};

pub const COMPOSITE_MASK_RECT: Facet = Facet {
    name: "composite_mask_rect",
    kind: FacetKind::CompositeMaskRect,
    version: 120,
    flags: FacetFlags::RENDER,
    locations: Locations::MASK,
    vs_vars: "",
    vs_exec: "",
    fs_vars: "",
    fs_exec: "    let mask_px = mask_sample(pos);\n",
};

pub const SOLID: Facet = Facet {
    name: "solid",
    kind: FacetKind::Solid,
    version: 0,
    flags: FacetFlags::empty(),
    locations: Locations::FG,
    vs_vars: "",
    vs_exec: "",
    fs_vars: "",
    fs_exec: "    color = u.fg;\n",
};

pub const TILE: Facet = Facet {
    name: "tile",
    kind: FacetKind::Tile,
    version: 0,
    flags: FacetFlags::empty(),
    locations: Locations::FILL_POS.union(Locations::FILL_SAMPLER),
    vs_vars: "",
    vs_exec: FILL_POS_VS,
    fs_vars: "",
    fs_exec: "    color = fill_texel(v.fill_pos);\n",
};

pub const STIPPLE: Facet = Facet {
    name: "stipple",
    kind: FacetKind::Stipple,
    version: 0,
    flags: FacetFlags::empty(),
    locations: Locations::FG
        .union(Locations::FILL_POS)
        .union(Locations::FILL_SAMPLER),
    vs_vars: "",
    vs_exec: FILL_POS_VS,
    fs_vars: "",
    fs_exec: "    if (fill_texel(v.fill_pos).r < 0.5) {\n        discard;\n    }\n    color = u.fg;\n",
};

pub const OPAQUE_STIPPLE: Facet = Facet {
    name: "opaque_stipple",
    kind: FacetKind::OpaqueStipple,
    version: 0,
    flags: FacetFlags::empty(),
    locations: Locations::FG
        .union(Locations::BG)
        .union(Locations::FILL_POS)
        .union(Locations::FILL_SAMPLER),
    vs_vars: "",
    vs_exec: FILL_POS_VS,
    fs_vars: "",
    fs_exec: "    color = select(u.bg, u.fg, fill_texel(v.fill_pos).r >= 0.5);\n",
};

pub const RENDER_SOLID: Facet = Facet {
    name: "render_solid",
    kind: FacetKind::RenderSolid,
    version: 0,
    flags: FacetFlags::empty(),
    locations: Locations::FG,
    vs_vars: "",
    vs_exec: "",
    fs_vars: "",
    fs_exec: "    let source_px = u.fg;\n",
};

pub const RENDER_PICTURE: Facet = Facet {
    name: "render_picture",
    kind: FacetKind::RenderPicture,
    version: 0,
    flags: FacetFlags::empty(),
    locations: Locations::SOURCE,
    vs_vars: "",
    vs_exec: "",
    fs_vars: "",
    fs_exec: "    let source_px = source_sample(pos);\n",
};

/// Repeating 1×1 source: one texel, no coordinate math.
pub const RENDER_1X1_PICTURE: Facet = Facet {
    name: "render_1x1_picture",
    kind: FacetKind::Render1x1,
    version: 0,
    flags: FacetFlags::empty(),
    locations: Locations::SOURCE,
    vs_vars: "",
    vs_exec: "",
    fs_vars: "",
    fs_exec: "    let source_px = source_texel(vec2<i32>(0, 0));\n",
};

use std::fmt::Write as _;

use crate::device::{Capabilities, Extensions, SHADING_BASELINE, SHADING_INSTANCED};
use crate::error::{EngineError, Result};

use super::facet::{LOCATION_VARS, OPERAND_FS};
use super::{AlphaMode, Define, Facet, FacetFlags, FacetKind, Locations, UniformLayout};

/// How rectangles reach the vertex stage.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    /// Unit quad corners plus one `vec4` rectangle per instance.
    Instanced,
    /// Six vertices per rectangle.
    PerVertex,
}

/// Shading profile chosen for a facet pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub version: u32,
    pub extensions: Vec<&'static str>,
    pub vertex_layout: VertexLayout,
}

/// Fully assembled program ready for a backend to compile.
#[derive(Debug, Clone)]
pub struct ProgramSource {
    pub name: String,
    pub prim: FacetKind,
    pub fill: FacetKind,
    pub alpha: AlphaMode,
    pub version: u32,
    pub extensions: Vec<&'static str>,
    pub vertex_layout: VertexLayout,
    pub locations: Locations,
    pub layout: UniformLayout,
    pub wgsl: String,
}

impl ProgramSource {
    pub fn uses_source_texture(&self) -> bool {
        self.locations
            .intersects(Locations::SOURCE | Locations::FILL_SAMPLER)
    }

    pub fn uses_mask_texture(&self) -> bool {
        self.locations.contains(Locations::MASK)
    }
}

fn unavailable(prim: &Facet, fill: &Facet, reason: impl Into<String>) -> EngineError {
    EngineError::ProgramUnavailable {
        name: format!("{}+{}", prim.name, fill.name),
        reason: reason.into(),
    }
}

/// Picks the shading profile for a facet pair on this device.
///
/// The wanted version is the highest of both facets and `min_version`. When
/// the device is below it, the instanced profile degrades to the baseline
/// plus `gpu_shader4`; anything else is unavailable.
pub fn select_profile(
    prim: &Facet,
    fill: &Facet,
    alpha: AlphaMode,
    min_version: u32,
    caps: &Capabilities,
) -> Result<Profile> {
    let wanted = prim
        .version
        .max(fill.version)
        .max(min_version)
        .max(SHADING_BASELINE);
    let mut extensions = Vec::new();

    let version = if wanted <= caps.shading_version {
        wanted
    } else if wanted <= SHADING_INSTANCED
        && caps.shading_version >= SHADING_BASELINE
        && caps.has(Extensions::GPU_SHADER4)
    {
        extensions.push("gpu_shader4");
        SHADING_BASELINE
    } else {
        return Err(unavailable(
            prim,
            fill,
            format!("needs profile {wanted}, device has {}", caps.shading_version),
        ));
    };

    let instanced = (prim.flags | fill.flags).contains(FacetFlags::INSTANCED);
    if instanced && version < SHADING_INSTANCED && !extensions.contains(&"gpu_shader4") {
        if !caps.has(Extensions::GPU_SHADER4) {
            return Err(unavailable(prim, fill, "per-instance attributes unsupported"));
        }
        extensions.push("gpu_shader4");
    }

    if alpha != AlphaMode::Normal && !prim.flags.contains(FacetFlags::RENDER) {
        return Err(unavailable(prim, fill, "alpha mode on a non-render primitive"));
    }
    if alpha == AlphaMode::DualBlend {
        if !caps.has(Extensions::DUAL_SOURCE_BLEND) {
            return Err(unavailable(prim, fill, "dual-source blending unsupported"));
        }
        extensions.push("dual_source_blending");
    }

    Ok(Profile {
        version,
        extensions,
        vertex_layout: if instanced {
            VertexLayout::Instanced
        } else {
            VertexLayout::PerVertex
        },
    })
}

/// Assembles the WGSL for `prim` × `fill` under `alpha`.
pub fn build_source(
    prim: &Facet,
    fill: &Facet,
    alpha: AlphaMode,
    min_version: u32,
    defines: &[Define<'_>],
    caps: &Capabilities,
) -> Result<ProgramSource> {
    let profile = select_profile(prim, fill, alpha, min_version, caps)?;
    let locations = prim.locations | fill.locations | Locations::TARGET;
    let vars: Vec<_> = LOCATION_VARS
        .iter()
        .filter(|v| locations.contains(v.location))
        .collect();
    let layout = UniformLayout::new(vars.iter().flat_map(|v| v.uniforms.iter().copied()));
    let render = prim.flags.contains(FacetFlags::RENDER);
    let dual = alpha == AlphaMode::DualBlend;

    let mut s = String::with_capacity(4096);
    let _ = writeln!(
        s,
        "// tessel program {}+{} ({:?}) profile {}",
        prim.name, fill.name, alpha, profile.version
    );
    if !profile.extensions.is_empty() {
        let _ = writeln!(s, "// extensions: {}", profile.extensions.join(", "));
    }
    if dual {
        s.push_str("enable dual_source_blending;\n");
    }
    s.push('\n');

    for d in defines {
        let _ = writeln!(s, "const {} = {};", d.name, d.value);
    }
    if !defines.is_empty() {
        s.push('\n');
    }

    s.push_str("struct Uniforms {\n");
    for u in layout.fields() {
        let _ = writeln!(s, "    {}: vec4<f32>,", u.name());
    }
    s.push_str("};\n\n");
    s.push_str("@group(0) @binding(0) var<uniform> u: Uniforms;\n");
    s.push_str("@group(0) @binding(1) var source_tex: texture_2d<f32>;\n");
    s.push_str("@group(0) @binding(2) var mask_tex: texture_2d<f32>;\n\n");

    s.push_str("struct VsOut {\n    @builtin(position) position: vec4<f32>,\n");
    let mut slot = 0;
    for v in vars.iter().filter(|v| !v.varying.is_empty()) {
        let _ = writeln!(s, "    @location({slot}) {},", v.varying);
        slot += 1;
    }
    s.push_str("};\n\n");

    if dual {
        s.push_str(
            "struct FsOut {\n    @location(0) @blend_src(0) color0: vec4<f32>,\n    @location(0) @blend_src(1) color1: vec4<f32>,\n};\n\n",
        );
    }

    s.push_str(prim.vs_vars);
    s.push_str(fill.vs_vars);

    s.push_str("@vertex\n");
    match profile.vertex_layout {
        VertexLayout::Instanced => {
            s.push_str(
                "fn vs_main(@location(0) corner: vec2<f32>, @location(1) rect: vec4<f32>) -> VsOut {\n    let p = mix(rect.xy, rect.zw, corner);\n",
            );
        }
        VertexLayout::PerVertex => {
            s.push_str("fn vs_main(@location(0) p: vec2<f32>) -> VsOut {\n");
        }
    }
    s.push_str("    var vout: VsOut;\n");
    s.push_str(
        "    vout.position = vec4<f32>(p.x / u.target_info.x * 2.0 - 1.0, 1.0 - p.y / u.target_info.y * 2.0, 0.0, 1.0);\n",
    );
    s.push_str(prim.vs_exec);
    if fill.vs_exec != prim.vs_exec {
        s.push_str(fill.vs_exec);
    }
    s.push_str("    return vout;\n}\n\n");

    if locations.intersects(Locations::SOURCE | Locations::MASK) {
        s.push_str(OPERAND_FS);
        s.push('\n');
    }
    for v in &vars {
        if !v.fs_vars.is_empty() {
            s.push_str(v.fs_vars);
            s.push('\n');
        }
    }
    s.push_str(prim.fs_vars);
    s.push_str(fill.fs_vars);

    s.push_str("@fragment\n");
    if dual {
        s.push_str("fn fs_main(v: VsOut) -> FsOut {\n");
    } else {
        s.push_str("fn fs_main(v: VsOut) -> @location(0) vec4<f32> {\n");
    }
    s.push_str("    let pos = v.position.xy;\n    var color = vec4<f32>(0.0);\n");
    if dual {
        s.push_str("    var color1 = vec4<f32>(0.0);\n");
    }
    s.push_str(prim.fs_exec);
    s.push_str(fill.fs_exec);
    if render {
        s.push_str(alpha.combine());
    }
    if dual {
        s.push_str("    return FsOut(color, color1);\n}\n");
    } else {
        s.push_str("    return color;\n}\n");
    }

    Ok(ProgramSource {
        name: format!("{}+{}", prim.name, fill.name),
        prim: prim.kind,
        fill: fill.kind,
        alpha,
        version: profile.version,
        extensions: profile.extensions,
        vertex_layout: profile.vertex_layout,
        locations,
        layout,
        wgsl: s,
    })
}

//! Software reference device.
//!
//! Stores real pixels in host memory and evaluates the builtin facets with
//! the same arithmetic the generated WGSL uses, so it doubles as the
//! rasterizer that GPU output is checked against. Allocation is accounted and
//! can be made to fail on demand.

use std::collections::HashMap;

use crate::coords::IBox;
use crate::error::{EngineError, Result};
use crate::program::{
    AlphaMode, BlendFactor, BlendState, FacetKind, ProgramSource, Uniform,
    UniformLayout,
};

use super::backend::transfer_len;
use super::{
    Backend, Capabilities, DrawCall, Extensions, FramebufferId, PixelFormat, PixelTransfer,
    ProgramHandle, TextureDesc, TextureId,
};

/// Host-side texture storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftTexture {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl SoftTexture {
    fn new(desc: TextureDesc) -> Self {
        let len = desc.width as usize * desc.height as usize * desc.format.bytes_per_pixel();
        Self {
            width: desc.width,
            height: desc.height,
            format: desc.format,
            data: vec![0; len],
        }
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.format.bytes_per_pixel()
    }

    /// Texel at integer coordinates; outside reads as zero.
    pub fn texel(&self, x: i64, y: i64) -> [f32; 4] {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return [0.0; 4];
        }
        let off = self.offset(x as u32, y as u32);
        self.format.decode(&self.data[off..])
    }

    fn store(&mut self, x: u32, y: u32, c: [f32; 4]) {
        let off = self.offset(x, y);
        self.format.encode(c, &mut self.data[off..]);
    }

    /// Raw bytes of one texel.
    pub fn texel_bytes(&self, x: u32, y: u32) -> &[u8] {
        let off = self.offset(x, y);
        &self.data[off..off + self.format.bytes_per_pixel()]
    }

    #[inline]
    fn bounds(&self) -> IBox {
        IBox::from_size(self.width, self.height)
    }

    fn byte_len(&self) -> usize {
        self.data.len()
    }
}

#[derive(Debug, Copy, Clone)]
struct SoftProgram {
    prim: FacetKind,
    fill: FacetKind,
    alpha: AlphaMode,
    render: bool,
    layout: UniformLayout,
}

/// Call counters.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SoftStats {
    pub compiles: usize,
    pub draws: usize,
    pub uploads: usize,
    pub downloads: usize,
    pub textures_created: usize,
    pub textures_destroyed: usize,
    pub clears: usize,
    pub barriers: usize,
}

#[derive(Debug)]
pub struct SoftBackend {
    caps: Capabilities,
    textures: HashMap<u64, SoftTexture>,
    framebuffers: HashMap<u64, u64>,
    programs: HashMap<u64, SoftProgram>,
    next_id: u64,
    memory_limit: Option<usize>,
    memory_used: usize,
    fail_allocations: usize,
    stats: SoftStats,
}

impl SoftBackend {
    pub fn new(caps: Capabilities) -> Self {
        Self {
            caps,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            next_id: 1,
            memory_limit: None,
            memory_used: 0,
            fail_allocations: 0,
            stats: SoftStats::default(),
        }
    }

    /// Texture allocations beyond `bytes` in total report out-of-memory.
    pub fn with_memory_limit(caps: Capabilities, bytes: usize) -> Self {
        Self {
            memory_limit: Some(bytes),
            ..Self::new(caps)
        }
    }

    /// The next `n` texture allocations fail with out-of-memory.
    pub fn fail_next_allocations(&mut self, n: usize) {
        self.fail_allocations = n;
    }

    #[inline]
    pub fn stats(&self) -> SoftStats {
        self.stats
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    #[inline]
    pub fn memory_used(&self) -> usize {
        self.memory_used
    }

    pub fn texture(&self, id: TextureId) -> Option<&SoftTexture> {
        self.textures.get(&id.0)
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn texture_mut(&mut self, id: TextureId) -> Result<&mut SoftTexture> {
        self.textures
            .get_mut(&id.0)
            .ok_or_else(|| EngineError::Backend(format!("unknown texture {}", id.0)))
    }
}

impl PixelTransfer for SoftBackend {
    fn upload(&mut self, texture: TextureId, rect: IBox, data: &[u8], stride: usize) -> Result<()> {
        let tex = self.texture_mut(texture)?;
        let bpp = tex.format.bytes_per_pixel();
        check_transfer(tex, rect, data.len(), stride, bpp)?;
        let row_len = rect.width() as usize * bpp;
        for (row, y) in (rect.y1..rect.y2).enumerate() {
            let dst = tex.offset(rect.x1 as u32, y as u32);
            let src = row * stride;
            tex.data[dst..dst + row_len].copy_from_slice(&data[src..src + row_len]);
        }
        self.stats.uploads += 1;
        Ok(())
    }

    fn download(
        &mut self,
        texture: TextureId,
        rect: IBox,
        out: &mut [u8],
        stride: usize,
    ) -> Result<()> {
        let tex = self.texture_mut(texture)?;
        let bpp = tex.format.bytes_per_pixel();
        check_transfer(tex, rect, out.len(), stride, bpp)?;
        let row_len = rect.width() as usize * bpp;
        for (row, y) in (rect.y1..rect.y2).enumerate() {
            let src = tex.offset(rect.x1 as u32, y as u32);
            let dst = row * stride;
            out[dst..dst + row_len].copy_from_slice(&tex.data[src..src + row_len]);
        }
        self.stats.downloads += 1;
        Ok(())
    }
}

fn check_transfer(
    tex: &SoftTexture,
    rect: IBox,
    len: usize,
    stride: usize,
    bpp: usize,
) -> Result<()> {
    if rect.is_empty() || !tex.bounds().contains_box(rect) {
        return Err(EngineError::InvalidArgument(format!(
            "transfer rect {rect:?} outside {}x{}",
            tex.width, tex.height
        )));
    }
    if stride < rect.width() as usize * bpp || len < transfer_len(rect, stride, bpp) {
        return Err(EngineError::InvalidArgument(format!(
            "transfer buffer of {len} bytes too small for {rect:?} at stride {stride}"
        )));
    }
    Ok(())
}

impl Backend for SoftBackend {
    fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    fn create_texture(&mut self, desc: TextureDesc) -> Result<TextureId> {
        if desc.width == 0 || desc.height == 0 {
            return Err(EngineError::InvalidSize {
                width: desc.width,
                height: desc.height,
            });
        }
        let limit = self.caps.max_texture_size;
        if desc.width > limit || desc.height > limit {
            return Err(EngineError::SizeLimit {
                width: desc.width,
                height: desc.height,
                limit,
            });
        }
        if self.fail_allocations > 0 {
            self.fail_allocations -= 1;
            return Err(EngineError::OutOfMemory { what: "texture" });
        }
        let tex = SoftTexture::new(desc);
        if let Some(limit) = self.memory_limit {
            if self.memory_used + tex.byte_len() > limit {
                return Err(EngineError::OutOfMemory { what: "texture" });
            }
        }
        self.memory_used += tex.byte_len();
        let id = self.alloc_id();
        self.textures.insert(id, tex);
        self.stats.textures_created += 1;
        Ok(TextureId(id))
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if let Some(tex) = self.textures.remove(&texture.0) {
            self.memory_used -= tex.byte_len();
            self.stats.textures_destroyed += 1;
        }
    }

    fn create_framebuffer(&mut self, texture: TextureId) -> Result<FramebufferId> {
        if !self.textures.contains_key(&texture.0) {
            return Err(EngineError::Backend(format!("unknown texture {}", texture.0)));
        }
        let id = self.alloc_id();
        self.framebuffers.insert(id, texture.0);
        Ok(FramebufferId(id))
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.framebuffers.remove(&framebuffer.0);
    }

    fn clear_texture(&mut self, texture: TextureId) -> Result<()> {
        if !self.caps.has(Extensions::CLEAR_TEXTURE) {
            return Err(EngineError::Fallback("direct texture clear unsupported"));
        }
        self.texture_mut(texture)?.data.fill(0);
        self.stats.clears += 1;
        Ok(())
    }

    fn compile_program(&mut self, source: &ProgramSource) -> Result<ProgramHandle> {
        if source.prim == FacetKind::Custom || source.fill == FacetKind::Custom {
            return Err(EngineError::ProgramUnavailable {
                name: source.name.clone(),
                reason: "custom facets need a GPU backend".into(),
            });
        }
        let render = matches!(
            source.prim,
            FacetKind::CompositeRect | FacetKind::CompositeMaskRect
        );
        let id = self.alloc_id();
        self.programs.insert(
            id,
            SoftProgram {
                prim: source.prim,
                fill: source.fill,
                alpha: source.alpha,
                render,
                layout: source.layout,
            },
        );
        self.stats.compiles += 1;
        Ok(ProgramHandle(id))
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program.0);
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<()> {
        let prog = *self
            .programs
            .get(&call.program.0)
            .ok_or_else(|| EngineError::Backend(format!("unknown program {}", call.program.0)))?;
        let tex_id = *self
            .framebuffers
            .get(&call.target.0)
            .ok_or_else(|| EngineError::Backend(format!("unknown framebuffer {}", call.target.0)))?;
        let mut target = self
            .textures
            .remove(&tex_id)
            .ok_or_else(|| EngineError::Backend(format!("unknown texture {tex_id}")))?;

        // A draw reading its own target sees the contents from before the draw.
        let aliased = [call.source, call.mask]
            .iter()
            .any(|t| *t == Some(TextureId(tex_id)));
        let snapshot = aliased.then(|| target.clone());

        let result = operands(&self.textures, snapshot.as_ref(), tex_id, call).and_then(
            |(source, mask)| {
                let shader = Shader {
                    prog,
                    uniforms: call.uniforms,
                    source,
                    mask,
                };
                rasterize(&mut target, &shader, call.blend, call.scissor, call.rects)
            },
        );

        self.textures.insert(tex_id, target);
        self.stats.draws += 1;
        result
    }

    fn texture_barrier(&mut self) {
        self.stats.barriers += 1;
    }
}

type Operands<'a> = (Option<&'a SoftTexture>, Option<&'a SoftTexture>);

fn operands<'a>(
    textures: &'a HashMap<u64, SoftTexture>,
    snapshot: Option<&'a SoftTexture>,
    target: u64,
    call: &DrawCall<'_>,
) -> Result<Operands<'a>> {
    let lookup = |t: Option<TextureId>| match t {
        None => Ok(None),
        Some(id) if id.0 == target => Ok(snapshot),
        Some(id) => textures
            .get(&id.0)
            .map(Some)
            .ok_or_else(|| EngineError::Backend(format!("unknown texture {}", id.0))),
    };
    Ok((lookup(call.source)?, lookup(call.mask)?))
}

fn rasterize(
    target: &mut SoftTexture,
    shader: &Shader<'_>,
    blend: Option<BlendState>,
    scissor: Option<IBox>,
    rects: &[IBox],
) -> Result<()> {
    let mut clip = target.bounds();
    if let Some(s) = scissor {
        match clip.intersect(s) {
            Some(c) => clip = c,
            None => return Ok(()),
        }
    }
    for r in rects {
        let Some(r) = r.intersect(clip) else { continue };
        for y in r.y1..r.y2 {
            for x in r.x1..r.x2 {
                let pos = [x as f32 + 0.5, y as f32 + 0.5];
                let Some((color, color1)) = shader.shade(pos)? else {
                    continue;
                };
                let out = match blend {
                    None => color,
                    Some(b) => {
                        let dst = target.texel(x, y);
                        blend_pixel(b, color, color1, dst)
                    }
                };
                target.store(x as u32, y as u32, out);
            }
        }
    }
    Ok(())
}

fn factor(f: BlendFactor, c: usize, src: [f32; 4], src1: [f32; 4], dst: [f32; 4]) -> f32 {
    match f {
        BlendFactor::Zero => 0.0,
        BlendFactor::One => 1.0,
        BlendFactor::SrcAlpha => src[3],
        BlendFactor::OneMinusSrcAlpha => 1.0 - src[3],
        BlendFactor::DstAlpha => dst[3],
        BlendFactor::OneMinusDstAlpha => 1.0 - dst[3],
        BlendFactor::SrcColor => src[c],
        BlendFactor::OneMinusSrcColor => 1.0 - src[c],
        BlendFactor::Src1Color => src1[c],
        BlendFactor::OneMinusSrc1Color => 1.0 - src1[c],
        BlendFactor::DstColor => dst[c],
        BlendFactor::OneMinusDstColor => 1.0 - dst[c],
    }
}

fn blend_pixel(b: BlendState, src: [f32; 4], src1: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
    let mut out = [0.0; 4];
    for (c, o) in out.iter_mut().enumerate() {
        let v = src[c] * factor(b.src, c, src, src1, dst) + dst[c] * factor(b.dst, c, src, src1, dst);
        *o = v.clamp(0.0, 1.0);
    }
    out
}

struct Shader<'a> {
    prog: SoftProgram,
    uniforms: &'a [u8],
    source: Option<&'a SoftTexture>,
    mask: Option<&'a SoftTexture>,
}

/// Operand uniforms of the source or mask slot.
#[derive(Copy, Clone)]
struct Operand {
    m: [[f32; 4]; 3],
    size: [f32; 4],
    bounds: [f32; 4],
    flags: [f32; 4],
}

impl Shader<'_> {
    #[inline]
    fn u(&self, u: Uniform) -> [f32; 4] {
        self.prog.layout.read(self.uniforms, u)
    }

    fn operand(&self, mask: bool) -> Operand {
        let (m0, m1, m2, size, bounds, flags) = if mask {
            (
                Uniform::MaskMatrix0,
                Uniform::MaskMatrix1,
                Uniform::MaskMatrix2,
                Uniform::MaskSize,
                Uniform::MaskBounds,
                Uniform::MaskFlags,
            )
        } else {
            (
                Uniform::SrcMatrix0,
                Uniform::SrcMatrix1,
                Uniform::SrcMatrix2,
                Uniform::SrcSize,
                Uniform::SrcBounds,
                Uniform::SrcFlags,
            )
        };
        Operand {
            m: [self.u(m0), self.u(m1), self.u(m2)],
            size: self.u(size),
            bounds: self.u(bounds),
            flags: self.u(flags),
        }
    }

    fn fill_texel(&self, p: [f32; 2]) -> [f32; 4] {
        let size = self.u(Uniform::FillSize);
        let (w, h) = (size[0] as i64, size[1] as i64);
        let Some(tex) = self.source else {
            return [0.0; 4];
        };
        if w <= 0 || h <= 0 {
            return [0.0; 4];
        }
        let x = (p[0].floor() as i64).rem_euclid(w);
        let y = (p[1].floor() as i64).rem_euclid(h);
        tex.texel(x, y)
    }

    fn fill_pos(&self, pos: [f32; 2]) -> [f32; 2] {
        let o = self.u(Uniform::FillOffset);
        [pos[0] + o[0], pos[1] + o[1]]
    }

    fn to_target(&self, c: [f32; 4]) -> [f32; 4] {
        if self.u(Uniform::TargetInfo)[2] > 0.5 {
            [c[3], 0.0, 0.0, c[3]]
        } else {
            c
        }
    }

    /// `None` discards the fragment.
    fn shade(&self, pos: [f32; 2]) -> Result<Option<([f32; 4], [f32; 4])>> {
        let mut color = [0.0f32; 4];
        let mut mask_px = [1.0f32; 4];
        let mut source_px = [0.0f32; 4];

        match self.prog.prim {
            FacetKind::CopyArea => {
                let p = self.fill_pos(pos);
                color = match self.source {
                    Some(t) => t.texel(p[0].floor() as i64, p[1].floor() as i64),
                    None => [0.0; 4],
                };
            }
            FacetKind::PolyFillRect | FacetKind::CompositeRect => {}
            FacetKind::CompositeMaskRect => {
                mask_px = operand_sample(self.mask, self.operand(true), pos);
            }
            other => return Err(unsupported_kind(other)),
        }

        match self.prog.fill {
            FacetKind::Identity => {}
            FacetKind::Solid => color = self.u(Uniform::Fg),
            FacetKind::Tile => color = self.fill_texel(self.fill_pos(pos)),
            FacetKind::Stipple => {
                if self.fill_texel(self.fill_pos(pos))[0] < 0.5 {
                    return Ok(None);
                }
                color = self.u(Uniform::Fg);
            }
            FacetKind::OpaqueStipple => {
                color = if self.fill_texel(self.fill_pos(pos))[0] >= 0.5 {
                    self.u(Uniform::Fg)
                } else {
                    self.u(Uniform::Bg)
                };
            }
            FacetKind::RenderSolid => source_px = self.u(Uniform::Fg),
            FacetKind::RenderPicture => {
                source_px = operand_sample(self.source, self.operand(false), pos);
            }
            FacetKind::Render1x1 => {
                source_px = operand_texel(self.source, self.operand(false), 0, 0);
            }
            other => return Err(unsupported_kind(other)),
        }

        let mut color1 = [0.0f32; 4];
        if self.prog.render {
            let scale = |s: [f32; 4], m: [f32; 4]| -> [f32; 4] {
                [s[0] * m[0], s[1] * m[1], s[2] * m[2], s[3] * m[3]]
            };
            match self.prog.alpha {
                AlphaMode::Normal => color = self.to_target(source_px.map(|c| c * mask_px[3])),
                AlphaMode::CaFirst => color = self.to_target(mask_px.map(|m| m * source_px[3])),
                AlphaMode::CaSecond => color = self.to_target(scale(source_px, mask_px)),
                AlphaMode::DualBlend => {
                    color = self.to_target(scale(source_px, mask_px));
                    color1 = self.to_target(mask_px.map(|m| m * source_px[3]));
                }
            }
        }
        Ok(Some((color, color1)))
    }
}

fn unsupported_kind(kind: FacetKind) -> EngineError {
    EngineError::Backend(format!("facet {kind:?} cannot run on the software device"))
}

fn wrap_coord(i: i64, size: i64, mode: i32) -> i64 {
    match mode {
        1 => i.rem_euclid(size),
        2 => {
            let m = i.rem_euclid(2 * size);
            if m >= size { 2 * size - 1 - m } else { m }
        }
        _ => i.clamp(0, size - 1),
    }
}

fn operand_texel(tex: Option<&SoftTexture>, op: Operand, x: i64, y: i64) -> [f32; 4] {
    let Some(tex) = tex else {
        return [0.0; 4];
    };
    if op.flags[2] > 0.5 {
        let (fx, fy) = (x as f32, y as f32);
        let b = op.bounds;
        if fx < b[0] || fy < b[1] || fx >= b[2] || fy >= b[3] {
            return [0.0; 4];
        }
    }
    let (w, h) = (op.size[0] as i64, op.size[1] as i64);
    if w <= 0 || h <= 0 {
        return [0.0; 4];
    }
    let mode = op.flags[0] as i32;
    let c = tex.texel(wrap_coord(x, w, mode), wrap_coord(y, h, mode));
    if op.flags[3] > 0.5 {
        [0.0, 0.0, 0.0, c[0]]
    } else {
        c
    }
}

fn operand_sample(tex: Option<&SoftTexture>, op: Operand, pos: [f32; 2]) -> [f32; 4] {
    let row = |r: [f32; 4]| r[0] * pos[0] + r[1] * pos[1] + r[2];
    let w = row(op.m[2]);
    if w == 0.0 {
        return [0.0; 4];
    }
    let s = [row(op.m[0]) / w, row(op.m[1]) / w];
    if op.flags[1] < 0.5 {
        return operand_texel(tex, op, s[0].floor() as i64, s[1].floor() as i64);
    }
    let t = [s[0] - 0.5, s[1] - 0.5];
    let base = [t[0].floor(), t[1].floor()];
    let f = [t[0] - base[0], t[1] - base[1]];
    let (ix, iy) = (base[0] as i64, base[1] as i64);
    let c00 = operand_texel(tex, op, ix, iy);
    let c10 = operand_texel(tex, op, ix + 1, iy);
    let c01 = operand_texel(tex, op, ix, iy + 1);
    let c11 = operand_texel(tex, op, ix + 1, iy + 1);
    let mix = |a: [f32; 4], b: [f32; 4], t: f32| -> [f32; 4] {
        [
            a[0] + (b[0] - a[0]) * t,
            a[1] + (b[1] - a[1]) * t,
            a[2] + (b[2] - a[2]) * t,
            a[3] + (b[3] - a[3]) * t,
        ]
    };
    mix(mix(c00, c10, f[0]), mix(c01, c11, f[0]), f[1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{CompositeOp, Facet, UniformBlock, blend_for, build_source, facets};

    fn rgba(w: u32, h: u32) -> TextureDesc {
        TextureDesc { width: w, height: h, format: PixelFormat::Rgba8 }
    }

    fn compile(
        dev: &mut SoftBackend,
        prim: &Facet,
        fill: &Facet,
        alpha: AlphaMode,
    ) -> (ProgramHandle, UniformBlock) {
        let caps = dev.capabilities().clone();
        let src = build_source(prim, fill, alpha, 0, &[], &caps).unwrap();
        let handle = dev.compile_program(&src).unwrap();
        (handle, UniformBlock::new(src.layout))
    }

    fn draw(
        dev: &mut SoftBackend,
        program: ProgramHandle,
        target: FramebufferId,
        uniforms: &UniformBlock,
        source: Option<TextureId>,
        blend: Option<BlendState>,
        rects: &[IBox],
    ) {
        dev.draw(&DrawCall {
            program,
            target,
            blend,
            scissor: None,
            uniforms: uniforms.as_bytes(),
            source,
            mask: None,
            rects,
        })
        .unwrap();
    }

    // ── allocation ────────────────────────────────────────────────────────

    #[test]
    fn allocation_is_accounted() {
        let mut dev = SoftBackend::new(Capabilities::default());
        let t = dev.create_texture(rgba(4, 4)).unwrap();
        assert_eq!(dev.memory_used(), 64);
        dev.destroy_texture(t);
        dev.destroy_texture(t);
        assert_eq!(dev.memory_used(), 0);
        assert_eq!(dev.stats().textures_destroyed, 1);
    }

    #[test]
    fn memory_limit_and_injection_report_oom() {
        let mut dev = SoftBackend::with_memory_limit(Capabilities::default(), 100);
        dev.create_texture(rgba(4, 4)).unwrap();
        assert!(matches!(
            dev.create_texture(rgba(4, 4)),
            Err(EngineError::OutOfMemory { .. })
        ));

        let mut dev = SoftBackend::new(Capabilities::default());
        dev.fail_next_allocations(1);
        assert!(dev.create_texture(rgba(1, 1)).is_err());
        assert!(dev.create_texture(rgba(1, 1)).is_ok());
    }

    #[test]
    fn oversized_texture_is_a_size_error() {
        let caps = Capabilities { max_texture_size: 16, ..Capabilities::default() };
        let mut dev = SoftBackend::new(caps);
        assert!(matches!(
            dev.create_texture(rgba(17, 1)),
            Err(EngineError::SizeLimit { limit: 16, .. })
        ));
    }

    // ── drawing ───────────────────────────────────────────────────────────

    #[test]
    fn solid_fill_covers_only_the_rects() {
        let mut dev = SoftBackend::new(Capabilities::default());
        let tex = dev.create_texture(rgba(4, 4)).unwrap();
        let fb = dev.create_framebuffer(tex).unwrap();
        let (prog, mut u) = compile(&mut dev, &facets::POLY_FILL_RECT, &facets::SOLID, AlphaMode::Normal);
        u.set(Uniform::TargetInfo, [4.0, 4.0, 0.0, 0.0])
            .set(Uniform::Fg, [1.0, 0.0, 0.0, 1.0]);
        draw(&mut dev, prog, fb, &u, None, None, &[IBox::new(1, 1, 3, 2)]);

        let t = dev.texture(tex).unwrap();
        assert_eq!(t.texel_bytes(1, 1), &[255, 0, 0, 255]);
        assert_eq!(t.texel_bytes(2, 1), &[255, 0, 0, 255]);
        assert_eq!(t.texel_bytes(0, 0), &[0, 0, 0, 0]);
        assert_eq!(t.texel_bytes(1, 2), &[0, 0, 0, 0]);
    }

    #[test]
    fn over_blends_premultiplied() {
        let mut dev = SoftBackend::new(Capabilities::default());
        let tex = dev.create_texture(rgba(1, 1)).unwrap();
        dev.upload(tex, IBox::new(0, 0, 1, 1), &[0, 0, 255, 255], 4).unwrap();
        let fb = dev.create_framebuffer(tex).unwrap();
        let (prog, mut u) =
            compile(&mut dev, &facets::COMPOSITE_RECT, &facets::RENDER_SOLID, AlphaMode::Normal);
        u.set(Uniform::TargetInfo, [1.0, 1.0, 0.0, 0.0])
            .set(Uniform::Fg, [0.5, 0.0, 0.0, 0.5]);
        let blend = blend_for(CompositeOp::Over, AlphaMode::Normal, true, false);
        draw(&mut dev, prog, fb, &u, None, blend, &[IBox::new(0, 0, 1, 1)]);
        assert_eq!(dev.texture(tex).unwrap().texel_bytes(0, 0), &[128, 0, 128, 255]);
    }

    #[test]
    fn copy_reads_at_offset_and_sees_pre_draw_contents() {
        let mut dev = SoftBackend::new(Capabilities::default());
        let tex = dev.create_texture(rgba(4, 1)).unwrap();
        let row: Vec<u8> = (0..4u8).flat_map(|i| [i * 10, 0, 0, 255]).collect();
        dev.upload(tex, IBox::new(0, 0, 4, 1), &row, 16).unwrap();
        let fb = dev.create_framebuffer(tex).unwrap();
        let (prog, mut u) =
            compile(&mut dev, &facets::COPY_AREA, &Facet::IDENTITY, AlphaMode::Normal);
        u.set(Uniform::TargetInfo, [4.0, 1.0, 0.0, 0.0])
            .set(Uniform::FillOffset, [-1.0, 0.0, 0.0, 0.0]);
        // Shift right by one inside the same texture.
        draw(&mut dev, prog, fb, &u, Some(tex), None, &[IBox::new(1, 0, 4, 1)]);

        let mut out = [0u8; 16];
        dev.download(tex, IBox::new(0, 0, 4, 1), &mut out, 16).unwrap();
        let reds: Vec<u8> = out.chunks(4).map(|p| p[0]).collect();
        assert_eq!(reds, vec![0, 0, 10, 20]);
    }

    #[test]
    fn repeat_wrap_tiles_the_source() {
        let mut dev = SoftBackend::new(Capabilities::default());
        let src = dev.create_texture(rgba(2, 1)).unwrap();
        dev.upload(src, IBox::new(0, 0, 2, 1), &[255, 0, 0, 255, 0, 255, 0, 255], 8)
            .unwrap();
        let dst = dev.create_texture(rgba(5, 1)).unwrap();
        let fb = dev.create_framebuffer(dst).unwrap();
        let (prog, mut u) =
            compile(&mut dev, &facets::COMPOSITE_RECT, &facets::RENDER_PICTURE, AlphaMode::Normal);
        let rows = crate::coords::Transform::IDENTITY.to_uniform_rows();
        u.set(Uniform::TargetInfo, [5.0, 1.0, 0.0, 0.0])
            .set(Uniform::SrcMatrix0, rows[0])
            .set(Uniform::SrcMatrix1, rows[1])
            .set(Uniform::SrcMatrix2, rows[2])
            .set(Uniform::SrcSize, [2.0, 1.0, 0.0, 0.0])
            .set(Uniform::SrcFlags, [1.0, 0.0, 0.0, 0.0]);
        draw(&mut dev, prog, fb, &u, Some(src), None, &[IBox::new(0, 0, 5, 1)]);
        let t = dev.texture(dst).unwrap();
        let greens: Vec<u8> = (0..5).map(|x| t.texel_bytes(x, 0)[1]).collect();
        assert_eq!(greens, vec![0, 255, 0, 255, 0]);
    }

    /// A 4x1 target and a 2x1 fill texture whose first texel is set.
    fn fill_fixture(dev: &mut SoftBackend) -> (TextureId, FramebufferId, TextureId) {
        let dst = dev.create_texture(rgba(4, 1)).unwrap();
        dev.upload(dst, IBox::new(0, 0, 4, 1), &[0, 0, 255, 255].repeat(4), 16).unwrap();
        let fb = dev.create_framebuffer(dst).unwrap();
        let pattern = dev.create_texture(rgba(2, 1)).unwrap();
        dev.upload(pattern, IBox::new(0, 0, 2, 1), &[255, 0, 0, 255, 0, 255, 0, 255], 8)
            .unwrap();
        (dst, fb, pattern)
    }

    fn pixels(dev: &SoftBackend, tex: TextureId) -> Vec<Vec<u8>> {
        let t = dev.texture(tex).unwrap();
        (0..4).map(|x| t.texel_bytes(x, 0).to_vec()).collect()
    }

    #[test]
    fn tile_fill_repeats_from_the_offset() {
        let mut dev = SoftBackend::new(Capabilities::default());
        let (dst, fb, pattern) = fill_fixture(&mut dev);
        let (prog, mut u) = compile(&mut dev, &facets::POLY_FILL_RECT, &facets::TILE, AlphaMode::Normal);
        u.set(Uniform::TargetInfo, [4.0, 1.0, 0.0, 0.0])
            .set(Uniform::FillSize, [2.0, 1.0, 0.0, 0.0])
            .set(Uniform::FillOffset, [1.0, 0.0, 0.0, 0.0]);
        draw(&mut dev, prog, fb, &u, Some(pattern), None, &[IBox::new(0, 0, 3, 1)]);
        let px = pixels(&dev, dst);
        assert_eq!(px[0], [0, 255, 0, 255]);
        assert_eq!(px[1], [255, 0, 0, 255]);
        assert_eq!(px[2], [0, 255, 0, 255]);
        // Outside the rect.
        assert_eq!(px[3], [0, 0, 255, 255]);
    }

    #[test]
    fn stipple_leaves_clear_bits_untouched() {
        let mut dev = SoftBackend::new(Capabilities::default());
        let (dst, fb, pattern) = fill_fixture(&mut dev);
        let (prog, mut u) =
            compile(&mut dev, &facets::POLY_FILL_RECT, &facets::STIPPLE, AlphaMode::Normal);
        u.set(Uniform::TargetInfo, [4.0, 1.0, 0.0, 0.0])
            .set(Uniform::FillSize, [2.0, 1.0, 0.0, 0.0])
            .set(Uniform::Fg, [1.0, 1.0, 1.0, 1.0]);
        draw(&mut dev, prog, fb, &u, Some(pattern), None, &[IBox::new(0, 0, 4, 1)]);
        let px = pixels(&dev, dst);
        assert_eq!(px[0], [255, 255, 255, 255]);
        assert_eq!(px[1], [0, 0, 255, 255]);
        assert_eq!(px[2], [255, 255, 255, 255]);
        assert_eq!(px[3], [0, 0, 255, 255]);
    }

    #[test]
    fn opaque_stipple_paints_clear_bits_with_background() {
        let mut dev = SoftBackend::new(Capabilities::default());
        let (dst, fb, pattern) = fill_fixture(&mut dev);
        let (prog, mut u) =
            compile(&mut dev, &facets::POLY_FILL_RECT, &facets::OPAQUE_STIPPLE, AlphaMode::Normal);
        u.set(Uniform::TargetInfo, [4.0, 1.0, 0.0, 0.0])
            .set(Uniform::FillSize, [2.0, 1.0, 0.0, 0.0])
            .set(Uniform::FillOffset, [1.0, 0.0, 0.0, 0.0])
            .set(Uniform::Fg, [1.0, 1.0, 1.0, 1.0])
            .set(Uniform::Bg, [0.0, 0.0, 0.0, 1.0]);
        draw(&mut dev, prog, fb, &u, Some(pattern), None, &[IBox::new(0, 0, 4, 1)]);
        let px = pixels(&dev, dst);
        assert_eq!(px[0], [0, 0, 0, 255]);
        assert_eq!(px[1], [255, 255, 255, 255]);
        assert_eq!(px[2], [0, 0, 0, 255]);
        assert_eq!(px[3], [255, 255, 255, 255]);
    }

    #[test]
    fn mirror_wrap_reflects_at_edges() {
        assert_eq!(wrap_coord(-1, 4, 2), 0);
        assert_eq!(wrap_coord(4, 4, 2), 3);
        assert_eq!(wrap_coord(9, 4, 2), 1);
        assert_eq!(wrap_coord(-5, 4, 1), 3);
        assert_eq!(wrap_coord(7, 4, 0), 3);
    }

    #[test]
    fn alpha_in_red_target_stores_alpha() {
        let mut dev = SoftBackend::new(Capabilities::default());
        let tex = dev
            .create_texture(TextureDesc { width: 1, height: 1, format: PixelFormat::R8 })
            .unwrap();
        let fb = dev.create_framebuffer(tex).unwrap();
        let (prog, mut u) =
            compile(&mut dev, &facets::COMPOSITE_RECT, &facets::RENDER_SOLID, AlphaMode::Normal);
        u.set(Uniform::TargetInfo, [1.0, 1.0, 1.0, 0.0])
            .set(Uniform::Fg, [0.0, 0.0, 1.0, 1.0]);
        draw(&mut dev, prog, fb, &u, None, None, &[IBox::new(0, 0, 1, 1)]);
        assert_eq!(dev.texture(tex).unwrap().texel_bytes(0, 0), &[255]);
    }

    #[test]
    fn transfers_reject_short_buffers() {
        let mut dev = SoftBackend::new(Capabilities::default());
        let tex = dev.create_texture(rgba(2, 2)).unwrap();
        assert!(dev.upload(tex, IBox::new(0, 0, 2, 2), &[0; 12], 8).is_err());
        assert!(dev.upload(tex, IBox::new(0, 0, 3, 1), &[0; 12], 12).is_err());
    }
}

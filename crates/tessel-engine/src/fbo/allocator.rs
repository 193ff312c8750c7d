use crate::coords::Color;
use crate::device::{
    Backend, DrawCall, Extensions, FramebufferId, PixelFormat, TextureDesc, TextureId,
};
use crate::error::{EngineError, LogOnce, Result};
use crate::program::{AlphaMode, ProgramCache, Uniform, facets};

use super::{Surface, SurfacePool};

/// Creates, recycles and destroys GPU surfaces.
#[derive(Debug)]
pub struct FboAllocator {
    pool: SurfacePool,
    once: LogOnce,
}

impl FboAllocator {
    pub fn new(pool_per_key: usize, pool_bytes: u64) -> Self {
        Self {
            pool: SurfacePool::new(pool_per_key, pool_bytes),
            once: LogOnce::new(),
        }
    }

    /// Allocates a `width × height` surface, reusing a pooled one when possible.
    ///
    /// Sizes beyond the device limit are configuration errors and are never
    /// retried. Out-of-memory is reported once per context at warn level.
    pub fn create<B: Backend>(
        &mut self,
        backend: &mut B,
        width: u32,
        height: u32,
        format: PixelFormat,
        no_framebuffer: bool,
    ) -> Result<Surface> {
        if width == 0 || height == 0 {
            return Err(EngineError::InvalidSize { width, height });
        }
        let limit = backend.capabilities().max_texture_size;
        if width > limit || height > limit {
            return Err(EngineError::SizeLimit { width, height, limit });
        }

        if let Some(mut s) = self.pool.take(width, height, format) {
            if !no_framebuffer {
                if let Err(e) = self.ensure_framebuffer(backend, &mut s) {
                    self.discard(backend, s);
                    return Err(e);
                }
            }
            return Ok(s);
        }

        let texture = backend
            .create_texture(TextureDesc { width, height, format })
            .inspect_err(|e| self.once.report(e))?;
        let mut surface = Surface {
            texture,
            framebuffer: None,
            width,
            height,
            format,
            foreign: false,
        };
        if !no_framebuffer {
            if let Err(e) = self.ensure_framebuffer(backend, &mut surface) {
                backend.destroy_texture(texture);
                return Err(e);
            }
        }
        Ok(surface)
    }

    /// Wraps a texture owned elsewhere. Its contents are left untouched and
    /// it is never destroyed or pooled by the engine.
    pub fn create_from_existing_texture<B: Backend>(
        &mut self,
        backend: &mut B,
        texture: TextureId,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Surface> {
        let mut surface = Surface {
            texture,
            framebuffer: None,
            width,
            height,
            format,
            foreign: true,
        };
        self.ensure_framebuffer(backend, &mut surface)?;
        Ok(surface)
    }

    /// Attaches a render target on first use.
    pub fn ensure_framebuffer<B: Backend>(
        &mut self,
        backend: &mut B,
        surface: &mut Surface,
    ) -> Result<FramebufferId> {
        if let Some(fb) = surface.framebuffer {
            return Ok(fb);
        }
        let fb = backend
            .create_framebuffer(surface.texture)
            .inspect_err(|e| self.once.report(e))?;
        surface.framebuffer = Some(fb);
        Ok(fb)
    }

    /// Releases a surface; `None` is a no-op.
    ///
    /// Owned surfaces go back to the pool while it has room, evicting older
    /// pooled ones past the byte budget. Foreign ones only lose their
    /// framebuffer.
    pub fn destroy<B: Backend>(&mut self, backend: &mut B, surface: Option<Surface>) {
        let Some(surface) = surface else { return };
        for s in self.pool.put(surface) {
            self.discard(backend, s);
        }
    }

    /// Releases a surface without pooling it.
    pub fn discard<B: Backend>(&mut self, backend: &mut B, surface: Surface) {
        if let Some(fb) = surface.framebuffer {
            backend.destroy_framebuffer(fb);
        }
        if !surface.foreign {
            backend.destroy_texture(surface.texture);
        }
    }

    /// Zero-fills a surface.
    ///
    /// Uses a direct texture clear when the device has one, otherwise draws a
    /// transparent rectangle over the whole surface.
    pub fn clear<B: Backend>(
        &mut self,
        backend: &mut B,
        programs: &mut ProgramCache,
        surface: &mut Surface,
    ) -> Result<()> {
        if backend.capabilities().has(Extensions::CLEAR_TEXTURE) {
            return backend.clear_texture(surface.texture);
        }

        let fb = self.ensure_framebuffer(backend, surface)?;
        let prim = if backend.capabilities().supports_instancing() {
            &facets::POLY_FILL_RECT
        } else {
            &facets::POLY_FILL_RECT_120
        };
        let program = programs.build_or_get(backend, prim, &facets::SOLID, AlphaMode::Normal, 0, &[])?;
        let mut u = program.uniforms();
        u.set(
            Uniform::TargetInfo,
            [surface.width as f32, surface.height as f32, 0.0, 0.0],
        )
        .set(Uniform::Fg, Color::TRANSPARENT.to_array());
        let rects = [surface.bounds()];
        backend.draw(&DrawCall {
            program: program.handle,
            target: fb,
            blend: None,
            scissor: None,
            uniforms: u.as_bytes(),
            source: None,
            mask: None,
            rects: &rects,
        })
    }

    /// Destroys every pooled surface, returning how many were released.
    pub fn purge_pool<B: Backend>(&mut self, backend: &mut B) -> usize {
        let n = self.pool.purge(backend);
        if n > 0 {
            log::debug!("purged {n} pooled surfaces");
        }
        n
    }

    pub fn pooled_count(&self) -> usize {
        self.pool.len()
    }

    pub fn pooled_bytes(&self) -> u64 {
        self.pool.bytes()
    }
}

use std::collections::HashMap;

use crate::device::{Backend, PixelFormat};

use super::Surface;

type PoolKey = (u32, u32, PixelFormat);

fn surface_bytes(s: &Surface) -> u64 {
    s.width as u64 * s.height as u64 * s.format.bytes_per_pixel() as u64
}

/// Released surfaces kept for reuse, bucketed by size and format.
///
/// Each bucket holds at most `per_key` surfaces and the whole pool at most
/// `max_bytes` of texel storage. When a release would exceed the byte budget
/// the oldest pooled surfaces are evicted first.
#[derive(Debug)]
pub struct SurfacePool {
    /// Each entry carries the release stamp it was pooled with.
    buckets: HashMap<PoolKey, Vec<(u64, Surface)>>,
    per_key: usize,
    max_bytes: u64,
    bytes: u64,
    stamp: u64,
}

impl SurfacePool {
    pub fn new(per_key: usize, max_bytes: u64) -> Self {
        Self {
            buckets: HashMap::new(),
            per_key,
            max_bytes,
            bytes: 0,
            stamp: 0,
        }
    }

    pub fn take(&mut self, width: u32, height: u32, format: PixelFormat) -> Option<Surface> {
        let (_, s) = self.buckets.get_mut(&(width, height, format))?.pop()?;
        self.bytes -= surface_bytes(&s);
        Some(s)
    }

    /// Pools `surface` and returns whatever the caller must destroy: the
    /// surface itself when it does not fit, or the entries evicted for it.
    pub fn put(&mut self, surface: Surface) -> Vec<Surface> {
        let size = surface_bytes(&surface);
        if surface.foreign || self.per_key == 0 || size > self.max_bytes {
            return vec![surface];
        }
        let key = (surface.width, surface.height, surface.format);
        if self.buckets.get(&key).is_some_and(|b| b.len() >= self.per_key) {
            return vec![surface];
        }

        let mut evicted = Vec::new();
        while self.bytes + size > self.max_bytes {
            match self.evict_oldest() {
                Some(s) => evicted.push(s),
                None => break,
            }
        }
        self.stamp += 1;
        self.bytes += size;
        self.buckets.entry(key).or_default().push((self.stamp, surface));
        evicted
    }

    fn evict_oldest(&mut self) -> Option<Surface> {
        let key = self
            .buckets
            .iter()
            .filter_map(|(k, b)| b.first().map(|(stamp, _)| (*stamp, *k)))
            .min_by_key(|(stamp, _)| *stamp)
            .map(|(_, k)| k)?;
        let bucket = self.buckets.get_mut(&key)?;
        let (_, s) = bucket.remove(0);
        if bucket.is_empty() {
            self.buckets.remove(&key);
        }
        self.bytes -= surface_bytes(&s);
        Some(s)
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Texel bytes held by pooled surfaces.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Destroys every pooled surface.
    pub fn purge<B: Backend>(&mut self, backend: &mut B) -> usize {
        let mut n = 0;
        for (_, bucket) in self.buckets.drain() {
            for (_, s) in bucket {
                if let Some(fb) = s.framebuffer {
                    backend.destroy_framebuffer(fb);
                }
                backend.destroy_texture(s.texture);
                n += 1;
            }
        }
        self.bytes = 0;
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::TextureId;

    fn surface(id: u64, width: u32, height: u32) -> Surface {
        Surface {
            texture: TextureId(id),
            framebuffer: None,
            width,
            height,
            format: PixelFormat::Rgba8,
            foreign: false,
        }
    }

    #[test]
    fn full_bucket_hands_the_surface_back() {
        let mut pool = SurfacePool::new(1, u64::MAX);
        assert!(pool.put(surface(1, 4, 4)).is_empty());
        let back = pool.put(surface(2, 4, 4));
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].texture, TextureId(2));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn byte_budget_evicts_oldest_first() {
        // Room for two 4x4 RGBA surfaces.
        let mut pool = SurfacePool::new(4, 128);
        assert!(pool.put(surface(1, 4, 4)).is_empty());
        assert!(pool.put(surface(2, 2, 8)).is_empty());
        let evicted = pool.put(surface(3, 8, 2));
        assert_eq!(evicted.iter().map(|s| s.texture).collect::<Vec<_>>(), vec![TextureId(1)]);
        assert_eq!(pool.bytes(), 128);
        assert!(pool.take(4, 4, PixelFormat::Rgba8).is_none());
        assert_eq!(pool.take(2, 8, PixelFormat::Rgba8).map(|s| s.texture), Some(TextureId(2)));
        assert_eq!(pool.bytes(), 64);
    }

    #[test]
    fn eviction_crosses_formats_by_age() {
        // 16 bytes of R8 and 64 bytes of RGBA8 fill the budget exactly.
        let mut pool = SurfacePool::new(4, 80);
        let single = Surface { format: PixelFormat::R8, ..surface(1, 4, 4) };
        assert!(pool.put(single).is_empty());
        assert!(pool.put(surface(2, 4, 4)).is_empty());
        let evicted = pool.put(surface(3, 2, 2));
        assert_eq!(evicted.iter().map(|s| s.texture).collect::<Vec<_>>(), vec![TextureId(1)]);
        assert!(pool.take(4, 4, PixelFormat::R8).is_none());
        assert_eq!(pool.bytes(), 80);
    }

    #[test]
    fn oversized_surface_is_never_pooled() {
        let mut pool = SurfacePool::new(4, 63);
        let back = pool.put(surface(1, 4, 4));
        assert_eq!(back.len(), 1);
        assert!(pool.is_empty());
        assert_eq!(pool.bytes(), 0);
    }
}

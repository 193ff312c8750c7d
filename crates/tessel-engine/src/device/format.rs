use super::Capabilities;

/// Texel storage format of a GPU surface.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// One channel; 8-bit pixmaps keep their alpha here.
    R8,
    Rgba8,
    /// Packed little-endian `u32`: red in the low ten bits, alpha in the top two.
    Rgb10a2,
}

impl PixelFormat {
    /// GPU format for a pixmap depth, `None` when the depth stays on the CPU.
    pub fn for_depth(depth: u8, caps: &Capabilities) -> Option<PixelFormat> {
        match depth {
            8 if caps.alpha_in_red => Some(PixelFormat::R8),
            8 => Some(PixelFormat::Rgba8),
            24 | 32 => Some(PixelFormat::Rgba8),
            30 => Some(PixelFormat::Rgb10a2),
            _ => None,
        }
    }

    #[inline]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::R8 => 1,
            PixelFormat::Rgba8 | PixelFormat::Rgb10a2 => 4,
        }
    }

    /// Texel as it reads back from the texture: one-channel formats
    /// return `(r, 0, 0, 1)`.
    pub fn decode(self, px: &[u8]) -> [f32; 4] {
        match self {
            PixelFormat::R8 => [px[0] as f32 / 255.0, 0.0, 0.0, 1.0],
            PixelFormat::Rgba8 => [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
                px[3] as f32 / 255.0,
            ],
            PixelFormat::Rgb10a2 => {
                let v = u32::from_le_bytes([px[0], px[1], px[2], px[3]]);
                [
                    (v & 0x3ff) as f32 / 1023.0,
                    ((v >> 10) & 0x3ff) as f32 / 1023.0,
                    ((v >> 20) & 0x3ff) as f32 / 1023.0,
                    (v >> 30) as f32 / 3.0,
                ]
            }
        }
    }

    pub fn encode(self, c: [f32; 4], out: &mut [u8]) {
        let unorm = |v: f32, max: f32| (v.clamp(0.0, 1.0) * max + 0.5) as u32;
        match self {
            PixelFormat::R8 => out[0] = unorm(c[0], 255.0) as u8,
            PixelFormat::Rgba8 => {
                for (o, v) in out.iter_mut().zip(c) {
                    *o = unorm(v, 255.0) as u8;
                }
            }
            PixelFormat::Rgb10a2 => {
                let v = unorm(c[0], 1023.0)
                    | (unorm(c[1], 1023.0) << 10)
                    | (unorm(c[2], 1023.0) << 20)
                    | (unorm(c[3], 3.0) << 30);
                out[..4].copy_from_slice(&v.to_le_bytes());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_mapping_follows_capabilities() {
        let caps = Capabilities::default();
        assert_eq!(PixelFormat::for_depth(8, &caps), Some(PixelFormat::R8));
        assert_eq!(PixelFormat::for_depth(32, &caps), Some(PixelFormat::Rgba8));
        assert_eq!(PixelFormat::for_depth(30, &caps), Some(PixelFormat::Rgb10a2));
        assert_eq!(PixelFormat::for_depth(15, &caps), None);

        let no_red = Capabilities { alpha_in_red: false, ..Capabilities::default() };
        assert_eq!(PixelFormat::for_depth(8, &no_red), Some(PixelFormat::Rgba8));
    }

    #[test]
    fn r8_reads_back_as_red_only() {
        assert_eq!(PixelFormat::R8.decode(&[255]), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn rgb10a2_packs_channels_in_order() {
        let mut px = [0u8; 4];
        PixelFormat::Rgb10a2.encode([1.0, 0.0, 1.0, 1.0], &mut px);
        assert_eq!(u32::from_le_bytes(px), 0x3ff | (0x3ff << 20) | (3 << 30));
        assert_eq!(PixelFormat::Rgb10a2.decode(&px), [1.0, 0.0, 1.0, 1.0]);
    }
}

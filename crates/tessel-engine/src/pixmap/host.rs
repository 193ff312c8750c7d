use crate::device::PixelFormat;
use crate::error::{EngineError, Result};

/// Host-memory pixels of a pixmap, in the layout its GPU format uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostImage {
    width: u32,
    height: u32,
    format: PixelFormat,
    stride: usize,
    data: Vec<u8>,
}

impl HostImage {
    /// Zeroed image with tightly packed rows.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let stride = width as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            stride,
            data: vec![0; stride * height as usize],
        }
    }

    pub fn from_data(
        width: u32,
        height: u32,
        format: PixelFormat,
        stride: usize,
        data: Vec<u8>,
    ) -> Result<Self> {
        let row = width as usize * format.bytes_per_pixel();
        if stride < row || data.len() < stride * height as usize {
            return Err(EngineError::InvalidArgument(format!(
                "{} bytes at stride {stride} cannot hold {width}x{height}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            stride,
            data,
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.stride + x as usize * self.format.bytes_per_pixel()
    }

    /// Bytes from pixel `(x, y)` to the end of the image.
    pub fn bytes_from(&self, x: u32, y: u32) -> &[u8] {
        &self.data[self.offset(x, y)..]
    }

    pub fn bytes_from_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        let off = self.offset(x, y);
        &mut self.data[off..]
    }

    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let off = self.offset(x, y);
        &self.data[off..off + self.format.bytes_per_pixel()]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, px: &[u8]) {
        let off = self.offset(x, y);
        let n = self.format.bytes_per_pixel();
        self.data[off..off + n].copy_from_slice(&px[..n]);
    }
}

use crate::context::RenderContext;
use crate::coords::Region;
use crate::device::{Backend, transfer_len};
use crate::error::{EngineError, Result, fallback};
use crate::pixmap::{HostImage, Pixmap, PixmapId, PixmapUsage, ResidencyHint};
use crate::tiler::{ClipDirection, RepeatMode, compute_clipped_regions};

/// Byte offset of pixmap pixel `(x, y)` in a buffer whose first byte is
/// pixel `origin`.
#[inline]
fn offset_of(x: i64, y: i64, origin: (i64, i64), stride: usize, bpp: usize) -> usize {
    (y - origin.1) as usize * stride + (x - origin.0) as usize * bpp
}

fn check_len(region: &Region, origin: (i64, i64), len: usize, stride: usize, bpp: usize) -> Result<()> {
    let Some(ext) = region.extents() else { return Ok(()) };
    let need = offset_of(ext.x1, ext.y1, origin, stride, bpp)
        + transfer_len(ext, stride, bpp);
    if stride < ext.width() as usize * bpp || len < need {
        return Err(EngineError::InvalidArgument(format!(
            "{len} bytes at stride {stride} cannot hold {ext:?}"
        )));
    }
    Ok(())
}

/// Writes `region` of a resident pixmap from `data`.
pub(super) fn write_blocks<B: Backend>(
    backend: &mut B,
    pm: &Pixmap,
    region: &Region,
    origin: (i64, i64),
    data: &[u8],
    stride: usize,
) -> Result<()> {
    let bpp = pm.format().map_or(4, |f| f.bytes_per_pixel());
    check_len(region, origin, data.len(), stride, bpp)?;
    for e in compute_clipped_regions(pm.grid(), region, RepeatMode::None, ClipDirection::empty()) {
        let s = pm.surface(e.block).ok_or_else(|| fallback("block is not resident"))?;
        let b = pm.grid().block_box(e.block);
        for r in e.region.boxes() {
            let off = offset_of(r.x1, r.y1, origin, stride, bpp);
            backend.upload(s.texture(), r.translate(-b.x1, -b.y1), &data[off..], stride)?;
        }
    }
    Ok(())
}

/// Reads `region` of a resident pixmap into `out`.
pub(super) fn read_blocks<B: Backend>(
    backend: &mut B,
    pm: &Pixmap,
    region: &Region,
    origin: (i64, i64),
    out: &mut [u8],
    stride: usize,
) -> Result<()> {
    let bpp = pm.format().map_or(4, |f| f.bytes_per_pixel());
    check_len(region, origin, out.len(), stride, bpp)?;
    for e in compute_clipped_regions(pm.grid(), region, RepeatMode::None, ClipDirection::empty()) {
        let s = pm.surface(e.block).ok_or_else(|| fallback("block is not resident"))?;
        let b = pm.grid().block_box(e.block);
        for r in e.region.boxes() {
            let off = offset_of(r.x1, r.y1, origin, stride, bpp);
            backend.download(s.texture(), r.translate(-b.x1, -b.y1), &mut out[off..], stride)?;
        }
    }
    Ok(())
}

fn write_host(img: &mut HostImage, region: &Region, origin: (i64, i64), data: &[u8], stride: usize) -> Result<()> {
    let bpp = img.format().bytes_per_pixel();
    check_len(region, origin, data.len(), stride, bpp)?;
    for r in region.boxes() {
        let row = r.width() as usize * bpp;
        for y in r.y1..r.y2 {
            let off = offset_of(r.x1, y, origin, stride, bpp);
            img.bytes_from_mut(r.x1 as u32, y as u32)[..row].copy_from_slice(&data[off..off + row]);
        }
    }
    Ok(())
}

fn read_host(img: &HostImage, region: &Region, origin: (i64, i64), out: &mut [u8], stride: usize) -> Result<()> {
    let bpp = img.format().bytes_per_pixel();
    check_len(region, origin, out.len(), stride, bpp)?;
    for r in region.boxes() {
        let row = r.width() as usize * bpp;
        for y in r.y1..r.y2 {
            let off = offset_of(r.x1, y, origin, stride, bpp);
            out[off..off + row].copy_from_slice(&img.bytes_from(r.x1 as u32, y as u32)[..row]);
        }
    }
    Ok(())
}

impl<B: Backend> RenderContext<B> {
    /// Writes pixels into `region`.
    ///
    /// `data` starts at the top-left pixel of the region's extents, rows
    /// `stride` bytes apart; parts of the region outside the pixmap are
    /// skipped. CPU-only pixmaps are written in host memory, everything else
    /// is made resident first.
    pub fn upload(&mut self, id: PixmapId, region: &Region, data: &[u8], stride: usize) -> Result<()> {
        let Some(ext) = region.extents() else { return Ok(()) };
        let origin = (ext.x1, ext.y1);
        let pm = self.pixmaps.get(id)?;
        let clipped = region.intersect_box(pm.bounds());
        if clipped.is_empty() {
            return Ok(());
        }

        if pm.usage() == PixmapUsage::CpuOnly {
            let img = self
                .pixmaps
                .get_mut(id)?
                .host_mut()
                .ok_or_else(|| fallback("CPU pixmap has no host image"))?;
            return write_host(img, &clipped, origin, data, stride);
        }

        self.ensure_resident(id, ResidencyHint::NO_FRAMEBUFFER)?;
        let pm = self.pixmaps.get(id)?;
        write_blocks(&mut self.backend, pm, &clipped, origin, data, stride)
    }

    /// Reads pixels of `region` into `out`, laid out as for [`Self::upload`].
    ///
    /// A pixmap that is neither resident nor backed by host memory has no
    /// pixels to read and is declined.
    pub fn download(&mut self, id: PixmapId, region: &Region, out: &mut [u8], stride: usize) -> Result<()> {
        let Some(ext) = region.extents() else { return Ok(()) };
        let origin = (ext.x1, ext.y1);
        let pm = self.pixmaps.get(id)?;
        let clipped = region.intersect_box(pm.bounds());
        if clipped.is_empty() {
            return Ok(());
        }
        if pm.is_resident() {
            return read_blocks(&mut self.backend, pm, &clipped, origin, out, stride);
        }
        match pm.host() {
            Some(img) => read_host(img, &clipped, origin, out, stride),
            None => Err(fallback("pixmap has no pixels to read")),
        }
    }
}

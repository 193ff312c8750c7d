use tessel_engine::coords::{Color, IBox, Region, Transform};
use tessel_engine::device::{Capabilities, SoftBackend};
use tessel_engine::program::{CompositeOp, facets};
use tessel_engine::tiler::{BlockGrid, ClipDirection, RepeatMode, compute_clipped_regions};
use tessel_engine::{
    CompositeRequest, EngineConfig, ErrorKind, Picture, PixmapId, PixmapUsage, RenderContext,
    ResidencyHint,
};

fn ctx(max: u32) -> RenderContext<SoftBackend> {
    let caps = Capabilities { max_texture_size: max, ..Capabilities::default() };
    RenderContext::new(SoftBackend::new(caps), EngineConfig::default())
}

fn read_all(ctx: &mut RenderContext<SoftBackend>, id: PixmapId, w: u32, h: u32) -> Vec<u8> {
    let mut out = vec![0u8; (w * h * 4) as usize];
    ctx.download(id, &Region::from_box(IBox::from_size(w, h)), &mut out, w as usize * 4)
        .unwrap();
    out
}

// ── tiler ───────────────────────────────────────────────────────────────

#[test]
fn full_region_on_two_by_two_grid() {
    let grid = BlockGrid::new(2048, 2048, 1024, 1024);
    let all = Region::from_box(IBox::from_size(2048, 2048));
    let entries = compute_clipped_regions(&grid, &all, RepeatMode::None, ClipDirection::empty());
    assert_eq!(entries.len(), 4);
    for e in &entries {
        assert_eq!(e.region, Region::from_box(grid.block_box(e.block)));
    }
}

#[test]
fn normal_repeat_folds_into_the_pixmap() {
    let grid = BlockGrid::single(512, 512);
    let r = Region::from_box(IBox::new(-600, 10, -100, 20));
    let entries = compute_clipped_regions(&grid, &r, RepeatMode::Normal, ClipDirection::empty());
    assert!(!entries.is_empty());
    let mut covered = 0;
    for e in &entries {
        let ext = e.source.extents().unwrap();
        assert!(ext.x1 >= 0 && ext.x2 <= 512, "{ext:?}");
        covered += e.region.area();
    }
    assert_eq!(covered, 500 * 10);
}

// ── programs ────────────────────────────────────────────────────────────

#[test]
fn second_program_request_is_cached() {
    let mut ctx = ctx(1024);
    let a = ctx.build_or_get_program(&facets::POLY_FILL_RECT, &facets::SOLID, &[]).unwrap();
    let b = ctx.build_or_get_program(&facets::POLY_FILL_RECT, &facets::SOLID, &[]).unwrap();
    assert_eq!(a.handle, b.handle);
    assert_eq!(ctx.program_compile_count(), 1);
    assert_eq!(ctx.backend().stats().compiles, 1);
}

// ── residency ───────────────────────────────────────────────────────────

#[test]
fn forced_oom_leaves_pixmap_unattached() {
    let mut ctx = ctx(1024);
    let id = ctx.create_pixmap(64, 64, 32, PixmapUsage::Gpu).unwrap();
    ctx.backend_mut().fail_next_allocations(1);
    let err = ctx.ensure_resident(id, ResidencyHint::empty()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    assert!(!ctx.pixmap(id).unwrap().is_resident());
    assert_eq!(ctx.backend().live_textures(), 0);

    ctx.ensure_resident(id, ResidencyHint::empty()).unwrap();
    assert!(ctx.pixmap(id).unwrap().is_resident());
}

#[test]
fn ensure_resident_twice_keeps_the_surface() {
    let mut ctx = ctx(1024);
    let id = ctx.create_pixmap(32, 32, 32, PixmapUsage::Gpu).unwrap();
    ctx.ensure_resident(id, ResidencyHint::empty()).unwrap();
    let first = ctx.pixmap(id).unwrap().surface(0).unwrap().texture();
    ctx.ensure_resident(id, ResidencyHint::empty()).unwrap();
    assert_eq!(ctx.pixmap(id).unwrap().surface(0).unwrap().texture(), first);
    assert_eq!(ctx.backend().live_textures(), 1);
}

// ── composite ───────────────────────────────────────────────────────────

/// Translated OVER composite of an 8×2 picture, on a device of `max`.
fn translated_over(max: u32) -> Vec<u8> {
    let mut ctx = ctx(max);
    let src = ctx.create_pixmap(8, 2, 32, PixmapUsage::Gpu).unwrap();
    let data: Vec<u8> = (0..16u8).flat_map(|i| [i * 8, 0, 0, 128]).collect();
    ctx.upload(src, &Region::from_box(IBox::from_size(8, 2)), &data, 32).unwrap();

    let dst = ctx.create_pixmap(8, 2, 32, PixmapUsage::Gpu).unwrap();
    let all = Region::from_box(IBox::from_size(8, 2));
    ctx.fill_solid(dst, &all, Color::new(0.0, 0.0, 1.0, 1.0)).unwrap();

    let pic = Picture::pixmap(src).with_transform(Transform::translate(1.0, 0.0));
    ctx.composite_region(&CompositeRequest {
        op: CompositeOp::Over,
        source: &pic,
        mask: None,
        dest: dst,
        region: &all,
        src_offset: (0, 0),
        mask_offset: (0, 0),
    })
    .unwrap();
    read_all(&mut ctx, dst, 8, 2)
}

#[test]
fn tiled_composite_matches_single_texture() {
    let single = translated_over(64);
    let tiled = translated_over(4);
    assert_eq!(tiled, single);
    // Column 7 reads past the source edge and keeps the fill.
    assert_eq!(&single[7 * 4..8 * 4], &[0, 0, 255, 255]);
}

/// SRC composite of a `sw × sh` pattern over a 10×10 destination.
fn composite_pattern(
    max: u32,
    (sw, sh): (u32, u32),
    repeat: RepeatMode,
    transform: Option<Transform>,
) -> Vec<u8> {
    let mut ctx = ctx(max);
    let src = ctx.create_pixmap(sw, sh, 32, PixmapUsage::Gpu).unwrap();
    let data: Vec<u8> = (0..(sw * sh) as u8)
        .flat_map(|i| [i.wrapping_mul(37), i.wrapping_mul(11).wrapping_add(5), 200 - i, 255])
        .collect();
    ctx.upload(src, &Region::from_box(IBox::from_size(sw, sh)), &data, sw as usize * 4)
        .unwrap();

    let dst = ctx.create_pixmap(10, 10, 32, PixmapUsage::Gpu).unwrap();
    let all = Region::from_box(IBox::from_size(10, 10));
    ctx.fill_solid(dst, &all, Color::new(0.0, 1.0, 0.0, 1.0)).unwrap();

    let mut pic = Picture::pixmap(src).with_repeat(repeat);
    if let Some(t) = transform {
        pic = pic.with_transform(t);
    }
    ctx.composite_region(&CompositeRequest {
        op: CompositeOp::Src,
        source: &pic,
        mask: None,
        dest: dst,
        region: &all,
        src_offset: (-3, -1),
        mask_offset: (0, 0),
    })
    .unwrap();
    read_all(&mut ctx, dst, 10, 10)
}

#[test]
fn tiled_source_matches_single_texture_in_every_mode() {
    let modes = [RepeatMode::None, RepeatMode::Pad, RepeatMode::Normal, RepeatMode::Reflect];
    let transforms = [
        None,
        Some(Transform::translate(-2.0, 3.0)),
        Some(Transform::scale(0.5, 0.5)),
    ];
    // One row of blocks, then a full 2×2 grid.
    for size in [(6, 3), (6, 5)] {
        for mode in modes {
            for t in transforms {
                let single = composite_pattern(64, size, mode, t);
                let tiled = composite_pattern(4, size, mode, t);
                assert_eq!(tiled, single, "{size:?} {mode:?} {t:?}");
            }
        }
    }
}

#[test]
fn repeating_source_covers_the_whole_destination() {
    for mode in [RepeatMode::Normal, RepeatMode::Reflect, RepeatMode::Pad] {
        let px = composite_pattern(4, (6, 3), mode, None);
        assert!(px.chunks(4).all(|p| p[3] == 255), "{mode:?}");
    }
    // Without repeat, destination (0, 0) reads source (-3, -1).
    let px = composite_pattern(4, (6, 3), RepeatMode::None, None);
    assert_eq!(&px[..4], &[0, 0, 0, 0]);
    // Destination (3, 1) reads source (0, 0).
    assert_eq!(&px[(10 + 3) * 4..(10 + 4) * 4], &[0, 5, 200, 255]);
}

#[test]
fn copy_across_pixmaps_round_trips() {
    let mut ctx = ctx(4);
    let a = ctx.create_pixmap(8, 4, 32, PixmapUsage::Gpu).unwrap();
    let b = ctx.create_pixmap(8, 4, 32, PixmapUsage::Gpu).unwrap();
    let all = Region::from_box(IBox::from_size(8, 4));
    let data: Vec<u8> = (0..32u8).flat_map(|i| [i, 255 - i, 3, 255]).collect();
    ctx.upload(a, &all, &data, 32).unwrap();

    ctx.copy_area(a, b, &all, 0, 0, ClipDirection::empty()).unwrap();
    assert_eq!(read_all(&mut ctx, b, 8, 4), data);
    assert_eq!(ctx.pixmap(b).unwrap().block_count(), 2);
}

#[test]
fn cpu_only_source_is_uploaded_into_gpu_destination() {
    let mut ctx = ctx(64);
    let host = ctx.create_pixmap(2, 2, 32, PixmapUsage::CpuOnly).unwrap();
    let all = Region::from_box(IBox::from_size(2, 2));
    let data = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];
    ctx.upload(host, &all, &data, 8).unwrap();

    let gpu = ctx.create_pixmap(2, 2, 32, PixmapUsage::Gpu).unwrap();
    ctx.copy_area(host, gpu, &all, 0, 0, ClipDirection::empty()).unwrap();
    assert!(ctx.pixmap(gpu).unwrap().is_resident());
    assert_eq!(read_all(&mut ctx, gpu, 2, 2), data);
}

#[test]
fn teardown_releases_every_texture() {
    let mut ctx = ctx(4);
    let id = ctx.create_pixmap(10, 10, 32, PixmapUsage::Gpu).unwrap();
    ctx.ensure_resident(id, ResidencyHint::empty()).unwrap();
    assert_eq!(ctx.backend().live_textures(), 9);
    ctx.teardown();
    assert_eq!(ctx.backend().live_textures(), 0);
    assert_eq!(ctx.backend().live_framebuffers(), 0);
}

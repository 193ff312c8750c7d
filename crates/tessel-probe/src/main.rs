use anyhow::Context as _;

use tessel_engine::config::BackendChoice;
use tessel_engine::coords::{Color, IBox, Region};
use tessel_engine::device::{Backend, Capabilities, SoftBackend, WgpuBackend, WgpuInit};
use tessel_engine::logging::init_logging;
use tessel_engine::program::{CompositeOp, Facet, facets};
use tessel_engine::tiler::{ClipDirection, RepeatMode};
use tessel_engine::{CompositeRequest, EngineConfig, Picture, PixmapUsage, RenderContext};

fn main() -> anyhow::Result<()> {
    let mut config = EngineConfig::load_or_default();
    config.merge_with_env();
    init_logging(config.logging.clone());

    match config.backend {
        BackendChoice::Wgpu => match WgpuBackend::new_blocking(WgpuInit::default()) {
            Ok(backend) => run(backend, config),
            Err(e) => {
                log::warn!("wgpu unavailable ({e:#}); using the software device");
                run(SoftBackend::new(Capabilities::default()), config)
            }
        },
        BackendChoice::Soft => run(SoftBackend::new(Capabilities::default()), config),
    }
}

fn run<B: Backend>(backend: B, config: EngineConfig) -> anyhow::Result<()> {
    let mut ctx = RenderContext::new(backend, config);
    let caps = ctx.caps().clone();
    println!("max texture   {}", caps.max_texture_size);
    println!("shading       {}", caps.shading_version);
    println!("extensions    {:?}", caps.extensions);
    println!("tile limit    {}", ctx.tile_limit());

    // ── programs ──────────────────────────────────────────────────────────
    for (name, prim, fill) in [
        ("fill", &facets::POLY_FILL_RECT, &facets::SOLID),
        ("copy", &facets::COPY_AREA, &Facet::IDENTITY),
        ("render", &facets::COMPOSITE_RECT, &facets::RENDER_PICTURE),
    ] {
        match ctx.build_or_get_program(prim, fill, &[]) {
            Ok(p) => println!("program {name:<8} version {}", p.version),
            Err(e) => println!("program {name:<8} unavailable: {e}"),
        }
    }

    // ── tiling ────────────────────────────────────────────────────────────
    let w = (ctx.tile_limit() + ctx.tile_limit() / 2).min(4096);
    let big = ctx.create_pixmap(w, 64, 32, PixmapUsage::Gpu)?;
    let all = Region::from_box(IBox::from_size(w, 64));
    ctx.fill_solid(big, &all, Color::new(0.0, 0.0, 1.0, 1.0))
        .context("filling the large pixmap")?;
    let blocks = ctx.pixmap(big)?.block_count();
    let entries = ctx.compute_clipped_regions(big, &all, RepeatMode::None, ClipDirection::empty())?;
    println!("large pixmap  {w}x64 in {blocks} blocks, {} clipped entries", entries.len());

    // ── composite ─────────────────────────────────────────────────────────
    let dest = ctx.create_pixmap(64, 64, 32, PixmapUsage::Gpu)?;
    let region = Region::from_box(IBox::from_size(64, 64));
    ctx.fill_solid(dest, &region, Color::new(1.0, 0.0, 0.0, 1.0))?;
    let src = Picture::pixmap(big);
    ctx.composite_region(&CompositeRequest {
        op: CompositeOp::Over,
        source: &src,
        mask: None,
        dest,
        region: &region,
        src_offset: (w as i64 - 32, 0),
        mask_offset: (0, 0),
    })
    .context("compositing across blocks")?;
    ctx.copy_area(dest, dest, &Region::from_box(IBox::new(0, 0, 32, 32)), 16, 16, ClipDirection::empty())?;

    let mut px = [0u8; 4];
    ctx.download(dest, &Region::from_box(IBox::new(8, 8, 9, 9)), &mut px, 4)?;
    println!("composite     pixel (8, 8) = {px:?}");
    println!("compiles      {}", ctx.program_compile_count());
    println!("pooled        {}", ctx.pooled_surfaces());

    ctx.destroy_pixmap(big)?;
    ctx.destroy_pixmap(dest)?;
    ctx.teardown();
    Ok(())
}

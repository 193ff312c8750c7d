//! Tessel engine crate.
//!
//! GPU raster resource management for a 2D compositing server: surfaces and
//! their pool, lazily resident pixmaps, tiling of pixmaps larger than one
//! texture, shader programs assembled from facets, and the composite
//! dispatcher that ties them together.

pub mod composite;
pub mod config;
pub mod coords;
pub mod device;
pub mod error;
pub mod fbo;
pub mod logging;
pub mod pixmap;
pub mod program;
pub mod tiler;

mod context;

pub use composite::{CompositeRequest, Filter, Picture, PictureSource};
pub use config::EngineConfig;
pub use context::RenderContext;
pub use error::{EngineError, ErrorKind, Result};
pub use pixmap::{PixmapId, PixmapUsage, ResidencyHint};

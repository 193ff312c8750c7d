//! FBO allocator: GPU surfaces and their recycling pool.

mod allocator;
mod pool;
mod surface;

pub use allocator::FboAllocator;
pub use pool::SurfacePool;
pub use surface::Surface;

//! Error taxonomy.
//!
//! Every failure the engine reports tells the caller one thing: take the
//! software path for this operation. The [`ErrorKind`] says why, and whether a
//! retry on the GPU can ever succeed.

use thiserror::Error;

/// Coarse failure category.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Size or format beyond what the device supports. Never retried.
    Configuration,
    /// The device ran out of memory while allocating.
    ResourceExhausted,
    /// A shader permutation needs a feature the device lacks.
    CapabilityGap,
    /// A temporary buffer could not be allocated while merging tiles.
    PartialMerge,
    /// No GPU path applies to this request.
    Unsupported,
    /// Device or driver failure.
    Backend,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{width}x{height} exceeds the device limit of {limit}")]
    SizeLimit { width: u32, height: u32, limit: u32 },

    #[error("invalid dimensions {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("depth {0} has no GPU pixel format")]
    UnsupportedDepth(u8),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("config {path}: {reason}")]
    Config { path: String, reason: String },

    #[error("out of GPU memory allocating {what}")]
    OutOfMemory { what: &'static str },

    #[error("program {name} unavailable: {reason}")]
    ProgramUnavailable { name: String, reason: String },

    #[error("temporary merge buffer {width}x{height} could not be allocated")]
    MergeAllocation { width: u32, height: u32 },

    #[error("no GPU path: {0}")]
    Fallback(&'static str),

    #[error("stale pixmap handle")]
    StalePixmap,

    #[error("backend failure: {0}")]
    Backend(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::SizeLimit { .. }
            | EngineError::InvalidSize { .. }
            | EngineError::InvalidArgument(_)
            | EngineError::Config { .. }
            | EngineError::StalePixmap => ErrorKind::Configuration,
            EngineError::OutOfMemory { .. } => ErrorKind::ResourceExhausted,
            EngineError::ProgramUnavailable { .. } => ErrorKind::CapabilityGap,
            EngineError::MergeAllocation { .. } => ErrorKind::PartialMerge,
            EngineError::UnsupportedDepth(_) | EngineError::Fallback(_) => ErrorKind::Unsupported,
            EngineError::Backend(_) => ErrorKind::Backend,
        }
    }

    /// True when the software path can take over the same operation.
    ///
    /// Only device failures are excluded; everything else degrades to the CPU.
    pub fn falls_back_to_cpu(&self) -> bool {
        self.kind() != ErrorKind::Backend
    }

    /// True when a later GPU attempt may succeed once memory is released.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::ResourceExhausted | ErrorKind::PartialMerge)
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Declines a GPU path, logging why at debug.
pub(crate) fn fallback(reason: &'static str) -> EngineError {
    log::debug!("fallback: {reason}");
    EngineError::Fallback(reason)
}

/// Emits a `warn!` the first time a category fires and `debug!` after that.
#[derive(Debug, Default)]
pub struct LogOnce {
    seen: Vec<ErrorKind>,
}

impl LogOnce {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, err: &EngineError) {
        let kind = err.kind();
        if self.seen.contains(&kind) {
            log::debug!("{err}");
        } else {
            self.seen.push(kind);
            log::warn!("{err} (further {kind:?} failures logged at debug)");
        }
    }

    pub fn has_reported(&self, kind: ErrorKind) -> bool {
        self.seen.contains(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_errors_are_never_retried() {
        let e = EngineError::SizeLimit { width: 9000, height: 1, limit: 8192 };
        assert_eq!(e.kind(), ErrorKind::Configuration);
        assert!(!e.is_retryable());
        assert!(e.falls_back_to_cpu());
    }

    #[test]
    fn exhaustion_and_merge_failures_are_retryable() {
        assert!(EngineError::OutOfMemory { what: "texture" }.is_retryable());
        assert!(EngineError::MergeAllocation { width: 4, height: 4 }.is_retryable());
        assert!(!EngineError::Backend("lost".into()).falls_back_to_cpu());
    }

    #[test]
    fn log_once_tracks_categories() {
        let mut once = LogOnce::new();
        once.report(&EngineError::OutOfMemory { what: "texture" });
        once.report(&EngineError::OutOfMemory { what: "framebuffer" });
        assert!(once.has_reported(ErrorKind::ResourceExhausted));
        assert!(!once.has_reported(ErrorKind::CapabilityGap));
    }
}

use std::collections::HashMap;

use crate::device::{Backend, ProgramHandle};
use crate::error::{EngineError, LogOnce, Result};

use super::{
    AlphaMode, Define, Facet, Locations, UniformBlock, UniformLayout, VertexLayout, build_source,
};

/// Identity of a program: never includes per-draw data.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ProgramKey {
    pub prim: &'static str,
    pub fill: &'static str,
    pub alpha: AlphaMode,
    /// Requested minimum version, not the profile that was selected.
    pub version: u32,
}

/// A compiled program and its cached uniform locations.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Program {
    pub handle: ProgramHandle,
    pub layout: UniformLayout,
    pub locations: Locations,
    pub alpha: AlphaMode,
    pub vertex_layout: VertexLayout,
    pub version: u32,
}

impl Program {
    /// Empty uniform block for this program.
    pub fn uniforms(&self) -> UniformBlock {
        UniformBlock::new(self.layout)
    }
}

#[derive(Debug)]
enum Slot {
    Ready(Program),
    Failed(String),
}

/// Lazily built programs, one per [`ProgramKey`].
///
/// A failed build is remembered; later requests for the same key return the
/// failure without touching the compiler.
#[derive(Debug, Default)]
pub struct ProgramCache {
    slots: HashMap<ProgramKey, Slot>,
    compiles: usize,
    once: LogOnce,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build_or_get<B: Backend>(
        &mut self,
        backend: &mut B,
        prim: &Facet,
        fill: &Facet,
        alpha: AlphaMode,
        min_version: u32,
        defines: &[Define<'_>],
    ) -> Result<Program> {
        let key = ProgramKey {
            prim: prim.name,
            fill: fill.name,
            alpha,
            version: min_version,
        };
        match self.slots.get(&key) {
            Some(Slot::Ready(p)) => return Ok(*p),
            Some(Slot::Failed(reason)) => {
                return Err(EngineError::ProgramUnavailable {
                    name: format!("{}+{}", prim.name, fill.name),
                    reason: reason.clone(),
                });
            }
            None => {}
        }

        let caps = backend.capabilities().clone();
        let built = build_source(prim, fill, alpha, min_version, defines, &caps).and_then(|src| {
            self.compiles += 1;
            log::debug!(
                "compiling {} (profile {}, {} uniform bytes)",
                src.name,
                src.version,
                src.layout.size()
            );
            let handle = backend.compile_program(&src)?;
            Ok(Program {
                handle,
                layout: src.layout,
                locations: src.locations,
                alpha,
                vertex_layout: src.vertex_layout,
                version: src.version,
            })
        });

        match built {
            Ok(p) => {
                self.slots.insert(key, Slot::Ready(p));
                Ok(p)
            }
            Err(e) => {
                self.once.report(&e);
                let reason = match &e {
                    EngineError::ProgramUnavailable { reason, .. } => reason.clone(),
                    other => other.to_string(),
                };
                self.slots.insert(key, Slot::Failed(reason));
                Err(e)
            }
        }
    }

    /// Backend compile calls made so far.
    #[inline]
    pub fn compile_count(&self) -> usize {
        self.compiles
    }

    pub fn is_failed(&self, key: &ProgramKey) -> bool {
        matches!(self.slots.get(key), Some(Slot::Failed(_)))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Destroys every compiled program. Used at context teardown.
    pub fn release_all<B: Backend>(&mut self, backend: &mut B) {
        for (_, slot) in self.slots.drain() {
            if let Slot::Ready(p) = slot {
                backend.destroy_program(p.handle);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Capabilities, Extensions, SHADING_BASELINE, SoftBackend};
    use crate::program::facets;

    #[test]
    fn second_request_hits_the_cache() {
        let mut dev = SoftBackend::new(Capabilities::default());
        let mut cache = ProgramCache::new();
        let a = cache
            .build_or_get(&mut dev, &facets::POLY_FILL_RECT, &facets::SOLID, AlphaMode::Normal, 0, &[])
            .unwrap();
        let b = cache
            .build_or_get(&mut dev, &facets::POLY_FILL_RECT, &facets::SOLID, AlphaMode::Normal, 0, &[])
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.compile_count(), 1);
        assert_eq!(dev.stats().compiles, 1);
    }

    #[test]
    fn failures_are_sticky() {
        let caps = Capabilities {
            shading_version: SHADING_BASELINE,
            extensions: Extensions::empty(),
            ..Capabilities::default()
        };
        let mut dev = SoftBackend::new(caps);
        let mut cache = ProgramCache::new();
        for _ in 0..3 {
            assert!(
                cache
                    .build_or_get(&mut dev, &facets::POLY_FILL_RECT, &facets::SOLID, AlphaMode::Normal, 0, &[])
                    .is_err()
            );
        }
        let key = ProgramKey {
            prim: "poly_fill_rect",
            fill: "solid",
            alpha: AlphaMode::Normal,
            version: 0,
        };
        assert!(cache.is_failed(&key));
        assert_eq!(dev.stats().compiles, 0);
    }

    #[test]
    fn alpha_mode_is_part_of_the_key() {
        let mut dev = SoftBackend::new(Capabilities::default());
        let mut cache = ProgramCache::new();
        for alpha in [AlphaMode::Normal, AlphaMode::CaFirst, AlphaMode::CaSecond] {
            cache
                .build_or_get(&mut dev, &facets::COMPOSITE_RECT, &facets::RENDER_SOLID, alpha, 0, &[])
                .unwrap();
        }
        assert_eq!(cache.len(), 3);
        cache.release_all(&mut dev);
        assert!(cache.is_empty());
    }
}

//! Shader program builder.
//!
//! A program is assembled from a primitive facet and a fill facet. Their
//! uniform and varying requirements are merged through [`Locations`], a
//! shading profile is selected against the device capabilities, and the
//! result is compiled once and cached per [`ProgramKey`].

mod blend;
mod builder;
mod cache;
mod facet;
pub mod facets;
mod uniforms;

pub use blend::{BlendFactor, BlendState, CompositeOp, blend_for, depth_has_alpha};
pub use builder::{Profile, ProgramSource, VertexLayout, build_source, select_profile};
pub use cache::{Program, ProgramCache, ProgramKey};
pub use facet::{AlphaMode, Define, Facet, FacetFlags, FacetKind, Locations};
pub use uniforms::{Uniform, UniformBlock, UniformLayout};

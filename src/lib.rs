//! # splatfield
//!
//! **Moving-least-squares isosurface engine for oriented splat clouds.**
//!
//! Given a set of splats (position, normal, radius, quality) and a regular
//! grid, the engine produces a signed isovalue at every grid corner — the
//! zero level set approximates the sampled surface — plus a boundary
//! discriminant at arbitrary query vertices that separates true surface
//! from hole rims.
//!
//! ## Components
//!
//! - **[`octree`]**: a compact splat index. For any grid cell it enumerates
//!   the splats whose influence ball covers that cell, with no per-query
//!   allocation; neighboring cells share ancestor lists through a jump-coded
//!   command stream.
//! - **[`eval`]**: the corner and boundary evaluators, data-parallel per
//!   query, driven by a weighted algebraic-sphere fit ([`fit`]).
//! - **[`gpu`]** (feature `gpu`): a wgpu compute rendition of the corner
//!   evaluator.
//!
//! File loading, meshing, and bucketing of oversized inputs are external
//! collaborators: the engine consumes splats plus a grid and produces
//! scalar fields.
//!
//! ## Example
//!
//! ```rust
//! use splatfield::prelude::*;
//! use glam::{IVec3, Vec3};
//!
//! // Four coplanar splats on the plane z = 0, normals +Z
//! let splats: Vec<Splat> = [(0.3f32, 0.3f32), (-0.3, 0.3), (0.3, -0.3), (-0.3, -0.3)]
//!     .iter()
//!     .map(|&(x, y)| Splat::new(Vec3::new(x, y, 0.0), Vec3::Z, 1.5, 1.0))
//!     .collect();
//!
//! // 9x9x9 vertex grid over [-4, 4]^3 at unit spacing
//! let grid = Grid::new(Vec3::splat(-4.0), 1.0, IVec3::ZERO, IVec3::splat(8));
//! let config = EngineConfig::default();
//!
//! let tree = SplatOctree::build(&splats, &grid, &config)?;
//! let buffer = SplatBuffer::from_splats(&splats, &grid)?;
//!
//! // Evaluate the slice through the splat plane (vertex z = 4)
//! let evaluator = CornerEvaluator::new(&tree, &buffer, &grid, &config);
//! let mut image = SliceImage::padded(9, 9, config.wgs);
//! evaluator.process_slice(4, &mut image);
//!
//! // The corner at the cloud's center lies on the fitted plane
//! assert!(image.get(4, 4).abs() < 1e-3);
//! # Ok::<(), splatfield::EngineError>(())
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod eval;
pub mod fit;
pub mod morton;
pub mod octree;
pub mod types;

#[cfg(feature = "gpu")]
pub mod gpu;

pub use error::{EngineError, Result};
pub use eval::{BoundaryEvaluator, CornerEvaluator, SliceImage};
pub use octree::SplatOctree;
pub use types::{EngineConfig, Grid, MlsShape, Splat, SplatBuffer};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude - commonly used types and functions.
pub mod prelude {
    pub use crate::error::EngineError;
    pub use crate::eval::{
        BoundaryEvaluator, CornerEvaluator, SliceImage, Swathe, BOUNDARY_SENTINEL,
    };
    pub use crate::fit::{solve_quadratic, AlgebraicSphere, SphereFit};
    #[cfg(feature = "gpu")]
    pub use crate::gpu::{GpuCornerEvaluator, GpuError};
    pub use crate::morton::{morton_decode, morton_encode};
    pub use crate::octree::{CommandWalker, SplatOctree};
    pub use crate::types::{
        EngineConfig, Grid, MlsShape, Splat, SplatBuffer, SplatGpu, HITS_CUTOFF, RADIUS_CUTOFF,
    };
    pub use glam::{IVec3, Vec3};
}

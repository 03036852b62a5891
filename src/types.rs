//! Core types: splats, grids, and the engine configuration.
//!
//! A [`Splat`] is an oriented disc sample as it arrives from the host. The
//! evaluators never touch it directly; they read a [`SplatBuffer`], the
//! GPU-side layout in which the w-lanes of two vec4s carry the two most-used
//! precomputed scalars (`1/r²` and quality) so the inner loop pays no
//! per-sample reciprocal.

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::morton::MORTON_BITS;

/// Default minimum number of contributing splats for a defined query.
pub const HITS_CUTOFF: u32 = 4;

/// Default squared-distance cutoff, as a fraction of the squared radius.
///
/// Samples at `d >= RADIUS_CUTOFF` are skipped: the quartic weight vanishes
/// there and the fit becomes singular exactly at the support boundary.
pub const RADIUS_CUTOFF: f32 = 0.99;

/// Maximum octree levels. Together with [`MORTON_BITS`] this bounds the
/// addressable grid to `2^(levels + subsampling - 1)` vertices per axis.
pub const MAX_LEVELS: u32 = 10;

/// An oriented disc sample: position, outward normal, influence radius, and
/// a non-negative quality weight. Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Splat {
    /// Sample position in world space.
    pub position: Vec3,
    /// Outward surface normal (unit length by convention).
    pub normal: Vec3,
    /// Influence radius in world units; must be positive.
    pub radius: f32,
    /// Quality weight; must be non-negative.
    pub quality: f32,
}

impl Splat {
    /// Construct a splat.
    #[inline]
    pub fn new(position: Vec3, normal: Vec3, radius: f32, quality: f32) -> Self {
        Splat {
            position,
            normal,
            radius,
            quality,
        }
    }
}

/// GPU-side splat record: two vec4s, 32 bytes.
///
/// `position_radius.xyz` is the position in grid-vertex coordinates and `.w`
/// the inverse squared radius in grid units. `normal_quality.xyz` is the
/// normal, `.w` the quality weight.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SplatGpu {
    /// xyz = position (grid-vertex coordinates), w = `1/r²` (grid units).
    pub position_radius: [f32; 4],
    /// xyz = normal, w = quality.
    pub normal_quality: [f32; 4],
}

impl SplatGpu {
    /// Position in grid-vertex coordinates.
    #[inline]
    pub fn position(&self) -> Vec3 {
        Vec3::new(
            self.position_radius[0],
            self.position_radius[1],
            self.position_radius[2],
        )
    }

    /// Inverse squared radius in grid units.
    #[inline]
    pub fn inv_radius_sq(&self) -> f32 {
        self.position_radius[3]
    }

    /// Surface normal.
    #[inline]
    pub fn normal(&self) -> Vec3 {
        Vec3::new(
            self.normal_quality[0],
            self.normal_quality[1],
            self.normal_quality[2],
        )
    }

    /// Quality weight.
    #[inline]
    pub fn quality(&self) -> f32 {
        self.normal_quality[3]
    }
}

/// Splats in evaluation layout, transformed into a grid's vertex space.
#[derive(Debug, Clone)]
pub struct SplatBuffer {
    splats: Vec<SplatGpu>,
}

impl SplatBuffer {
    /// Transform `splats` into `grid`'s vertex coordinate space.
    ///
    /// Positions become vertex coordinates, radii grid units, and the
    /// inverse squared radius is precomputed into the position w-lane.
    pub fn from_splats(splats: &[Splat], grid: &Grid) -> Result<Self> {
        if splats.is_empty() {
            return Err(EngineError::InvalidGeometry("empty splat set".into()));
        }
        let mut out = Vec::with_capacity(splats.len());
        for (i, s) in splats.iter().enumerate() {
            if !(s.radius > 0.0) || !s.radius.is_finite() {
                return Err(EngineError::InvalidGeometry(format!(
                    "splat {i} has non-positive radius {}",
                    s.radius
                )));
            }
            if !(s.quality >= 0.0) || !s.quality.is_finite() {
                return Err(EngineError::InvalidGeometry(format!(
                    "splat {i} has invalid quality {}",
                    s.quality
                )));
            }
            if !s.position.is_finite() || !s.normal.is_finite() {
                return Err(EngineError::InvalidGeometry(format!(
                    "splat {i} has non-finite position or normal"
                )));
            }
            let p = grid.world_to_vertex(s.position);
            let r = s.radius / grid.spacing;
            let inv_r2 = 1.0 / (r * r);
            out.push(SplatGpu {
                position_radius: [p.x, p.y, p.z, inv_r2],
                normal_quality: [s.normal.x, s.normal.y, s.normal.z, s.quality],
            });
        }
        Ok(SplatBuffer { splats: out })
    }

    /// Splat records in evaluation layout.
    #[inline]
    pub fn splats(&self) -> &[SplatGpu] {
        &self.splats
    }

    /// Number of splats.
    #[inline]
    pub fn len(&self) -> usize {
        self.splats.len()
    }

    /// Whether the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.splats.is_empty()
    }

    /// Raw bytes for GPU upload.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.splats)
    }
}

/// A regular axis-aligned grid of vertices.
///
/// `world = reference + spacing * (lo + vertex)` where `vertex` is the local
/// integer index, so vertex `(0,0,0)` sits at the `lo` corner. Extents are
/// inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    /// World position of vertex index zero (before `lo` is applied).
    pub reference: Vec3,
    /// Uniform vertex spacing in world units; must be positive.
    pub spacing: f32,
    /// Lowest vertex index on each axis (inclusive).
    pub lo: IVec3,
    /// Highest vertex index on each axis (inclusive).
    pub hi: IVec3,
}

impl Grid {
    /// Construct a grid descriptor.
    #[inline]
    pub fn new(reference: Vec3, spacing: f32, lo: IVec3, hi: IVec3) -> Self {
        Grid {
            reference,
            spacing,
            lo,
            hi,
        }
    }

    /// Vertex count along each axis.
    #[inline]
    pub fn dims(&self) -> IVec3 {
        self.hi - self.lo + IVec3::ONE
    }

    /// Vertex count along one axis.
    #[inline]
    pub fn num_vertices(&self, axis: usize) -> i32 {
        self.dims()[axis]
    }

    /// Map a world position to local (continuous) vertex coordinates.
    #[inline]
    pub fn world_to_vertex(&self, world: Vec3) -> Vec3 {
        (world - self.reference) / self.spacing - self.lo.as_vec3()
    }

    /// Map local vertex coordinates back to world space.
    #[inline]
    pub fn vertex_to_world(&self, vertex: Vec3) -> Vec3 {
        self.reference + (vertex + self.lo.as_vec3()) * self.spacing
    }

    /// Basic sanity checks on extents and spacing.
    pub fn validate(&self) -> Result<()> {
        if !(self.spacing > 0.0) || !self.spacing.is_finite() {
            return Err(EngineError::InvalidGeometry(format!(
                "grid spacing must be positive, got {}",
                self.spacing
            )));
        }
        if self.hi.cmplt(self.lo).any() {
            return Err(EngineError::InvalidGeometry(format!(
                "grid extents are inverted: lo {:?} hi {:?}",
                self.lo, self.hi
            )));
        }
        Ok(())
    }
}

/// Fit shape used by the evaluators.
///
/// `Sphere` fits a full algebraic sphere; `Plane` restricts the same
/// functional to the planar subspace (the curvature term is held at zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MlsShape {
    /// Weighted plane fit (zero curvature).
    Plane,
    /// Weighted algebraic-sphere fit.
    #[default]
    Sphere,
}

/// Engine tuning options, passed explicitly through every call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Octree levels; level 0 is the root, `levels - 1` the finest.
    pub levels: u32,
    /// Log2 of the grid-vertex span of a finest-level cell.
    pub subsampling: u32,
    /// Multiplicative tuning factor for the boundary discriminant.
    pub boundary_limit: f32,
    /// Fit shape specialization.
    pub shape: MlsShape,
    /// Minimum contributing splats for a defined query.
    pub hits_cutoff: u32,
    /// Squared-distance support cutoff, fraction of squared radius.
    pub radius_cutoff: f32,
    /// Workgroup size used for output padding and GPU dispatch.
    pub wgs: [u32; 3],
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            levels: 6,
            subsampling: 3,
            boundary_limit: 1.0,
            shape: MlsShape::Sphere,
            hits_cutoff: HITS_CUTOFF,
            radius_cutoff: RADIUS_CUTOFF,
            wgs: [8, 8, 1],
        }
    }
}

impl EngineConfig {
    /// Morton shift applied to a vertex code to obtain its finest-level
    /// octree cell code.
    #[inline]
    pub fn code_shift(&self) -> u32 {
        3 * self.subsampling
    }

    /// The precomputed boundary factor `1 - (θ·limit)²`.
    ///
    /// `θ = √6·512 / (693π)` assumes the quartic weight, uniformly
    /// distributed samples, and a straight boundary; `boundary_limit` tunes
    /// it multiplicatively.
    pub fn boundary_factor(&self) -> f32 {
        let theta = (6.0f32.sqrt() * 512.0) / (693.0 * std::f32::consts::PI);
        let gamma = theta * self.boundary_limit;
        1.0 - gamma * gamma
    }

    /// Check internal consistency of the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.levels < 1 || self.levels > MAX_LEVELS {
            return Err(EngineError::InvalidConfig(format!(
                "levels must be in 1..={MAX_LEVELS}, got {}",
                self.levels
            )));
        }
        let max_wgs = self.wgs.iter().copied().max().unwrap_or(1);
        if max_wgs == 0 {
            return Err(EngineError::InvalidConfig("workgroup size is zero".into()));
        }
        if (1u32 << self.subsampling) < max_wgs {
            return Err(EngineError::InvalidConfig(format!(
                "2^subsampling ({}) must cover the workgroup size ({max_wgs})",
                1u32 << self.subsampling
            )));
        }
        if self.subsampling + self.levels - 1 > MORTON_BITS {
            return Err(EngineError::InvalidConfig(format!(
                "subsampling ({}) + levels ({}) exceeds the {MORTON_BITS}-bit Morton budget",
                self.subsampling, self.levels
            )));
        }
        if !(self.boundary_limit > 0.0) || !self.boundary_limit.is_finite() {
            return Err(EngineError::InvalidConfig(format!(
                "boundary limit must be positive, got {}",
                self.boundary_limit
            )));
        }
        if self.hits_cutoff == 0 {
            return Err(EngineError::InvalidConfig("hits cutoff must be >= 1".into()));
        }
        if !(self.radius_cutoff > 0.0 && self.radius_cutoff <= 1.0) {
            return Err(EngineError::InvalidConfig(format!(
                "radius cutoff must be in (0, 1], got {}",
                self.radius_cutoff
            )));
        }
        Ok(())
    }

    /// Number of grid vertices per axis addressable by this configuration.
    #[inline]
    pub fn max_grid_vertices(&self) -> u32 {
        1u32 << (self.subsampling + self.levels - 1)
    }
}

//! Half-disc boundary discriminant at arbitrary query vertices.
//!
//! For a query on a well-sampled surface the weighted neighbors surround it,
//! their first moment projected onto the fitted tangent plane is small, and
//! the discriminant is negative. Near a hole rim the neighborhood collapses
//! to a half disc, the tangential moment grows, and the discriminant turns
//! positive.

use glam::{IVec3, Vec3};
use rayon::prelude::*;
use tracing::trace;

use super::gather_splats;
use crate::octree::SplatOctree;
use crate::types::{EngineConfig, Grid, SplatBuffer};

/// Discriminant written when fewer than `hits_cutoff` splats contribute:
/// no information, treated as outside.
pub const BOUNDARY_SENTINEL: f32 = 1000.0;

/// Evaluates the boundary discriminant for world-space query vertices.
pub struct BoundaryEvaluator<'a> {
    tree: &'a SplatOctree,
    splats: &'a SplatBuffer,
    grid: Grid,
    dims: IVec3,
    offset: IVec3,
    boundary_factor: f32,
    hits_cutoff: u32,
    radius_cutoff: f32,
    code_shift: u32,
}

impl<'a> BoundaryEvaluator<'a> {
    /// Bind the evaluator to an octree, a splat buffer, and the grid they
    /// were built against. The boundary factor `1 - (θ·limit)²` is
    /// precomputed here so the per-vertex loop pays no extra multiply.
    pub fn new(
        tree: &'a SplatOctree,
        splats: &'a SplatBuffer,
        grid: &Grid,
        config: &EngineConfig,
    ) -> Self {
        BoundaryEvaluator {
            tree,
            splats,
            grid: *grid,
            dims: grid.dims(),
            offset: IVec3::ZERO,
            boundary_factor: config.boundary_factor(),
            hits_cutoff: config.hits_cutoff,
            radius_cutoff: config.radius_cutoff,
            code_shift: 3 * tree.subsampling(),
        }
    }

    /// Shift local coordinates by `offset` into the splat buffer's vertex
    /// space (sub-window dispatch against a shared buffer).
    pub fn with_offset(mut self, offset: IVec3) -> Self {
        self.offset = offset;
        self
    }

    /// Discriminant for one world-space vertex.
    ///
    /// Negative means interior, positive near a boundary;
    /// [`BOUNDARY_SENTINEL`] when too few splats contribute. Never NaN.
    pub fn eval_vertex(&self, world: Vec3) -> f32 {
        let v = self.grid.world_to_vertex(world);
        let cell = v
            .floor()
            .as_ivec3()
            .clamp(IVec3::ZERO, self.dims - IVec3::ONE);
        let code = crate::morton::morton_encode(cell.x as u32, cell.y as u32, cell.z as u32)
            >> self.code_shift;
        let start = self.tree.start_fine()[code as usize];
        if start < 0 {
            return BOUNDARY_SENTINEL;
        }

        let vq = v + self.offset.as_vec3();
        let mut sum_w = 0.0f32;
        let mut moment = Vec3::ZERO;
        let mut sum_wn = Vec3::ZERO;
        let mut sum_wpp = 0.0f32;
        let hits = gather_splats(
            self.tree,
            self.splats.splats(),
            start,
            vq,
            self.radius_cutoff,
            |s, diff, w| {
                sum_w += w;
                moment += diff * w;
                sum_wn += s.normal() * w;
                sum_wpp += diff.length_squared() * w;
            },
        );
        if hits < self.hits_cutoff {
            return BOUNDARY_SENTINEL;
        }
        let scale2 = sum_wpp * sum_w;
        if !(scale2 > 0.0) {
            // all contributing weights vanished; no usable information
            return BOUNDARY_SENTINEL;
        }

        let normal = sum_wn.normalize_or_zero();
        let normal_len = moment.dot(normal);
        // ‖m − (m·n)n‖² = ‖m‖² − (m·n)²; clamped so rounding cannot push
        // the tangential moment negative
        let plane_len2 = (moment.length_squared() - normal_len * normal_len).max(0.0);
        self.boundary_factor * (plane_len2 / scale2).sqrt() - 1.0
    }

    /// Discriminants for a batch of world-space vertices, one work item per
    /// vertex.
    pub fn process_vertices(&self, vertices: &[Vec3]) -> Vec<f32> {
        let out: Vec<f32> = vertices
            .par_iter()
            .map(|&w| self.eval_vertex(w))
            .collect();
        trace!(vertices = vertices.len(), "boundary batch evaluated");
        out
    }
}

//! Per-corner isovalue evaluation over Z slices.

use glam::IVec3;
use rayon::prelude::*;
use tracing::trace;

use super::{gather_splats, SliceImage};
use crate::error::{EngineError, Result};
use crate::fit::SphereFit;
use crate::morton::morton_encode;
use crate::octree::SplatOctree;
use crate::types::{EngineConfig, Grid, MlsShape, SplatBuffer};

/// A contiguous range of Z slices written into one tall image.
///
/// Slice `z` lands at row offset `z * z_stride + z_bias`; `z_stride` must be
/// at least `height` so consecutive slices do not overlap.
#[derive(Debug, Clone, Copy)]
pub struct Swathe {
    /// Corner columns per slice (the image may be wider; extra columns are
    /// padding).
    pub width: u32,
    /// Corner rows per slice.
    pub height: u32,
    /// First Z slice, inclusive.
    pub z_first: i32,
    /// Last Z slice, inclusive.
    pub z_last: i32,
    /// Image rows between consecutive slices.
    pub z_stride: u32,
    /// Row offset added to every slice.
    pub z_bias: i32,
}

/// Evaluates the MLS isovalue at every grid corner of a requested Z slice.
///
/// One independent work item per corner; each pixel is written exactly once
/// and no state is shared, so outputs do not depend on tiling.
pub struct CornerEvaluator<'a> {
    tree: &'a SplatOctree,
    splats: &'a SplatBuffer,
    dims: IVec3,
    offset: IVec3,
    shape: MlsShape,
    hits_cutoff: u32,
    radius_cutoff: f32,
    code_shift: u32,
}

impl<'a> CornerEvaluator<'a> {
    /// Bind the evaluator to an octree, a splat buffer, and the grid they
    /// were built against.
    pub fn new(
        tree: &'a SplatOctree,
        splats: &'a SplatBuffer,
        grid: &Grid,
        config: &EngineConfig,
    ) -> Self {
        CornerEvaluator {
            tree,
            splats,
            dims: grid.dims(),
            offset: IVec3::ZERO,
            shape: config.shape,
            hits_cutoff: config.hits_cutoff,
            radius_cutoff: config.radius_cutoff,
            code_shift: 3 * tree.subsampling(),
        }
    }

    /// Evaluate with local coordinates shifted by `offset` into the splat
    /// buffer's vertex space (sub-window dispatch against a shared buffer).
    pub fn with_offset(mut self, offset: IVec3) -> Self {
        self.offset = offset;
        self
    }

    /// Isovalue at local corner `(x, y, z)`, or NaN when the corner is
    /// outside the grid or has fewer than `hits_cutoff` contributing splats.
    ///
    /// Isovalues are in grid units; multiply by the grid spacing for world
    /// distances.
    pub fn eval_corner(&self, x: i32, y: i32, z: i32) -> f32 {
        if x < 0
            || y < 0
            || z < 0
            || x >= self.dims.x
            || y >= self.dims.y
            || z >= self.dims.z
        {
            return f32::NAN;
        }
        let code = morton_encode(x as u32, y as u32, z as u32) >> self.code_shift;
        let start = self.tree.start_fine()[code as usize];
        if start < 0 {
            return f32::NAN;
        }

        let v = (IVec3::new(x, y, z) + self.offset).as_vec3();
        let mut fit = SphereFit::new();
        let hits = gather_splats(
            self.tree,
            self.splats.splats(),
            start,
            v,
            self.radius_cutoff,
            |s, diff, w| fit.add(diff, s.normal(), w),
        );
        if hits < self.hits_cutoff {
            return f32::NAN;
        }
        fit.solve(self.shape).project_dist_origin()
    }

    /// Evaluate slice `z` into `image`, one pixel per corner.
    ///
    /// Pixels beyond the grid extent (padding) are NaN.
    pub fn process_slice(&self, z: i32, image: &mut SliceImage) {
        let width = image.width();
        let height = image.height();
        self.eval_rows(z, image.data_mut(), width, height);
        trace!(z, width, height, "corner slice evaluated");
    }

    /// Evaluate a range of Z slices into one tall image.
    ///
    /// Checks the swathe geometry against the image before writing; output
    /// rows for slice `z` start at `z * z_stride + z_bias`.
    pub fn process_swathe(&self, swathe: &Swathe, image: &mut SliceImage) -> Result<()> {
        if swathe.z_first > swathe.z_last {
            return Err(EngineError::InvalidConfig(format!(
                "swathe z range is inverted: {}..={}",
                swathe.z_first, swathe.z_last
            )));
        }
        if swathe.z_stride < swathe.height {
            return Err(EngineError::InvalidConfig(format!(
                "swathe z stride {} is smaller than the slice height {}",
                swathe.z_stride, swathe.height
            )));
        }
        if (swathe.width as usize) > image.width() {
            return Err(EngineError::InvalidConfig(format!(
                "swathe width {} exceeds the image width {}",
                swathe.width,
                image.width()
            )));
        }
        let first_row = swathe.z_first as i64 * swathe.z_stride as i64 + swathe.z_bias as i64;
        let end_row = swathe.z_last as i64 * swathe.z_stride as i64
            + swathe.z_bias as i64
            + swathe.height as i64;
        if first_row < 0 || end_row > image.height() as i64 {
            return Err(EngineError::InvalidConfig(format!(
                "swathe rows {first_row}..{end_row} do not fit an image of height {}",
                image.height()
            )));
        }

        let width = image.width();
        let height = swathe.height as usize;
        for z in swathe.z_first..=swathe.z_last {
            let base = (z as i64 * swathe.z_stride as i64 + swathe.z_bias as i64) as usize;
            let rows = &mut image.data_mut()[base * width..(base + height) * width];
            self.eval_rows(z, rows, width, height);
        }
        Ok(())
    }

    fn eval_rows(&self, z: i32, data: &mut [f32], width: usize, n_rows: usize) {
        data[..n_rows * width]
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, out) in row.iter_mut().enumerate() {
                    *out = self.eval_corner(x as i32, y as i32, z);
                }
            });
    }
}

//! Splat octree: a compact, GPU-friendly index from grid cells to splats.
//!
//! The octree is a forest of cells over the grid's vertex space. Level 0 is
//! the root (one cell); each deeper level splits cells in eight, down to the
//! finest level `levels - 1` whose cells span `2^subsampling` grid vertices
//! per axis. Each splat lives at exactly one level — the coarsest at which
//! its rounded bounding box spans at most two cells per axis — and is listed
//! in every cell (1 to 8) that box intersects.
//!
//! # Layout
//!
//! Three flat arrays, read-only after construction:
//!
//! - `start[global]`: per-cell entry point into `commands`, or negative when
//!   no splat is reachable. Cells of all levels are concatenated in
//!   `level_start` order.
//! - `commands[]`: per-cell splat lists with shared tails. A non-negative
//!   value is a splat index; `-1` terminates; `c <= -2` jumps to position
//!   `-2 - c`. A cell's list chains onto its nearest non-empty ancestor's
//!   list, so one walk from a fine cell visits all ancestors, fine to
//!   coarse, with no duplicated storage.
//! - `level_start[l]`: first global cell index of level `l`;
//!   `level_start[l + 1] = level_start[l] + 8^l`.
//!
//! The evaluators index only the finest level ([`SplatOctree::start_fine`])
//! with `morton_encode(x, y, z) >> (3 * subsampling)`; the jump chain brings
//! in the coarser levels.

mod build;

use crate::error::{EngineError, Result};
use crate::types::{EngineConfig, Grid, Splat};

/// Terminator command ending a per-cell list.
pub const CMD_END: i32 = -1;

/// Encode a jump command targeting `pos` in the command stream.
#[inline]
pub const fn cmd_jump(pos: i32) -> i32 {
    -2 - pos
}

/// Decode a jump command (`c <= -2`) into its target position.
#[inline]
pub const fn cmd_jump_target(cmd: i32) -> i32 {
    -2 - cmd
}

/// The built splat octree. Read-only after [`SplatOctree::build`].
#[derive(Debug, Clone)]
pub struct SplatOctree {
    start: Vec<i32>,
    commands: Vec<i32>,
    level_start: Vec<u32>,
    levels: u32,
    subsampling: u32,
}

impl SplatOctree {
    /// Build the octree for `splats` over `grid`.
    ///
    /// Fails with [`EngineError::InvalidGeometry`] when the input is empty, a
    /// radius is non-positive, or a splat's expanded bounding box leaves the
    /// grid; with [`EngineError::Overflow`] when the command stream would
    /// exceed the signed 32-bit budget or the grid needs more cells than the
    /// configured levels provide.
    pub fn build(splats: &[Splat], grid: &Grid, config: &EngineConfig) -> Result<Self> {
        build::build(splats, grid, config)
    }

    /// Global per-cell start table, all levels concatenated.
    #[inline]
    pub fn start(&self) -> &[i32] {
        &self.start
    }

    /// Packed command stream.
    #[inline]
    pub fn commands(&self) -> &[i32] {
        &self.commands
    }

    /// First global cell index per level, plus one trailing total.
    #[inline]
    pub fn level_start(&self) -> &[u32] {
        &self.level_start
    }

    /// Number of levels.
    #[inline]
    pub fn levels(&self) -> u32 {
        self.levels
    }

    /// Subsampling shift this octree was built with.
    #[inline]
    pub fn subsampling(&self) -> u32 {
        self.subsampling
    }

    /// The finest-level slice of the start table, indexed directly by
    /// `morton_encode(x, y, z) >> (3 * subsampling)`.
    #[inline]
    pub fn start_fine(&self) -> &[i32] {
        &self.start[self.level_start[(self.levels - 1) as usize] as usize..]
    }

    /// Walk the command stream from a start-table value.
    ///
    /// Yields splat indices in stream order: the cell's own list first, then
    /// each ancestor's, fine to coarse. Traversal length is bounded by the
    /// stream length, so a malformed stream cannot loop forever.
    #[inline]
    pub fn walk(&self, start_value: i32) -> CommandWalker<'_> {
        CommandWalker::new(&self.commands, start_value)
    }

    /// Walk the splats reachable from the cell containing local vertex
    /// `(x, y, z)` at the finest level.
    #[inline]
    pub fn walk_vertex(&self, x: u32, y: u32, z: u32) -> CommandWalker<'_> {
        let code = crate::morton::morton_encode(x, y, z) >> (3 * self.subsampling);
        self.walk(self.start_fine()[code as usize])
    }

    /// Verify stream well-formedness: every start entry reaches `CMD_END`
    /// within the stream length, every splat index is in range, and every
    /// jump lands inside the stream.
    pub fn validate(&self, num_splats: usize) -> Result<()> {
        for (cell, &s) in self.start.iter().enumerate() {
            if s < 0 {
                continue;
            }
            let mut pos = s;
            let mut steps = 0usize;
            loop {
                if pos as usize >= self.commands.len() {
                    return Err(EngineError::Overflow(format!(
                        "cell {cell}: command position {pos} out of range"
                    )));
                }
                if steps > self.commands.len() {
                    return Err(EngineError::Overflow(format!(
                        "cell {cell}: command stream does not terminate"
                    )));
                }
                steps += 1;
                let cmd = self.commands[pos as usize];
                if cmd == CMD_END {
                    break;
                }
                if cmd <= -2 {
                    pos = cmd_jump_target(cmd);
                    continue;
                }
                if cmd as usize >= num_splats {
                    return Err(EngineError::Overflow(format!(
                        "cell {cell}: splat index {cmd} out of range"
                    )));
                }
                pos += 1;
            }
        }
        Ok(())
    }

    /// Raw little-endian bytes of the start table, for GPU upload.
    #[inline]
    pub fn start_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.start)
    }

    /// Raw little-endian bytes of the command stream, for GPU upload.
    #[inline]
    pub fn commands_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.commands)
    }
}

/// Bounded iterator over the splat indices reachable from one start value.
#[derive(Debug, Clone)]
pub struct CommandWalker<'a> {
    commands: &'a [i32],
    pos: i32,
    remaining: usize,
}

impl<'a> CommandWalker<'a> {
    /// Walk `commands` beginning at `start_value` (negative means empty).
    #[inline]
    pub fn new(commands: &'a [i32], start_value: i32) -> Self {
        CommandWalker {
            commands,
            pos: start_value,
            // one slot per stream entry; a well-formed walk never needs more
            remaining: commands.len(),
        }
    }
}

impl Iterator for CommandWalker<'_> {
    type Item = u32;

    #[inline]
    fn next(&mut self) -> Option<u32> {
        loop {
            if self.pos < 0 || self.pos as usize >= self.commands.len() {
                return None;
            }
            if self.remaining == 0 {
                // malformed stream (cycle); bail out instead of spinning
                return None;
            }
            self.remaining -= 1;
            let cmd = self.commands[self.pos as usize];
            if cmd == CMD_END {
                self.pos = -1;
                return None;
            }
            if cmd <= -2 {
                self.pos = cmd_jump_target(cmd);
                continue;
            }
            self.pos += 1;
            return Some(cmd as u32);
        }
    }
}

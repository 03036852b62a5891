//! Octree construction: level assignment, cell emission, command layout.

use glam::Vec3;
use tracing::debug;

use super::{cmd_jump, SplatOctree, CMD_END};
use crate::error::{EngineError, Result};
use crate::morton::morton_encode;
use crate::types::{EngineConfig, Grid, Splat};

/// Transient (cell, splat) pair emitted during construction.
///
/// Sorted stably by cell so per-cell splat order stays the insertion order;
/// the evaluators accumulate in stream order, so this is observable.
#[derive(Debug, Clone, Copy)]
struct Entry {
    pos: u32,
    splat_id: u32,
}

pub(super) fn build(splats: &[Splat], grid: &Grid, config: &EngineConfig) -> Result<SplatOctree> {
    config.validate()?;
    grid.validate()?;
    if splats.is_empty() {
        return Err(EngineError::InvalidGeometry("empty splat set".into()));
    }
    if splats.len() > (i32::MAX - 1) as usize {
        return Err(EngineError::Overflow(format!(
            "{} splats exceed the signed 32-bit index budget",
            splats.len()
        )));
    }

    let levels = config.levels;
    let subsampling = config.subsampling;
    let dims = grid.dims();
    let max_dim = dims.max_element() as u32;
    if max_dim > config.max_grid_vertices() {
        return Err(EngineError::Overflow(format!(
            "grid spans {max_dim} vertices but levels {levels} + subsampling {subsampling} \
             address only {}",
            config.max_grid_vertices()
        )));
    }

    // level_start[l + 1] = level_start[l] + 8^l
    let mut level_start = Vec::with_capacity(levels as usize + 1);
    level_start.push(0u32);
    for l in 0..levels {
        let cells = 1u32 << (3 * l);
        level_start.push(level_start[l as usize] + cells);
    }
    let total_cells = level_start[levels as usize] as usize;
    let max_level = levels - 1;

    // Emit one entry per (cell, splat) incidence, ordered by splat id.
    // This is memory-heavy at up to 8 entries per splat; a counting +
    // scan + emit pass would avoid the transient vector.
    let mut entries: Vec<Entry> = Vec::with_capacity(splats.len());
    for (splat_id, splat) in splats.iter().enumerate() {
        if !(splat.radius > 0.0) || !splat.radius.is_finite() {
            return Err(EngineError::InvalidGeometry(format!(
                "splat {splat_id} has non-positive radius {}",
                splat.radius
            )));
        }
        let r = Vec3::splat(splat.radius);
        let vlo = grid.world_to_vertex(splat.position - r);
        let vhi = grid.world_to_vertex(splat.position + r);

        // Low corners round up, high corners round down: only vertices
        // strictly inside the influence box matter.
        let mut ilo = [0i32; 3];
        let mut ihi = [0i32; 3];
        let mut shift = 0u32;
        for axis in 0..3 {
            ilo[axis] = vlo[axis].ceil() as i32;
            ihi[axis] = vhi[axis].floor() as i32;
            if ilo[axis] < 0 || ihi[axis] >= dims[axis] {
                return Err(EngineError::InvalidGeometry(format!(
                    "splat {splat_id} bounding box [{}, {}] leaves the grid on axis {axis}",
                    ilo[axis], ihi[axis]
                )));
            }
            // Fit the box into at most 2 cells per axis at the chosen level
            ilo[axis] >>= subsampling;
            ihi[axis] >>= subsampling;
            while (ihi[axis] >> shift) - (ilo[axis] >> shift) > 1 {
                shift += 1;
            }
        }
        debug_assert!(shift <= max_level);
        let level = max_level - shift;

        // An inverted range (box between vertices on some axis) emits
        // nothing: the splat covers no grid vertex.
        let base = level_start[level as usize];
        for z in (ilo[2] >> shift)..=(ihi[2] >> shift) {
            for y in (ilo[1] >> shift)..=(ihi[1] >> shift) {
                for x in (ilo[0] >> shift)..=(ihi[0] >> shift) {
                    entries.push(Entry {
                        pos: base + morton_encode(x as u32, y as u32, z as u32),
                        splat_id: splat_id as u32,
                    });
                }
            }
        }
    }

    // Stable sort groups entries per cell while preserving splat-id order.
    entries.sort_by_key(|e| e.pos);

    // Lay out the command stream level by level, coarse to fine, so each
    // cell can chain onto its parent's already-resolved start.
    let mut start = vec![CMD_END; total_cells];
    let mut commands: Vec<i32> = Vec::with_capacity(entries.len() + entries.len() / 4 + 1);
    let mut cursor = 0usize;
    let mut listed_cells = 0usize;

    for level in 0..levels {
        let base = level_start[level as usize];
        let cells = 1u32 << (3 * level);
        for code in 0..cells {
            let pos = base + code;
            let parent_chain = if level == 0 {
                CMD_END
            } else {
                start[(level_start[level as usize - 1] + (code >> 3)) as usize]
            };

            let begin = cursor;
            while cursor < entries.len() && entries[cursor].pos == pos {
                cursor += 1;
            }
            if begin == cursor {
                // no own splats: inherit the nearest non-empty ancestor
                start[pos as usize] = if parent_chain >= 0 { parent_chain } else { CMD_END };
                continue;
            }

            if commands.len() + (cursor - begin) + 1 > (i32::MAX - 1) as usize {
                return Err(EngineError::Overflow(
                    "command stream exceeds the signed 32-bit budget".into(),
                ));
            }
            let list_start = commands.len() as i32;
            for e in &entries[begin..cursor] {
                commands.push(e.splat_id as i32);
            }
            commands.push(if parent_chain >= 0 {
                cmd_jump(parent_chain)
            } else {
                CMD_END
            });
            start[pos as usize] = list_start;
            listed_cells += 1;
        }
    }
    debug_assert_eq!(cursor, entries.len());

    debug!(
        splats = splats.len(),
        entries = entries.len(),
        commands = commands.len(),
        listed_cells,
        total_cells,
        levels,
        subsampling,
        "splat octree built"
    );

    Ok(SplatOctree {
        start,
        commands,
        level_start,
        levels,
        subsampling,
    })
}

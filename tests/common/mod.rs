//! Common test helpers for splatfield integration tests.
//!
//! Each test binary pulls in the subset it needs.

#![allow(dead_code)]

use splatfield::prelude::*;

// ============================================================================
// Standard splat clouds
// ============================================================================

/// A square patch of splats on the plane z = 0, centered at the origin.
///
/// `n_side x n_side` splats at `step` spacing, all with normal +Z.
pub fn plane_patch(n_side: i32, step: f32, radius: f32) -> Vec<Splat> {
    let half = (n_side - 1) as f32 * step * 0.5;
    let mut splats = Vec::with_capacity((n_side * n_side) as usize);
    for j in 0..n_side {
        for i in 0..n_side {
            splats.push(Splat::new(
                Vec3::new(i as f32 * step - half, j as f32 * step - half, 0.0),
                Vec3::Z,
                radius,
                1.0,
            ));
        }
    }
    splats
}

/// Splats on a sphere of radius `sphere_radius` centered at the origin,
/// normals pointing outward (Fibonacci distribution).
pub fn sphere_shell(n: usize, sphere_radius: f32, splat_radius: f32) -> Vec<Splat> {
    let golden_ratio = (1.0 + 5.0f32.sqrt()) / 2.0;
    let mut splats = Vec::with_capacity(n);
    for i in 0..n {
        let theta = 2.0 * std::f32::consts::PI * (i as f32) / golden_ratio;
        let phi = (1.0 - 2.0 * (i as f32 + 0.5) / n as f32).acos();
        let normal = Vec3::new(phi.sin() * theta.cos(), phi.sin() * theta.sin(), phi.cos());
        splats.push(Splat::new(normal * sphere_radius, normal, splat_radius, 1.0));
    }
    splats
}

// ============================================================================
// Grids and configurations
// ============================================================================

/// A unit-spacing grid of `n + 1` vertices per axis centered on the origin.
///
/// Vertex `(n/2, n/2, n/2)` sits at the world origin when `n` is even.
pub fn centered_grid(n: i32) -> Grid {
    Grid::new(
        Vec3::splat(-(n as f32) * 0.5),
        1.0,
        IVec3::ZERO,
        IVec3::splat(n),
    )
}

/// A small-scale configuration for tests: scalar workgroups so subsampling
/// can drop to zero and every octree level is exercised on tiny grids.
pub fn test_config(levels: u32, subsampling: u32) -> EngineConfig {
    EngineConfig {
        levels,
        subsampling,
        wgs: [1, 1, 1],
        ..EngineConfig::default()
    }
}

// ============================================================================
// Brute-force reference
// ============================================================================

/// Splat indices contributing at local `vertex` by direct search, using the
/// same support test as the evaluators (`d < radius_cutoff` in grid units).
pub fn brute_force_hits(
    splats: &[Splat],
    grid: &Grid,
    vertex: IVec3,
    radius_cutoff: f32,
) -> Vec<usize> {
    let v = vertex.as_vec3();
    splats
        .iter()
        .enumerate()
        .filter(|(_, s)| {
            let p = grid.world_to_vertex(s.position);
            let r = s.radius / grid.spacing;
            (p - v).length_squared() / (r * r) < radius_cutoff
        })
        .map(|(i, _)| i)
        .collect()
}

// ============================================================================
// Assertion helpers
// ============================================================================

/// Assert two f32 values are close within tolerance.
pub fn assert_close(a: f32, b: f32, tol: f32, msg: &str) {
    assert!(
        (a - b).abs() < tol,
        "{}: {} vs {} (diff={}, tol={})",
        msg,
        a,
        b,
        (a - b).abs(),
        tol
    );
}

//! Weighted algebraic-sphere fitting.
//!
//! The MLS evaluators accumulate weighted sums of neighbor samples into a
//! [`SphereFit`], solve for the algebraic sphere `(q/2)‖x‖² + u·x + c = 0`
//! in query-local coordinates, and project the fitted surface onto a signed
//! distance from the query point (the local origin).
//!
//! Accumulation order is the command-stream visitation order; reproducibility
//! of the isovalue field depends on that, so nothing here reassociates sums.

use glam::Vec3;

use crate::types::MlsShape;

/// Threshold below which the quadratic leading coefficient is treated as
/// zero and the linear formula is used instead.
const LINEAR_EPSILON: f32 = 1e-20;

/// Running weighted sums for one MLS query.
#[derive(Debug, Clone, Copy, Default)]
pub struct SphereFit {
    sum_w: f32,
    sum_wp: Vec3,
    sum_wn: Vec3,
    sum_wpp: f32,
    sum_wpn: f32,
    hits: u32,
}

impl SphereFit {
    /// Fresh accumulator.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate one sample at position `p` (relative to the query point)
    /// with normal `n` and weight `w`.
    #[inline]
    pub fn add(&mut self, p: Vec3, n: Vec3, w: f32) {
        self.sum_w += w;
        self.sum_wp += p * w;
        self.sum_wn += n * w;
        self.sum_wpp += p.length_squared() * w;
        self.sum_wpn += p.dot(n) * w;
        self.hits += 1;
    }

    /// Number of accumulated samples.
    #[inline]
    pub fn hits(&self) -> u32 {
        self.hits
    }

    /// Total accumulated weight.
    #[inline]
    pub fn total_weight(&self) -> f32 {
        self.sum_w
    }

    /// Solve for the algebraic sphere.
    ///
    /// The curvature term is `q = qNum/qDen` with
    /// `qNum = Σw(p·n) − m·Σwn` and `qDen = Σw‖p‖² − m·Σwp` where `m` is the
    /// weighted centroid. When `qDen` is within `4ε·hits·|Σw‖p‖²|` of zero,
    /// or `q` comes out non-finite, the fit degrades to a plane (`q = 0`)
    /// instead of surfacing the degeneracy. [`MlsShape::Plane`] holds `q = 0`
    /// unconditionally.
    pub fn solve(&self, shape: MlsShape) -> AlgebraicSphere {
        let inv_sum_w = 1.0 / self.sum_w;
        let m = self.sum_wp * inv_sum_w;

        let q = match shape {
            MlsShape::Plane => 0.0,
            MlsShape::Sphere => {
                let q_num = self.sum_wpn - m.dot(self.sum_wn);
                let q_den = self.sum_wpp - m.dot(self.sum_wp);
                let q = q_num / q_den;
                let degenerate = q_den.abs()
                    < 4.0 * f32::EPSILON * self.hits as f32 * self.sum_wpp.abs();
                if degenerate || !q.is_finite() {
                    0.0
                } else {
                    q
                }
            }
        };

        let u = (self.sum_wn - self.sum_wp * q) * inv_sum_w;
        let half_q = 0.5 * q;
        let c = (-half_q * self.sum_wpp - u.dot(self.sum_wp)) * inv_sum_w;

        AlgebraicSphere {
            gradient: u,
            half_q,
            c,
        }
    }
}

/// A solved algebraic sphere `(q/2)‖x‖² + u·x + c` in query-local
/// coordinates.
#[derive(Debug, Clone, Copy)]
pub struct AlgebraicSphere {
    /// Gradient of the implicit function at the origin (`u`).
    pub gradient: Vec3,
    /// Half the curvature coefficient (`q/2`).
    pub half_q: f32,
    /// Constant term.
    pub c: f32,
}

impl AlgebraicSphere {
    /// Signed distance from the query origin to the fitted surface.
    ///
    /// Marches along the normalized gradient direction and solves
    /// `(q/2)x² + ‖g‖x + c = 0` for the surface crossing. A zero gradient
    /// falls back to the x-axis; only `dir·g = ‖g‖` enters the quadratic
    /// either way, and `b = ‖g‖` is never negative.
    #[inline]
    pub fn project_dist_origin(&self) -> f32 {
        let b = self.gradient.length();
        let x = solve_quadratic(self.half_q, b, self.c);
        -x
    }
}

/// Return whichever argument has the larger magnitude.
#[inline]
fn max_mag(a: f32, b: f32) -> f32 {
    if a.abs() >= b.abs() {
        a
    } else {
        b
    }
}

/// Solve `ax² + bx + c = 0` for the root selected by the citardauq form
/// `-2c / (b + sign(b)·√(b² − 4ac))`, falling back to the linear solution
/// when `|a|` is negligible.
///
/// One Newton step polishes the closed-form root; the derivative is kept
/// away from zero with [`max_mag`] so a double root does not divide by zero.
/// Returns NaN when no finite root exists.
pub fn solve_quadratic(a: f32, b: f32, c: f32) -> f32 {
    let mut x = if a.abs() < LINEAR_EPSILON {
        -c / b
    } else {
        let disc = b * b - 4.0 * a * c;
        let den = b + disc.sqrt().copysign(b);
        -2.0 * c / den
    };
    x -= (a * x * x + b * x + c) / max_mag(2.0 * a * x + b, LINEAR_EPSILON);
    if x.is_finite() {
        x
    } else {
        f32::NAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn quadratic_double_root() {
        assert_eq!(solve_quadratic(1.0, -2.0, 1.0), 1.0);
    }

    #[test]
    fn quadratic_linear_fallback() {
        assert_eq!(solve_quadratic(0.0, 2.0, -6.0), 3.0);
    }

    #[test]
    fn quadratic_no_real_root() {
        assert!(solve_quadratic(1.0, 0.0, 1.0).is_nan());
    }

    #[test]
    fn quadratic_general_root() {
        // x² - 5x + 6: citardauq picks -2·6/(-5 - √1) = 2
        let x = solve_quadratic(1.0, -5.0, 6.0);
        assert_relative_eq!(x, 2.0, max_relative = 1e-6);
    }

    #[test]
    fn max_mag_prefers_larger_magnitude() {
        assert_eq!(max_mag(-3.0, 2.0), -3.0);
        assert_eq!(max_mag(0.0, 1e-20), 1e-20);
    }

    fn plane_fit(query_height: f32) -> SphereFit {
        // Four samples on the plane z = 0, query at (0, 0, query_height)
        let mut fit = SphereFit::new();
        for &(x, y) in &[(0.3f32, 0.3f32), (-0.3, 0.3), (0.3, -0.3), (-0.3, -0.3)] {
            let p = Vec3::new(x, y, -query_height);
            fit.add(p, Vec3::Z, 0.8);
        }
        fit
    }

    #[test]
    fn coplanar_samples_give_plane_distance() {
        let fit = plane_fit(0.5);
        let sphere = fit.solve(MlsShape::Sphere);
        // Symmetric coplanar input: curvature must vanish
        assert_relative_eq!(sphere.half_q, 0.0);
        assert_relative_eq!(sphere.project_dist_origin(), 0.5, max_relative = 1e-5);
    }

    #[test]
    fn plane_shape_matches_sphere_shape_on_planar_data() {
        let fit = plane_fit(0.75);
        let a = fit.solve(MlsShape::Sphere).project_dist_origin();
        let b = fit.solve(MlsShape::Plane).project_dist_origin();
        assert_relative_eq!(a, b, max_relative = 1e-6);
    }

    #[test]
    fn tangent_sphere_samples_give_negative_radius() {
        // Samples on the unit sphere, normals outward, query at the center:
        // p = n for every sample, so u = 0, q = 1, c = -1/2 and the signed
        // distance is exactly -1.
        let mut fit = SphereFit::new();
        let dirs = [
            Vec3::X,
            Vec3::Y,
            Vec3::Z,
            Vec3::NEG_X,
            Vec3::NEG_Y,
            Vec3::NEG_Z,
            Vec3::new(0.577, 0.577, 0.577),
        ];
        for d in dirs {
            let n = d.normalize();
            fit.add(n, n, 0.5);
        }
        let sphere = fit.solve(MlsShape::Sphere);
        assert_relative_eq!(sphere.project_dist_origin(), -1.0, max_relative = 1e-5);
    }

    #[test]
    fn quality_scaling_leaves_solution_unchanged() {
        let mut a = SphereFit::new();
        let mut b = SphereFit::new();
        let samples = [
            (Vec3::new(0.2, 0.1, -0.4), Vec3::Z),
            (Vec3::new(-0.3, 0.2, -0.5), Vec3::new(0.1, 0.0, 1.0).normalize()),
            (Vec3::new(0.1, -0.2, -0.45), Vec3::Z),
            (Vec3::new(-0.1, -0.1, -0.55), Vec3::Z),
        ];
        for (p, n) in samples {
            a.add(p, n, 0.6);
            b.add(p, n, 0.6 * 4.0); // exact power-of-two scaling
        }
        let da = a.solve(MlsShape::Sphere).project_dist_origin();
        let db = b.solve(MlsShape::Sphere).project_dist_origin();
        assert_relative_eq!(da, db, max_relative = 1e-6);
    }

    #[test]
    fn degenerate_denominator_degrades_to_plane() {
        // A single sample makes qDen exactly zero
        let mut fit = SphereFit::new();
        fit.add(Vec3::new(0.0, 0.0, -0.5), Vec3::Z, 1.0);
        let sphere = fit.solve(MlsShape::Sphere);
        assert_eq!(sphere.half_q, 0.0);
        assert!(sphere.project_dist_origin().is_finite());
    }
}

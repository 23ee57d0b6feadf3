// SPDX-License-Identifier: AGPL-3.0-only

//! Regularized pairwise interaction kernels.
//!
//! Single point of truth for the physical law. The WGSL device kernels in
//! `src/shaders/` mirror these expressions structurally; the only permitted
//! divergence is the device's fast reciprocal square root
//! (`inverseSqrt`), an accepted accuracy/speed trade.
//!
//! Both kernels soften the 1/r singularity by adding the source and target
//! radii in quadrature to the squared separation, so `distsq > 0` whenever
//! either radius is nonzero.

use std::f64::consts::PI;

/// Scalar precision for kernel, accumulator, and host evaluator.
///
/// Generalizes the original build-time float/double switch: thread `f32` or
/// `f64` through the whole host path. The device path stores f32 (see
/// DESIGN.md); the compensated kernels recover accuracy there.
pub trait Scalar:
    Copy
    + Default
    + PartialOrd
    + Send
    + Sync
    + std::fmt::Debug
    + std::fmt::Display
    + std::ops::Add<Output = Self>
    + std::ops::Sub<Output = Self>
    + std::ops::Mul<Output = Self>
    + std::ops::Div<Output = Self>
    + std::ops::Neg<Output = Self>
    + std::ops::AddAssign
    + 'static
{
    const ZERO: Self;
    const ONE: Self;

    fn from_f64(v: f64) -> Self;
    fn to_f64(self) -> f64;
    fn sqrt(self) -> Self;
    fn abs(self) -> Self;
}

impl Scalar for f32 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    #[inline]
    fn from_f64(v: f64) -> Self {
        v as Self
    }
    #[inline]
    fn to_f64(self) -> f64 {
        f64::from(self)
    }
    #[inline]
    fn sqrt(self) -> Self {
        self.sqrt()
    }
    #[inline]
    fn abs(self) -> Self {
        self.abs()
    }
}

impl Scalar for f64 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }
    #[inline]
    fn to_f64(self) -> f64 {
        self
    }
    #[inline]
    fn sqrt(self) -> Self {
        self.sqrt()
    }
    #[inline]
    fn abs(self) -> Self {
        self.abs()
    }
}

/// Geometric normalization for the 3D gravitational kernel: 1/(4π).
pub const GRAV3_NORM: f64 = 1.0 / (4.0 * PI);

/// Geometric normalization for the 2D vortex (Biot–Savart) kernel: 1/(2π).
pub const VORTEX2_NORM: f64 = 1.0 / (2.0 * PI);

/// Unnormalized 3D gravitational contribution of one source on one target.
///
/// `d` = source position minus target position, `ss` = source strength,
/// `sr` = source softening radius, `tr2` = target softening radius squared
/// (hoisted by callers since it is constant per target).
///
/// Returns `ss · distsq^(-3/2) · d`; the caller applies [`GRAV3_NORM`] after
/// accumulation.
#[inline]
pub fn grav3_contrib<T: Scalar>(dx: T, dy: T, dz: T, ss: T, sr: T, tr2: T) -> (T, T, T) {
    let distsq = dx * dx + dy * dy + dz * dz + sr * sr + tr2;
    let factor = ss / (distsq * distsq.sqrt());
    (dx * factor, dy * factor, dz * factor)
}

/// Unnormalized 2D vortex-induced velocity contribution.
///
/// Returns `(dy, -dx) · ss / distsq`; the caller applies [`VORTEX2_NORM`]
/// after accumulation.
#[inline]
pub fn vortex2_contrib<T: Scalar>(dx: T, dy: T, ss: T, sr: T, tr2: T) -> (T, T) {
    let distsq = dx * dx + dy * dy + sr * sr + tr2;
    let factor = ss / distsq;
    (dy * factor, -(dx * factor))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn magnitude3(v: (f64, f64, f64)) -> f64 {
        (v.0 * v.0 + v.1 * v.1 + v.2 * v.2).sqrt()
    }

    fn magnitude2(v: (f64, f64)) -> f64 {
        (v.0 * v.0 + v.1 * v.1).sqrt()
    }

    #[test]
    fn grav3_points_along_separation() {
        // Source on the +x axis pulls the target toward +x.
        let (u, v, w) = grav3_contrib(1.0_f64, 0.0, 0.0, 1.0, 0.1, 0.01);
        assert!(u > 0.0);
        assert_eq!(v, 0.0);
        assert_eq!(w, 0.0);
    }

    #[test]
    fn grav3_analytical_value() {
        // distsq = 1 + 0 + 0 → factor = ss
        let (u, _, _) = grav3_contrib(1.0_f64, 0.0, 0.0, 2.5, 0.0, 0.0);
        assert!((u - 2.5).abs() < 1e-14);
    }

    #[test]
    fn vortex2_antisymmetric_under_swap() {
        // Swapping source and target flips d; for equal strengths and radii
        // the contribution negates (Biot–Savart antisymmetry).
        let (dx, dy) = (0.3_f64, -0.7);
        let fwd = vortex2_contrib(dx, dy, 1.0, 0.05, 0.05 * 0.05);
        let rev = vortex2_contrib(-dx, -dy, 1.0, 0.05, 0.05 * 0.05);
        assert!((fwd.0 + rev.0).abs() < 1e-15);
        assert!((fwd.1 + rev.1).abs() < 1e-15);
    }

    #[test]
    fn vortex2_perpendicular_to_separation() {
        let (u, v) = vortex2_contrib(0.4_f64, 0.2, 1.0, 0.1, 0.01);
        // (u,v)·(dx,dy) = 0
        assert!((u * 0.4 + v * 0.2).abs() < 1e-15);
    }

    #[test]
    fn softening_monotonically_weakens_both_kernels() {
        let mut prev3 = f64::INFINITY;
        let mut prev2 = f64::INFINITY;
        for sr in [0.01, 0.1, 0.5, 1.0, 4.0] {
            let g = magnitude3(grav3_contrib(0.5, 0.3, -0.2, 1.0, sr, 0.0));
            let c = magnitude2(vortex2_contrib(0.5, 0.3, 1.0, sr, 0.0));
            assert!(g < prev3, "grav3 must weaken as sr grows: {g} vs {prev3}");
            assert!(c < prev2, "vortex2 must weaken as sr grows: {c} vs {prev2}");
            assert!(g.is_finite() && c.is_finite());
            prev3 = g;
            prev2 = c;
        }
    }

    #[test]
    fn coincident_particles_stay_finite_with_nonzero_radius() {
        let g = grav3_contrib(0.0_f64, 0.0, 0.0, 1.0, 0.1, 0.0);
        assert!(g.0.is_finite() && g.1.is_finite() && g.2.is_finite());
        let c = vortex2_contrib(0.0_f64, 0.0, 1.0, 0.0, 0.01);
        assert!(c.0.is_finite() && c.1.is_finite());
    }

    #[test]
    fn f32_and_f64_agree_to_single_precision() {
        let a = grav3_contrib(0.25_f32, -0.5, 0.125, 0.75, 0.1, 0.01);
        let b = grav3_contrib(0.25_f64, -0.5, 0.125, 0.75, 0.1, 0.01);
        assert!((f64::from(a.0) - b.0).abs() < 1e-6);
        assert!((f64::from(a.1) - b.1).abs() < 1e-6);
        assert!((f64::from(a.2) - b.2).abs() < 1e-6);
    }

    #[test]
    fn normalization_constants() {
        assert!((GRAV3_NORM * 4.0 * PI - 1.0).abs() < 1e-15);
        assert!((VORTEX2_NORM * 2.0 * PI - 1.0).abs() < 1e-15);
    }
}

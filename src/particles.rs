// SPDX-License-Identifier: AGPL-3.0-only

//! Structure-of-arrays particle sets with block padding.
//!
//! Buffers are allocated once at padded length; padding entries carry zero
//! strength so they contribute nothing to any sum, while their softening
//! radius is copied from a valid value so the kernel's `distsq` never
//! degenerates to zero. Sources and targets are the same underlying set:
//! a particle's target-role coordinates are the same values it presents as
//! a source on the same step.

use crate::kernel::Scalar;

/// Smallest multiple of `align` that is ≥ `n`.
#[must_use]
pub fn padded_len(n: usize, align: usize) -> usize {
    align * n.div_ceil(align)
}

/// Deterministic LCG over [0, 1) — good enough for particle initialization,
/// and reproducible across platforms.
pub struct Lcg {
    state: u64,
}

impl Lcg {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn uniform(&mut self) -> f64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.state >> 33) as f64 / (1u64 << 31) as f64
    }
}

/// Default generator seed (matches the historical runs).
pub const DEFAULT_SEED: u64 = 1234;

/// 3D particle set: positions, strength, softening radius, output velocity.
#[derive(Clone, Debug)]
pub struct ParticleSet3<T: Scalar> {
    /// True particle count; indices `n..padded_len()` are padding.
    pub n: usize,
    pub x: Vec<T>,
    pub y: Vec<T>,
    pub z: Vec<T>,
    pub s: Vec<T>,
    pub r: Vec<T>,
    pub u: Vec<T>,
    pub v: Vec<T>,
    pub w: Vec<T>,
}

impl<T: Scalar> ParticleSet3<T> {
    /// All-zero set of padded length `n_padded`. Callers must fill radii
    /// before evaluating, or padding targets divide by zero.
    #[must_use]
    pub fn padded(n: usize, n_padded: usize) -> Self {
        assert!(n_padded >= n, "padded length {n_padded} below count {n}");
        Self {
            n,
            x: vec![T::ZERO; n_padded],
            y: vec![T::ZERO; n_padded],
            z: vec![T::ZERO; n_padded],
            s: vec![T::ZERO; n_padded],
            r: vec![T::ZERO; n_padded],
            u: vec![T::ZERO; n_padded],
            v: vec![T::ZERO; n_padded],
            w: vec![T::ZERO; n_padded],
        }
    }

    /// Random set: positions uniform in the unit cube, strengths
    /// `uniform/√n`, radius `(2/3)/√n` for every entry including padding.
    /// Padding strengths stay zero.
    #[must_use]
    pub fn random(n: usize, n_padded: usize, seed: u64) -> Self {
        let mut set = Self::padded(n, n_padded);
        let mut rng = Lcg::new(seed);
        let strmag = 1.0 / (n as f64).sqrt();
        let rad = T::from_f64((2.0 / 3.0) / (n as f64).sqrt());
        for i in 0..n {
            set.x[i] = T::from_f64(rng.uniform());
        }
        for i in 0..n {
            set.y[i] = T::from_f64(rng.uniform());
        }
        for i in 0..n {
            set.z[i] = T::from_f64(rng.uniform());
        }
        for i in 0..n {
            set.s[i] = T::from_f64(strmag * rng.uniform());
        }
        for r in &mut set.r {
            *r = rad;
        }
        set
    }

    #[must_use]
    pub fn padded_len(&self) -> usize {
        self.x.len()
    }

    /// Zero the output buffers before an evaluation pass.
    pub fn zero_outputs(&mut self) {
        self.u.iter_mut().for_each(|o| *o = T::ZERO);
        self.v.iter_mut().for_each(|o| *o = T::ZERO);
        self.w.iter_mut().for_each(|o| *o = T::ZERO);
    }
}

/// 2D particle set: positions, circulation strength, softening radius,
/// output velocity.
#[derive(Clone, Debug)]
pub struct ParticleSet2<T: Scalar> {
    /// True particle count; indices `n..padded_len()` are padding.
    pub n: usize,
    pub x: Vec<T>,
    pub y: Vec<T>,
    pub s: Vec<T>,
    pub r: Vec<T>,
    pub u: Vec<T>,
    pub v: Vec<T>,
}

impl<T: Scalar> ParticleSet2<T> {
    /// All-zero set of padded length `n_padded`.
    #[must_use]
    pub fn padded(n: usize, n_padded: usize) -> Self {
        assert!(n_padded >= n, "padded length {n_padded} below count {n}");
        Self {
            n,
            x: vec![T::ZERO; n_padded],
            y: vec![T::ZERO; n_padded],
            s: vec![T::ZERO; n_padded],
            r: vec![T::ZERO; n_padded],
            u: vec![T::ZERO; n_padded],
            v: vec![T::ZERO; n_padded],
        }
    }

    /// Random set: positions uniform in the unit square, signed circulations
    /// `(2·uniform − 1)/√n`, radius `(2/3)/√n` everywhere.
    #[must_use]
    pub fn random(n: usize, n_padded: usize, seed: u64) -> Self {
        let mut set = Self::padded(n, n_padded);
        let mut rng = Lcg::new(seed);
        let strmag = 1.0 / (n as f64).sqrt();
        let rad = T::from_f64((2.0 / 3.0) / (n as f64).sqrt());
        for i in 0..n {
            set.x[i] = T::from_f64(rng.uniform());
        }
        for i in 0..n {
            set.y[i] = T::from_f64(rng.uniform());
        }
        for i in 0..n {
            set.s[i] = T::from_f64(strmag * (2.0 * rng.uniform() - 1.0));
        }
        for r in &mut set.r {
            *r = rad;
        }
        set
    }

    #[must_use]
    pub fn padded_len(&self) -> usize {
        self.x.len()
    }

    pub fn zero_outputs(&mut self) {
        self.u.iter_mut().for_each(|o| *o = T::ZERO);
        self.v.iter_mut().for_each(|o| *o = T::ZERO);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padded_len_rounds_up_to_alignment() {
        assert_eq!(padded_len(63, 64), 64);
        assert_eq!(padded_len(64, 64), 64);
        assert_eq!(padded_len(65, 64), 128);
        assert_eq!(padded_len(1, 256), 256);
    }

    #[test]
    fn lcg_uniform_in_unit_interval() {
        let mut rng = Lcg::new(42);
        for _ in 0..10_000 {
            let x = rng.uniform();
            assert!((0.0..1.0).contains(&x));
        }
    }

    #[test]
    fn generator_deterministic_per_seed() {
        let a = ParticleSet3::<f32>::random(100, 256, DEFAULT_SEED);
        let b = ParticleSet3::<f32>::random(100, 256, DEFAULT_SEED);
        assert_eq!(a.x, b.x);
        assert_eq!(a.s, b.s);
        let c = ParticleSet3::<f32>::random(100, 256, 99);
        assert_ne!(a.x, c.x);
    }

    #[test]
    fn padding_entries_have_zero_strength_and_valid_radius() {
        let set = ParticleSet3::<f32>::random(100, 512, DEFAULT_SEED);
        for i in 100..512 {
            assert_eq!(set.s[i], 0.0, "padding strength must be zero at {i}");
            assert!(set.r[i] > 0.0, "padding radius must stay nonzero at {i}");
        }
        let set2 = ParticleSet2::<f64>::random(50, 128, DEFAULT_SEED);
        for i in 50..128 {
            assert_eq!(set2.s[i], 0.0);
            assert!(set2.r[i] > 0.0);
        }
    }

    #[test]
    fn vortex_strengths_are_signed() {
        let set = ParticleSet2::<f64>::random(1000, 1024, DEFAULT_SEED);
        assert!(set.s[..1000].iter().any(|&s| s > 0.0));
        assert!(set.s[..1000].iter().any(|&s| s < 0.0));
    }

    #[test]
    fn zero_outputs_clears_previous_results() {
        let mut set = ParticleSet3::<f32>::random(10, 64, DEFAULT_SEED);
        set.u[3] = 5.0;
        set.w[9] = -1.0;
        set.zero_outputs();
        assert!(set.u.iter().all(|&o| o == 0.0));
        assert!(set.w.iter().all(|&o| o == 0.0));
    }

    #[test]
    #[should_panic(expected = "padded length")]
    fn padding_below_count_is_a_contract_violation() {
        let _ = ParticleSet3::<f32>::padded(100, 64);
    }
}

// SPDX-License-Identifier: AGPL-3.0-only

//! Blocked host evaluator — the deterministic reference path.
//!
//! Sources are processed in fixed-size chunks (outer tier) and each target in
//! a bounded sub-range (inner tier) keeps its own accumulator across the
//! chunk. The two-tier blocking exists to bound the working set and to pin
//! the summation order — source-chunk by source-chunk — to the device
//! evaluator's block order, so rounding is comparable and results are
//! reproducible regardless of thread scheduling.
//!
//! Whole-set drivers parallelize over target blocks with rayon; per-target
//! results are independent of the worker count because each target's source
//! order is fixed.

use rayon::prelude::*;

use crate::accum::Accumulator;
use crate::kernel::{grav3_contrib, vortex2_contrib, Scalar, GRAV3_NORM, VORTEX2_NORM};
use crate::particles::{ParticleSet2, ParticleSet3};

/// Outer-tier source chunk length.
pub const SRC_BLOCK: usize = 256;

/// Inner-tier target sub-range capacity per block call.
pub const TRG_BLOCK: usize = 32;

/// Evaluate one target sub-range against all sources, 3D gravitational
/// kernel, with an explicit source chunk length.
///
/// The chunk length controls only the floating-point accumulation order;
/// [`grav3_block`] fixes it at [`SRC_BLOCK`] to match the device evaluator.
///
/// # Panics
///
/// If the target sub-range exceeds [`TRG_BLOCK`] — a caller contract
/// violation, not a recoverable condition.
#[allow(clippy::too_many_arguments)]
pub fn grav3_block_chunked<T: Scalar, A: Accumulator<T>>(
    src_chunk: usize,
    sx: &[T],
    sy: &[T],
    sz: &[T],
    ss: &[T],
    sr: &[T],
    tx: &[T],
    ty: &[T],
    tz: &[T],
    tr: &[T],
    tu: &mut [T],
    tv: &mut [T],
    tw: &mut [T],
) {
    let n_src = sx.len();
    let n_trg = tx.len();
    assert!(
        n_trg <= TRG_BLOCK,
        "target sub-range ({n_trg}) exceeds per-call capacity ({TRG_BLOCK})"
    );

    let mut tot_u = [A::default(); TRG_BLOCK];
    let mut tot_v = [A::default(); TRG_BLOCK];
    let mut tot_w = [A::default(); TRG_BLOCK];

    let mut jstart = 0;
    while jstart < n_src {
        let jend = (jstart + src_chunk).min(n_src);

        for i in 0..n_trg {
            let (txi, tyi, tzi) = (tx[i], ty[i], tz[i]);
            let tr2 = tr[i] * tr[i];
            let mut lu = A::default();
            let mut lv = A::default();
            let mut lw = A::default();

            // No cross-target dependency: vectorizable.
            for j in jstart..jend {
                let (cu, cv, cw) =
                    grav3_contrib(sx[j] - txi, sy[j] - tyi, sz[j] - tzi, ss[j], sr[j], tr2);
                lu.add(cu);
                lv.add(cv);
                lw.add(cw);
            }

            tot_u[i].add(lu.value());
            tot_v[i].add(lv.value());
            tot_w[i].add(lw.value());
        }

        jstart = jend;
    }

    let norm = T::from_f64(GRAV3_NORM);
    for i in 0..n_trg {
        tu[i] = tot_u[i].value() * norm;
        tv[i] = tot_v[i].value() * norm;
        tw[i] = tot_w[i].value() * norm;
    }
}

/// [`grav3_block_chunked`] with the standard [`SRC_BLOCK`] chunk length.
#[allow(clippy::too_many_arguments)]
pub fn grav3_block<T: Scalar, A: Accumulator<T>>(
    sx: &[T],
    sy: &[T],
    sz: &[T],
    ss: &[T],
    sr: &[T],
    tx: &[T],
    ty: &[T],
    tz: &[T],
    tr: &[T],
    tu: &mut [T],
    tv: &mut [T],
    tw: &mut [T],
) {
    grav3_block_chunked::<T, A>(SRC_BLOCK, sx, sy, sz, ss, sr, tx, ty, tz, tr, tu, tv, tw);
}

/// Evaluate one target sub-range against all sources, 2D vortex kernel,
/// with an explicit source chunk length.
///
/// # Panics
///
/// If the target sub-range exceeds [`TRG_BLOCK`].
#[allow(clippy::too_many_arguments)]
pub fn vortex2_block_chunked<T: Scalar, A: Accumulator<T>>(
    src_chunk: usize,
    sx: &[T],
    sy: &[T],
    ss: &[T],
    sr: &[T],
    tx: &[T],
    ty: &[T],
    tr: &[T],
    tu: &mut [T],
    tv: &mut [T],
) {
    let n_src = sx.len();
    let n_trg = tx.len();
    assert!(
        n_trg <= TRG_BLOCK,
        "target sub-range ({n_trg}) exceeds per-call capacity ({TRG_BLOCK})"
    );

    let mut tot_u = [A::default(); TRG_BLOCK];
    let mut tot_v = [A::default(); TRG_BLOCK];

    let mut jstart = 0;
    while jstart < n_src {
        let jend = (jstart + src_chunk).min(n_src);

        for i in 0..n_trg {
            let (txi, tyi) = (tx[i], ty[i]);
            let tr2 = tr[i] * tr[i];
            let mut lu = A::default();
            let mut lv = A::default();

            for j in jstart..jend {
                let (cu, cv) = vortex2_contrib(sx[j] - txi, sy[j] - tyi, ss[j], sr[j], tr2);
                lu.add(cu);
                lv.add(cv);
            }

            tot_u[i].add(lu.value());
            tot_v[i].add(lv.value());
        }

        jstart = jend;
    }

    let norm = T::from_f64(VORTEX2_NORM);
    for i in 0..n_trg {
        tu[i] = tot_u[i].value() * norm;
        tv[i] = tot_v[i].value() * norm;
    }
}

/// [`vortex2_block_chunked`] with the standard [`SRC_BLOCK`] chunk length.
#[allow(clippy::too_many_arguments)]
pub fn vortex2_block<T: Scalar, A: Accumulator<T>>(
    sx: &[T],
    sy: &[T],
    ss: &[T],
    sr: &[T],
    tx: &[T],
    ty: &[T],
    tr: &[T],
    tu: &mut [T],
    tv: &mut [T],
) {
    vortex2_block_chunked::<T, A>(SRC_BLOCK, sx, sy, ss, sr, tx, ty, tr, tu, tv);
}

/// Evaluate all true targets of a 3D set against all true sources
/// (self-interaction case), target blocks in parallel.
pub fn eval_grav3<T: Scalar, A: Accumulator<T>>(set: &mut ParticleSet3<T>) {
    set.zero_outputs();
    let n = set.n;
    let ParticleSet3 {
        x, y, z, s, r, u, v, w, ..
    } = set;
    let (sx, sy, sz, ss, sr) = (&x[..n], &y[..n], &z[..n], &s[..n], &r[..n]);

    u.par_chunks_mut(TRG_BLOCK)
        .zip(v.par_chunks_mut(TRG_BLOCK))
        .zip(w.par_chunks_mut(TRG_BLOCK))
        .enumerate()
        .for_each(|(ibk, ((bu, bv), bw))| {
            let start = ibk * TRG_BLOCK;
            if start >= n {
                return;
            }
            let end = (start + TRG_BLOCK).min(n);
            let len = end - start;
            grav3_block::<T, A>(
                sx,
                sy,
                sz,
                ss,
                sr,
                &sx[start..end],
                &sy[start..end],
                &sz[start..end],
                &sr[start..end],
                &mut bu[..len],
                &mut bv[..len],
                &mut bw[..len],
            );
        });
}

/// Evaluate all true targets of a 2D set against all true sources,
/// target blocks in parallel.
pub fn eval_vortex2<T: Scalar, A: Accumulator<T>>(set: &mut ParticleSet2<T>) {
    set.zero_outputs();
    let n = set.n;
    let ParticleSet2 { x, y, s, r, u, v, .. } = set;
    let (sx, sy, ss, sr) = (&x[..n], &y[..n], &s[..n], &r[..n]);

    u.par_chunks_mut(TRG_BLOCK)
        .zip(v.par_chunks_mut(TRG_BLOCK))
        .enumerate()
        .for_each(|(ibk, (bu, bv))| {
            let start = ibk * TRG_BLOCK;
            if start >= n {
                return;
            }
            let end = (start + TRG_BLOCK).min(n);
            let len = end - start;
            vortex2_block::<T, A>(
                sx,
                sy,
                ss,
                sr,
                &sx[start..end],
                &sy[start..end],
                &sr[start..end],
                &mut bu[..len],
                &mut bv[..len],
            );
        });
}

/// Explicit Euler position update: `pos += dt · vel` over the true range.
pub fn euler_step3<T: Scalar>(set: &mut ParticleSet3<T>, dt: T) {
    for i in 0..set.n {
        set.x[i] += dt * set.u[i];
        set.y[i] += dt * set.v[i];
        set.z[i] += dt * set.w[i];
    }
}

/// Host time-stepping loop: evaluate, then advance positions, per step.
/// Velocity buffers hold the final step's evaluation on return.
pub fn evolve_grav3<T: Scalar, A: Accumulator<T>>(set: &mut ParticleSet3<T>, dt: T, steps: usize) {
    for _ in 0..steps {
        eval_grav3::<T, A>(set);
        euler_step3(set, dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accum::{KahanSum, RunningSum};
    use crate::particles::DEFAULT_SEED;

    /// Direct unblocked all-pairs loop, the simplest possible oracle.
    fn grav3_direct(set: &ParticleSet3<f64>, i: usize) -> (f64, f64, f64) {
        let tr2 = set.r[i] * set.r[i];
        let (mut u, mut v, mut w) = (0.0, 0.0, 0.0);
        for j in 0..set.n {
            let (cu, cv, cw) = grav3_contrib(
                set.x[j] - set.x[i],
                set.y[j] - set.y[i],
                set.z[j] - set.z[i],
                set.s[j],
                set.r[j],
                tr2,
            );
            u += cu;
            v += cv;
            w += cw;
        }
        (u * GRAV3_NORM, v * GRAV3_NORM, w * GRAV3_NORM)
    }

    #[test]
    fn blocked_evaluator_matches_direct_sum() {
        let mut set = ParticleSet3::<f64>::random(300, 512, DEFAULT_SEED);
        eval_grav3::<f64, RunningSum<f64>>(&mut set);
        for i in [0, 17, 150, 299] {
            let (u, v, w) = grav3_direct(&set, i);
            assert!((set.u[i] - u).abs() < 1e-12, "u[{i}]: {} vs {u}", set.u[i]);
            assert!((set.v[i] - v).abs() < 1e-12);
            assert!((set.w[i] - w).abs() < 1e-12);
        }
    }

    #[test]
    fn two_particle_analytic_check() {
        // Particles at origin and (1,0,0), unit strength, no softening on
        // the source side: distsq = 1, factor = 1, u = 1/(4π).
        let mut set = ParticleSet3::<f64>::padded(2, 32);
        set.x[1] = 1.0;
        set.s[0] = 1.0;
        set.s[1] = 1.0;
        set.r.iter_mut().for_each(|r| *r = 1e-8);
        eval_grav3::<f64, RunningSum<f64>>(&mut set);
        assert!((set.u[0] - GRAV3_NORM).abs() < 1e-9);
        assert!((set.u[1] + GRAV3_NORM).abs() < 1e-9);
        assert!(set.v[0].abs() < 1e-12 && set.w[0].abs() < 1e-12);
    }

    #[test]
    fn evaluation_deterministic_across_runs() {
        let mut a = ParticleSet3::<f32>::random(500, 512, DEFAULT_SEED);
        let mut b = a.clone();
        eval_grav3::<f32, RunningSum<f32>>(&mut a);
        eval_grav3::<f32, RunningSum<f32>>(&mut b);
        assert_eq!(a.u, b.u, "fixed block order must be thread-schedule independent");
        assert_eq!(a.v, b.v);
        assert_eq!(a.w, b.w);
    }

    #[test]
    fn vortex_evaluator_produces_divergence_free_swirl() {
        // A single positive vortex at the origin induces counter-clockwise
        // velocity at (1, 0): d = s - t = (-1, 0), so (dy, -dx) scaled by
        // the positive factor gives u = 0, v = +1/(2π).
        let mut set = ParticleSet2::<f64>::padded(2, 32);
        set.x[1] = 1.0;
        set.s[0] = 1.0;
        set.r.iter_mut().for_each(|r| *r = 1e-6);
        eval_vortex2::<f64, RunningSum<f64>>(&mut set);
        assert!(set.u[1].abs() < 1e-12);
        assert!((set.v[1] - VORTEX2_NORM).abs() < 1e-9);
    }

    #[test]
    #[should_panic(expected = "per-call capacity")]
    fn oversized_target_range_is_rejected() {
        let src = vec![0.0_f32; 64];
        let trg = vec![0.0_f32; TRG_BLOCK + 1];
        let mut out = vec![0.0_f32; TRG_BLOCK + 1];
        let (mut ou, mut ov, mut ow) = (out.clone(), out.clone(), std::mem::take(&mut out));
        grav3_block::<f32, RunningSum<f32>>(
            &src, &src, &src, &src, &src, &trg, &trg, &trg, &trg, &mut ou, &mut ov, &mut ow,
        );
    }

    #[test]
    fn euler_step_advances_only_true_particles() {
        let mut set = ParticleSet3::<f32>::padded(2, 64);
        set.r.iter_mut().for_each(|r| *r = 0.1);
        set.u[0] = 1.0;
        set.u[5] = 1.0; // padding velocity must not move padding positions
        euler_step3(&mut set, 0.5);
        assert_eq!(set.x[0], 0.5);
        assert_eq!(set.x[5], 0.0);
    }

    #[test]
    fn compensated_variant_agrees_with_naive_on_smooth_data() {
        let mut a = ParticleSet2::<f32>::random(256, 256, DEFAULT_SEED);
        let mut b = a.clone();
        eval_vortex2::<f32, RunningSum<f32>>(&mut a);
        eval_vortex2::<f32, KahanSum<f32>>(&mut b);
        for i in 0..a.n {
            assert!(
                (f64::from(a.u[i]) - f64::from(b.u[i])).abs() < 1e-6,
                "u[{i}] naive {} vs compensated {}",
                a.u[i],
                b.u[i]
            );
        }
    }
}

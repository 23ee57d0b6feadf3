// SPDX-License-Identifier: AGPL-3.0-only

//! Pointwise parity between two evaluator outputs.
//!
//! Error per particle is the Euclidean norm of the component-wise output
//! difference; the report carries the RMS over all particles and the single
//! worst particle. Accumulation runs in f64 regardless of the evaluators'
//! working precision so the statistic itself adds no rounding story.

use crate::kernel::Scalar;

/// Summary statistics from comparing two output sets.
#[derive(Clone, Copy, Debug)]
pub struct ParityReport {
    /// Root-mean-square per-particle vector error.
    pub rms: f64,
    /// Largest single-particle vector error.
    pub max: f64,
    /// Particle count compared.
    pub n: usize,
}

impl ParityReport {
    pub fn within(&self, rms_bound: f64, max_bound: f64) -> bool {
        self.rms <= rms_bound && self.max <= max_bound
    }
}

/// Compare the first `n` entries of `D` component slices against a reference.
///
/// # Panics
///
/// If any slice is shorter than `n`.
pub fn compare<T: Scalar, const D: usize>(
    reference: [&[T]; D],
    test: [&[T]; D],
    n: usize,
) -> ParityReport {
    let mut sumsq = 0.0_f64;
    let mut max = 0.0_f64;
    for i in 0..n {
        let mut errsq = 0.0_f64;
        for d in 0..D {
            let diff = reference[d][i].to_f64() - test[d][i].to_f64();
            errsq += diff * diff;
        }
        sumsq += errsq;
        if errsq.sqrt() > max {
            max = errsq.sqrt();
        }
    }
    ParityReport {
        rms: (sumsq / n.max(1) as f64).sqrt(),
        max,
        n,
    }
}

// SPDX-License-Identifier: AGPL-3.0-only

//! Running-sum accumulators: naive and Kahan-compensated.
//!
//! The compensated accumulator carries a `(sum, rem)` pair so that, for a
//! sequence of additions, the final value's error is bounded independently
//! of sequence length to leading order. With f32 storage this behaves close
//! to an f64 running sum. The device kernels carry the same two-value state
//! in a `vec2<f32>` (see `src/shaders/`).

use crate::kernel::Scalar;

/// A running-sum primitive selectable per evaluation.
pub trait Accumulator<T: Scalar>: Copy + Default + Send {
    fn add(&mut self, x: T);
    fn value(&self) -> T;
}

/// Plain (uncompensated) running sum.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunningSum<T: Scalar> {
    sum: T,
}

impl<T: Scalar> Accumulator<T> for RunningSum<T> {
    #[inline]
    fn add(&mut self, x: T) {
        self.sum += x;
    }

    #[inline]
    fn value(&self) -> T {
        self.sum
    }
}

/// Kahan-compensated running sum.
///
/// `rem` tracks the rounding error of the previous addition and is folded
/// back into the next one.
#[derive(Clone, Copy, Debug, Default)]
pub struct KahanSum<T: Scalar> {
    sum: T,
    rem: T,
}

impl<T: Scalar> Accumulator<T> for KahanSum<T> {
    #[inline]
    fn add(&mut self, x: T) {
        let y = x - self.rem;
        let t = self.sum + y;
        self.rem = (t - self.sum) - y;
        self.sum = t;
    }

    #[inline]
    fn value(&self) -> T {
        self.sum + self.rem
    }
}

// SPDX-License-Identifier: AGPL-3.0-only

//! Centralized comparison tolerances with numerical justification.
//!
//! Every threshold used when comparing evaluator outputs is defined here
//! with documentation of its origin and rationale. No ad-hoc magic numbers.
//!
//! # Tolerance categories
//!
//! | Category | Basis | Example |
//! |----------|-------|---------|
//! | Machine precision | IEEE 754 f64 | 1e-12 for exact arithmetic |
//! | Summation order | f32 rounding × sum length | 1e-4 for naive f32 sums |
//! | Compensated sums | Kahan error bound | 1e-6 reblocking agreement |

// ═══════════════════════════════════════════════════════════════════
// Machine-precision tolerances
// ═══════════════════════════════════════════════════════════════════

/// Tolerance for operations that should be exact in f64 arithmetic.
///
/// f64 has ~15.9 significant digits; 1e-12 allows a few digits of
/// accumulated rounding across the kernel's multiply/add chain.
pub const EXACT_F64: f64 = 1e-12;

// ═══════════════════════════════════════════════════════════════════
// Summation-order tolerances (f32)
// ═══════════════════════════════════════════════════════════════════

/// Relative agreement between naive f32 sums taken in different orders.
///
/// A naive running sum of k terms carries O(k·ε) worst-case rounding;
/// for k ~ 1e5 and ε_f32 ≈ 1.2e-7 that is order 1e-2 worst case, but
/// random-sign cancellation keeps observed drift near √k·ε. 1e-4 covers
/// blocked-vs-unblocked f32 evaluation up to n ~ 1e5.
pub const NAIVE_REORDER_REL: f64 = 1e-4;

/// Relative agreement between compensated f32 sums under re-blocking.
///
/// Kahan's bound is 2ε + O(k·ε²): effectively order-independent at f32.
/// Changing the chunk length must not move the result by more than a few
/// ulps; 1e-6 gives an order of margin over 2ε_f32.
pub const COMPENSATED_REBLOCK_REL: f64 = 1e-6;

// ═══════════════════════════════════════════════════════════════════
// Cross-evaluator parity
// ═══════════════════════════════════════════════════════════════════

/// RMS velocity error, device f32 evaluator vs compensated host reference.
///
/// The device path differs from the host in reciprocal-sqrt accuracy
/// (`inverseSqrt`, ~2 ulp), atomic combine order across source chunks, and
/// fused-multiply-add contraction. On uniform unit-box test sets the
/// observed RMS sits near 1e-7; 1e-5 leaves two orders of margin without
/// masking a wrong kernel (an index or normalization bug shows up at 1e-1).
pub const GPU_VS_CPU_RMS: f64 = 1e-5;

/// Max single-particle velocity error for the same comparison.
///
/// Looser than the RMS bound: a particle with a near neighbor sits on a
/// steep kernel gradient where the device's fast rsqrt costs the most.
pub const GPU_VS_CPU_MAX: f64 = 1e-3;

/// RMS position drift after a short time-stepped run, device vs host.
///
/// Per-step velocity error compounds through the Euler update; for ~10
/// steps at dt ~ 1e-3 the compounded drift stays below the single-step
/// bound times step count.
pub const STEPPED_RMS: f64 = 1e-4;

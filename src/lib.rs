// SPDX-License-Identifier: AGPL-3.0-only

//! riptide — multi-GPU all-pairs particle interaction summation
//!
//! Direct O(N²) summation of regularized pairwise interactions — 3D
//! gravitational and 2D vortex (Biot–Savart) — with a blocked CPU reference
//! evaluator, tiled f32 WGSL device kernels (plain and Kahan-compensated),
//! and a multi-device orchestrator that partitions targets across logical
//! GPUs and keeps replicas coherent through an explicit-Euler stepping loop.
//!
//! ## Modules
//!   - `kernel` — interaction laws + the `Scalar` f32/f64 seam
//!   - `accum` — running-sum accumulators (naive, Kahan)
//!   - `particles` — SoA particle sets, padding, deterministic generator
//!   - `cpu_reference` — blocked host evaluator (rayon over target blocks)
//!   - `shaders` / `src/shaders/` — WGSL device kernels
//!   - `gpu` — wgpu adapter selection, buffers, dispatch
//!   - `orchestrator` — partitioning, multi-device evaluation, stepping
//!   - `parity` — RMS/max comparison between evaluator outputs
//!   - `tolerances` — centralized comparison thresholds
//!
//! ## Binaries
//!   - `ngrav3d` — 3D summation benchmark; host parity report under `-c`
//!   - `nvortex2d` — 2D vortex benchmark with compensated kernels
//!   - `ngrav3d_steps` — time-stepped 3D run; host-loop parity under `-c`

pub mod accum;
pub mod cpu_reference;
pub mod error;
pub mod gpu;
pub mod kernel;
pub mod orchestrator;
pub mod parity;
pub mod particles;
pub mod shaders;
pub mod tolerances;

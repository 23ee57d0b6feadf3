// SPDX-License-Identifier: AGPL-3.0-only

//! WGSL shader sources for the device evaluators.
//!
//! All kernels store f32 and compile with the default wgpu feature set.
//! Accuracy on device comes from the compensated variants, not from wider
//! storage: WGSL exposes no 64-bit atomics, so an f64 rendition of the
//! chunk-combine does not exist on this API.
//!
//! The interaction kernels share one structure: a 2-D dispatch whose x axis
//! covers target workgroups and whose y axis covers source chunks, shared
//! tiles staged per workgroup, and per-chunk partials folded into the
//! outputs through compare-exchange f32 adds (WGSL has no native float
//! `atomicAdd`). Dispatch geometry comes from
//! [`crate::orchestrator::Partition`].

// ═══════════════════════════════════════════════════════════════════
// 3D gravitational all-pairs kernel
// ═══════════════════════════════════════════════════════════════════
//
// Physics:
//   distsq = |d|² + sr² + tr²
//   vel   += s · d / distsq^(3/2),  normalized by 1/(4π)

pub const SHADER_GRAV3: &str = include_str!("shaders/grav3d_f32.wgsl");

pub const SHADER_GRAV3_KAHAN: &str = include_str!("shaders/grav3d_kahan_f32.wgsl");

/// Workgroup size of the 3D kernels (threads per target workgroup).
pub const GRAV3_WG_SIZE: usize = 256;

/// Preferred source-chunk count along dispatch y for the 3D kernels.
pub const GRAV3_CHUNKS: usize = 64;

// ═══════════════════════════════════════════════════════════════════
// 2D vortex (Biot–Savart) all-pairs kernel
// ═══════════════════════════════════════════════════════════════════
//
// Physics:
//   distsq = |d|² + sr² + tr²
//   vel   += s · (dy, -dx) / distsq,  normalized by 1/(2π)

pub const SHADER_VORTEX2: &str = include_str!("shaders/vortex2d_f32.wgsl");

pub const SHADER_VORTEX2_KAHAN: &str = include_str!("shaders/vortex2d_kahan_f32.wgsl");

/// Workgroup size of the 2D kernels.
pub const VORTEX2_WG_SIZE: usize = 128;

/// Preferred source-chunk count for the 2D kernels.
pub const VORTEX2_CHUNKS: usize = 32;

// ═══════════════════════════════════════════════════════════════════
// Euler position update (stepping loop)
// ═══════════════════════════════════════════════════════════════════

pub const SHADER_POS_UPDATE: &str = include_str!("shaders/pos_update_f32.wgsl");

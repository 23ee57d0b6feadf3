// SPDX-License-Identifier: AGPL-3.0-only

//! Typed errors for GPU setup and orchestration.
//!
//! Replaces `Result<_, String>` in public APIs with a proper enum so callers
//! can pattern-match on failure modes (no adapter, device creation, readback)
//! rather than parsing opaque strings.

use std::fmt;

/// Errors arising from GPU initialization or evaluation.
#[derive(Debug)]
pub enum RiptideError {
    /// No compatible GPU adapter was found by wgpu.
    NoAdapter,

    /// GPU device creation failed (wraps the underlying wgpu error message).
    DeviceCreation(String),

    /// A buffer readback did not complete (wraps the map error message).
    Readback(String),
}

impl fmt::Display for RiptideError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAdapter => write!(f, "No GPU adapter found"),
            Self::DeviceCreation(e) => write!(f, "Failed to create GPU device: {e}"),
            Self::Readback(e) => write!(f, "Buffer readback failed: {e}"),
        }
    }
}

impl std::error::Error for RiptideError {}

// SPDX-License-Identifier: AGPL-3.0-only

//! GPU compute plumbing for the all-pairs evaluators.
//!
//! Creates wgpu devices with the default feature set — the interaction
//! kernels store f32 and recover accuracy through compensated summation,
//! so no optional features are required and any Vulkan/Metal/DX12 adapter
//! (NVIDIA proprietary, NVK/nouveau, RADV, software) can serve.
//!
//! ## Adapter selection
//!
//! Set `RIPTIDE_GPU_ADAPTER` to control which GPUs back the logical
//! device set:
//!
//! | Value | Behavior |
//! |-------|----------|
//! | `auto` / *(unset)* | All adapters, discrete first, round-robin |
//! | `0`, `1`, … | Pin every context to the adapter at that index |
//! | substring | Case-insensitive name match (e.g. `"titan"`, `"4070"`) |
//!
//! Use [`GpuContext::enumerate_adapters`] to list available GPUs.
//!
//! ## Module structure
//!
//! - `adapter` — adapter discovery and selection
//! - `buffers` — f32 buffer creation, upload, readback
//! - `dispatch` — bind groups, command encoding, 2-D dispatch

mod adapter;
mod buffers;
mod dispatch;

pub use adapter::AdapterInfo;
pub use buffers::mapped_bytes_to_f32;

use std::sync::Arc;

/// One logical GPU device: wgpu device + queue plus adapter identity.
///
/// Multiple contexts may share a physical adapter (each gets its own
/// device and queue); the orchestrator treats them as independent workers.
#[must_use]
pub struct GpuContext {
    pub adapter_name: String,
    /// `SHADER_F64` support, probed and reported; the kernels do not use it.
    pub has_f64: bool,
    pub device_type: wgpu::DeviceType,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

// ── Core accessors ───────────────────────────────────────────────────

impl GpuContext {
    /// Access the underlying wgpu Device.
    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Access the underlying wgpu Queue.
    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

// ── Constructors ─────────────────────────────────────────────────────

impl GpuContext {
    /// Open the logical device at `ordinal` (see [`adapter::select_adapter`]).
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::RiptideError`] if no adapter is found or
    /// device creation fails.
    pub async fn nth(ordinal: usize) -> Result<Self, crate::error::RiptideError> {
        let selected = adapter::select_adapter(ordinal)?;
        let info = selected.get_info();
        let has_f64 = selected.features().contains(wgpu::Features::SHADER_F64);

        let (device, queue) = selected
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("riptide compute device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(|e| crate::error::RiptideError::DeviceCreation(e.to_string()))?;

        Ok(Self {
            adapter_name: info.name,
            has_f64,
            device_type: info.device_type,
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    /// Enumerate all available GPU adapters.
    #[must_use]
    pub fn enumerate_adapters() -> Vec<AdapterInfo> {
        adapter::enumerate_adapters()
    }

    /// Print all available adapters to stdout.
    pub fn print_available_adapters() {
        let adapters = Self::enumerate_adapters();
        println!("  Available GPU adapters:");
        for info in &adapters {
            println!("    {info}");
        }
        if adapters.is_empty() {
            println!("    (none found)");
        }
    }
}

// ── Pipeline creation ────────────────────────────────────────────────

impl GpuContext {
    /// Compile a WGSL compute shader into a pipeline (entry point `main`,
    /// bind group layout inferred from the shader).
    #[must_use]
    pub fn create_pipeline(&self, shader_source: &str, label: &str) -> wgpu::ComputePipeline {
        let shader_module = self
            .device()
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(shader_source.into()),
            });

        self.device()
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: None,
                module: &shader_module,
                entry_point: "main",
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
    }
}

#[cfg(test)]
mod tests {
    fn f32_buffer_size_bytes(count: usize) -> usize {
        count * 4
    }

    #[test]
    fn f32_buffer_size_calculation() {
        assert_eq!(f32_buffer_size_bytes(0), 0);
        assert_eq!(f32_buffer_size_bytes(256), 1024);
        // Five input arrays + three outputs for a padded 3D set of 4096.
        assert_eq!(f32_buffer_size_bytes(4096) * 8, 131_072);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn f32_byte_roundtrip() {
        let original = vec![
            0.0_f32,
            1.0,
            -1.0,
            std::f32::consts::PI,
            f32::INFINITY,
            f32::NEG_INFINITY,
            f32::NAN,
        ];
        let bytes: Vec<u8> = original.iter().flat_map(|v| v.to_le_bytes()).collect();
        let recovered = super::mapped_bytes_to_f32(&bytes);
        assert_eq!(original.len(), recovered.len());
        for i in 0..original.len() {
            if original[i].is_nan() {
                assert!(recovered[i].is_nan());
            } else {
                assert_eq!(original[i], recovered[i]);
            }
        }
    }
}

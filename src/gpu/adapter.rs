// SPDX-License-Identifier: AGPL-3.0-only

//! GPU adapter discovery and selection.
//!
//! Runtime capability probing — no hardcoded GPU assumptions. The adapter
//! set is selected by environment variable or auto-detected, and logical
//! contexts round-robin over it so a forced device count larger than the
//! physical adapter count still works (on a laptop that means every
//! "device" is the same GPU, which is exactly what partition testing needs).

/// Summary of a discovered GPU adapter.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    /// Enumeration index (stable within a single run).
    pub index: usize,
    /// Adapter name as reported by the driver.
    pub name: String,
    /// Vulkan driver name (e.g. `"NVIDIA"`, `"NVK"`, `"radv"`).
    pub driver: String,
    /// Whether `SHADER_F64` is supported (reported; kernels run f32).
    pub has_f64: bool,
    /// Adapter device type (discrete, integrated, software, etc.).
    pub device_type: wgpu::DeviceType,
}

impl std::fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let f64_tag = if self.has_f64 { "f64" } else { "f32" };
        let kind = match self.device_type {
            wgpu::DeviceType::DiscreteGpu => "discrete",
            wgpu::DeviceType::IntegratedGpu => "integrated",
            wgpu::DeviceType::VirtualGpu => "virtual",
            wgpu::DeviceType::Cpu => "cpu",
            wgpu::DeviceType::Other => "other",
        };
        write!(
            f,
            "[{}] {} ({}, {}, {})",
            self.index, self.name, self.driver, kind, f64_tag
        )
    }
}

/// Create a wgpu instance with the backend configured via `RIPTIDE_WGPU_BACKEND`.
pub fn create_instance() -> wgpu::Instance {
    let backends = match std::env::var("RIPTIDE_WGPU_BACKEND").as_deref() {
        Ok("vulkan") => wgpu::Backends::VULKAN,
        Ok("metal") => wgpu::Backends::METAL,
        Ok("dx12") => wgpu::Backends::DX12,
        _ => wgpu::Backends::all(),
    };
    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends,
        ..Default::default()
    })
}

/// Enumerate all available GPU adapters.
///
/// Returns a summary for each adapter including name, driver, and
/// `SHADER_F64` support. Use the `index` field with
/// `RIPTIDE_GPU_ADAPTER=<index>` to pin every context to a specific GPU.
#[must_use]
pub fn enumerate_adapters() -> Vec<AdapterInfo> {
    let instance = create_instance();
    instance
        .enumerate_adapters(wgpu::Backends::all())
        .into_iter()
        .enumerate()
        .map(|(i, adapter)| {
            let info = adapter.get_info();
            let features = adapter.features();
            AdapterInfo {
                index: i,
                name: info.name.clone(),
                driver: info.driver.clone(),
                has_f64: features.contains(wgpu::Features::SHADER_F64),
                device_type: info.device_type,
            }
        })
        .collect()
}

/// Select the adapter backing logical device `ordinal`.
///
/// `RIPTIDE_GPU_ADAPTER` narrows the candidate pool first: an index pins
/// one adapter, a case-insensitive name substring keeps matches, `auto` or
/// unset keeps everything (discrete adapters first). The ordinal then
/// round-robins over the pool.
///
/// # Errors
///
/// Returns [`crate::error::RiptideError`] if no adapter survives selection.
pub fn select_adapter(ordinal: usize) -> Result<wgpu::Adapter, crate::error::RiptideError> {
    let selector = std::env::var("RIPTIDE_GPU_ADAPTER")
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    let instance = create_instance();
    let adapters: Vec<wgpu::Adapter> = instance.enumerate_adapters(wgpu::Backends::all());
    if adapters.is_empty() {
        return Err(crate::error::RiptideError::NoAdapter);
    }

    let pool: Vec<wgpu::Adapter> = if selector.is_empty() || selector == "auto" {
        discrete_first(adapters)
    } else if let Ok(idx) = selector.parse::<usize>() {
        let n = adapters.len();
        adapters.into_iter().nth(idx).map(|a| vec![a]).ok_or_else(|| {
            crate::error::RiptideError::DeviceCreation(format!(
                "Adapter index {idx} out of range ({n} available)"
            ))
        })?
    } else {
        let matched: Vec<wgpu::Adapter> = adapters
            .into_iter()
            .filter(|a| a.get_info().name.to_ascii_lowercase().contains(&selector))
            .collect();
        if matched.is_empty() {
            return Err(crate::error::RiptideError::DeviceCreation(format!(
                "No adapter matching '{selector}'"
            )));
        }
        matched
    };

    let idx = ordinal % pool.len();
    pool.into_iter()
        .nth(idx)
        .ok_or(crate::error::RiptideError::NoAdapter)
}

fn discrete_first(adapters: Vec<wgpu::Adapter>) -> Vec<wgpu::Adapter> {
    let (discrete, rest): (Vec<_>, Vec<_>) = adapters
        .into_iter()
        .partition(|a| a.get_info().device_type == wgpu::DeviceType::DiscreteGpu);
    discrete.into_iter().chain(rest).collect()
}

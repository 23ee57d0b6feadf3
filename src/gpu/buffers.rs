// SPDX-License-Identifier: AGPL-3.0-only

//! GPU buffer creation, upload, and readback for f32 particle data.

use super::GpuContext;

impl GpuContext {
    /// Create a storage buffer from f32 data.
    ///
    /// Includes `COPY_DST` so the position replicas can be refreshed in
    /// place when peers broadcast updated slices between steps.
    #[must_use]
    pub fn create_f32_buffer(&self, data: &[f32], label: &str) -> wgpu::Buffer {
        use wgpu::util::DeviceExt;
        self.device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
            })
    }

    /// Create a writable storage buffer for f32 output.
    #[must_use]
    pub fn create_f32_output_buffer(&self, count: usize, label: &str) -> wgpu::Buffer {
        self.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: (count * 4) as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Create a staging buffer for reading results back to CPU.
    #[must_use]
    pub fn create_staging_buffer(&self, size: usize, label: &str) -> wgpu::Buffer {
        self.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: size as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Create a uniform buffer from raw bytes.
    #[must_use]
    pub fn create_uniform_buffer(&self, data: &[u8], label: &str) -> wgpu::Buffer {
        use wgpu::util::DeviceExt;
        self.device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: data,
                usage: wgpu::BufferUsages::UNIFORM,
            })
    }

    /// Upload f32 data starting at element `offset` — the peer-slice
    /// broadcast path writes each device's updated positions into the
    /// other replicas at the slice's own offset.
    pub fn upload_f32_at(&self, buffer: &wgpu::Buffer, offset: usize, data: &[f32]) {
        self.queue()
            .write_buffer(buffer, (offset * 4) as u64, bytemuck::cast_slice(data));
    }

    /// Read f32 data from a staging buffer after submit.
    ///
    /// Call this after [`super::GpuContext::submit_encoder`] when the
    /// encoder included a `copy_buffer_to_buffer` into the staging buffer.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::RiptideError::Readback`] if the GPU map
    /// callback fails or the channel is dropped.
    pub fn read_staging_f32(
        &self,
        staging: &wgpu::Buffer,
    ) -> Result<Vec<f32>, crate::error::RiptideError> {
        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device().poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| {
                crate::error::RiptideError::Readback("map callback: channel recv failed".into())
            })?
            .map_err(|e| crate::error::RiptideError::Readback(format!("buffer mapping: {e}")))?;

        let data = slice.get_mapped_range();
        let result = mapped_bytes_to_f32(&data);
        drop(data);
        staging.unmap();
        Ok(result)
    }
}

/// Convert mapped GPU buffer bytes to f32 values.
///
/// GPU mapped buffers are typically page-aligned, so `bytemuck::try_cast_slice`
/// will succeed. Falls back to manual byte conversion if alignment is wrong.
pub fn mapped_bytes_to_f32(data: &[u8]) -> Vec<f32> {
    bytemuck::try_cast_slice(data).map_or_else(
        |_| {
            data.chunks_exact(4)
                .map(|chunk| {
                    let mut b = [0u8; 4];
                    b.copy_from_slice(chunk);
                    f32::from_le_bytes(b)
                })
                .collect()
        },
        <[f32]>::to_vec,
    )
}

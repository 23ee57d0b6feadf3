// SPDX-License-Identifier: AGPL-3.0-only

//! GPU dispatch and encoder management.
//!
//! Streaming dispatch pattern: pre-plan GPU work, submit as few command
//! buffers as possible, read back only at control points.
//!
//! ```text
//! begin_encoder()  → CommandEncoder
//!   ↕  encode clears / passes / staging copies
//! submit_encoder() → ONE GPU submission
//! read_staging_f32() → read back results
//! ```
//!
//! The interaction kernels use a true 2-D grid — x spans target workgroups,
//! y spans source chunks — so there is no linearized split here; both axes
//! must stay within the 65 535 per-dimension dispatch limit, which holds
//! for any particle count the storage limits admit.

use super::GpuContext;

impl GpuContext {
    /// Create a bind group from a pipeline and ordered buffer slice.
    ///
    /// Each buffer is bound at binding index 0, 1, 2, ... in order.
    pub fn create_bind_group(
        &self,
        pipeline: &wgpu::ComputePipeline,
        buffers: &[&wgpu::Buffer],
    ) -> wgpu::BindGroup {
        let layout = pipeline.get_bind_group_layout(0);
        let entries: Vec<wgpu::BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(i, buf): (usize, &&wgpu::Buffer)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: buf.as_entire_binding(),
            })
            .collect();
        self.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("bind_group"),
            layout: &layout,
            entries: &entries,
        })
    }

    /// Begin a command encoder for streaming multiple dispatches.
    #[must_use]
    pub fn begin_encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    /// Submit a finished encoder to the GPU queue (single submission).
    pub fn submit_encoder(&self, encoder: wgpu::CommandEncoder) {
        self.queue().submit(std::iter::once(encoder.finish()));
    }

    /// Encode a 2-D compute pass: x = target workgroups, y = source chunks.
    pub fn encode_pass_2d(
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::ComputePipeline,
        bind_group: &wgpu::BindGroup,
        workgroups_x: u32,
        workgroups_y: u32,
    ) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("interaction_pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(workgroups_x, workgroups_y, 1);
    }

    /// Encode a 1-D compute pass (position update).
    pub fn encode_pass(
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::ComputePipeline,
        bind_group: &wgpu::BindGroup,
        workgroups: u32,
    ) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("update_pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(workgroups, 1, 1);
    }
}

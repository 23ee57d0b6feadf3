// SPDX-License-Identifier: AGPL-3.0-only

//! Multi-device evaluation and time stepping.
//!
//! Every logical device holds a full replica of the particle inputs and
//! owns one contiguous slab of targets. A single evaluation runs the
//! provision → stage → compute → retrieve sequence on one worker thread per
//! device (`std::thread::scope`, so workers borrow the set directly); the
//! stepping loop keeps device state resident, advances positions on-device,
//! and after every step reads each slab back and broadcasts it into the
//! peers' replicas. The scope join is the inter-step barrier: no device
//! starts step k+1 until all replicas hold the complete step-k positions.

use crate::error::RiptideError;
use crate::gpu::GpuContext;
use crate::particles::{padded_len, ParticleSet2, ParticleSet3};
use crate::shaders::{
    GRAV3_CHUNKS, GRAV3_WG_SIZE, SHADER_GRAV3, SHADER_GRAV3_KAHAN, SHADER_POS_UPDATE,
    SHADER_VORTEX2, SHADER_VORTEX2_KAHAN, VORTEX2_CHUNKS, VORTEX2_WG_SIZE,
};

/// Hard cap on cooperating logical devices.
pub const MAX_DEVICES: usize = 8;

/// Which summation the device kernels use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Accumulation {
    /// Plain running sum.
    Running,
    /// Kahan-compensated per-thread sums.
    Compensated,
}

/// Work split and dispatch geometry for one evaluation.
///
/// Targets pad to a multiple of `devices × wg_size` so every device gets an
/// equal slab of whole workgroups; the shared replica then pads further so
/// the source span divides evenly into `chunks` whole tiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Partition {
    pub devices: usize,
    /// Targets per device slab (multiple of `wg_size`).
    pub targ_per_device: usize,
    /// Replica length; also the padded source count.
    pub padded: usize,
    pub wg_size: usize,
    /// Source chunks along dispatch y.
    pub chunks: usize,
}

impl Partition {
    fn build(n: usize, devices: usize, wg_size: usize, desired_chunks: usize) -> Self {
        assert!(n > 0, "empty particle set");
        assert!(
            (1..=MAX_DEVICES).contains(&devices),
            "device count {devices} outside 1..={MAX_DEVICES}"
        );
        let targ_per_device = padded_len(n, devices * wg_size) / devices;
        let targ_tiles = targ_per_device * devices / wg_size;
        let chunks = desired_chunks.min(targ_tiles);
        let src_tiles = chunks * targ_tiles.div_ceil(chunks);
        Self {
            devices,
            targ_per_device,
            padded: src_tiles * wg_size,
            wg_size,
            chunks,
        }
    }

    #[must_use]
    pub fn grav3(n: usize, devices: usize) -> Self {
        Self::build(n, devices, GRAV3_WG_SIZE, GRAV3_CHUNKS)
    }

    #[must_use]
    pub fn vortex2(n: usize, devices: usize) -> Self {
        Self::build(n, devices, VORTEX2_WG_SIZE, VORTEX2_CHUNKS)
    }

    /// First target index of device `d` within the replica.
    #[must_use]
    pub fn offset(&self, d: usize) -> usize {
        d * self.targ_per_device
    }

    /// True (non-padding) targets in device `d`'s slab.
    #[must_use]
    pub fn true_targets(&self, d: usize, n: usize) -> usize {
        let start = self.offset(d);
        n.saturating_sub(start).min(self.targ_per_device)
    }

    #[must_use]
    pub fn workgroups_x(&self) -> u32 {
        (self.targ_per_device / self.wg_size) as u32
    }
}

/// A set of logical GPU devices evaluating cooperatively.
pub struct MultiGpu {
    devices: Vec<GpuContext>,
}

impl MultiGpu {
    /// Open `count` logical devices, round-robin over physical adapters.
    ///
    /// More logical devices than adapters is allowed: the partition logic
    /// is identical whether slabs land on different GPUs or share one.
    ///
    /// # Errors
    ///
    /// Returns [`RiptideError`] if no adapter exists or a device fails to
    /// open.
    pub async fn new(count: usize) -> Result<Self, RiptideError> {
        assert!(
            (1..=MAX_DEVICES).contains(&count),
            "device count {count} outside 1..={MAX_DEVICES}"
        );
        let mut devices = Vec::with_capacity(count);
        for i in 0..count {
            devices.push(GpuContext::nth(i).await?);
        }
        Ok(Self { devices })
    }

    #[must_use]
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub fn contexts(&self) -> &[GpuContext] {
        &self.devices
    }
}

// ── Single-shot evaluation ───────────────────────────────────────────

impl MultiGpu {
    /// Evaluate all pairwise 3D gravitational interactions into `set.u/v/w`.
    ///
    /// `set` must be padded to `Partition::grav3(set.n, devices).padded`.
    ///
    /// # Errors
    ///
    /// Returns [`RiptideError`] on readback failure or a panicked worker.
    pub fn eval_grav3(
        &self,
        set: &mut ParticleSet3<f32>,
        mode: Accumulation,
    ) -> Result<(), RiptideError> {
        let part = Partition::grav3(set.n, self.devices.len());
        assert_eq!(
            set.padded_len(),
            part.padded,
            "set padding must match the partition"
        );
        let shader = match mode {
            Accumulation::Running => SHADER_GRAV3,
            Accumulation::Compensated => SHADER_GRAV3_KAHAN,
        };

        let view = &*set;
        let results: Vec<Result<[Vec<f32>; 3], RiptideError>> = std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .devices
                .iter()
                .enumerate()
                .map(|(d, ctx)| {
                    scope.spawn(move || -> Result<[Vec<f32>; 3], RiptideError> {
                        let pipeline = ctx.create_pipeline(shader, "grav3");
                        let bx = ctx.create_f32_buffer(&view.x, "sx");
                        let by = ctx.create_f32_buffer(&view.y, "sy");
                        let bz = ctx.create_f32_buffer(&view.z, "sz");
                        let bs = ctx.create_f32_buffer(&view.s, "ss");
                        let br = ctx.create_f32_buffer(&view.r, "sr");
                        let per = part.targ_per_device;
                        let bu = ctx.create_f32_output_buffer(per, "tu");
                        let bv = ctx.create_f32_output_buffer(per, "tv");
                        let bw = ctx.create_f32_output_buffer(per, "tw");
                        let params: [u32; 4] = [
                            part.padded as u32,
                            part.offset(d) as u32,
                            part.chunks as u32,
                            0,
                        ];
                        let bp =
                            ctx.create_uniform_buffer(bytemuck::cast_slice(&params), "params");
                        let bind = ctx.create_bind_group(
                            &pipeline,
                            &[&bx, &by, &bz, &bs, &br, &bu, &bv, &bw, &bp],
                        );

                        let stage_u = ctx.create_staging_buffer(per * 4, "stage_u");
                        let stage_v = ctx.create_staging_buffer(per * 4, "stage_v");
                        let stage_w = ctx.create_staging_buffer(per * 4, "stage_w");

                        let mut encoder = ctx.begin_encoder("grav3");
                        encoder.clear_buffer(&bu, 0, None);
                        encoder.clear_buffer(&bv, 0, None);
                        encoder.clear_buffer(&bw, 0, None);
                        GpuContext::encode_pass_2d(
                            &mut encoder,
                            &pipeline,
                            &bind,
                            part.workgroups_x(),
                            part.chunks as u32,
                        );
                        let bytes = (per * 4) as u64;
                        encoder.copy_buffer_to_buffer(&bu, 0, &stage_u, 0, bytes);
                        encoder.copy_buffer_to_buffer(&bv, 0, &stage_v, 0, bytes);
                        encoder.copy_buffer_to_buffer(&bw, 0, &stage_w, 0, bytes);
                        ctx.submit_encoder(encoder);

                        Ok([
                            ctx.read_staging_f32(&stage_u)?,
                            ctx.read_staging_f32(&stage_v)?,
                            ctx.read_staging_f32(&stage_w)?,
                        ])
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .unwrap_or_else(|_| Err(RiptideError::Readback("worker panicked".into())))
                })
                .collect()
        });

        set.zero_outputs();
        for (d, result) in results.into_iter().enumerate() {
            let [ru, rv, rw] = result?;
            let start = part.offset(d);
            let take = part.true_targets(d, set.n);
            set.u[start..start + take].copy_from_slice(&ru[..take]);
            set.v[start..start + take].copy_from_slice(&rv[..take]);
            set.w[start..start + take].copy_from_slice(&rw[..take]);
        }
        Ok(())
    }

    /// Evaluate all pairwise 2D vortex interactions into `set.u/v`.
    ///
    /// `set` must be padded to `Partition::vortex2(set.n, devices).padded`.
    ///
    /// # Errors
    ///
    /// Returns [`RiptideError`] on readback failure or a panicked worker.
    pub fn eval_vortex2(
        &self,
        set: &mut ParticleSet2<f32>,
        mode: Accumulation,
    ) -> Result<(), RiptideError> {
        let part = Partition::vortex2(set.n, self.devices.len());
        assert_eq!(
            set.padded_len(),
            part.padded,
            "set padding must match the partition"
        );
        let shader = match mode {
            Accumulation::Running => SHADER_VORTEX2,
            Accumulation::Compensated => SHADER_VORTEX2_KAHAN,
        };

        let view = &*set;
        let results: Vec<Result<[Vec<f32>; 2], RiptideError>> = std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .devices
                .iter()
                .enumerate()
                .map(|(d, ctx)| {
                    scope.spawn(move || -> Result<[Vec<f32>; 2], RiptideError> {
                        let pipeline = ctx.create_pipeline(shader, "vortex2");
                        let bx = ctx.create_f32_buffer(&view.x, "sx");
                        let by = ctx.create_f32_buffer(&view.y, "sy");
                        let bs = ctx.create_f32_buffer(&view.s, "ss");
                        let br = ctx.create_f32_buffer(&view.r, "sr");
                        let per = part.targ_per_device;
                        let bu = ctx.create_f32_output_buffer(per, "tu");
                        let bv = ctx.create_f32_output_buffer(per, "tv");
                        let params: [u32; 4] = [
                            part.padded as u32,
                            part.offset(d) as u32,
                            part.chunks as u32,
                            0,
                        ];
                        let bp =
                            ctx.create_uniform_buffer(bytemuck::cast_slice(&params), "params");
                        let bind = ctx
                            .create_bind_group(&pipeline, &[&bx, &by, &bs, &br, &bu, &bv, &bp]);

                        let stage_u = ctx.create_staging_buffer(per * 4, "stage_u");
                        let stage_v = ctx.create_staging_buffer(per * 4, "stage_v");

                        let mut encoder = ctx.begin_encoder("vortex2");
                        encoder.clear_buffer(&bu, 0, None);
                        encoder.clear_buffer(&bv, 0, None);
                        GpuContext::encode_pass_2d(
                            &mut encoder,
                            &pipeline,
                            &bind,
                            part.workgroups_x(),
                            part.chunks as u32,
                        );
                        let bytes = (per * 4) as u64;
                        encoder.copy_buffer_to_buffer(&bu, 0, &stage_u, 0, bytes);
                        encoder.copy_buffer_to_buffer(&bv, 0, &stage_v, 0, bytes);
                        ctx.submit_encoder(encoder);

                        Ok([
                            ctx.read_staging_f32(&stage_u)?,
                            ctx.read_staging_f32(&stage_v)?,
                        ])
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .unwrap_or_else(|_| Err(RiptideError::Readback("worker panicked".into())))
                })
                .collect()
        });

        set.zero_outputs();
        for (d, result) in results.into_iter().enumerate() {
            let [ru, rv] = result?;
            let start = part.offset(d);
            let take = part.true_targets(d, set.n);
            set.u[start..start + take].copy_from_slice(&ru[..take]);
            set.v[start..start + take].copy_from_slice(&rv[..take]);
        }
        Ok(())
    }
}

// ── Time stepping ────────────────────────────────────────────────────

/// Resident device state for the stepping loop.
struct StepState {
    eval_pipeline: wgpu::ComputePipeline,
    update_pipeline: wgpu::ComputePipeline,
    bx: wgpu::Buffer,
    by: wgpu::Buffer,
    bz: wgpu::Buffer,
    bu: wgpu::Buffer,
    bv: wgpu::Buffer,
    bw: wgpu::Buffer,
    eval_bind: wgpu::BindGroup,
    update_bind: wgpu::BindGroup,
    stage_x: wgpu::Buffer,
    stage_y: wgpu::Buffer,
    stage_z: wgpu::Buffer,
    stage_u: wgpu::Buffer,
    stage_v: wgpu::Buffer,
    stage_w: wgpu::Buffer,
    offset: usize,
}

/// One device's per-step products: updated position slab, and on the final
/// step the slab velocities.
type StepSlabs = ([Vec<f32>; 3], Option<[Vec<f32>; 3]>);

impl MultiGpu {
    /// Run `steps` evaluate-then-advance iterations on-device.
    ///
    /// On return `set` holds the final positions and the last step's
    /// velocities, matching the host loop's contract. Between steps every
    /// device's replica is refreshed with all peers' updated slabs before
    /// any device proceeds.
    ///
    /// # Errors
    ///
    /// Returns [`RiptideError`] on readback failure or a panicked worker.
    pub fn evolve_grav3(
        &self,
        set: &mut ParticleSet3<f32>,
        dt: f32,
        steps: usize,
        mode: Accumulation,
    ) -> Result<(), RiptideError> {
        if steps == 0 {
            return Ok(());
        }
        let part = Partition::grav3(set.n, self.devices.len());
        assert_eq!(
            set.padded_len(),
            part.padded,
            "set padding must match the partition"
        );
        let shader = match mode {
            Accumulation::Running => SHADER_GRAV3,
            Accumulation::Compensated => SHADER_GRAV3_KAHAN,
        };

        let states: Vec<StepState> = self
            .devices
            .iter()
            .enumerate()
            .map(|(d, ctx)| Self::provision_step_state(ctx, set, &part, d, dt, shader))
            .collect();

        for step in 0..steps {
            let last = step + 1 == steps;
            let results: Vec<Result<StepSlabs, RiptideError>> = std::thread::scope(|scope| {
                let handles: Vec<_> = self
                    .devices
                    .iter()
                    .zip(states.iter())
                    .map(|(ctx, st)| {
                        scope.spawn(move || -> Result<StepSlabs, RiptideError> {
                            let per = part.targ_per_device;
                            let bytes = (per * 4) as u64;
                            let slab_off = (st.offset * 4) as u64;

                            let mut encoder = ctx.begin_encoder("step");
                            encoder.clear_buffer(&st.bu, 0, None);
                            encoder.clear_buffer(&st.bv, 0, None);
                            encoder.clear_buffer(&st.bw, 0, None);
                            GpuContext::encode_pass_2d(
                                &mut encoder,
                                &st.eval_pipeline,
                                &st.eval_bind,
                                part.workgroups_x(),
                                part.chunks as u32,
                            );
                            GpuContext::encode_pass(
                                &mut encoder,
                                &st.update_pipeline,
                                &st.update_bind,
                                part.workgroups_x(),
                            );
                            encoder.copy_buffer_to_buffer(&st.bx, slab_off, &st.stage_x, 0, bytes);
                            encoder.copy_buffer_to_buffer(&st.by, slab_off, &st.stage_y, 0, bytes);
                            encoder.copy_buffer_to_buffer(&st.bz, slab_off, &st.stage_z, 0, bytes);
                            if last {
                                encoder.copy_buffer_to_buffer(&st.bu, 0, &st.stage_u, 0, bytes);
                                encoder.copy_buffer_to_buffer(&st.bv, 0, &st.stage_v, 0, bytes);
                                encoder.copy_buffer_to_buffer(&st.bw, 0, &st.stage_w, 0, bytes);
                            }
                            ctx.submit_encoder(encoder);

                            let pos = [
                                ctx.read_staging_f32(&st.stage_x)?,
                                ctx.read_staging_f32(&st.stage_y)?,
                                ctx.read_staging_f32(&st.stage_z)?,
                            ];
                            let vel = if last {
                                Some([
                                    ctx.read_staging_f32(&st.stage_u)?,
                                    ctx.read_staging_f32(&st.stage_v)?,
                                    ctx.read_staging_f32(&st.stage_w)?,
                                ])
                            } else {
                                None
                            };
                            Ok((pos, vel))
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| {
                        h.join().unwrap_or_else(|_| {
                            Err(RiptideError::Readback("worker panicked".into()))
                        })
                    })
                    .collect()
            });
            // Scope join above is the step barrier; broadcast below completes
            // the replica refresh before any step-k+1 submission.

            for (d, result) in results.into_iter().enumerate() {
                let ([px, py, pz], vel) = result?;
                let start = part.offset(d);
                let take = part.true_targets(d, set.n);
                set.x[start..start + take].copy_from_slice(&px[..take]);
                set.y[start..start + take].copy_from_slice(&py[..take]);
                set.z[start..start + take].copy_from_slice(&pz[..take]);
                for (p, (ctx, st)) in self.devices.iter().zip(states.iter()).enumerate() {
                    if p == d {
                        continue;
                    }
                    ctx.upload_f32_at(&st.bx, start, &px[..take]);
                    ctx.upload_f32_at(&st.by, start, &py[..take]);
                    ctx.upload_f32_at(&st.bz, start, &pz[..take]);
                }
                if let Some([vu, vv, vw]) = vel {
                    set.u[start..start + take].copy_from_slice(&vu[..take]);
                    set.v[start..start + take].copy_from_slice(&vv[..take]);
                    set.w[start..start + take].copy_from_slice(&vw[..take]);
                }
            }
        }
        Ok(())
    }

    fn provision_step_state(
        ctx: &GpuContext,
        set: &ParticleSet3<f32>,
        part: &Partition,
        d: usize,
        dt: f32,
        shader: &str,
    ) -> StepState {
        let eval_pipeline = ctx.create_pipeline(shader, "grav3");
        let update_pipeline = ctx.create_pipeline(SHADER_POS_UPDATE, "pos_update");

        let bx = ctx.create_f32_buffer(&set.x, "sx");
        let by = ctx.create_f32_buffer(&set.y, "sy");
        let bz = ctx.create_f32_buffer(&set.z, "sz");
        let bs = ctx.create_f32_buffer(&set.s, "ss");
        let br = ctx.create_f32_buffer(&set.r, "sr");
        let per = part.targ_per_device;
        let bu = ctx.create_f32_output_buffer(per, "tu");
        let bv = ctx.create_f32_output_buffer(per, "tv");
        let bw = ctx.create_f32_output_buffer(per, "tw");

        let offset = part.offset(d);
        let n_true = part.true_targets(d, set.n);

        let eval_params: [u32; 4] = [part.padded as u32, offset as u32, part.chunks as u32, 0];
        let bp_eval = ctx.create_uniform_buffer(bytemuck::cast_slice(&eval_params), "eval_params");
        let eval_bind =
            ctx.create_bind_group(&eval_pipeline, &[&bx, &by, &bz, &bs, &br, &bu, &bv, &bw, &bp_eval]);

        // dt travels as raw bits; the shader reads the same bytes as f32.
        let update_params: [u32; 4] = [n_true as u32, offset as u32, dt.to_bits(), 0];
        let bp_update =
            ctx.create_uniform_buffer(bytemuck::cast_slice(&update_params), "update_params");
        let update_bind =
            ctx.create_bind_group(&update_pipeline, &[&bx, &by, &bz, &bu, &bv, &bw, &bp_update]);

        StepState {
            eval_pipeline,
            update_pipeline,
            bx,
            by,
            bz,
            bu,
            bv,
            bw,
            eval_bind,
            update_bind,
            stage_x: ctx.create_staging_buffer(per * 4, "stage_x"),
            stage_y: ctx.create_staging_buffer(per * 4, "stage_y"),
            stage_z: ctx.create_staging_buffer(per * 4, "stage_z"),
            stage_u: ctx.create_staging_buffer(per * 4, "stage_u"),
            stage_v: ctx.create_staging_buffer(per * 4, "stage_v"),
            stage_w: ctx.create_staging_buffer(per * 4, "stage_w"),
            offset,
        }
    }
}

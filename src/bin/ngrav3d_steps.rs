// SPDX-License-Identifier: AGPL-3.0-only

//! Time-stepped 3D gravitational run: host loop vs on-device loop.
//!
//! Both loops start from the same generated set and alternate evaluate /
//! Euler-advance for the requested step count. The device loop keeps state
//! resident and broadcasts each slab's updated positions to all replicas
//! between steps. The host loop is O(steps · n²) on the CPU, so it and
//! the parity report run only under `-c`.
//!
//! Usage:
//!   ngrav3d_steps [-n=<count>] [-g=<devices>] [-s=<steps>] [-c] [-k]
//!     -n=<count>    particle count (default 400000)
//!     -g=<devices>  logical GPU count, 1..=8 (default 1)
//!     -s=<steps>    time steps, at least 1 (default 1)
//!     -c            compare: run the host loop and report parity
//!     -k            compensated (Kahan) summation on host and device

use std::time::Instant;

use riptide::accum::{KahanSum, RunningSum};
use riptide::cpu_reference;
use riptide::gpu::GpuContext;
use riptide::orchestrator::{Accumulation, MultiGpu, Partition, MAX_DEVICES};
use riptide::parity;
use riptide::particles::{ParticleSet3, DEFAULT_SEED};
use riptide::tolerances;

const DT: f32 = 1e-3;

#[derive(Debug, PartialEq, Eq)]
struct Config {
    n: usize,
    devices: usize,
    steps: usize,
    compare: bool,
    compensated: bool,
}

fn parse_args<I: Iterator<Item = String>>(args: I) -> Result<Config, String> {
    let mut cfg = Config {
        n: 400_000,
        devices: 1,
        steps: 1,
        compare: false,
        compensated: false,
    };
    for arg in args {
        if let Some(v) = arg.strip_prefix("-n=") {
            cfg.n = v.parse().map_err(|_| arg.clone())?;
        } else if let Some(v) = arg.strip_prefix("-g=") {
            cfg.devices = v.parse().map_err(|_| arg.clone())?;
        } else if let Some(v) = arg.strip_prefix("-s=") {
            cfg.steps = v.parse().map_err(|_| arg.clone())?;
        } else if arg == "-c" {
            cfg.compare = true;
        } else if arg == "-k" {
            cfg.compensated = true;
        } else {
            return Err(arg);
        }
    }
    if cfg.n == 0 {
        return Err("-n must be positive".into());
    }
    if cfg.steps == 0 {
        return Err("-s must be at least 1".into());
    }
    if !(1..=MAX_DEVICES).contains(&cfg.devices) {
        return Err(format!("-g must be in 1..={MAX_DEVICES}"));
    }
    Ok(cfg)
}

fn usage() -> ! {
    eprintln!("usage: ngrav3d_steps [-n=<count>] [-g=<devices>] [-s=<steps>] [-c] [-k]");
    std::process::exit(1);
}

fn fatal(msg: &str) -> ! {
    eprintln!("error: {msg}");
    std::process::exit(1);
}

fn main() {
    let cfg = parse_args(std::env::args().skip(1)).unwrap_or_else(|_| usage());
    let (n, devices, steps) = (cfg.n, cfg.devices, cfg.steps);

    println!("═══════════════════════════════════════════════════════════");
    println!("  ngrav3d_steps — time-stepped 3D all-pairs run");
    println!("═══════════════════════════════════════════════════════════");
    println!();

    let part = Partition::grav3(n, devices);
    println!("  Particles:   {n} (padded to {})", part.padded);
    println!("  Devices:     {devices} × {} targets", part.targ_per_device);
    println!("  Steps:       {steps} @ dt = {DT:e}");
    println!(
        "  Summation:   {}",
        if cfg.compensated { "compensated (Kahan)" } else { "running" }
    );
    println!();
    GpuContext::print_available_adapters();

    // Host loop (only on request: O(steps · n²) on the CPU)
    let mut host = ParticleSet3::<f32>::random(n, part.padded, DEFAULT_SEED);
    if cfg.compare {
        let t0 = Instant::now();
        if cfg.compensated {
            cpu_reference::evolve_grav3::<f32, KahanSum<f32>>(&mut host, DT, steps);
        } else {
            cpu_reference::evolve_grav3::<f32, RunningSum<f32>>(&mut host, DT, steps);
        }
        let t_host = t0.elapsed().as_secs_f64();
        println!(
            "  Host loop:    {:>8.3} s  ({:.3} s/step)",
            t_host,
            t_host / steps as f64
        );
    }

    // Device loop
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    let gpus = match rt.block_on(MultiGpu::new(devices)) {
        Ok(g) => g,
        Err(e) => fatal(&e.to_string()),
    };
    for (i, ctx) in gpus.contexts().iter().enumerate() {
        println!(
            "  Device {i}: {} (SHADER_F64={})",
            ctx.adapter_name, ctx.has_f64
        );
    }

    let mode = if cfg.compensated {
        Accumulation::Compensated
    } else {
        Accumulation::Running
    };
    let mut dev_set = ParticleSet3::<f32>::random(n, part.padded, DEFAULT_SEED);
    let t0 = Instant::now();
    if let Err(e) = gpus.evolve_grav3(&mut dev_set, DT, steps, mode) {
        fatal(&e.to_string());
    }
    let t_dev = t0.elapsed().as_secs_f64();
    println!(
        "  Device loop:  {t_dev:>8.3} s  ({:.3} s/step)",
        t_dev / steps as f64
    );
    println!(
        "    positions ( {:10.8} {:10.8} {:10.8} {:10.8} {:10.8} {:10.8} )",
        dev_set.x[0],
        dev_set.y[0],
        dev_set.z[0],
        dev_set.x[n - 1],
        dev_set.y[n - 1],
        dev_set.z[n - 1]
    );
    println!();

    // Parity (only meaningful when the host loop ran): positions after the
    // full run, velocities from the final step.
    if cfg.compare {
        let pos = parity::compare(
            [&host.x[..n], &host.y[..n], &host.z[..n]],
            [&dev_set.x[..n], &dev_set.y[..n], &dev_set.z[..n]],
            n,
        );
        let vel = parity::compare(
            [&host.u[..n], &host.v[..n], &host.w[..n]],
            [&dev_set.u[..n], &dev_set.v[..n], &dev_set.w[..n]],
            n,
        );
        println!("── Parity after {steps} steps (host loop vs device loop) ──");
        println!("  positions   RMS {:.3e}   max {:.3e}", pos.rms, pos.max);
        println!("  velocities  RMS {:.3e}   max {:.3e}", vel.rms, vel.max);
        if pos.rms <= tolerances::STEPPED_RMS
            && vel.within(tolerances::GPU_VS_CPU_RMS, tolerances::GPU_VS_CPU_MAX)
        {
            println!("  → PASS");
        } else {
            println!(
                "  → FAIL (bounds: pos rms {:.1e}, vel rms {:.1e})",
                tolerances::STEPPED_RMS,
                tolerances::GPU_VS_CPU_RMS
            );
            std::process::exit(1);
        }
    }
}

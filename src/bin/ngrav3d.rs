// SPDX-License-Identifier: AGPL-3.0-only

//! 3D gravitational all-pairs summation benchmark.
//!
//! Always runs the tiled device kernels across the requested logical device
//! count. The blocked host reference is O(n²) on the CPU — minutes at the
//! default size — so it and the parity report only run under `-c`.
//!
//! Usage:
//!   ngrav3d [-n=<count>] [-g=<devices>] [-c] [-k]
//!     -n=<count>    particle count (default 400000)
//!     -g=<devices>  logical GPU count, 1..=8 (default 1)
//!     -c            compare: run the host reference and report parity
//!     -k            compensated (Kahan) summation on host and device

use std::time::Instant;

use riptide::accum::{KahanSum, RunningSum};
use riptide::cpu_reference;
use riptide::gpu::GpuContext;
use riptide::orchestrator::{Accumulation, MultiGpu, Partition, MAX_DEVICES};
use riptide::parity;
use riptide::particles::{ParticleSet3, DEFAULT_SEED};
use riptide::tolerances;

#[derive(Debug, PartialEq, Eq)]
struct Config {
    n: usize,
    devices: usize,
    compare: bool,
    compensated: bool,
}

fn parse_args<I: Iterator<Item = String>>(args: I) -> Result<Config, String> {
    let mut cfg = Config {
        n: 400_000,
        devices: 1,
        compare: false,
        compensated: false,
    };
    for arg in args {
        if let Some(v) = arg.strip_prefix("-n=") {
            cfg.n = v.parse().map_err(|_| arg.clone())?;
        } else if let Some(v) = arg.strip_prefix("-g=") {
            cfg.devices = v.parse().map_err(|_| arg.clone())?;
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
    if !(1..=MAX_DEVICES).contains(&cfg.devices) {
        return Err(format!("-g must be in 1..={MAX_DEVICES}"));
    }
    Ok(cfg)
}

fn usage() -> ! {
    eprintln!("usage: ngrav3d [-n=<count>] [-g=<devices>] [-c] [-k]");
    std::process::exit(1);
}

fn fatal(msg: &str) -> ! {
    eprintln!("error: {msg}");
    std::process::exit(1);
}

/// Interaction work: 20 flops per pair plus 7 per target for normalization
/// and setup.
fn gflops(n: usize, seconds: f64) -> f64 {
    n as f64 * (7.0 + 20.0 * n as f64) * 1e-9 / seconds
}

fn main() {
    let cfg = parse_args(std::env::args().skip(1)).unwrap_or_else(|_| usage());
    let (n, devices) = (cfg.n, cfg.devices);

    println!("═══════════════════════════════════════════════════════════");
    println!("  ngrav3d — 3D gravitational all-pairs summation");
    println!("═══════════════════════════════════════════════════════════");
    println!();

    let part = Partition::grav3(n, devices);
    println!("  Particles:   {n} (padded to {})", part.padded);
    println!(
        "  Devices:     {devices} × {} targets ({} chunks of sources)",
        part.targ_per_device, part.chunks
    );
    println!(
        "  Summation:   {}",
        if cfg.compensated { "compensated (Kahan)" } else { "running" }
    );
    println!();
    GpuContext::print_available_adapters();

    // Host reference (only on request: O(n²) on the CPU)
    let mut host = ParticleSet3::<f32>::random(n, part.padded, DEFAULT_SEED);
    if cfg.compare {
        let t0 = Instant::now();
        if cfg.compensated {
            cpu_reference::eval_grav3::<f32, KahanSum<f32>>(&mut host);
        } else {
            cpu_reference::eval_grav3::<f32, RunningSum<f32>>(&mut host);
        }
        let t_host = t0.elapsed().as_secs_f64();
        println!(
            "  Host (blocked, rayon):  {:>8.3} s  {:>8.2} GFlop/s",
            t_host,
            gflops(n, t_host)
        );
        println!(
            "    results ( {:10.8} {:10.8} {:10.8} {:10.8} {:10.8} {:10.8} )",
            host.u[0],
            host.v[0],
            host.w[0],
            host.u[n - 1],
            host.v[n - 1],
            host.w[n - 1]
        );
    }

    // Device evaluation
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

    // Warmup covers pipeline compilation and first-touch allocation.
    if let Err(e) = gpus.eval_grav3(&mut dev_set, mode) {
        fatal(&e.to_string());
    }
    let t0 = Instant::now();
    if let Err(e) = gpus.eval_grav3(&mut dev_set, mode) {
        fatal(&e.to_string());
    }
    let t_dev = t0.elapsed().as_secs_f64();
    println!(
        "  Device ({devices} logical):     {t_dev:>8.3} s  {:>8.2} GFlop/s",
        gflops(n, t_dev)
    );
    println!(
        "    results ( {:10.8} {:10.8} {:10.8} {:10.8} {:10.8} {:10.8} )",
        dev_set.u[0],
        dev_set.v[0],
        dev_set.w[0],
        dev_set.u[n - 1],
        dev_set.v[n - 1],
        dev_set.w[n - 1]
    );
    println!();

    // Parity (only meaningful when the host pass ran)
    if cfg.compare {
        let report = parity::compare(
            [&host.u[..n], &host.v[..n], &host.w[..n]],
            [&dev_set.u[..n], &dev_set.v[..n], &dev_set.w[..n]],
            n,
        );
        println!("── Parity (host reference vs device) ─────────────────────");
        println!("  RMS error: {:.3e}   max error: {:.3e}", report.rms, report.max);
        if report.within(tolerances::GPU_VS_CPU_RMS, tolerances::GPU_VS_CPU_MAX) {
            println!("  → PASS");
        } else {
            println!(
                "  → FAIL (bounds: rms {:.1e}, max {:.1e})",
                tolerances::GPU_VS_CPU_RMS,
                tolerances::GPU_VS_CPU_MAX
            );
            std::process::exit(1);
        }
    }
}

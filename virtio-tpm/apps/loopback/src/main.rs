// Licensed under the Apache-2.0 license

//! virtio TPM loopback demo
//!
//! Probes the front-end driver against an in-memory virtio device, sends the
//! given commands through the chip adapter and prints the responses.

use anyhow::{Context, Result};
use clap::Parser;
use clap_num::maybe_hex;
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use virtio_tpm::driver::{probe, DriverConfig};
use virtio_tpm::testing::{build_response, FixedResponder, LoopbackDevice, SilentResponder};
use virtio_tpm::transport::TransportConfig;
use virtio_tpm_loopback_config::{parse_hex, BackendMode, LoopbackConfig};

/// TPM2_Startup(SU_CLEAR)
const DEFAULT_COMMAND: &str = "80010000000c000001440000";

#[derive(Parser)]
#[command(name = "vtpm-loopback")]
#[command(about = "Exercise the virtio TPM front-end against a loopback device")]
#[command(version)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Command bytes in hex; may be repeated
    #[arg(long = "command", value_name = "HEX")]
    commands: Vec<String>,

    /// Send each command this many times
    #[arg(long, default_value_t = 1)]
    count: u32,

    /// Override the backend mode (echo, fixed, silent)
    #[arg(long)]
    mode: Option<String>,

    /// Override the response tag used by the backend
    #[arg(long, value_parser = maybe_hex::<u32>)]
    tag: Option<u32>,

    /// Override the command deadline in milliseconds
    #[arg(long)]
    timeout_ms: Option<u32>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_mode(mode: &str) -> Result<BackendMode> {
    match mode {
        "echo" => Ok(BackendMode::Echo),
        "fixed" => Ok(BackendMode::Fixed),
        "silent" => Ok(BackendMode::Silent),
        other => anyhow::bail!("Unknown backend mode: {}", other),
    }
}

fn build_device(config: &LoopbackConfig) -> Result<LoopbackDevice> {
    let backend = &config.backend;
    let device = LoopbackDevice::new()
        .with_device_id(config.device.device_id)
        .with_vendor_id(config.device.vendor_id)
        .with_queue_size(config.device.queue_size)
        .with_response_delay(Duration::from_millis(backend.response_delay_ms));

    let tag = backend.response_tag;
    let device = match backend.mode {
        BackendMode::Echo => device.with_responder(move |command: &[u8]| -> Option<Vec<u8>> {
            Some(build_response(tag, command))
        }),
        BackendMode::Fixed => device.with_responder(FixedResponder::with_payload(
            tag,
            &backend.fixed_payload_bytes()?,
        )),
        BackendMode::Silent => device.with_responder(SilentResponder),
    };
    Ok(device)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::new()
        .with_level(level)
        .init()
        .context("Failed to initialise logger")?;

    let mut config = match &args.config {
        Some(path) => {
            println!("Loading configuration from: {:?}", path);
            LoopbackConfig::from_file(path)?
        }
        None => LoopbackConfig::load_default()?,
    };
    if let Some(mode) = &args.mode {
        config.backend.mode = parse_mode(mode)?;
    }
    if let Some(tag) = args.tag {
        config.backend.response_tag = tag;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.transport.timeout_ms = timeout_ms;
    }

    let commands = if args.commands.is_empty() {
        vec![DEFAULT_COMMAND.to_string()]
    } else {
        args.commands.clone()
    };
    let commands = commands
        .iter()
        .map(|hex| parse_hex(hex).with_context(|| format!("Invalid command: {}", hex)))
        .collect::<Result<Vec<_>>>()?;

    let device = Arc::new(build_device(&config)?);
    let driver_config = DriverConfig::new()
        .with_transport(
            TransportConfig::new()
                .with_timeout(config.transport.timeout_ms)
                .with_response_capacity(config.transport.response_capacity),
        )
        .with_tpm2_probe(config.transport.tpm2_probe);
    let driver = probe(device, driver_config).context("Failed to probe loopback device")?;

    println!("virtio TPM loopback");
    println!("===================");
    println!("TPM2 detected: {}", driver.chip().is_tpm2());

    let mut response = vec![0u8; config.transport.response_capacity];
    let mut failures = 0;
    for command in &commands {
        for round in 0..args.count {
            match driver.chip().transmit(command, &mut response) {
                Ok(len) => println!(
                    "[{}] {} bytes -> {} bytes: {}",
                    round,
                    command.len(),
                    len,
                    hex(&response[..len])
                ),
                Err(e) => {
                    failures += 1;
                    println!("[{}] {} bytes -> error: {}", round, command.len(), e);
                }
            }
        }
    }

    let report = driver.remove();
    println!(
        "Removed device: {} unconsumed, {} late regions reclaimed",
        report.unconsumed, report.late
    );

    if failures > 0 {
        anyhow::bail!("{} command(s) failed", failures);
    }
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

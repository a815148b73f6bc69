//! thermoscan: discovers Modbus RTU temperature sensors on every serial
//! port and samples them.
//!
//! Logs go to stderr; with `--emit-records` every record is written to
//! stdout in the configured format.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use thermoscan_common::{Format, LoggingConfig, Record, write_record};
use thermoscan_modbus::bus::{BusError, BusReport, run_bus_pass};
use thermoscan_modbus::config::{OutputConfig, ThermoscanConfig};
use thermoscan_modbus::registry::VariableRegistry;
use thermoscan_modbus::sampler::Sampler;
use thermoscan_modbus::scanner::{BusScanner, MAX_UNIT_ADDRESS};
use thermoscan_modbus::sim::SimulatedBus;
use thermoscan_modbus::transport::{RtuTransport, available_ports};
use tracing::{error, info, warn};

/// Discovers and samples Modbus RTU temperature sensors.
#[derive(Parser, Debug)]
#[command(name = "thermoscan")]
#[command(about = "Discovers and samples Modbus RTU temperature sensors")]
#[command(version)]
struct Args {
    /// Highest unit address to probe (default 16, capped at 247)
    max_address: Option<u16>,

    /// Path to configuration file (JSON5 format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Override the number of sampling iterations per device.
    #[arg(long)]
    iterations: Option<u32>,

    /// Scan only this port (repeatable). Default: every serial port found.
    #[arg(long = "port")]
    ports: Vec<String>,

    /// Write every record to stdout.
    #[arg(long)]
    emit_records: bool,

    /// Run against a simulated bus instead of serial hardware.
    #[arg(long)]
    simulate: bool,
}

impl Args {
    fn apply(&self, config: &mut ThermoscanConfig) {
        if let Some(max_address) = self.max_address {
            config.scan.max_address = max_address.min(u16::from(MAX_UNIT_ADDRESS)) as u8;
        }
        if let Some(iterations) = self.iterations {
            config.sampling.iterations = iterations;
        }
        if !self.ports.is_empty() {
            config.scan.ports = self.ports.clone();
        }
        if self.emit_records {
            config.output.emit_records = true;
        }
    }
}

/// Totals over every bus of the run.
#[derive(Debug, Default)]
struct RunSummary {
    buses: usize,
    devices: usize,
    records: usize,
    failed_devices: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => ThermoscanConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => ThermoscanConfig::default(),
    };
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    // Initialize logging
    let log_config = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
        format: config.logging.format,
    };
    thermoscan_common::init_tracing(&log_config)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    info!("Starting thermoscan");
    if let Some(path) = &args.config {
        info!("Loaded configuration from {:?}", path);
    }

    let registry = VariableRegistry::with_overrides(&config.variables)
        .context("Invalid variable table")?
        .shared();
    for name in &config.sampling.variables {
        registry
            .get(name)
            .with_context(|| format!("Cannot sample '{}'", name))?;
    }

    let scanner = BusScanner::new(registry, config.layout, config.scan.max_address);
    let sampler = Sampler::new(
        config.sampling.variables.clone(),
        config.sampling.iterations,
    );

    let summary = tokio::select! {
        summary = run(&config, args.simulate, &scanner, &sampler) => summary?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            return Ok(());
        }
    };

    info!(
        buses = summary.buses,
        devices = summary.devices,
        records = summary.records,
        failed_devices = summary.failed_devices,
        "thermoscan finished"
    );

    Ok(())
}

/// Run one pass over every bus, one bus after another.
///
/// Only configuration errors are returned; everything else is logged and
/// the next bus is tried.
async fn run(
    config: &ThermoscanConfig,
    simulate: bool,
    scanner: &BusScanner,
    sampler: &Sampler,
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();

    if simulate {
        info!("Using simulated bus");
        let bus = SimulatedBus::demo("sim0", config.layout, config.serial.response_timeout());
        let result = run_bus_pass(bus, scanner, sampler).await;
        finish_bus("sim0", result, &config.output, &mut summary)?;
        return Ok(summary);
    }

    let ports = if config.scan.ports.is_empty() {
        available_ports().unwrap_or_else(|e| {
            error!(error = %e, "Failed to enumerate serial ports");
            Vec::new()
        })
    } else {
        config.scan.ports.clone()
    };
    info!(ports = ?ports, "Found com ports");

    for port in &ports {
        let transport = match RtuTransport::open(port, &config.serial) {
            Ok(transport) => transport,
            Err(e) => {
                error!(port = %port, error = %e, "Failed to open port, skipping");
                continue;
            }
        };

        let result = run_bus_pass(transport, scanner, sampler).await;
        finish_bus(port, result, &config.output, &mut summary)?;
    }

    Ok(summary)
}

fn finish_bus(
    bus: &str,
    result: Result<BusReport, BusError>,
    output: &OutputConfig,
    summary: &mut RunSummary,
) -> Result<()> {
    let report = match result {
        Ok(report) => report,
        Err(e) if e.is_config() => {
            return Err(e).with_context(|| format!("Pass over {} aborted", bus));
        }
        Err(e) => {
            error!(bus = %bus, error = %e, "Bus pass failed");
            return Ok(());
        }
    };

    for run in &report.runs {
        info!(
            device = %run.device,
            started_at = %run.started_at.to_rfc3339(),
            elapsed_ms = run.elapsed.as_millis() as u64,
            records = run.records.len(),
            complete = run.is_complete(),
            "Device sampled"
        );
    }

    let records: Vec<&Record> = report.records().collect();
    let failed = report.failed_runs().count();

    info!(
        bus = %report.bus,
        units = ?report.devices.iter().map(|d| d.address()).collect::<Vec<_>>(),
        records = records.len(),
        failed_devices = failed,
        "Bus summary"
    );

    if output.emit_records {
        if let Err(e) = emit_records(&records, output.format) {
            warn!(bus = %bus, error = %e, "Failed to write records");
        }
    }

    summary.buses += 1;
    summary.devices += report.devices.len();
    summary.records += records.len();
    summary.failed_devices += failed;

    Ok(())
}

/// Write records to stdout. JSON records are newline-delimited.
fn emit_records(records: &[&Record], format: Format) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    for record in records {
        write_record(&mut out, record, format)?;
    }

    out.flush()?;
    Ok(())
}

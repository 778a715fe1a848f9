#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ldm_core::{DiskGroup, Ldm};
use serde::Serialize;
use std::path::PathBuf;

// ── CLI definition ──────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "ldmtool", about = "Inspect Windows dynamic disks and emit device-mapper tables")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan devices and show the assembled disk groups.
    Show {
        /// Member devices or image files.
        #[arg(required = true)]
        devices: Vec<PathBuf>,
        /// Output in JSON format.
        #[arg(long)]
        json: bool,
    },
    /// Print the device-mapper tables exposing a volume.
    Tables {
        /// Name of the volume within its disk group.
        volume: String,
        /// Member devices or image files.
        #[arg(required = true)]
        devices: Vec<PathBuf>,
    },
}

// ── Serializable outputs ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ShowOutput<'a> {
    disk_groups: &'a [DiskGroup],
}

// ── Main ────────────────────────────────────────────────────────────────────

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Show { devices, json } => show(&devices, json),
        Command::Tables { volume, devices } => tables(&volume, &devices),
    }
}

fn scan(devices: &[PathBuf]) -> Result<Ldm> {
    let mut ldm = Ldm::new();
    for device in devices {
        ldm.add(device)
            .with_context(|| format!("adding {}", device.display()))?;
    }
    Ok(ldm)
}

fn show(devices: &[PathBuf], json: bool) -> Result<()> {
    let ldm = scan(devices)?;

    if json {
        let output = ShowOutput {
            disk_groups: ldm.disk_groups(),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("serialize output")?
        );
        return Ok(());
    }

    for dg in ldm.disk_groups() {
        println!("Disk group: {} ({})", dg.name, dg.guid);
        println!("  committed sequence: {}", dg.sequence);
        for disk in &dg.disks {
            match &disk.device {
                Some(dev) => println!(
                    "  disk {}: {} at {} (data {}+{})",
                    disk.name, disk.guid, dev.path, dev.data_start, dev.data_size
                ),
                None => println!("  disk {}: {} [missing]", disk.name, disk.guid),
            }
        }
        for vol in &dg.volumes {
            println!(
                "  volume {}: {:?}, {} sectors, partition type {:#04x}{}",
                vol.name,
                vol.kind,
                vol.size,
                vol.part_type,
                vol.hint
                    .as_deref()
                    .map(|h| format!(", hint {h}"))
                    .unwrap_or_default()
            );
            for comp in vol.components.iter().filter_map(|&id| dg.component_by_id(id)) {
                println!(
                    "    component {}: {:?}, {} partition(s)",
                    comp.name,
                    comp.kind,
                    comp.partitions.len()
                );
                for part in comp.partitions.iter().filter_map(|&id| dg.partition_by_id(id)) {
                    println!(
                        "      partition {}: start {}, {} sectors, column {}",
                        part.name, part.start, part.size, part.index
                    );
                }
            }
        }
    }

    Ok(())
}

fn tables(volume: &str, devices: &[PathBuf]) -> Result<()> {
    let ldm = scan(devices)?;

    let (dg, vol) = ldm
        .disk_groups()
        .iter()
        .find_map(|dg| dg.volume_by_name(volume).map(|vol| (dg, vol)))
        .with_context(|| format!("no volume named {volume} in any scanned disk group"))?;

    let tables = ldm_dm::volume_tables(dg, vol)
        .with_context(|| format!("generating DM tables for {volume}"))?;

    for table in &tables {
        println!("{}", table.name);
        print!("{}", table.table);
    }

    Ok(())
}

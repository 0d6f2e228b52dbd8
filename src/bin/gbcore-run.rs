//! Headless runner: loads a cartridge image, runs it for a number of frames
//! and writes out the last picture and whatever state was asked for.

use std::{fs, path::PathBuf};

use anyhow::{anyhow, Context};
use clap::Parser;
use gbcore::{MachineBuilder, MachineConfig, MachineEvent, PowerOn, ReportState};
use tracing_subscriber::{fmt::time::UtcTime, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "gbcore-run")]
#[command(about = "Runs a Game Boy cartridge image headless", long_about = None)]
struct Args {
    /// Path to the cartridge image
    rom: PathBuf,

    /// Number of frames to run
    #[arg(short, long, default_value = "60")]
    frames: u64,

    /// JSON machine configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start from the post-boot register pattern instead of all zeroes
    #[arg(short = 'b', long)]
    post_boot: bool,

    /// Write the last frame as a binary PGM image
    #[arg(long)]
    pgm: Option<PathBuf>,

    /// Print the last frame as ASCII art
    #[arg(short, long)]
    ascii: bool,

    /// Dump a memory range, e.g. `C000:C0FF`
    #[arg(short, long)]
    dump: Option<String>,

    /// Disassemble this many instructions from the final PC
    #[arg(long)]
    disassemble: Option<usize>,

    /// Log the CPU state before every instruction
    #[arg(short, long)]
    trace: bool,
}

fn parse_range(range: &str) -> anyhow::Result<(u16, u16)> {
    let (start, end) = range
        .split_once(':')
        .ok_or_else(|| anyhow!("expected START:END, got {range}"))?;
    let start = u16::from_str_radix(start.trim_start_matches("0x"), 16)
        .with_context(|| format!("invalid start address {start}"))?;
    let end = u16::from_str_radix(end.trim_start_matches("0x"), 16)
        .with_context(|| format!("invalid end address {end}"))?;
    if end < start {
        return Err(anyhow!("range end {end:#06X} is before start {start:#06X}"));
    }
    Ok((start, end))
}

/// Filter used when `RUST_LOG` is not set. `--trace` turns on this binary's
/// per-instruction lines without the library's own trace output.
fn default_filter(trace: bool) -> &'static str {
    if trace {
        "gbcore_run=trace,info"
    } else {
        "info"
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter(args.trace))),
        )
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let mut config = match &args.config {
        Some(path) => MachineConfig::load(path)?,
        None => MachineConfig::default(),
    };
    if args.post_boot {
        config.power_on = PowerOn::PostBoot;
    }
    let range = args.dump.as_deref().map(parse_range).transpose()?;

    let image = fs::read(&args.rom)
        .with_context(|| format!("failed to read {}", args.rom.display()))?;
    let mut machine = MachineBuilder::new()
        .config(config)
        .rom(&image)
        .build()
        .with_context(|| format!("failed to load {}", args.rom.display()))?;

    if let Some(header) = machine.space.cartridge().and_then(|c| c.header.as_ref()) {
        tracing::info!("Cartridge: {}", header);
    }

    let mut completed = 0;
    while completed < args.frames {
        let done = if args.trace {
            let start = machine.frame_count();
            let budget = machine.cycles() + 2 * gbcore::clock::CYCLES_PER_FRAME as u64;
            while machine.frame_count() == start && machine.cycles() < budget {
                tracing::trace!("{}", machine.report_state());
                machine.step();
            }
            machine.frame_count() != start
        } else {
            machine.step_frame()
        };

        for event in machine.drain_events() {
            if let MachineEvent::IllegalInstruction(fault) = event {
                tracing::error!("{}", fault);
            }
        }

        if machine.cpu.locked().is_some() {
            tracing::warn!("CPU locked up after {} frames", completed);
            break;
        }
        if !done {
            tracing::warn!("No frame completed, is the LCD off?");
        }
        completed += 1;
    }

    tracing::info!(
        "Ran {} frames, {} cycles, {} illegal instructions",
        machine.frame_count(),
        machine.cycles(),
        machine.illegal_instruction_count()
    );
    println!("{}", machine.report_state());

    if let Some((start, end)) = range {
        print!("{}", machine.memory_dump(start, end));
    }

    if let Some(count) = args.disassemble {
        for entry in machine.disassemble(machine.pc(), count) {
            println!("{:04X}  {:<9} {}", entry.address, entry.data, entry.instruction);
        }
    }

    let frame = machine.take_frame();
    if args.ascii {
        print!("{}", frame.as_ascii());
    }
    if let Some(path) = &args.pgm {
        fs::write(path, frame.to_pgm())
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!("Wrote {}", path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_flag_enables_state_lines() {
        assert_eq!(default_filter(false), "info");

        let filter = EnvFilter::try_new(default_filter(true)).unwrap();
        assert_eq!(
            filter.max_level_hint(),
            Some(tracing_subscriber::filter::LevelFilter::TRACE)
        );
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("C000:C0FF").unwrap(), (0xC000, 0xC0FF));
        assert_eq!(parse_range("0x8000:0x9FFF").unwrap(), (0x8000, 0x9FFF));
        assert!(parse_range("C0FF:C000").is_err());
        assert!(parse_range("C000").is_err());
    }
}

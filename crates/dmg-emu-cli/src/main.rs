mod config;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};
use thiserror::Error;

use config::RunConfig;
use dmg_emu_core::cartridge::{CartKind, MBC2_RAM_SIZE, RAM_BANK_SIZE};
use dmg_emu_core::{EmuError, GameBoy};

#[derive(Parser, Debug)]
#[command(name = "dmg-emu", about = "Headless Game Boy runner")]
struct Args {
    /// Path to ROM file
    rom: PathBuf,

    /// Run configuration (TOML). Defaults to ~/.config/dmg-emu/run.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,

    /// Stop after this many machine cycles
    #[arg(long)]
    max_cycles: Option<u64>,

    /// Stop once the serial output contains this text
    #[arg(long)]
    until: Option<String>,

    /// Print serial output as it is produced
    #[arg(long)]
    echo_serial: bool,

    /// Load and store battery RAM in <rom>.sav
    #[arg(long)]
    save_ram: bool,

    /// Write the final console state as JSON
    #[arg(long)]
    state_out: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Emu(#[from] EmuError),
    #[error("failed to encode state: {0}")]
    State(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CliError + '_ {
    move |source| CliError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// A frame or cycle limit ended the run.
    LimitReached,
    MarkerSeen,
    MarkerMissing,
}

fn apply_args(cfg: &mut RunConfig, args: &Args) {
    if args.frames.is_some() {
        cfg.frames = args.frames;
    }
    if args.max_cycles.is_some() {
        cfg.max_cycles = args.max_cycles;
    }
    if args.until.is_some() {
        cfg.stop_on_serial = args.until.clone();
    }
    if args.state_out.is_some() {
        cfg.state_out = args.state_out.clone();
    }
    cfg.echo_serial |= args.echo_serial;
    cfg.save_ram |= args.save_ram;
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

/// Bank size for the battery file of this cartridge, or `None` when there is
/// nothing worth saving.
fn save_bank_size(gb: &GameBoy) -> Option<usize> {
    let mbc = gb.mmu.cartridge()?;
    let has_battery = gb.cartridge()?.header().has_battery;
    if !has_battery || mbc.ram_bank_count() == 0 {
        return None;
    }
    Some(if mbc.kind() == CartKind::Mbc2 {
        MBC2_RAM_SIZE
    } else {
        RAM_BANK_SIZE
    })
}

fn import_save(gb: &mut GameBoy, path: &Path) -> Result<(), CliError> {
    let Some(bank_size) = save_bank_size(gb) else {
        return Ok(());
    };
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(io_error(path)(e)),
    };
    let banks: Vec<Vec<u8>> = data.chunks(bank_size).map(<[u8]>::to_vec).collect();
    if let Some(mbc) = gb.mmu.cartridge_mut() {
        mbc.load_ram_banks(&banks);
    }
    info!("Loaded {} bytes of battery RAM from {}", data.len(), path.display());
    Ok(())
}

fn export_save(gb: &GameBoy, path: &Path) -> Result<(), CliError> {
    if save_bank_size(gb).is_none() {
        return Ok(());
    }
    let Some(mbc) = gb.mmu.cartridge() else {
        return Ok(());
    };
    let data = mbc.ram_banks().concat();
    std::fs::write(path, &data).map_err(io_error(path))?;
    info!("Saved {} bytes of battery RAM to {}", data.len(), path.display());
    Ok(())
}

fn run_frames(gb: &mut GameBoy, cfg: &RunConfig) -> Result<Outcome, CliError> {
    let marker = cfg.stop_on_serial.as_deref().map(str::as_bytes);
    let mut frames = 0u64;
    let mut echoed = 0usize;

    loop {
        gb.dispatch_until_buffer_flush()?;
        frames += 1;

        let output = gb.serial_output();
        if cfg.echo_serial && output.len() > echoed {
            let mut stdout = std::io::stdout().lock();
            // Losing echo output is not worth aborting the run.
            let _ = stdout.write_all(&output[echoed..]);
            let _ = stdout.flush();
            echoed = output.len();
        }
        if let Some(marker) = marker
            && contains(output, marker)
        {
            return Ok(Outcome::MarkerSeen);
        }

        let frames_done = cfg.frames.is_some_and(|max| frames >= max);
        let cycles_done = cfg
            .max_cycles
            .is_some_and(|max| gb.cpu.clock.total() >= max);
        if frames_done || cycles_done {
            return Ok(if marker.is_some() {
                Outcome::MarkerMissing
            } else {
                Outcome::LimitReached
            });
        }
    }
}

fn run(rom_path: &Path, cfg: &RunConfig) -> Result<Outcome, CliError> {
    let rom = std::fs::read(rom_path).map_err(io_error(rom_path))?;
    let mut gb = GameBoy::new();
    gb.load_rom(rom)?;

    let save_path = rom_path.with_extension("sav");
    if cfg.save_ram {
        import_save(&mut gb, &save_path)?;
    }

    let result = run_frames(&mut gb, cfg);

    if cfg.save_ram {
        export_save(&gb, &save_path)?;
    }
    if let Some(path) = &cfg.state_out {
        let json = serde_json::to_string_pretty(&gb.get_state())?;
        std::fs::write(path, json).map_err(io_error(path))?;
    }
    info!(
        "Stopped after {} cycles, PC={:04X}",
        gb.cpu.clock.total(),
        gb.cpu.regs.pc
    );
    result
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(config::default_run_config_path);
    if args.config.is_some() && !config_path.exists() {
        warn!("Config {} not found; using defaults", config_path.display());
    }
    let mut cfg = config::load_from_file(&config_path);
    apply_args(&mut cfg, &args);

    match run(&args.rom, &cfg) {
        Ok(Outcome::LimitReached | Outcome::MarkerSeen) => ExitCode::SUCCESS,
        Ok(Outcome::MarkerMissing) => {
            warn!("Serial marker never appeared");
            ExitCode::from(2)
        }
        Err(e) => {
            error!("{e}");
            ExitCode::from(1)
        }
    }
}

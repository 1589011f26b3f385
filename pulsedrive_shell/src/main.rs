//! # Pulsedrive Control Shell
//!
//! Interactive line-based shell over the pulse driver: sector moves, speed
//! moves, raw ENA/DIR level commands and a state dump. Ships with the
//! simulation GPIO backend only; real backends plug in through
//! `pulsedrive_driver::GpioBus`.
//!
//! # Usage
//!
//! ```bash
//! # Run against the simulation backend with defaults
//! pulsedrive_shell --simulate
//!
//! # Load a driver config file
//! pulsedrive_shell --simulate --config config/driver.toml
//!
//! # Verbose logging
//! pulsedrive_shell -s -v
//! ```

#![deny(warnings)]

use std::io::{BufRead, Write as _};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use pulsedrive_driver::{
    Driver, DriverConfig, Level, LineRole, SimGpioBus, TracingSink,
};
use tracing::{Level as LogLevel, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Pulsedrive - interactive control shell for ENA/DIR/PUL servo drivers
#[derive(Parser, Debug)]
#[command(name = "pulsedrive_shell")]
#[command(version)]
#[command(about = "Interactive control shell for the pulsedrive stepper driver")]
#[command(long_about = None)]
struct Args {
    /// Path to driver configuration file (TOML). Defaults apply when absent.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use the simulation GPIO backend (the only backend shipped).
    #[arg(short = 's', long)]
    simulate: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("shell failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_tracing(&args);

    info!("Pulsedrive shell v{} starting...", env!("CARGO_PKG_VERSION"));

    if !args.simulate {
        return Err("no hardware GPIO backend compiled in; run with --simulate".into());
    }

    let config = match &args.config {
        Some(path) => DriverConfig::load(path)?,
        None => {
            info!("no config file given, using defaults");
            DriverConfig::default()
        }
    };

    let mut driver = Driver::new(config, SimGpioBus::new(), Arc::new(TracingSink))?;
    let result = repl(&mut driver);
    // the driver is always stopped, whatever took the loop down
    if let Err(e) = driver.stop() {
        warn!("shutdown reported: {}", e);
    }
    info!("driver closed");
    result
}

const MENU: &str = "Choose mode:\n\
    d          -> sector (angle) move\n\
    s          -> speed move\n\
    ena 1|0|c  -> ENA HIGH / LOW / toggle\n\
    dir 1|0|c  -> DIR HIGH / LOW / toggle\n\
    state      -> line levels and timing\n\
    e          -> exit";

fn repl(driver: &mut Driver<SimGpioBus>) -> Result<(), Box<dyn std::error::Error>> {
    let stdin = std::io::stdin();
    loop {
        println!("{MENU}");
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(()); // EOF
        }
        let command = line.trim().to_lowercase();

        let outcome = match command.as_str() {
            "" => Ok(()),
            "e" | "exit" => return Ok(()),
            "d" => sector_move(driver, &stdin),
            "s" => speed_move(driver, &stdin),
            "state" => {
                println!("{}", serde_json::to_string_pretty(&driver.snapshot())?);
                Ok(())
            }
            "ena 1" => driver.set_level(LineRole::Enable, Some(Level::High)).map(drop),
            "ena 0" => driver.set_level(LineRole::Enable, Some(Level::Low)).map(drop),
            "ena c" => driver.set_level(LineRole::Enable, None).map(drop),
            "dir 1" => driver.set_level(LineRole::Direction, Some(Level::High)).map(drop),
            "dir 0" => driver.set_level(LineRole::Direction, Some(Level::Low)).map(drop),
            "dir c" => driver.set_level(LineRole::Direction, None).map(drop),
            other => {
                println!("unknown command {other:?}");
                Ok(())
            }
        };

        if let Err(e) = outcome {
            // per-call errors are local; the shell keeps running
            warn!("command failed: {}", e);
        }
    }
}

fn sector_move(
    driver: &mut Driver<SimGpioBus>,
    stdin: &std::io::Stdin,
) -> Result<(), pulsedrive_driver::CommandError> {
    let Some(sector) = prompt_number(stdin, "sector count (negative = CCW)") else {
        return Ok(());
    };
    let speed = prompt_number(stdin, "speed rpm (empty = max)");
    driver.rotate_by_sector(sector, speed)
}

fn speed_move(
    driver: &mut Driver<SimGpioBus>,
    stdin: &std::io::Stdin,
) -> Result<(), pulsedrive_driver::CommandError> {
    let Some(speed) = prompt_number(stdin, "speed rpm (negative = CCW)") else {
        return Ok(());
    };
    let Some(duration) = prompt_number(stdin, "duration seconds") else {
        return Ok(());
    };
    driver.rotate_by_speed(speed, duration)
}

fn prompt_number(stdin: &std::io::Stdin, label: &str) -> Option<f64> {
    print!("{label}: ");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    if stdin.lock().read_line(&mut line).ok()? == 0 {
        return None;
    }
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<f64>() {
        Ok(value) => Some(value),
        Err(_) => {
            println!("{trimmed:?} is not a number");
            None
        }
    }
}

fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        LogLevel::DEBUG
    } else {
        LogLevel::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

// SPDX-License-Identifier: GPL-2.0

//! Drives the `sprd_governor` attribute files against a simulated PM-system firmware.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::error;

use sprd_dfs::devfreq::{DevFreq, GovernorList};
use sprd_dfs::error::to_result;
use sprd_dfs::governor::{self, SceneGovernor, GOVERNOR_NAME};
use sprd_dfs::sim::SimFirmware;
use sprd_dfs::trace::TraceBuffer;
use sprd_dfs::{DfsConfig, DfsDriver, DfsResources};

const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Inspect and drive the DDR DFS governor
#[derive(Parser)]
#[command(name = "dfsctl")]
#[command(about = "Inspect and drive the DDR DFS scene governor", long_about = None)]
struct Cli {
    /// JSON device configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Print the recorded trace events before exiting
    #[arg(long)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read an attribute
    Show {
        /// Attribute name
        attr: String,
    },
    /// Write an attribute
    Store {
        /// Attribute name
        attr: String,
        /// Value words, joined with spaces
        #[arg(required = true)]
        value: Vec<String>,
    },
    /// List the attribute files
    List,
    /// Read `show <attr>` / `store <attr> <value...>` lines from stdin
    Run,
}

/// Runs one command line; returns false if it failed.
fn execute(df: &DevFreq, line: &str) -> bool {
    let mut words = line.split_whitespace();
    match (words.next(), words.next()) {
        (Some("show"), Some(attr)) => show(df, attr),
        (Some("store"), Some(attr)) => {
            let value = words.collect::<Vec<_>>().join(" ");
            store(df, attr, &value)
        }
        (None, _) => true,
        _ => {
            eprintln!("Unknown command: {line}");
            false
        }
    }
}

fn show(df: &DevFreq, attr: &str) -> bool {
    match df.sysfs_show(GOVERNOR_NAME, attr) {
        Ok(page) => {
            print!("{page}");
            true
        }
        Err(e) => {
            eprintln!("{attr}: {e} ({})", e.to_errno());
            false
        }
    }
}

fn store(df: &DevFreq, attr: &str, value: &str) -> bool {
    let page = format!("{value}\n");
    let res = df.sysfs_store(GOVERNOR_NAME, attr, &page).map(drop);
    let ret = to_result(res);
    if ret != 0 {
        eprintln!("{attr}: write failed ({ret})");
    }
    ret == 0
}

fn init_logger(level: simplelog::LevelFilter) {
    let mut lcfg = simplelog::ConfigBuilder::new();
    lcfg.set_time_level(simplelog::LevelFilter::Error)
        .set_location_level(simplelog::LevelFilter::Off)
        .set_target_level(simplelog::LevelFilter::Off)
        .set_thread_level(simplelog::LevelFilter::Off);
    if let Err(e) = simplelog::TermLogger::init(
        level,
        lcfg.build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    ) {
        eprintln!("Logger init failed: {e}");
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(
        cli.log_level
            .parse()
            .unwrap_or(simplelog::LevelFilter::Warn),
    );

    if let Commands::List = cli.command {
        for name in governor::attribute_names() {
            println!("{name}");
        }
        return ExitCode::SUCCESS;
    }

    let config = match &cli.config {
        Some(path) => match DfsConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => DfsConfig::default(),
    };

    let firmware = Arc::new(SimFirmware::default());
    let trace = Arc::new(TraceBuffer::new(1024));
    let driver = DfsDriver::new();
    let res = DfsResources::new(firmware).with_trace(trace.clone());
    let dfs = match driver.probe(&config, res) {
        Ok(dfs) => dfs,
        Err(e) => {
            error!("probe failed: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = dfs.wait_for_startup(STARTUP_TIMEOUT) {
        error!("dfs startup: {e}");
        return ExitCode::FAILURE;
    }

    let governors = GovernorList::new();
    let df = match governors
        .add_governor(Arc::new(SceneGovernor::new()))
        .and_then(|()| DevFreq::add_device(dfs, &governors, GOVERNOR_NAME))
    {
        Ok(df) => df,
        Err(e) => {
            error!("devfreq: {e}");
            return ExitCode::FAILURE;
        }
    };

    let ok = match &cli.command {
        Commands::Show { attr } => show(&df, attr),
        Commands::Store { attr, value } => store(&df, attr, &value.join(" ")),
        Commands::Run => {
            let mut ok = true;
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => ok &= execute(&df, &line),
                    Err(e) => {
                        eprintln!("stdin: {e}");
                        ok = false;
                        break;
                    }
                }
            }
            ok
        }
        Commands::List => true,
    };

    if cli.trace {
        for record in trace.drain() {
            println!("{} {:?}", record.at.format("%H:%M:%S%.3f"), record.event);
        }
    }

    if let Err(e) = df.remove_device() {
        error!("devfreq remove: {e}");
    }
    if let Err(e) = driver.remove() {
        error!("dfs remove: {e}");
    }

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

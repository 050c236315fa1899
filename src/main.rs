//! Inspection tool for hub update logs: dump them as JSON, follow live
//! appends, or replay them with their original pacing.

use clap::{Parser, Subcommand};
use liquidhub::wirelog::watch::LogWatcher;
use liquidhub::wirelog::{read_records, replay, Record};
use log::info;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tokio::signal;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "hublog", about = "Inspect and replay hub update logs")]
struct Cli {
    /// Logging level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every record of the log file as JSON lines and exit
    Dump {
        /// Path to the update log file
        file: PathBuf,
    },
    /// Follow the log file and print newly appended records
    Tail {
        /// Path to the update log file
        file: PathBuf,
        /// Prefix printed before every record, to tag the source
        #[arg(long)]
        label: Option<String>,
    },
    /// Follow the log file, reproducing the original record pacing
    Replay {
        /// Path to the update log file
        file: PathBuf,
        /// Prefix printed before every record, to tag the source
        #[arg(long)]
        label: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.parse().unwrap_or(log::LevelFilter::Info))
        .format_timestamp_secs()
        .init();

    match cli.command {
        Commands::Dump { file } => dump(&file),
        Commands::Tail { file, label } => {
            let (watcher, rx) = LogWatcher::start(file);
            stream(rx, label).await;
            watcher.join().await;
            Ok(())
        }
        Commands::Replay { file, label } => {
            let (watcher, rx) = LogWatcher::start(file);
            let paced = replay::spawn(rx);
            stream(paced, label).await;
            watcher.join().await;
            Ok(())
        }
    }
}

fn dump(path: &Path) -> anyhow::Result<()> {
    let file = File::open(path)?;
    let records = read_records(&mut BufReader::new(file))?;
    for record in records {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}

/// Print records from the stream until it closes or ctrl-c arrives.
async fn stream(mut rx: mpsc::UnboundedReceiver<Record>, label: Option<String>) {
    loop {
        tokio::select! {
            maybe = rx.recv() => {
                match maybe {
                    Some(record) => match serde_json::to_string(&record) {
                        Ok(json) => match &label {
                            Some(label) => println!("{label} {json}"),
                            None => println!("{json}"),
                        },
                        Err(err) => {
                            log::error!("unable to encode record: {err}");
                            return;
                        }
                    },
                    None => {
                        info!("Record stream closed");
                        return;
                    }
                }
            }
            _ = signal::ctrl_c() => {
                info!("Received shutdown signal");
                return;
            }
        }
    }
}

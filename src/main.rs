//! CLI Entry Point for chirp-anemometer
//!
//! Stands in for the sensor-network runner: events come in as newline-delimited JSON
//! (or are synthesised), flow through a single processing worker, and records go out
//! on stdout as newline-delimited JSON. Logs go to stderr.
//!
//! # Usage
//!
//! Replay captured events:
//! ```bash
//! chirp_anemometer replay captured.jsonl
//! cat captured.jsonl | chirp_anemometer replay -
//! ```
//!
//! Simulate devices:
//! ```bash
//! chirp_anemometer simulate --devices 4 --bursts 100 --seed 7
//! ```

use anyhow::{Context, Result};
use chirp_anemometer::device::DeviceId;
use chirp_anemometer::transport::synthetic::random_event;
use chirp_anemometer::transport::{ChirpEvent, JsonLinesSink};
use chirp_anemometer::{logging, worker, AnemometerConfig, BurstProcessor};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "chirp_anemometer")]
#[command(about = "Ultrasonic anemometer ToF and velocity processing", long_about = None)]
struct Cli {
    /// Configuration file (missing file means built-in defaults)
    #[arg(long, global = true, default_value = "config/anemometer.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process newline-delimited JSON events from a file or stdin
    Replay {
        /// Event file, or `-` for stdin
        #[arg(default_value = "-")]
        input: PathBuf,
    },

    /// Process synthetic bursts from simulated devices
    Simulate {
        /// Number of distinct devices
        #[arg(long, default_value = "4")]
        devices: usize,

        /// Bursts per device; primaries rotate through the four ports
        #[arg(long, default_value = "16")]
        bursts: u32,

        /// Random seed
        #[arg(long, default_value = "1")]
        seed: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AnemometerConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    logging::init_from_config(&config)?;

    let processor = Arc::new(BurstProcessor::new(&config)?);
    let (tx, rx) = worker::event_channel();
    let sink = JsonLinesSink::new(std::io::stdout());
    let worker = tokio::spawn(worker::run(Arc::clone(&processor), rx, sink));

    match cli.command {
        Commands::Replay { input } => replay(input, tx).await?,
        Commands::Simulate {
            devices,
            bursts,
            seed,
        } => simulate(devices, bursts, seed, tx).await?,
    }

    let stats = worker.await.context("worker task panicked")??;
    info!(?stats, "Done");
    Ok(())
}

async fn replay(input: PathBuf, tx: mpsc::Sender<ChirpEvent>) -> Result<()> {
    if input.as_os_str() == "-" {
        info!("Replaying events from stdin");
        feed_lines(tokio::io::stdin(), tx).await
    } else {
        info!(path = %input.display(), "Replaying events");
        let file = tokio::fs::File::open(&input)
            .await
            .with_context(|| format!("opening {}", input.display()))?;
        feed_lines(file, tx).await
    }
}

async fn feed_lines<R: AsyncRead + Unpin>(reader: R, tx: mpsc::Sender<ChirpEvent>) -> Result<()> {
    let mut lines = BufReader::new(reader).lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ChirpEvent>(&line) {
            Ok(event) => {
                if tx.send(event).await.is_err() {
                    warn!("Worker stopped, abandoning input");
                    break;
                }
            }
            Err(err) => warn!(line = line_no, error = %err, "Skipping unparsable event"),
        }
    }
    Ok(())
}

async fn simulate(devices: usize, bursts: u32, seed: u64, tx: mpsc::Sender<ChirpEvent>) -> Result<()> {
    info!(devices, bursts, seed, "Simulating devices");
    let mut rng = StdRng::seed_from_u64(seed);
    let ids: Vec<DeviceId> = (0..devices)
        .map(|n| DeviceId::from(format!("sim-{n:04}")))
        .collect();

    for seqno in 0..bursts {
        let primary = (seqno % 4) as u8;
        for id in &ids {
            let event = random_event(&mut rng, id, seqno, primary);
            if tx.send(event).await.is_err() {
                warn!("Worker stopped, ending simulation");
                return Ok(());
            }
        }
    }
    Ok(())
}

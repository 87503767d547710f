use anyhow::Context;
use clap::{Parser, Subcommand};
use generator::phantom::{create_phantom, PhantomConfig};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::SimulationConfig;
use workflow::runner::Runner;

mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Pulse-echo ultrasound RF simulator")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sweep a phantom and write frequency-domain RF data
    Simulate {
        /// Colon-format or YAML simulation config
        config: PathBuf,
        /// Worker threads; overrides the config
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Populate a uniform random phantom and save it
    CreatePhantom {
        /// Colon-format or YAML phantom config
        config: PathBuf,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

/// Sets `abort` on Ctrl+C so the sweep stops at the next frequency.
fn spawn_interrupt_listener(abort: Arc<AtomicBool>) -> anyhow::Result<()> {
    let runtime = TokioBuilder::new_current_thread()
        .enable_all()
        .build()
        .context("creating runtime for signal handling")?;
    thread::spawn(move || {
        runtime.block_on(async {
            match signal::ctrl_c().await {
                Ok(()) => {
                    warn!("interrupt received, stopping after the current frequency");
                    abort.store(true, Ordering::Relaxed);
                }
                Err(err) => warn!("cannot listen for Ctrl+C: {}", err),
            }
        });
    });
    Ok(())
}

fn simulate(config: PathBuf, workers: Option<usize>) -> anyhow::Result<()> {
    let mut config = SimulationConfig::load(&config)?;
    if let Some(workers) = workers {
        config.workers = workers;
    }

    let runner = Runner::new(config);
    spawn_interrupt_listener(runner.abort_handle())?;
    let result = runner.execute()?;

    let metrics = result.metrics;
    info!(
        "{} frequencies, {} scatterer samples, {} outside the buffer",
        metrics.frequencies, metrics.scatterers_sampled, metrics.outside_buffer
    );
    if metrics.outside_buffer > 0 {
        warn!(
            "{} scatterer samples fell outside the field buffer; widen the beam width",
            metrics.outside_buffer
        );
    }
    for (beamline, time) in result.echo_times.iter().enumerate() {
        if let Some(time) = time {
            info!("beamline {}: peak echo at {:.3} us", beamline, time * 1e6);
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Simulate { config, workers } => simulate(config, workers),
        Command::CreatePhantom { config, seed } => {
            let config = PhantomConfig::load(&config)?;
            create_phantom(&config, seed)?;
            Ok(())
        }
    }
}

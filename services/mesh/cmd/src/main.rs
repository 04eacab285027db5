//! linkmesh simulator binary.
//!
//! Builds an in-process mesh from a YAML topology, runs discovery from the
//! first node and routes a USER message from the first node to the last.

use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod logging;
mod sim;

use config::SimConfig;
use logging::MeshLogFormatter;
use sim::Simulation;

/// Multi-hop mesh simulator over in-memory serial links
#[derive(Parser, Debug)]
#[command(name = "linkmesh", version, about = "Multi-hop mesh simulator over in-memory serial links")]
struct Args {
    /// Configuration file path
    #[arg(long, default_value = "linkmesh.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Time between node polls, e.g. 10ms
    #[arg(long)]
    poll_interval: Option<humantime::Duration>,

    /// Payload sent from the first node to the last
    #[arg(long)]
    message: Option<String>,

    /// Seed for discovery identifiers
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn apply(&self, config: &mut SimConfig) {
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(interval) = self.poll_interval {
            config.poll_interval_ms = interval.as_millis() as u64;
        }
        if let Some(message) = &self.message {
            config.message = message.clone();
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut sim_config = SimConfig::load_from_file(&args.config)?;
    args.apply(&mut sim_config);
    sim_config.validate()?;

    let level = &sim_config.log_level;
    let env_filter = EnvFilter::new("warn")
        .add_directive(format!("linkmesh={}", level).parse()?)
        .add_directive(format!("mesh_wire={}", level).parse()?)
        .add_directive(format!("mesh_routing={}", level).parse()?)
        .add_directive(format!("mesh_node={}", level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .event_format(MeshLogFormatter::new("linkmesh"))
        .init();

    info!(
        component = "sim",
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "Starting linkmesh"
    );

    let mut simulation = Simulation::build(sim_config)?;
    let report = simulation.run().await?;

    match &report.delivered {
        Some(msg) => info!(
            component = "sim",
            src = %msg.header.src,
            dst = %msg.header.dst,
            ticks = report.discovery_ticks,
            "Message delivered"
        ),
        None => warn!(component = "sim", "Message was not delivered"),
    }

    Ok(())
}

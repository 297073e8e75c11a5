//! CLI entry point for the guardian risk engine.
//!
//! Reads a graph document (`{"nodes": [...], "edges": [...]}`) as JSON from
//! stdin and writes the requested analysis as JSON to stdout. Logs go to
//! stderr.

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use guardian_core::EngineConfig;
use guardian_graph::{DependencyGraph, GraphDocument};
use guardian_engine::scoring::{identify_hotspots, risk_level_distribution, DEFAULT_HOTSPOT_RADIUS};
use guardian_engine::RiskEngine;

#[derive(Parser)]
#[command(name = "guardian")]
#[command(about = "Cascade simulation and risk analysis for vendor dependency graphs")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file prefix (default: guardian).
    #[arg(short, long, default_value = "guardian", global = true)]
    config: String,
}

#[derive(Subcommand)]
enum Command {
    /// Run a seeded cascade simulation.
    Simulate {
        /// Initially compromised node IDs.
        #[arg(long, value_delimiter = ',', required = true)]
        initial: Vec<String>,
        /// RNG seed.
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Score every node and aggregate network risk.
    Risk {
        /// Also report risk-level distribution and hotspots.
        #[arg(long)]
        detailed: bool,
    },
    /// Simulate, then rank structural mitigations.
    Mitigate {
        #[arg(long, value_delimiter = ',', required = true)]
        initial: Vec<String>,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Simulation, risk and mitigations in one report.
    Assess {
        #[arg(long, value_delimiter = ',', required = true)]
        initial: Vec<String>,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Centrality, single points of failure and bridges.
    Structure,
    /// Graph statistics and fingerprint.
    Stats,
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = EngineConfig::load(&cli.config)?;
    let engine = RiskEngine::new().with_config(config);
    let graph = read_graph()?;

    let output = match cli.command {
        Command::Simulate { ref initial, seed } => {
            serde_json::to_value(engine.run_simulation(&graph, initial.as_slice(), seed)?)?
        }
        Command::Risk { detailed } => {
            let assessment = engine.calculate_comprehensive_risk(&graph)?;
            if detailed {
                serde_json::json!({
                    "distribution": risk_level_distribution(&assessment),
                    "hotspots": identify_hotspots(&graph, &assessment, DEFAULT_HOTSPOT_RADIUS)?,
                    "assessment": assessment,
                })
            } else {
                serde_json::to_value(assessment)?
            }
        }
        Command::Mitigate { ref initial, seed } => {
            let simulation = engine.run_simulation(&graph, initial.as_slice(), seed)?;
            serde_json::to_value(engine.generate_mitigations(&graph, &simulation)?)?
        }
        Command::Assess { ref initial, seed } => {
            serde_json::to_value(engine.assess(&graph, initial.as_slice(), seed)?)?
        }
        Command::Structure => serde_json::to_value(engine.analyze_structure(&graph))?,
        Command::Stats => serde_json::json!({
            "fingerprint": graph.fingerprint()?,
            "statistics": graph.statistics(),
        }),
    };

    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

fn read_graph() -> anyhow::Result<DependencyGraph> {
    let input = std::io::read_to_string(std::io::stdin())?;
    let document: GraphDocument = serde_json::from_str(&input)?;
    Ok(DependencyGraph::from_document(document)?)
}

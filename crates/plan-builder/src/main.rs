//! build-plan: generate contact and interference plans from a scenario.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use contact_plan::{io, node_order};
use plan_builder::{PlanBuilder, Scenario};

#[derive(Parser, Debug)]
#[command(
    name = "build-plan",
    about = "Generate contact/interference plans from orbit geometry and link budgets"
)]
struct Args {
    /// Scenario JSON file
    scenario: PathBuf,

    /// Contact plan output path
    #[arg(short, long)]
    output: PathBuf,

    /// Interference plan output path (requires track_interference in the
    /// scenario)
    #[arg(long)]
    interference_output: Option<PathBuf>,

    /// Also write the dense CSV variant to this path
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Sort rows by endpoints instead of by time
    #[arg(long)]
    node_order: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let scenario = Scenario::from_file(&args.scenario)
        .with_context(|| format!("loading scenario {:?}", args.scenario))?;
    let nodes = scenario.build_nodes()?;

    let mut builder = PlanBuilder::new(scenario.builder_config(), nodes)?;
    let mut result = builder.run()?;

    if args.node_order {
        result.contacts.sort_by(node_order);
        result.interference.sort_by(node_order);
    }

    io::write_contact_plan(&args.output, &result.contacts, &result.metadata)
        .with_context(|| format!("writing contact plan {:?}", args.output))?;

    if let Some(csv_path) = &args.csv {
        io::write_contact_plan_csv(csv_path, &result.contacts, &result.metadata)
            .with_context(|| format!("writing CSV contact plan {:?}", csv_path))?;
    }

    if let Some(interference_path) = &args.interference_output {
        io::write_interference_plan(interference_path, &result.interference, &result.metadata)
            .with_context(|| format!("writing interference plan {:?}", interference_path))?;
    }

    info!(
        "Done: {} contacts, {} interference entries over {} s",
        result.contacts.len(),
        result.interference.len(),
        result.metadata.sim_time_limit
    );
    Ok(())
}

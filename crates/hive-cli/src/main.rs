//! # hive-cli
//!
//! CLI tool for inspecting Hive graphs and checkpoints.

mod scenarios;

use std::collections::HashMap;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use hive_core::{CheckpointPolicy, CheckpointStore, InMemoryCheckpointStore, Outcome, Output, RunOptions, Runtime};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "hive")]
#[command(about = "Hive CLI - inspect compiled graphs and step through checkpoints", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the builtin demo scenarios
    Scenarios,

    /// Print a scenario's compiled graph structure
    Graph {
        /// Scenario name (see `hive scenarios`)
        scenario: String,
    },

    /// Run a scenario to completion or interruption, printing its event stream
    Run {
        /// Scenario name (see `hive scenarios`)
        scenario: String,

        /// Thread id to run under
        #[arg(short, long, default_value = "default")]
        thread: String,

        /// If the run interrupts, resume it immediately with this JSON payload
        #[arg(short, long)]
        resume_payload: Option<String>,
    },

    /// Run a scenario with every-step checkpointing and print its checkpoint history
    Checkpoints {
        /// Scenario name (see `hive scenarios`)
        scenario: String,

        /// Thread id to run under
        #[arg(short, long, default_value = "default")]
        thread: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scenarios => {
            for name in scenarios::SCENARIO_NAMES {
                println!("{name}");
            }
        }
        Commands::Graph { scenario } => print_graph(&scenario)?,
        Commands::Run { scenario, thread, resume_payload } => run_scenario(&scenario, &thread, resume_payload).await?,
        Commands::Checkpoints { scenario, thread } => print_checkpoints(&scenario, &thread).await?,
    }

    Ok(())
}

fn load_scenario(name: &str) -> anyhow::Result<scenarios::Scenario> {
    scenarios::build(name).ok_or_else(|| anyhow::anyhow!("unknown scenario '{name}'; try `hive scenarios`"))
}

fn print_graph(name: &str) -> anyhow::Result<()> {
    let scenario = load_scenario(name)?;
    let graph = &scenario.graph;
    println!("schema_version: {}", graph.schema_version);
    println!("graph_version:  {}", graph.graph_version);
    println!("start: {:?}", graph.start);
    println!("nodes:");
    let mut node_ids: Vec<_> = graph.nodes.keys().collect();
    node_ids.sort();
    for node_id in node_ids {
        let successors = graph.static_successors(node_id);
        println!("  {node_id} -> {successors:?}");
    }
    if !graph.join_edges.is_empty() {
        println!("join edges:");
        for join in &graph.join_edges {
            println!("  {:?} -> {} (id {})", join.parents, join.target, join.id);
        }
    }
    Ok(())
}

fn print_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Finished { output, checkpoint_id } => {
            println!("outcome: Finished (checkpoint: {checkpoint_id:?})");
            print_output(output);
        }
        Outcome::Interrupted { interrupt_id, payload, checkpoint_id } => {
            println!("outcome: Interrupted {{ interrupt_id: {interrupt_id}, checkpoint_id: {checkpoint_id} }}");
            println!("  payload: {payload}");
        }
        Outcome::OutOfSteps { max_steps, output, checkpoint_id } => {
            println!("outcome: OutOfSteps {{ max_steps: {max_steps}, checkpoint: {checkpoint_id:?} }}");
            print_output(output);
        }
        Outcome::Cancelled { output, checkpoint_id } => {
            println!("outcome: Cancelled (checkpoint: {checkpoint_id:?})");
            print_output(output);
        }
    }
}

fn print_output(output: &Output) {
    match output {
        Output::FullStore(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();
            for key in keys {
                println!("  {key} = {}", map[key]);
            }
        }
        Output::Channels(values) => {
            for value in values {
                println!("  {value}");
            }
        }
    }
}

async fn run_scenario(name: &str, thread: &str, resume_payload: Option<String>) -> anyhow::Result<()> {
    let scenario = load_scenario(name)?;
    let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let runtime = Runtime::new(Arc::new(scenario.registry), Arc::new(scenario.graph)).with_checkpoint_store(store);

    let options = RunOptions { checkpoint_policy: CheckpointPolicy::OnInterrupt, ..Default::default() };
    let input: HashMap<String, serde_json::Value> = HashMap::new();
    let result = runtime.run(thread.to_string(), input, options.clone(), CancellationToken::new()).await?;
    for event in &result.events {
        println!("{:?}", event.kind);
    }
    print_outcome(&result.outcome);

    if let (Outcome::Interrupted { interrupt_id, .. }, Some(payload)) = (&result.outcome, resume_payload) {
        let payload: serde_json::Value = serde_json::from_str(&payload)?;
        println!("\nresuming with payload {payload}...\n");
        let resumed = runtime
            .resume(thread.to_string(), interrupt_id.clone(), payload, options, CancellationToken::new())
            .await?;
        for event in &resumed.events {
            println!("{:?}", event.kind);
        }
        print_outcome(&resumed.outcome);
    }
    Ok(())
}

async fn print_checkpoints(name: &str, thread: &str) -> anyhow::Result<()> {
    let scenario = load_scenario(name)?;
    let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let runtime = Runtime::new(Arc::new(scenario.registry), Arc::new(scenario.graph)).with_checkpoint_store(store.clone());

    let options = RunOptions { checkpoint_policy: CheckpointPolicy::EveryStep, ..Default::default() };
    let input: HashMap<String, serde_json::Value> = HashMap::new();
    runtime.run(thread.to_string(), input, options, CancellationToken::new()).await?;

    let history = store.list_checkpoints(&thread.to_string(), usize::MAX).await?;
    if history.is_empty() {
        println!("no checkpoints saved for thread '{thread}'");
        return Ok(());
    }
    for checkpoint in &history {
        println!(
            "step {:>3}  id={}  frontier={}  interrupted={}",
            checkpoint.step_index,
            checkpoint.id,
            checkpoint.frontier.len(),
            checkpoint.interruption.is_some(),
        );
    }
    Ok(())
}

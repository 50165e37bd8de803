mod loader;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use trellis_coordinator::{
    CoordinatorStatus, Frame, Operation, OperationCoordinator, OperationError, OperationOutcome,
};
use trellis_core::{CoordinatorConfig, LayoutConfig, StyleConfig, parse_config};
use trellis_events::{Event, EventBus};
use trellis_graph::LayoutBridge;

use crate::loader::load_graph;

#[derive(Parser)]
#[command(name = "trellis")]
#[command(about = "Collapsible graph engine driver", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a graph, run operations through the coordinator and print the final frame
    Replay {
        /// Path to the graph description (JSON)
        #[arg(long)]
        graph: PathBuf,
        /// Operation to run, e.g. `collapse:pkg`, `search:parse`, `expand-all`.
        /// Repeatable; runs in order.
        #[arg(long = "op")]
        ops: Vec<String>,
        /// Layout configuration as inline JSON
        #[arg(long)]
        layout_config: Option<String>,
        /// Style configuration as inline JSON
        #[arg(long)]
        style: Option<String>,
        /// How long to wait for a render acknowledgement
        #[arg(long, default_value_t = 2_000)]
        ack_timeout_ms: u64,
        /// Never acknowledge frames; every layout pass waits out the timeout
        #[arg(long)]
        no_ack: bool,
    },
    /// Load a graph and check its structural invariants
    Audit {
        /// Path to the graph description (JSON)
        #[arg(long)]
        graph: PathBuf,
    },
}

#[derive(Serialize)]
struct ReplayReport {
    status: CoordinatorStatus,
    errors: Vec<OperationError>,
    frame: Option<Frame>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the JSON report.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Replay {
            graph,
            ops,
            layout_config,
            style,
            ack_timeout_ms,
            no_ack,
        } => {
            cmd_replay(
                &graph,
                &ops,
                layout_config.as_deref(),
                style.as_deref(),
                Duration::from_millis(ack_timeout_ms),
                !no_ack,
            )
            .await
        }
        Commands::Audit { graph } => cmd_audit(&graph),
    }
}

fn parse_operations(
    ops: &[String],
    layout_config: Option<&str>,
    style: Option<&str>,
) -> Result<Vec<Operation>> {
    let mut operations = Vec::new();
    if let Some(json) = layout_config {
        let config: LayoutConfig = parse_config(json).context("Invalid --layout-config")?;
        operations.push(Operation::UpdateLayoutConfig(config));
    }
    if let Some(json) = style {
        let style: StyleConfig = parse_config(json).context("Invalid --style")?;
        operations.push(Operation::UpdateStyle(style));
    }
    for raw in ops {
        let operation = raw
            .parse::<Operation>()
            .with_context(|| format!("Invalid --op '{raw}'"))?;
        operations.push(operation);
    }
    if operations.is_empty() {
        operations.push(Operation::Relayout);
    }
    Ok(operations)
}

async fn cmd_replay(
    graph: &Path,
    ops: &[String],
    layout_config: Option<&str>,
    style: Option<&str>,
    ack_timeout: Duration,
    acknowledge: bool,
) -> Result<()> {
    let operations = parse_operations(ops, layout_config, style)?;
    let model = load_graph(graph)?;

    let events = EventBus::new();
    let config = CoordinatorConfig::default().with_render_ack_timeout(ack_timeout);
    let coordinator =
        OperationCoordinator::new(model, LayoutBridge::default(), events.clone(), config)?;

    // Stand-in renderer: log every event and confirm frames as they arrive.
    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
    let renderer = {
        let coordinator = coordinator.clone();
        let subscription = events.subscribe();
        std::thread::spawn(move || {
            loop {
                crossbeam_channel::select! {
                    recv(subscription.receiver()) -> event => {
                        let Ok(event) = event else { break };
                        render_event(&coordinator, event, acknowledge);
                    }
                    recv(stop_rx) -> _ => break,
                }
            }
        })
    };

    for operation in operations {
        coordinator.enqueue(operation);
    }
    let outcomes = coordinator.run_until_idle().await;
    for (id, outcome) in &outcomes {
        match outcome {
            OperationOutcome::Completed { frame_id, .. } => {
                info!("{} completed with frame {:?}", id, frame_id)
            }
            OperationOutcome::Failed(error) => info!("{} failed: {}", id, error.message),
            other => info!("{} finished as {:?}", id, other),
        }
    }
    drop(stop_tx);
    if renderer.join().is_err() {
        warn!("Renderer thread panicked");
    }

    let report = ReplayReport {
        status: coordinator.status(),
        errors: coordinator.errors(),
        frame: coordinator.latest_frame().map(|f| Frame::clone(&f)),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn render_event(coordinator: &OperationCoordinator, event: Event, acknowledge: bool) {
    match event {
        Event::FrameReady {
            frame_id,
            awaiting_ack: true,
            ..
        } if acknowledge => {
            coordinator.acknowledge_render(frame_id);
        }
        Event::OperationFailed { label, message, .. } => warn!("{} failed: {}", label, message),
        Event::RenderAckTimedOut { frame_id } => warn!("Frame {} was never acknowledged", frame_id),
        other => debug!("{:?}", other),
    }
}

fn cmd_audit(graph: &Path) -> Result<()> {
    let model = load_graph(graph)?;
    let violations = model.audit();
    if violations.is_empty() {
        let stats = model.stats();
        println!(
            "OK: {} nodes, {} containers, {} edges ({} visible, {} aggregated)",
            stats.node_count,
            stats.container_count,
            stats.edge_count,
            stats.visible_node_count + stats.visible_container_count,
            stats.aggregated_edge_count
        );
        return Ok(());
    }
    for violation in &violations {
        println!("VIOLATION: {violation}");
    }
    bail!("{} invariant violations", violations.len())
}

//! Resmon Control Tool
//!
//! Terminal client subscribing to the resmon daemon's push channel.

mod chart;

use anyhow::Result;
use clap::{Parser, Subcommand};
use resmon_client::{
    ConnectionState, Metric, Subscriber, SubscriberHandle, TelemetrySnapshot, DEFAULT_CAPACITY,
    DEFAULT_URL,
};
use tokio::sync::{mpsc, watch};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use chart::Chart;

#[derive(Parser)]
#[command(name = "resmonctl")]
#[command(about = "Terminal client for the resmon daemon")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Push endpoint of the daemon
    #[arg(long, default_value = DEFAULT_URL, global = true)]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print one line per received snapshot
    Watch,
    /// Chart the rolling history of metrics
    Chart {
        /// Metric to chart (repeatable, e.g. cpuLoadTotal); all if omitted
        #[arg(short, long = "metric", value_name = "METRIC")]
        metrics: Vec<Metric>,

        /// Samples kept per metric
        #[arg(long, default_value_t = DEFAULT_CAPACITY)]
        capacity: usize,

        /// Chart width in columns
        #[arg(long, default_value_t = 50)]
        width: usize,

        /// Also print the value at this logical index (0 = oldest)
        #[arg(long)]
        inspect: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // The subscriber task only forwards; printing happens here.
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = Subscriber::connect(cli.url.clone(), move |snapshot| {
        let _ = tx.send(snapshot);
    });
    eprintln!("Subscribing to {}", cli.url);

    let result = match cli.command {
        Commands::Watch => handle_watch(rx, &handle).await,
        Commands::Chart {
            metrics,
            capacity,
            width,
            inspect,
        } => {
            let chart = Chart::new(metrics, capacity, width).inspect(inspect);
            handle_chart(rx, &handle, chart).await
        }
    };

    handle.dispose().await;
    result
}

/// Next thing the printing loop has to react to.
enum Event {
    Snapshot(TelemetrySnapshot),
    State(ConnectionState),
    Stop,
}

async fn next_event(
    rx: &mut mpsc::UnboundedReceiver<TelemetrySnapshot>,
    states: &mut watch::Receiver<ConnectionState>,
) -> Event {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => Event::Stop,
        snapshot = rx.recv() => match snapshot {
            Some(snapshot) => Event::Snapshot(snapshot),
            None => Event::Stop,
        },
        changed = states.changed() => match changed {
            Ok(()) => Event::State(*states.borrow_and_update()),
            Err(_) => Event::Stop,
        },
    }
}

fn describe(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Disconnected => "disconnected",
        ConnectionState::Connecting => "connecting",
        ConnectionState::Connected => "connected",
        ConnectionState::Reconnecting => "connection lost, reconnecting",
    }
}

fn format_line(snapshot: &TelemetrySnapshot) -> String {
    Metric::ALL
        .iter()
        .map(|m| format!("{} {:.1}{}", m.label(), m.value(snapshot), m.unit()))
        .collect::<Vec<_>>()
        .join("  ")
}

async fn handle_watch(
    mut rx: mpsc::UnboundedReceiver<TelemetrySnapshot>,
    handle: &SubscriberHandle,
) -> Result<()> {
    let mut states = handle.watch_state();
    loop {
        match next_event(&mut rx, &mut states).await {
            Event::Snapshot(snapshot) => println!("{}", format_line(&snapshot)),
            Event::State(state) => eprintln!("[{}]", describe(state)),
            Event::Stop => break,
        }
    }
    Ok(())
}

async fn handle_chart(
    mut rx: mpsc::UnboundedReceiver<TelemetrySnapshot>,
    handle: &SubscriberHandle,
    mut chart: Chart,
) -> Result<()> {
    let mut states = handle.watch_state();
    let mut status = describe(handle.state());
    loop {
        if chart.take_dirty() {
            // Clear screen and home the cursor before each redraw.
            println!("\x1b[2J\x1b[H{}[{}]", chart.render(), status);
        }
        match next_event(&mut rx, &mut states).await {
            Event::Snapshot(snapshot) => chart.record(&snapshot),
            Event::State(state) => {
                debug!("Connection state: {:?}", state);
                status = describe(state);
                println!("\x1b[2J\x1b[H{}[{}]", chart.render(), status);
            }
            Event::Stop => break,
        }
    }
    Ok(())
}

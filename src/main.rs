mod cmd;
mod config;
mod error;
mod extract;
mod pipeline;
mod progress;
mod render;
mod report;
mod resolve;
mod runtime;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chartpeel")]
#[command(about = "Report size and layer count for every image a Helm chart references")]
#[command(version)]
struct Cli {
    /// Override runtime selection (docker, podman)
    #[arg(long, global = true, env = "CHARTPEEL_RUNTIME")]
    runtime: Option<String>,

    /// Helm binary used to render charts
    #[arg(long, global = true, env = "CHARTPEEL_HELM")]
    helm: Option<String>,

    /// Number of images pulled and inspected at the same time
    #[arg(long, global = true, env = "CHARTPEEL_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Parse rendered manifests as YAML instead of scanning lines
    #[arg(long, global = true)]
    strict: bool,

    /// Resolve every occurrence of an image instead of each distinct image once
    #[arg(long, global = true)]
    keep_duplicates: bool,

    /// Output as JSON (optionally to a file)
    #[arg(long, global = true, num_args = 0..=1, default_missing_value = "-")]
    json: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,

    /// Chart directory (shorthand for `chartpeel scan <chart>`)
    chart: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a chart and report its images
    Scan {
        /// Local chart directory
        chart: String,
    },

    /// Serve the scan endpoint over HTTP
    Serve {
        /// Address to listen on
        #[arg(long, env = "CHARTPEEL_LISTEN")]
        listen: Option<String>,
    },

    /// Detect installed container runtimes and helm
    Probe,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Resolve: `chartpeel <chart>` is shorthand for `chartpeel scan <chart>`
    let chart_to_scan = match &cli.command {
        Some(Commands::Scan { chart }) => Some(chart.clone()),
        Some(_) => None,
        None => cli.chart.clone(),
    };

    if cli.command.is_none() && chart_to_scan.is_none() {
        Cli::parse_from(["chartpeel", "--help"]);
        return Ok(());
    }

    let serving = matches!(cli.command, Some(Commands::Serve { .. }));
    init_tracing(if serving { "info" } else { "warn" });

    let listen = match &cli.command {
        Some(Commands::Serve { listen }) => listen.clone(),
        _ => None,
    };
    let cfg = config::init_from_cli(config::Overrides {
        runtime: cli.runtime,
        helm: cli.helm,
        concurrency: cli.concurrency,
        strict: cli.strict,
        keep_duplicates: cli.keep_duplicates,
        listen,
    })?;

    if let Some(chart) = &chart_to_scan {
        cmd::scan::run(chart, cli.json.as_deref(), cfg).await?;
    } else if serving {
        cmd::serve::run(cfg).await?;
    } else if matches!(cli.command, Some(Commands::Probe)) {
        cmd::probe::run(cli.json.is_some(), cfg)?;
    }

    Ok(())
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

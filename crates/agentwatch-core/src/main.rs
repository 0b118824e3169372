//! AgentWatch CLI
//!
//! Command-line interface for the AgentWatch telemetry service.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::json;
use tracing::info;

use agentwatch::alerting::details;
use agentwatch::models::{AlertType, Severity, UsagePeriod};
use agentwatch::performance::TraceOptions;
use agentwatch::{Config, Telemetry};

/// AgentWatch - Telemetry and alerting for conversational agents
#[derive(Parser)]
#[command(name = "agentwatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "AGENTWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Root directory for all artifacts (overrides per-component directories)
    #[arg(long, global = true, env = "AGENTWATCH_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (for commands that support it)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the snapshot writers, alert monitor and analytics reports until Ctrl+C
    Serve,

    /// Drive synthetic requests through a fresh instance and print the results
    Simulate {
        /// Number of requests to simulate
        #[arg(long, default_value = "25")]
        requests: usize,

        /// Every n-th request fails (0 disables failures)
        #[arg(long, default_value = "5")]
        fail_every: usize,

        /// Latency of the simulated tool calls
        #[arg(long, default_value = "150ms", value_parser = humantime::parse_duration)]
        tool_latency: Duration,
    },

    /// Raise one alert and persist it
    Alert {
        /// Alert type (performance, error_rate, guardrail, usage, security, system)
        #[arg(long = "type")]
        alert_type: String,

        /// Severity (info, warning, error, critical)
        #[arg(long, default_value = "warning")]
        severity: String,

        /// Alert message
        message: String,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref(), cli.data_dir.as_deref(), cli.verbose) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = match agentwatch::logging::init(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error initializing logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Serve => run_serve(config).await,
        Commands::Simulate {
            requests,
            fail_every,
            tool_latency,
        } => run_simulate(config, requests, fail_every, tool_latency, cli.format).await,
        Commands::Alert {
            alert_type,
            severity,
            message,
        } => run_alert(config, &alert_type, &severity, message).await,
        Commands::Config => run_config(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(
    path: Option<&std::path::Path>,
    data_dir: Option<&std::path::Path>,
    verbose: bool,
) -> anyhow::Result<Config> {
    let mut config = Config::load(path).context("failed to load configuration")?;
    if let Some(root) = data_dir {
        config = config.with_root(root);
    }
    if verbose {
        config.logging.level = "debug".to_string();
    }
    Ok(config)
}

fn install_exporter(config: &Config) -> anyhow::Result<()> {
    let Some(listen) = &config.exporter.prometheus_listen else {
        return Ok(());
    };
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("invalid exporter address '{listen}'"))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install Prometheus exporter")?;
    info!(%addr, "Prometheus exporter listening");
    Ok(())
}

async fn run_serve(config: Config) -> anyhow::Result<()> {
    install_exporter(&config)?;

    let telemetry = Telemetry::new(config)?;
    telemetry.start();

    println!("AgentWatch telemetry running");
    println!("   metrics:     {}", telemetry.config().metrics.directory.display());
    println!("   performance: {}", telemetry.config().performance.directory.display());
    println!("   alerts:      {}", telemetry.config().alerting.directory.display());
    println!("   analytics:   {}", telemetry.config().analytics.directory.display());
    println!();
    println!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    println!("\nShutting down...");
    telemetry.shutdown().await;
    Ok(())
}

const SIM_TOOLS: [&str; 4] = ["get_balance", "transfer_money", "get_transactions", "lookup_rates"];
const SIM_AGENTS: [&str; 2] = ["billing_agent", "support_agent"];

async fn run_simulate(
    config: Config,
    requests: usize,
    fail_every: usize,
    tool_latency: Duration,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let telemetry = Telemetry::new(config)?;
    let collector = telemetry.collector();
    let tracker = telemetry.tracker();

    for i in 0..requests {
        let request_id = format!("sim-{i}");
        let user = format!("user-{}", i % 3);
        collector.start_request(request_id.clone(), user.clone(), format!("{user}-session"));

        let api = tracker.start_trace_with(
            "handle_message",
            "api_request",
            TraceOptions::default().request(request_id.clone()),
        );

        collector.record_llm_call(&request_id, 200 + (i as u64 % 7) * 10, 80);
        let tool = SIM_TOOLS[i % SIM_TOOLS.len()];
        collector.record_tool_call(&request_id, tool);
        tracker.record_timing(tool, "tool_execution", tool_latency, Some(&request_id));

        if i % 4 == 0 {
            collector.record_agent_call(&request_id, SIM_AGENTS[i % SIM_AGENTS.len()]);
        }
        if i % 10 == 9 {
            collector.record_guardrail_block(&request_id, "out of scope");
        }

        let failed = fail_every > 0 && i % fail_every == fail_every - 1;
        if failed {
            collector.record_error(&request_id, "simulated tool failure");
        }
        tracker.end_trace(&api, !failed);
        collector.complete_request(&request_id, !failed);
    }

    let cycle = telemetry.alerts().run_cycle();
    telemetry.flush().await?;
    let reports = telemetry.analytics().persist_reports().await?;

    let metrics = collector.get_current_metrics();
    let performance = tracker.get_performance_metrics();
    let alerts = telemetry.alerts().get_active_alerts(None, None);
    let usage = telemetry.analytics().usage_summary(UsagePeriod::All);

    match format {
        OutputFormat::Json => {
            let out = json!({
                "metrics": metrics,
                "performance": performance,
                "alerts": alerts,
                "usage": usage,
                "reports": reports,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            println!("Requests: {} ({} ok, {} failed)", metrics.total_requests, metrics.successful_requests, metrics.failed_requests);
            println!("Average latency: {:.2}ms", metrics.average_latency_ms);
            println!("Top tools:");
            for (tool, count) in &metrics.top_tools {
                println!("   {tool}: {count}");
            }
            println!("Categories:");
            for (category, stats) in &performance {
                let p95 = stats
                    .p95_ms
                    .map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}ms"));
                println!("   {category}: {} spans, avg {:.2}ms, p95 {p95}", stats.count, stats.average_ms);
            }
            println!("Alerts raised: {}", cycle.triggered.len());
            for alert in &alerts {
                println!("   [{}] {}: {}", alert.severity, alert.alert_type, alert.message);
            }
            println!("Reports written: {}", reports.len());
        }
    }
    Ok(())
}

async fn run_alert(
    config: Config,
    alert_type: &str,
    severity: &str,
    message: String,
) -> anyhow::Result<()> {
    let alert_type: AlertType = alert_type.parse()?;
    let severity: Severity = severity.parse()?;

    let telemetry = Telemetry::new(config)?;
    let alerts = telemetry.alerts();
    let id = alerts.trigger_alert(alert_type, severity, message, details(json!({"source": "cli"})));
    alerts.repository().flush().await;

    println!("Raised alert {id}");
    println!("   record: {}", alerts.repository().dir().display());
    Ok(())
}

fn run_config(config: &Config) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

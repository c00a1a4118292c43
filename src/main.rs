//! Flowguard - Main Entry Point

mod cli;
mod logic;
pub mod constants;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use cli::{AdviseArgs, AuditArgs, Cli, Command, RunArgs, SimulateArgs};
use logic::advisory::AdvisoryClient;
use logic::audit::{most_recent_first, summarize, AuditLog};
use logic::capture::CaptureSource;
use logic::config::Config;
use logic::model::{build_anomaly_scorer, build_label_classifier};
use logic::pipeline::{Pipeline, PipelineStats, RecordWorker};
use logic::policy::{DecisionEngine, PolicyConfig};
use logic::response::{Enforcer, IptablesEnforcer, LogOnlyEnforcer, ResponseExecutor};
use logic::window::FlowAggregator;

fn main() -> anyhow::Result<()> {
    // .env first so it can carry RUST_LOG too
    let dotenv = dotenvy::dotenv();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Ok(path) = dotenv {
        log::debug!("Loaded environment from {:?}", path);
    }

    let cli = Cli::parse();
    let mut config = Config::from_env().context("invalid configuration")?;
    if let Some(path) = &cli.audit_path {
        config.audit_path = path.clone();
    }

    match cli.command {
        Command::Run(args) => run(config, args),
        Command::Simulate(args) => simulate(config, args),
        Command::Audit(args) => show_audit(&config, args),
        Command::Advise(args) => advise(&config, args),
    }
}

/// Build the decision engine from configuration
fn build_engine(config: &Config, audit: &Arc<AuditLog>) -> anyhow::Result<DecisionEngine> {
    let scorer = build_anomaly_scorer(&config.unsupervised, &config.heuristic)
        .context("failed to load anomaly model")?;
    let classifier = build_label_classifier(&config.supervised)
        .context("failed to load classifier model")?;

    Ok(DecisionEngine::new(config.policy.clone(), Arc::clone(audit))
        .with_anomaly_scorer(scorer)
        .with_label_classifier(classifier))
}

fn build_enforcer(config: &Config, dry_run: bool) -> Arc<dyn Enforcer> {
    if dry_run {
        Arc::new(LogOnlyEnforcer)
    } else {
        Arc::new(IptablesEnforcer::new(
            config.use_sudo,
            Duration::from_secs(config.block_timeout_secs),
        ))
    }
}

fn run(mut config: Config, args: RunArgs) -> anyhow::Result<()> {
    args.apply(&mut config).context("invalid command-line options")?;
    config.validate().context("invalid configuration")?;

    log::info!("Starting {} v{}", constants::APP_NAME, constants::APP_VERSION);

    let audit = Arc::new(AuditLog::open(&config.audit_path).context("failed to open audit log")?);
    let engine = build_engine(&config, &audit)?;
    let executor = ResponseExecutor::new(build_enforcer(&config, config.dry_run), Arc::clone(&audit));

    let advisory = if config.advisory.enabled {
        Some(AdvisoryClient::new(&config.advisory).context("advisory client")?)
    } else {
        None
    };

    let pipeline = Pipeline::new(
        FlowAggregator::new(config.window_secs),
        engine,
        executor,
        config.pipeline_options(),
    )
    .with_advisory(advisory);

    let shutdown = pipeline.shutdown_handle();
    ctrlc::set_handler(move || {
        log::warn!("Ctrl+C received, shutting down...");
        shutdown.store(true, Ordering::SeqCst);
    })
    .context("failed to register Ctrl+C handler")?;

    let reader = CaptureSource::parse(&args.input).open()?;
    let malformed = reader.malformed_counter();

    let mut summary = pipeline.run(reader)?;
    summary.packets_dropped += malformed.load(Ordering::Relaxed);
    summary.log();
    log::info!("{} audit entries written to {}", audit.entries_written(), audit.path().display());
    Ok(())
}

fn simulate(mut config: Config, args: SimulateArgs) -> anyhow::Result<()> {
    if let Some(path) = &args.policy {
        config.policy = PolicyConfig::from_file(path)?;
    }
    config.validate().context("invalid configuration")?;

    let audit = Arc::new(AuditLog::open(&config.audit_path).context("failed to open audit log")?);
    let worker = RecordWorker {
        engine: Arc::new(build_engine(&config, &audit)?),
        executor: Arc::new(ResponseExecutor::new(build_enforcer(&config, !args.enforce), Arc::clone(&audit))),
        stats: Arc::new(PipelineStats::default()),
        prompts: None,
        hostname: None,
    };

    let report = logic::simulate::run(&worker, &logic::simulate::canonical_scenarios());
    log::info!(
        "Simulation finished: {} payloads, {} detections, {} blocks ({} failed). {} audit entries written to {}",
        report.scenarios,
        report.detections,
        report.mitigations,
        report.mitigation_failures,
        audit.entries_written(),
        audit.path().display()
    );
    Ok(())
}

fn show_audit(config: &Config, args: AuditArgs) -> anyhow::Result<()> {
    let audit = AuditLog::open(&config.audit_path).context("failed to open audit log")?;
    let entries = audit.read_all();
    let stats = summarize(&entries);
    let recent = most_recent_first(entries, args.limit);

    if args.json {
        let out = serde_json::json!({ "entries": recent, "stats": stats });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{:<19}  {:<39}  {:<22}  {}", "TIMESTAMP", "SOURCE", "CATEGORY", "STATUS");
    for entry in &recent {
        println!(
            "{:<19}  {:<39}  {:<22}  {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.subject,
            entry.category,
            entry.status
        );
    }

    println!();
    println!("{} entries total", stats.total_entries);
    for (status, count) in &stats.by_status {
        println!("  {:<12} {}", status, count);
    }
    Ok(())
}

fn advise(config: &Config, args: AdviseArgs) -> anyhow::Result<()> {
    let client = AdvisoryClient::new(&config.advisory).context("advisory client")?;
    log::info!("Asking {}", client.endpoint());

    let reply = client.ask(&args.prompt)?;
    log::debug!("Advisory status {}", reply.status_code);
    println!("{}", reply.text);
    Ok(())
}

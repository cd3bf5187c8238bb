//! Hyra CLI - adaptive model routing

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use hyra_core::benchmark::{Benchmark, BenchmarkReport, EvalSet};
use hyra_core::config::Config;
use hyra_core::routing::{
    Domain, MetricsStore, ModelScorer, RouterBuilder, RoutingResult, SqliteMetricsStore,
    TracingObserver,
};
use hyra_core::storage::Database;
use serde_json::json;
use tracing::debug;

#[derive(Parser)]
#[command(name = "hyra")]
#[command(author, version, about = "Adaptive model routing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Route a prompt to the best model and print the judged answer
    Route {
        /// Prompt text
        prompt: String,
        /// Emit per-stage trace events
        #[arg(long)]
        trace: bool,
    },

    /// Inspect domains
    Domains {
        #[command(subcommand)]
        action: DomainAction,
    },

    /// Manage candidate models
    Models {
        #[command(subcommand)]
        action: ModelAction,
    },

    /// Run a labelled evaluation set against the registered models
    Benchmark {
        /// JSON array of {"domain", "q", "a"} objects
        eval_set: PathBuf,
        /// Only benchmark these model ids (all registered models if omitted)
        #[arg(short, long = "model")]
        models: Vec<i64>,
        /// Also write every graded answer to this JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show learned metrics and current scores
    Metrics {
        /// Domain name (all observed domains if omitted)
        #[arg(short, long)]
        domain: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Database management
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
}

#[derive(Subcommand)]
enum DomainAction {
    /// List all domains
    List,
}

#[derive(Subcommand)]
enum ModelAction {
    /// List registered models
    List,
    /// Register a model
    Add {
        /// Model name as served by the inference backend
        name: String,
        #[arg(short, long)]
        provider: String,
        /// Relative cost (0 = free)
        #[arg(short, long, default_value_t = 0.0)]
        cost: f64,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Show config file path
    Path,
}

#[derive(Subcommand)]
enum DbAction {
    /// Show database path and schema version
    Status,
}

#[tokio::main]
async fn main() {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("hyra=info,hyra_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        report(&err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Route { prompt, trace } => cmd_route(&prompt, trace, cli.format).await,
        Commands::Domains { action } => cmd_domains(action, cli.format, cli.quiet).await,
        Commands::Models { action } => cmd_models(action, cli.format, cli.quiet).await,
        Commands::Benchmark {
            eval_set,
            models,
            output,
        } => cmd_benchmark(&eval_set, &models, output.as_deref(), cli.format).await,
        Commands::Metrics { domain } => cmd_metrics(domain.as_deref(), cli.format).await,
        Commands::Config { action } => cmd_config(action, cli.quiet),
        Commands::Db { action } => cmd_db(action, cli.format).await,
    }
}

/// Print an error with its code and hint when it came from the router
fn report(err: &anyhow::Error) {
    match err.downcast_ref::<hyra_core::Error>() {
        Some(e) => {
            eprintln!("Error [{}]: {}", e.code(), e);
            if let Some(hint) = e.suggestion() {
                eprintln!("  Try: {}", hint);
            }
        }
        None => eprintln!("Error: {:#}", err),
    }
}

async fn open_store(config: &Config) -> anyhow::Result<(Database, Arc<SqliteMetricsStore>)> {
    let path = config.database_path()?;
    debug!(path = %path.display(), "Opening metrics database");
    let db = Database::open(path).await?;
    let store = Arc::new(SqliteMetricsStore::new(db.pool().clone()));
    Ok((db, store))
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_route(prompt: &str, trace: bool, format: OutputFormat) -> anyhow::Result<()> {
    let config = Config::load()?;
    let (db, store) = open_store(&config).await?;

    let mut builder = RouterBuilder::from_config(&config, store)?;
    if trace {
        builder = builder.observer(Arc::new(TracingObserver));
    }
    let router = builder.build()?;

    let result = router.route(prompt).await;
    db.close().await;
    let result = result?;

    match format {
        OutputFormat::Json => print_json(&serde_json::to_value(&result)?)?,
        OutputFormat::Text => print_result(&result),
    }
    Ok(())
}

fn print_result(result: &RoutingResult) {
    let verdict = if result.verified { "passed" } else { "failed" };
    println!("Domain:   {}", result.domain);
    println!("Model:    {}/{}", result.provider, result.model);
    println!("Verified: {}", verdict);
    println!();
    println!("{}", result.output);
    println!();
    println!(
        "accuracy {:.2} | fluency {:.2} | confidence {:.2} | latency {:.0} ms | {} tokens",
        result.metrics.accuracy,
        result.metrics.fluency,
        result.metrics.confidence,
        result.metrics.latency_ms,
        result.metrics.tokens
    );
}

async fn cmd_domains(action: DomainAction, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let config = Config::load()?;
    let (_db, store) = open_store(&config).await?;

    match action {
        DomainAction::List => {
            let domains = store.list_domains().await?;
            if format == OutputFormat::Json {
                return print_json(&serde_json::to_value(&domains)?);
            }
            if !quiet {
                println!("Domains:");
            }
            for d in domains {
                let flag = if d.subjective { " [subjective]" } else { "" };
                println!("  {:>2}. {}{}", d.id, d.name, flag);
            }
        }
    }
    Ok(())
}

async fn cmd_models(action: ModelAction, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let config = Config::load()?;
    let (_db, store) = open_store(&config).await?;

    match action {
        ModelAction::List => {
            let models = store.list_models().await?;
            if format == OutputFormat::Json {
                return print_json(&serde_json::to_value(&models)?);
            }
            if models.is_empty() {
                if !quiet {
                    println!("No models registered.");
                    println!("\nAdd one with: hyra models add <name> --provider <provider>");
                }
                return Ok(());
            }
            if !quiet {
                println!("Models:");
            }
            for m in models {
                println!("  {:>2}. {} (cost {})", m.id, m.backend_identifier(), m.cost);
            }
        }
        ModelAction::Add {
            name,
            provider,
            cost,
        } => {
            let model = store.add_model(&name, &provider, cost).await?;
            if format == OutputFormat::Json {
                return print_json(&serde_json::to_value(&model)?);
            }
            if !quiet {
                println!("Model registered.");
                println!("  ID: {}", model.id);
                println!("  Name: {}", model.backend_identifier());
                println!("  Cost: {}", model.cost);
            }
        }
    }
    Ok(())
}

async fn cmd_benchmark(
    eval_set: &Path,
    model_ids: &[i64],
    output: Option<&Path>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let set = EvalSet::load(eval_set)?;
    let config = Config::load()?;
    let (db, store) = open_store(&config).await?;

    let models = if model_ids.is_empty() {
        store.list_models().await?
    } else {
        let mut models = Vec::with_capacity(model_ids.len());
        for &id in model_ids {
            models.push(store.get_model(id).await?);
        }
        models
    };

    let benchmark = Benchmark::from_config(&config, store)?;
    let report = benchmark.run(&set, &models).await;
    db.close().await;
    let report = report?;

    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&report.records)?)?;
        debug!(path = %path.display(), "Wrote benchmark results");
    }

    match format {
        OutputFormat::Json => print_json(&json!({
            "records": report.records,
            "summary": report.summaries(),
        })),
        OutputFormat::Text => {
            print_benchmark(&report);
            Ok(())
        }
    }
}

fn print_benchmark(report: &BenchmarkReport) {
    for record in &report.records {
        let verdict = if record.passed { "pass" } else { "fail" };
        println!(
            "{} {:<32} [{}] acc {:.2}  flu {:.2}  {:>6.0} ms  {}",
            verdict,
            record.model,
            record.domain,
            record.accuracy,
            record.fluency,
            record.latency_ms,
            record.question
        );
    }
    println!();
    for summary in report.summaries() {
        println!(
            "{:<32} passed {}/{}  mean acc {:.2}  mean flu {:.2}  mean {:.0} ms",
            summary.model,
            summary.passed,
            summary.runs,
            summary.mean_accuracy,
            summary.mean_fluency,
            summary.mean_latency_ms
        );
    }
}

async fn cmd_metrics(domain: Option<&str>, format: OutputFormat) -> anyhow::Result<()> {
    let config = Config::load()?;
    let (_db, store) = open_store(&config).await?;

    let domains: Vec<Domain> = match domain {
        Some(name) => {
            let found = store
                .find_domain(name)
                .await?
                .ok_or_else(|| hyra_core::Error::UnknownDomain(name.to_string()))?;
            vec![found]
        }
        None => store.list_domains().await?,
    };

    let models = store.list_models().await?;
    if models.is_empty() {
        if format == OutputFormat::Json {
            return print_json(&json!([]));
        }
        println!("No models registered.");
        return Ok(());
    }

    let scorer = ModelScorer::new(store.clone(), config.routing.cold_start);
    let mut report = Vec::new();
    let mut printed = false;

    for d in &domains {
        let rows = store.domain_metrics(d.id).await?;
        // Without --domain only domains with observations are shown
        if domain.is_none() && rows.is_empty() {
            continue;
        }
        let ranked = scorer.rank(d, &config.routing.weights).await?;

        if format == OutputFormat::Json {
            let entries: Vec<_> = ranked
                .iter()
                .map(|s| {
                    json!({
                        "model": s.model,
                        "score": s.score,
                        "quality": s.quality,
                        "cost_factor": s.cost_factor,
                        "cold_start": s.cold_start,
                        "metrics": rows.get(&s.model.id),
                    })
                })
                .collect();
            report.push(json!({ "domain": d.name, "candidates": entries }));
            continue;
        }

        printed = true;
        println!("{}", d.name);
        for s in &ranked {
            match rows.get(&s.model.id) {
                Some(m) => println!(
                    "  {:<32} score {:.3}  acc {:.2}  flu {:.2}  conf {:.2}  {:>6.0} ms  used {}  failed {}",
                    s.model.backend_identifier(),
                    s.score,
                    m.accuracy_score,
                    m.fluency_score,
                    m.confidence,
                    m.latency_ms,
                    m.usage_count,
                    m.failure_count
                ),
                None => println!(
                    "  {:<32} score {:.3}  (cold start)",
                    s.model.backend_identifier(),
                    s.score
                ),
            }
        }
    }

    if format == OutputFormat::Json {
        print_json(&serde_json::Value::Array(report))?;
    } else if !printed {
        println!("No metrics recorded yet. Route a prompt with: hyra route <prompt>");
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_db(action: DbAction, format: OutputFormat) -> anyhow::Result<()> {
    match action {
        DbAction::Status => {
            let config = Config::load()?;
            let (db, _store) = open_store(&config).await?;
            db.health_check().await?;
            let status = db.migration_status().await?;

            if format == OutputFormat::Json {
                return print_json(&json!({
                    "path": db.path(),
                    "current_version": status.current_version,
                    "target_version": status.target_version,
                    "needs_migration": status.needs_migration,
                }));
            }
            println!("Database: {}", db.path().display());
            println!(
                "  Schema version: {} (latest {})",
                status.current_version, status.target_version
            );
            if status.needs_migration {
                println!("  Migrations pending");
            } else {
                println!("  Up to date");
            }
        }
    }
    Ok(())
}

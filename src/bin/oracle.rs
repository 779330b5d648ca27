//! Price Oracle CLI
//!
//! Command-line interface for operating a weighted price oracle.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::{style, Term};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use rust_decimal::Decimal;

use price_oracle::access::{AuthorizationContext, Principal, Role};
use price_oracle::cli::{
    forget_source_endpoint, oracle_from_config, record_source_endpoint, OutputFormat,
    OutputFormatter,
};
use price_oracle::oracle::{OracleAggregator, OracleConfig, SourceId, SourceSpec};

/// Weighted price oracle aggregator
#[derive(Parser)]
#[command(name = "oracle")]
#[command(version = price_oracle::VERSION)]
#[command(about = "Command-line interface for the price oracle", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "ORACLE_CONFIG")]
    config: Option<PathBuf>,

    /// Principal performing gated operations (defaults to the configured admin)
    #[arg(long = "as", env = "ORACLE_CALLER")]
    caller: Option<String>,

    /// Output format: text, json or json-pretty
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a configuration file with two demo sources
    Init {
        /// Overwrite an existing file without asking
        #[arg(short, long)]
        force: bool,
    },

    /// List registered sources
    Sources,

    /// Source registry operations
    #[command(subcommand)]
    Source(SourceCommands),

    /// Fetch all active sources and publish a new aggregate
    Recompute,

    /// Show the latest aggregate
    Price,

    /// Fetch live samples from every active source
    Prices,

    /// Check a candidate price against the latest aggregate
    Check {
        /// Candidate price
        candidate: String,
    },

    /// Change the deviation threshold
    Threshold {
        /// New threshold in basis points
        bps: u64,
    },

    /// Grant a role
    Grant {
        /// Role: admin or manager
        role: Role,
        /// Recipient principal
        principal: String,
    },

    /// Revoke a role
    Revoke {
        /// Role: admin or manager
        role: Role,
        /// Principal losing the role
        principal: String,
    },

    /// Oracle status
    Status,
}

#[derive(Subcommand)]
enum SourceCommands {
    /// Register a source
    Add {
        /// Source identifier
        id: String,
        /// Weight in basis points (1-10000)
        #[arg(short, long)]
        weight: u64,
        /// Maximum sample age in seconds
        #[arg(short, long, default_value = "60")]
        max_staleness: u64,
        /// Fixed price served for this source
        #[arg(long)]
        price: Option<Decimal>,
        /// HTTP endpoint serving samples (needs the http-fetcher feature)
        #[arg(long)]
        url: Option<String>,
        /// Confidence reported with a fixed price, in basis points
        #[arg(long)]
        confidence: Option<u16>,
    },

    /// Remove a source
    Remove {
        /// Source identifier
        id: String,
    },

    /// Change a source's weight
    Weight {
        /// Source identifier
        id: String,
        /// New weight in basis points
        weight: u64,
    },

    /// Include a source in aggregation
    Enable {
        /// Source identifier
        id: String,
    },

    /// Exclude a source from aggregation
    Disable {
        /// Source identifier
        id: String,
    },

    /// Show one source
    Show {
        /// Source identifier
        id: String,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAIN
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let term = Term::stdout();

    if let Err(e) = run_command(&cli, &term).await {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

async fn run_command(cli: &Cli, term: &Term) -> anyhow::Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(OracleConfig::default_path);

    match &cli.command {
        Commands::Init { force } => cmd_init(&config_path, *force, term),
        command => {
            let config = load_config(&config_path)?;
            let ctx = AuthorizationContext::new(
                cli.caller.clone().unwrap_or_else(|| config.admin.clone()),
            );
            let oracle = oracle_from_config(&config).context("failed to start oracle")?;
            let out = OutputFormatter::new(cli.format);
            let session = Session {
                oracle: &oracle,
                ctx: &ctx,
                config: &config,
                config_path: &config_path,
                out: &out,
            };
            run_oracle_command(command, &session, term).await
        }
    }
}

/// Everything a command needs once the oracle is up
struct Session<'a> {
    oracle: &'a OracleAggregator,
    ctx: &'a AuthorizationContext,
    config: &'a OracleConfig,
    config_path: &'a Path,
    out: &'a OutputFormatter,
}

async fn run_oracle_command(
    command: &Commands,
    session: &Session<'_>,
    term: &Term,
) -> anyhow::Result<()> {
    let Session {
        oracle,
        ctx,
        config,
        out,
        ..
    } = *session;

    match command {
        // Runs before any oracle exists
        Commands::Init { .. } => {}
        Commands::Sources => {
            out.section("Oracle Sources");
            out.sources(&oracle.sources());
        }
        Commands::Source(cmd) => cmd_source(session, cmd).await?,
        Commands::Recompute => {
            let spinner = create_spinner("Fetching sources...");
            let result = oracle.recompute_aggregate(ctx).await;
            spinner.finish_and_clear();

            let result = result?;
            out.section("Aggregate Published");
            out.aggregate(&result);
        }
        Commands::Price => match oracle.latest_result() {
            Some(result) => {
                out.section("Latest Aggregate");
                out.aggregate(&result);
            }
            None => out.warning("No aggregate price has been published yet"),
        },
        Commands::Prices => {
            let spinner = create_spinner("Fetching sources...");
            let samples = oracle.get_all_prices().await;
            spinner.finish_and_clear();

            out.section("Live Samples");
            out.samples(&samples);
        }
        Commands::Check { candidate } => {
            let candidate = Decimal::from_str(candidate.trim())
                .with_context(|| format!("invalid price: {}", candidate))?;
            let report = oracle.check_deviation(candidate)?;
            out.section("Deviation Check");
            out.deviation(&report);
        }
        Commands::Threshold { bps } => {
            oracle.update_deviation_threshold(ctx, *bps).await?;
            out.success(&format!("Deviation threshold set to {} bps", bps));
        }
        Commands::Grant { role, principal } => {
            let granted = oracle
                .grant_role(ctx, *role, Principal::new(principal.as_str()))
                .await?;
            if granted {
                out.success(&format!("Granted {} to {}", role, principal));
            } else {
                out.warning(&format!("{} already holds {}", principal, role));
            }
        }
        Commands::Revoke { role, principal } => {
            let revoked = oracle
                .revoke_role(ctx, *role, &Principal::new(principal.as_str()))
                .await?;
            if revoked {
                out.success(&format!("Revoked {} from {}", role, principal));
            } else {
                out.warning(&format!("{} does not hold {}", principal, role));
            }
        }
        Commands::Status => cmd_status(oracle, config, out, term),
    }

    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMMAND HANDLERS
// ═══════════════════════════════════════════════════════════════════════════════

fn cmd_init(path: &Path, force: bool, term: &Term) -> anyhow::Result<()> {
    if path.exists() && !force {
        let overwrite = Confirm::new()
            .with_prompt(format!("{} exists. Overwrite?", path.display()))
            .default(false)
            .interact()?;
        if !overwrite {
            anyhow::bail!("Configuration already exists: {}", path.display());
        }
    }

    let mut config = OracleConfig::default();
    config.sources = vec![
        demo_source("chainlink", 6_000, Decimal::from(3350)),
        demo_source("pyth", 4_000, Decimal::from(3355)),
    ];
    config.save(path)?;

    let _ = term.write_line(&format!(
        "{} Configuration written to {}",
        style("✓").green(),
        path.display()
    ));
    Ok(())
}

async fn cmd_source(session: &Session<'_>, cmd: &SourceCommands) -> anyhow::Result<()> {
    let Session { oracle, ctx, out, .. } = *session;

    match cmd {
        SourceCommands::Add {
            id,
            weight,
            max_staleness,
            price,
            url,
            confidence,
        } => {
            let source = oracle
                .add_source(ctx, SourceId::new(id.as_str()), *weight, *max_staleness)
                .await?;

            record_source_endpoint(
                session.config_path,
                SourceSpec {
                    id: id.clone(),
                    weight: *weight,
                    max_staleness_secs: *max_staleness,
                    url: url.clone(),
                    price: *price,
                    confidence_bps: *confidence,
                },
            )
            .with_context(|| format!("failed to update {}", session.config_path.display()))?;

            out.success(&format!("Added {} with weight {} bps", source.id, source.weight));
            if price.is_none() && url.is_none() {
                out.warning(&format!(
                    "{} has no --price or --url; it is excluded until one is configured",
                    id
                ));
            }
        }
        SourceCommands::Remove { id } => {
            let removed = oracle.remove_source(ctx, &SourceId::new(id.as_str())).await?;
            forget_source_endpoint(session.config_path, id)
                .with_context(|| format!("failed to update {}", session.config_path.display()))?;
            out.success(&format!("Removed {}", removed.id));
        }
        SourceCommands::Weight { id, weight } => {
            oracle
                .update_weight(ctx, &SourceId::new(id.as_str()), *weight)
                .await?;
            out.success(&format!("{} weight set to {} bps", id, weight));
        }
        SourceCommands::Enable { id } | SourceCommands::Disable { id } => {
            let active = matches!(cmd, SourceCommands::Enable { .. });
            let changed = oracle
                .set_source_active(ctx, &SourceId::new(id.as_str()), active)
                .await?;
            let state = if active { "active" } else { "inactive" };
            if changed {
                out.success(&format!("{} is now {}", id, state));
            } else {
                out.warning(&format!("{} was already {}", id, state));
            }
        }
        SourceCommands::Show { id } => match oracle.get_config(&SourceId::new(id.as_str())) {
            Some(source) => out.data(&source),
            None => anyhow::bail!("source not found: {}", id),
        },
    }
    Ok(())
}

fn cmd_status(oracle: &OracleAggregator, config: &OracleConfig, out: &OutputFormatter, term: &Term) {
    let stats = oracle.statistics();
    if out.format().is_json() {
        out.data(&stats);
        return;
    }

    let price = stats
        .latest_price
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".into());
    let storage = config
        .data_dir
        .as_ref()
        .map(|d| d.display().to_string())
        .unwrap_or_else(|| "in-memory".into());

    let _ = term.write_line(&format!("{}", style("Price Oracle Status").bold()));
    let _ = term.write_line(&format!("  Version:            {}", style(price_oracle::VERSION).green()));
    let _ = term.write_line(&format!("  Latest price:       {}", style(price).yellow().bold()));
    let _ = term.write_line(&format!(
        "  Computed at:        {}",
        stats
            .last_computed_at
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".into())
    ));
    let _ = term.write_line(&format!(
        "  Sources:            {} registered, {} active",
        style(stats.source_count).cyan(),
        style(stats.active_sources).cyan()
    ));
    let _ = term.write_line(&format!(
        "  Deviation limit:    {} bps",
        style(stats.deviation_threshold_bps).cyan()
    ));
    let _ = term.write_line(&format!("  Storage:            {}", storage));
    if let Some(fingerprint) = stats.state_fingerprint {
        let _ = term.write_line(&format!("  State:              {}", style(fingerprint.short()).dim()));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn load_config(path: &Path) -> anyhow::Result<OracleConfig> {
    let config = if path.exists() {
        OracleConfig::load(path)?
    } else {
        tracing::warn!(path = %path.display(), "config file not found, using defaults");
        OracleConfig::default()
    };

    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

fn demo_source(id: &str, weight: u64, price: Decimal) -> SourceSpec {
    SourceSpec {
        id: id.into(),
        weight,
        max_staleness_secs: 60,
        url: None,
        price: Some(price),
        confidence_bps: None,
    }
}

fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.cyan} {msg}")
    {
        spinner.set_style(template);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    spinner
}

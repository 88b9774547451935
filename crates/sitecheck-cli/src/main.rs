//! Sitecheck CLI
//!
//! Command-line interface for solar site feasibility evaluation.
//!
//! ## Usage
//!
//! ```bash
//! # Evaluate one or more addresses
//! sitecheck evaluate "123 Solar Way, Phoenix, AZ" "9 Elm St, Mesa, AZ"
//!
//! # JSON output, reproducible timestamp, on-disk cache
//! sitecheck evaluate "123 Solar Way, Phoenix, AZ" --format json \
//!     --evaluated-at 2025-06-01T00:00:00Z --cache-dir .sitecheck-cache
//!
//! # Show or validate configuration
//! sitecheck config show --config sitecheck.yaml
//! sitecheck config validate sitecheck.yaml
//! ```
//!
//! ## Exit Codes
//!
//! - 0: every site is GO
//! - 1: at least one NO_GO
//! - 2: at least one INVALID address
//! - 3: Error

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use sitecheck_core::{Decision, EvaluationBundle};
use sitecheck_runtime::{
    AddressResolver, Evaluator, HeadlineTable, OfflineSummarizer, PermitRulesTable, RuntimeConfig,
    StaticYield,
};

/// Sitecheck: solar site feasibility evaluation
#[derive(Parser)]
#[command(name = "sitecheck")]
#[command(version)]
#[command(about = "Evaluate whether solar installations should go ahead at given sites", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one or more site addresses
    Evaluate {
        /// Addresses in the form "123 Main St, City, ST"
        #[arg(required = true)]
        addresses: Vec<String>,

        /// Runtime configuration file (YAML or JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,

        /// Store cached producer results in this directory
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Disable the result cache
        #[arg(long, conflicts_with = "cache_dir")]
        no_cache: bool,

        /// Explicit timestamp for deterministic evaluation (ISO 8601 / RFC 3339).
        /// Example: --evaluated-at 2025-06-01T00:00:00Z
        #[arg(long, value_parser = parse_datetime)]
        evaluated_at: Option<DateTime<Utc>>,

        /// Headlines per jurisdiction (JSON)
        #[arg(long)]
        headlines: Option<PathBuf>,

        /// Permitting rules table (YAML or JSON)
        #[arg(long)]
        permit_rules: Option<PathBuf>,

        /// Coordinates per jurisdiction (JSON); a few large cities are built in
        #[arg(long)]
        gazetteer: Option<PathBuf>,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as YAML
    Show {
        /// Configuration file; defaults are shown when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        path: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Parse ISO 8601 / RFC 3339 datetime string to DateTime<Utc>.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("Invalid datetime format: {}. Expected ISO 8601/RFC 3339 (e.g., 2025-06-01T00:00:00Z)", e))
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(exit_code) => exit_code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(3)
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Evaluate {
            addresses,
            config,
            format,
            cache_dir,
            no_cache,
            evaluated_at,
            headlines,
            permit_rules,
            gazetteer,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(dir) = cache_dir {
                config.cache.directory = Some(dir);
            }
            if no_cache {
                config.cache.enabled = false;
            }
            if evaluated_at.is_some() {
                config.determinism.evaluated_at = evaluated_at;
            }
            let sources = DataSources {
                headlines,
                permit_rules,
                gazetteer,
            };
            evaluate_command(&addresses, config, &sources, format).await
        }

        Commands::Config { action } => match action {
            ConfigAction::Show { config } => show_config(config.as_deref()),
            ConfigAction::Validate { path } => validate_config(&path),
        },
    }
}

/// Optional data files for the built-in producers.
struct DataSources {
    headlines: Option<PathBuf>,
    permit_rules: Option<PathBuf>,
    gazetteer: Option<PathBuf>,
}

fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path)),
        None => Ok(RuntimeConfig::default()),
    }
}

async fn evaluate_command(
    addresses: &[String],
    config: RuntimeConfig,
    sources: &DataSources,
    format: OutputFormat,
) -> Result<ExitCode> {
    let headlines = match &sources.headlines {
        Some(path) => HeadlineTable::from_file(path)
            .with_context(|| format!("Failed to load headlines from {:?}", path))?,
        None => HeadlineTable::builtin(),
    };
    let rules = match &sources.permit_rules {
        Some(path) => PermitRulesTable::from_file(path)
            .with_context(|| format!("Failed to load permit rules from {:?}", path))?,
        None => PermitRulesTable::builtin(),
    };
    let resolver = match &sources.gazetteer {
        Some(path) => AddressResolver::from_file(path)
            .with_context(|| format!("Failed to load gazetteer from {:?}", path))?,
        None => AddressResolver::builtin(),
    };

    let evaluator = Evaluator::builder()
        .config(config)
        .resolver(Arc::new(resolver))
        .standard_producers(
            headlines,
            rules,
            Arc::new(StaticYield::default()),
            Arc::new(OfflineSummarizer),
        )
        .build()
        .context("Failed to set up evaluator")?;

    let bundles = evaluator.evaluate_many(addresses).await;

    match format {
        OutputFormat::Json => {
            let json = if let [bundle] = bundles.as_slice() {
                serde_json::to_string_pretty(bundle)?
            } else {
                serde_json::to_string_pretty(&bundles)?
            };
            println!("{}", json);
        }
        OutputFormat::Text => {
            for (i, bundle) in bundles.iter().enumerate() {
                if i > 0 {
                    println!();
                    println!("---");
                    println!();
                }
                print_text_result(bundle);
            }
        }
    }

    Ok(ExitCode::from(exit_code(&bundles)))
}

/// Most severe outcome wins: INVALID over NO_GO over GO.
fn exit_code(bundles: &[EvaluationBundle]) -> u8 {
    bundles
        .iter()
        .map(|b| match b.decision {
            Decision::Go => 0,
            Decision::NoGo => 1,
            Decision::Invalid => 2,
        })
        .max()
        .unwrap_or(0)
}

fn print_text_result(bundle: &EvaluationBundle) {
    println!("{}", bundle.address);
    println!();
    println!("{} (score {})", bundle.decision, bundle.final_score);
    println!();

    if let Some(context) = &bundle.context {
        print!("Jurisdiction: {}", context.jurisdiction);
        if let Some(coordinates) = context.coordinates {
            print!(" ({:.4}, {:.4})", coordinates.lat, coordinates.lon);
        }
        println!();
        println!();
    }

    if !bundle.normalized_scores.is_empty() {
        println!("Scores:");
        for score in bundle.normalized_scores.values() {
            let status = bundle
                .producer_results
                .iter()
                .find(|r| r.kind == score.kind)
                .map(|r| format!(" [{:?}]", r.status))
                .unwrap_or_default();
            println!("  {}: {}{}", score.kind.label(), score.value, status);
        }
        println!();
    }

    println!("Justification:");
    for line in &bundle.justification {
        println!("  - {}", line);
    }
}

fn show_config(path: Option<&Path>) -> Result<ExitCode> {
    let config = load_config(path)?;
    let yaml = serde_yaml::to_string(&config).context("Failed to render config")?;
    print!("{}", yaml);
    Ok(ExitCode::from(0))
}

fn validate_config(path: &Path) -> Result<ExitCode> {
    match RuntimeConfig::from_file(path) {
        Ok(config) => {
            println!("Config is valid: {}", path.display());
            println!();
            let order: Vec<&str> = config.producer_order.iter().map(|k| k.label()).collect();
            println!("Producers: {}", order.join(", "));
            println!(
                "GO threshold: {} (floor {})",
                config.fusion.go_threshold, config.fusion.floor
            );
            println!(
                "Cache: {}",
                match (&config.cache.enabled, &config.cache.directory) {
                    (false, _) => "disabled".to_string(),
                    (true, Some(dir)) => format!("{}", dir.display()),
                    (true, None) => "in memory".to_string(),
                }
            );
            Ok(ExitCode::from(0))
        }
        Err(e) => {
            eprintln!("Config validation failed: {}", e);
            Ok(ExitCode::from(1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_datetime() {
        assert_eq!(
            parse_datetime("2025-06-01T00:00:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2025, 5, 31, 22, 0, 0).unwrap()
        );
        assert!(parse_datetime("yesterday").is_err());
    }

    #[test]
    fn test_cli_parses_evaluate_flags() {
        let cli = Cli::try_parse_from([
            "sitecheck",
            "evaluate",
            "1 Main St, Austin, TX",
            "2 Oak Ave, Mesa, AZ",
            "--format",
            "json",
            "--no-cache",
        ])
        .unwrap();

        match cli.command {
            Commands::Evaluate {
                addresses,
                no_cache,
                format,
                ..
            } => {
                assert_eq!(addresses.len(), 2);
                assert!(no_cache);
                assert!(matches!(format, OutputFormat::Json));
            }
            _ => panic!("expected evaluate"),
        }
    }

    #[test]
    fn test_cache_flags_conflict() {
        let parsed = Cli::try_parse_from([
            "sitecheck",
            "evaluate",
            "1 Main St, Austin, TX",
            "--no-cache",
            "--cache-dir",
            "/tmp/x",
        ]);
        assert!(parsed.is_err());
    }

    #[tokio::test]
    async fn test_exit_code_reflects_worst_decision() {
        let evaluator = Evaluator::builder()
            .config({
                let mut config = RuntimeConfig::default();
                config.cache.enabled = false;
                config
            })
            .standard_producers(
                HeadlineTable::builtin(),
                PermitRulesTable::builtin(),
                Arc::new(StaticYield::default()),
                Arc::new(OfflineSummarizer),
            )
            .build()
            .unwrap();

        let bundles = evaluator
            .evaluate_many(&["9 Elm St, Mesa, AZ", "???"])
            .await;

        assert_eq!(bundles[0].decision, Decision::NoGo);
        assert_eq!(exit_code(&bundles), 2);
        assert_eq!(exit_code(&bundles[..1]), 1);
        assert_eq!(exit_code(&[]), 0);
    }
}

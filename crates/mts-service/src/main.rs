//! Model test service launcher and maintenance CLI

#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]

use clap::{Parser, Subcommand};
use mts_core::types::{BiasType, ScoreType};
use mts_core::{Error, Result};
use mts_service::{ServiceConfig, default_fairness_tests, default_performance_test, default_stability_test};
use mts_store::BiasConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mts")]
#[command(about = "Model test service", long_about = None)]
#[command(version)]
struct Cli {
    /// Log filter, e.g. "info" or "mts_service=debug"
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, validate, and print the effective service configuration
    CheckConfig {
        /// Path to a YAML configuration file; environment variables override
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the default test set the bootstrapper would create
    DefaultTests {
        /// Project id to seed the tests for
        #[arg(long)]
        project_id: String,

        /// Project score type (classification, regression, ranking, ...)
        #[arg(long)]
        score_type: String,

        /// Configured bias bands, as "bias_type:min:max" (repeatable)
        #[arg(long)]
        bias: Vec<String>,

        /// Path to a YAML configuration file for metric defaults
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<ServiceConfig> {
    let mut config = match path {
        Some(path) => ServiceConfig::from_yaml_file(path)?,
        None => ServiceConfig::default(),
    };
    config.apply_env();
    Ok(config)
}

fn parse_bias_band(raw: &str) -> Result<BiasConfig> {
    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() != 3 {
        return Err(Error::InvalidArgument(format!(
            "expected bias_type:min:max, got `{raw}`"
        )));
    }
    let bias_type = BiasType::from_str_lowercase(parts[0])?;
    let acceptable_min: f64 = parts[1]
        .parse()
        .map_err(|_| Error::InvalidArgument(format!("bad lower bound in `{raw}`")))?;
    let acceptable_max: f64 = parts[2]
        .parse()
        .map_err(|_| Error::InvalidArgument(format!("bad upper bound in `{raw}`")))?;
    Ok(BiasConfig {
        bias_type,
        acceptable_min,
        acceptable_max,
    })
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::CheckConfig { config } => {
            let config = load_config(config.as_ref())?;
            config.validate()?;
            let rendered = serde_yaml::to_string(&config)
                .map_err(|e| Error::Internal(format!("config render error: {e}")))?;
            println!("{rendered}");
            Ok(())
        }
        Commands::DefaultTests {
            project_id,
            score_type,
            bias,
            config,
        } => {
            let config = load_config(config.as_ref())?;
            let score_type = ScoreType::from_str_lowercase(&score_type)?;
            let bias_configs: Vec<BiasConfig> = bias
                .iter()
                .map(|raw| parse_bias_band(raw))
                .collect::<Result<_>>()?;

            let mut tests = vec![default_performance_test(&project_id, score_type, &config)];
            tests.extend(default_fairness_tests(&project_id, &bias_configs));
            tests.push(default_stability_test(&project_id));
            println!("{}", serde_json::to_string_pretty(&tests)?);
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&cli.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

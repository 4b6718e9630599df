//! BIR NIP validator binary.
//!
//! Run with: `bir-nip-validator --config config.yaml 5261040828`

use anyhow::{Context, Result};
use bir_nip_validator::{PolandNipValidator, RegistryConfig, ValidationRequest};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Check a Polish NIP against the GUS BIR registry.
///
/// Configuration values can be overridden with the
/// CONF_POLAND_NIP_CHECKER_PRODUCTION_URL, CONF_POLAND_NIP_CHECKER_WSDL_URL
/// and CONF_POLAND_NIP_CHECKER_KEY environment variables.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// NIP to check
    nip: String,

    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Print the full company record as JSON
    #[arg(short, long)]
    info: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting BIR NIP validator v{}", env!("CARGO_PKG_VERSION"));

    let config = if args.config.exists() {
        let content =
            std::fs::read_to_string(&args.config).context("Failed to read config file")?;
        serde_yaml::from_str::<RegistryConfig>(&content).context("Failed to parse config file")?
    } else {
        info!("Config file not found, using defaults");
        RegistryConfig::default()
    }
    .with_env_overrides();

    config.validate().context("Invalid configuration")?;

    info!(
        service_url = %config.service_url,
        connect_timeout_secs = config.connect_timeout_secs,
        "Configuration loaded"
    );

    let validator = PolandNipValidator::from_config(config);
    let request = ValidationRequest::new(args.nip);

    if args.info {
        match validator.company_info(&request) {
            Some(record) => println!(
                "{}",
                serde_json::to_string_pretty(&record).context("Failed to serialize record")?
            ),
            None => println!("no record"),
        }
    } else if validator.check_vat(&request) {
        println!("valid");
    } else {
        println!("invalid");
    }

    Ok(())
}

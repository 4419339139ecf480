//! mqttgw - Bidirectional gateway between a vessel data bus and an MQTT broker
//!
//! Usage:
//!   mqttgw [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>    Configuration file path (default: mqttgw.toml)
//!   -u, --url <URL>        Broker URL override
//!   -l, --log-level        Log level (error, warn, info, debug, trace)
//!   -h, --help             Print help

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use mqttgw::bus::{LogReporter, MemoryBus};
use mqttgw::config::GatewayConfig;
use mqttgw::gateway::Gateway;

/// Log level for CLI
#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    /// Only errors
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    Info,
    /// Debug messages
    Debug,
    /// Trace messages (very verbose)
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

fn level_from_config(level: &str) -> Level {
    match level {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}

/// mqttgw - exchange data between a vessel data bus and an MQTT server
#[derive(Parser, Debug)]
#[command(name = "mqttgw")]
#[command(version)]
#[command(about = "Bidirectional gateway between a vessel data bus and an MQTT broker")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long, default_value = "mqttgw.toml")]
    config: PathBuf,

    /// Broker URL override
    #[arg(short, long)]
    url: Option<String>,

    /// Log level (overrides the configuration file)
    #[arg(short, long)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = match GatewayConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("mqttgw: cannot load {}: {}", args.config.display(), e);
            std::process::exit(1);
        }
    };

    if let Some(url) = args.url {
        config.broker.url = Some(url);
    }

    let level = args
        .log_level
        .map(LogLevel::to_tracing_level)
        .unwrap_or_else(|| level_from_config(&config.log.level));

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("failed to set tracing subscriber");

    let bus = Arc::new(MemoryBus::new());
    let reporter = Arc::new(LogReporter);

    let gateway = match Gateway::start(&config, bus, reporter) {
        Ok(gateway) => gateway,
        Err(_) => std::process::exit(1),
    };

    info!("mqttgw running, press Ctrl-C to stop");
    let _ = tokio::signal::ctrl_c().await;

    gateway.stop("shutdown signal").await;
}

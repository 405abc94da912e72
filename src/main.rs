//! Pinwatch CLI
//!
//! GPIO pin-state monitoring agent with an optional web API.

use clap::{Parser, Subcommand};
use pinwatch::{Config, PinMonitor, VERSION};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pinwatch")]
#[command(version = VERSION)]
#[command(about = "GPIO pin-state monitor with transition tracking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start monitoring GPIO lines
    Run {
        /// Path to the configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Force the simulated line source even when hardware is present
        #[arg(long)]
        simulate: bool,

        /// Override the sampling interval, in seconds
        #[arg(long)]
        interval: Option<f64>,

        /// Host to bind the web API to
        #[cfg(feature = "server")]
        #[arg(long, default_value = "0.0.0.0")]
        host: std::net::IpAddr,

        /// Port to bind the web API to
        #[cfg(feature = "server")]
        #[arg(long, default_value = "5000")]
        port: u16,
    },

    /// Print the effective configuration
    Config {
        /// Path to the configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            simulate,
            interval,
            #[cfg(feature = "server")]
            host,
            #[cfg(feature = "server")]
            port,
        } => {
            #[cfg(feature = "server")]
            cmd_run(config, simulate, interval, (host, port));
            #[cfg(not(feature = "server"))]
            cmd_run(config, simulate, interval);
        }
        Commands::Config { config } => {
            cmd_config(config);
        }
    }
}

fn load_config(path: Option<PathBuf>, interval_override: Option<f64>) -> Config {
    let path = path.unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_default(&path);

    if let Some(secs) = interval_override {
        match Duration::try_from_secs_f64(secs) {
            Ok(interval) if secs > 0.0 => config.update_interval = interval,
            _ => tracing::warn!("Ignoring invalid interval override {secs}"),
        }
    }

    config
}

fn cmd_run(
    config_path: Option<PathBuf>,
    simulate: bool,
    interval: Option<f64>,
    #[cfg(feature = "server")] bind: (std::net::IpAddr, u16),
) {
    tracing::info!("Pinwatch v{VERSION}");

    let config = load_config(config_path, interval);
    tracing::info!(
        "Monitoring {} lines every {:?}",
        config.monitored_lines.len(),
        config.update_interval
    );

    // With the server enabled, updates fan out to SSE clients; otherwise
    // they go to the log at debug level.
    #[cfg(feature = "server")]
    let (sink, updates) = {
        let sink = pinwatch::server::BroadcastSink::new();
        let updates = sink.sender();
        (Arc::new(sink) as Arc<dyn pinwatch::PublishSink>, updates)
    };
    #[cfg(not(feature = "server"))]
    let sink: Arc<dyn pinwatch::PublishSink> = Arc::new(pinwatch::LogSink);

    let mut monitor = PinMonitor::new(config, sink);
    monitor.set_simulation(simulate);
    let monitor = Arc::new(monitor);

    if let Err(e) = monitor.start() {
        tracing::error!("Failed to start monitoring: {e}");
        std::process::exit(1);
    }

    // Start the web API on a background runtime.
    #[cfg(feature = "server")]
    let (_runtime, _shutdown_tx) = {
        let (host, port) = bind;
        let runtime = tokio::runtime::Runtime::new().expect("failed to start async runtime");
        let server_config = pinwatch::server::ServerConfig::new(host, port);
        match runtime.block_on(pinwatch::server::run(server_config, monitor.clone(), updates)) {
            Ok((addr, shutdown_tx)) => {
                tracing::info!("Dashboard available at http://{addr}");
                (runtime, shutdown_tx)
            }
            Err(e) => {
                tracing::error!("Failed to start server: {e}");
                monitor.stop();
                std::process::exit(1);
            }
        }
    };

    // Run until Ctrl+C.
    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }

    tracing::info!("Received shutdown signal, stopping...");
    #[cfg(feature = "server")]
    let _ = _shutdown_tx.send(());
    monitor.stop();
}

fn cmd_config(config_path: Option<PathBuf>) {
    let path = config_path.unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&path);

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {}", path.display());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");
}

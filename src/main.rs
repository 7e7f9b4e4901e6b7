use anyhow::{Context, Result};
use led_matrix_spi::config::{Config, DEFAULT_CONFIG_PATH};
use led_matrix_spi::daemon::Daemon;
use log::{error, info};
use tokio::signal::unix::{signal, SignalKind};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logger();

    // Parse command line arguments
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    info!("LED matrix SPI test starting...");
    info!("Loading configuration from: {}", config_path);

    let config = Config::load(&config_path)?;
    info!("Configuration loaded successfully");

    // Validate SPI device
    let spi_device_path = config.spi.device_path();
    if !spi_device_path.exists() {
        error!("SPI device not found: {}", spi_device_path.display());
        return Err(anyhow::anyhow!(
            "SPI device not found: {}",
            spi_device_path.display()
        ));
    }

    let mut daemon = Daemon::new(config)?;

    // Setup signal handling via tokio
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("Failed to setup SIGHUP handler")?;

    info!("Daemon started successfully");

    loop {
        tokio::select! {
            result = daemon.poll() => {
                if let Err(e) = result {
                    error!("Frame error: {:#}", e);
                    return Err(e);
                }
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully");
                break;
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully");
                break;
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP, reloading configuration");
                let new_config = Config::load(&config_path)?;
                daemon.reload_config(new_config)?;
            }
        }
    }

    daemon.blank()?;
    info!("LED matrix SPI test shutdown complete");
    Ok(())
}

fn init_logger() {
    // Use `env_logger` for logging. Systemd/journald will capture stdout/stderr.
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();
}

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use stagectl::config::AppConfig;
use stagectl::socket_server::SocketServer;
use stagectl::stage::Stage;
use stagectl::stage_manager::StageManager;
use stagectl::transport::SimulatedController;
use stagectl::StageError;

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - linear stage control daemon");

#[derive(Debug, Parser)]
#[command(version = env!("CARGO_PKG_VERSION"), about = PKG_DESCRIPTION)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print the default configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Serial device of the controller
    #[arg(short = 'p', long = "port")]
    port: Option<String>,
    /// Serial baud rate
    #[arg(short = 'b', long = "baud")]
    baud: Option<u32>,
    /// Unix socket path for clients
    #[arg(short = 's', long = "socket")]
    socket: Option<String>,
    /// Use an in-process simulated controller instead of a serial port
    #[arg(long = "simulate")]
    simulate: bool,
}

fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path)?,
        None => AppConfig::default(),
    };
    if let Some(port) = &cli.port {
        config.stage.serial.port = port.clone();
    }
    if let Some(baud) = cli.baud {
        config.stage.serial.baud_rate = baud;
    }
    if let Some(socket) = &cli.socket {
        config.server.socket_path = socket.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", AppConfig::example_toml());
        return Ok(());
    }

    let config = resolve_config(&cli)?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level())
        .init();

    info!("Starting {}", PKG_DESCRIPTION);

    let mut stage = if cli.simulate {
        info!("Using simulated controller");
        Stage::with_transport(Box::new(SimulatedController::new()), &config.stage).await?
    } else {
        Stage::connect(&config.stage).await?
    };

    if config.stage.home_on_connect {
        // Ctrl-C ends homing at the next poll instead of mid-frame.
        let cancel = stage.cancel_token();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling homing");
                cancel.cancel();
            }
        });
        let homed = stage.home().await;
        interrupt.abort();

        match homed {
            Ok(_) => {}
            Err(StageError::Cancelled { .. }) => {
                drop(stage);
                info!("Homing cancelled, stage released");
                return Ok(());
            }
            Err(e) => {
                error!("Homing failed: {}", e);
                if e.is_fatal() {
                    return Err(e.into());
                }
            }
        }
    }

    let manager = StageManager::new(stage, config.manager.clone());
    let mut socket_server = SocketServer::new(config.server.clone(), manager.handle());

    let served = async {
        socket_server.start().await?;
        info!("Press Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;
        Ok::<(), anyhow::Error>(())
    }
    .await;

    if let Err(e) = &served {
        warn!("Server stopped with error: {}", e);
    }

    info!("Shutting down");
    socket_server.shutdown().await?;
    manager.shutdown().await?;
    info!("Stage released");

    served
}

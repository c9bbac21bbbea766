//! Newline-delimited JSON over a Unix socket, for measurement scripts that
//! drive the stage from another process.

pub mod client_command;
pub mod config;
pub mod error;
pub mod server_response;

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::{path::Path, sync::Arc};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, Semaphore};
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, error, info, warn};

use crate::stage_manager::StageHandle;
use client_command::{ClientCommand, ClientEnvelope};
use config::SocketServerConfig;
use server_response::ServerResponse;

pub struct SocketServer {
    config: SocketServerConfig,
    stage: StageHandle,
    shutdown_tx: Option<broadcast::Sender<()>>,
}

impl SocketServer {
    pub fn new(config: SocketServerConfig, stage: StageHandle) -> Self {
        Self {
            config,
            stage,
            shutdown_tx: None,
        }
    }

    /// Binds the socket (replacing a stale file) and spawns the accept loop.
    pub async fn start(&mut self) -> Result<()> {
        self.remove_socket_file().await?;

        let listener = UnixListener::bind(&self.config.socket_path)?;
        info!("Socket server listening on: {}", self.config.socket_path);

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        self.shutdown_tx = Some(shutdown_tx);

        let slots = Arc::new(Semaphore::new(self.config.max_connections));
        tokio::spawn(Self::accept_loop(
            listener,
            self.stage.clone(),
            slots,
            shutdown_rx,
        ));

        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(());
        }
        self.remove_socket_file().await?;

        info!("Socket server shutdown complete");
        Ok(())
    }

    async fn remove_socket_file(&self) -> Result<()> {
        if Path::new(&self.config.socket_path).exists() {
            tokio::fs::remove_file(&self.config.socket_path).await?;
        }
        Ok(())
    }

    async fn accept_loop(
        listener: UnixListener,
        stage: StageHandle,
        slots: Arc<Semaphore>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let stream = match accepted {
                        Ok((stream, _addr)) => stream,
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };

                    // The permit lives as long as the client task.
                    let Ok(permit) = slots.clone().try_acquire_owned() else {
                        warn!("Maximum connections reached, rejecting new connection");
                        continue;
                    };
                    debug!(
                        "New client connected. Free slots: {}",
                        slots.available_permits()
                    );

                    let stage = stage.clone();
                    let mut client_shutdown = shutdown_rx.resubscribe();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_client(stream, stage, &mut client_shutdown).await {
                            error!("Client handler error: {}", e);
                        }
                        drop(permit);
                    });
                }
                _ = shutdown_rx.recv() => {
                    info!("Socket server shutting down");
                    break;
                }
            }
        }
    }

    async fn handle_client(
        stream: UnixStream,
        stage: StageHandle,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<()> {
        let mut framed = Framed::new(stream, LinesCodec::new());

        loop {
            let line = tokio::select! {
                next = framed.next() => match next {
                    Some(Ok(line)) => line,
                    Some(Err(e)) => {
                        error!("Error reading from client: {}", e);
                        break;
                    }
                    None => {
                        debug!("Client disconnected");
                        break;
                    }
                },
                _ = shutdown_rx.recv() => {
                    debug!("Shutdown signal received, closing client connection");
                    break;
                }
            };

            debug!("Received request: {}", line);
            let response = Self::process_request(&line, &stage).await;
            if let Err(e) = framed.send(response.to_json()?).await {
                error!("Failed to send response: {}", e);
                break;
            }
        }

        Ok(())
    }

    async fn process_request(line: &str, stage: &StageHandle) -> ServerResponse {
        let envelope = match ClientEnvelope::parse(line) {
            Ok(envelope) => envelope,
            Err(e) => return ServerResponse::error(None, format!("Failed to parse request: {}", e)),
        };

        match Self::execute_command(envelope.cmd, stage).await {
            Ok(data) => ServerResponse::success(envelope.id, data),
            Err(e) => {
                warn!("Request failed: {}", e);
                ServerResponse::failure(envelope.id, &e)
            }
        }
    }

    async fn execute_command(
        command: ClientCommand,
        stage: &StageHandle,
    ) -> Result<serde_json::Value> {
        let data = match command {
            ClientCommand::Home => json!({ "state": stage.home().await? }),
            ClientCommand::Move { target } => {
                serde_json::to_value(stage.move_absolute(target).await?)?
            }
            ClientCommand::GetPosition => json!({ "position": stage.get_position().await? }),
            ClientCommand::GetError => json!({ "error": stage.get_error().await?.as_str() }),
            ClientCommand::GetState => serde_json::to_value(stage.get_state().await?)?,
            ClientCommand::Ping => json!({
                "message": "pong",
                "timestamp": chrono::Utc::now().to_rfc3339()
            }),
        };
        Ok(data)
    }
}

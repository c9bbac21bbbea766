//! Owns the stage inside one task so every protocol exchange is serialized,
//! whichever task asked for it.

pub mod command;
pub mod config;

use command::Command;
use config::ManagerConfig;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::axis::state::ControllerState;
use crate::axis::state_info::StateInfo;
use crate::controller::completion::MoveOutcome;
use crate::error::StageResult;
use crate::protocol::error::ErrorCode;
use crate::stage::Stage;

pub struct StageManager {
    cmd_sender: mpsc::Sender<Command>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StageManager {
    pub fn new(mut stage: Stage, config: ManagerConfig) -> Self {
        let (tx, rx) = mpsc::channel::<Command>(config.queue_capacity);

        let cancel = CancellationToken::new();
        stage.set_cancel_token(cancel.clone());

        let task = tokio::spawn(Self::command_loop(stage, rx, cancel.clone()));

        StageManager {
            cmd_sender: tx,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn handle(&self) -> StageHandle {
        StageHandle {
            cmd_sender: self.cmd_sender.clone(),
        }
    }

    /// Interrupts any poll loop at its next iteration, drops queued
    /// requests, and waits until the stage (and its port) is released.
    pub async fn shutdown(&self) -> Result<()> {
        self.cancel.cancel();
        if let Some(task) = self.task.lock().await.take() {
            task.await?;
        }
        info!("Stage manager shut down");
        Ok(())
    }

    async fn command_loop(
        mut stage: Stage,
        mut rx: mpsc::Receiver<Command>,
        cancel: CancellationToken,
    ) {
        loop {
            let cmd = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                cmd = rx.recv() => match cmd {
                    Some(cmd) => cmd,
                    None => break,
                },
            };

            match cmd {
                Command::Home { resp } => {
                    let result = stage.home().await;
                    let _ = resp.send(result);
                }
                Command::Move { target, resp } => {
                    let result = stage.move_absolute(target).await;
                    let _ = resp.send(result);
                }
                Command::GetPos { resp } => {
                    let result = stage.get_position().await;
                    let _ = resp.send(result);
                }
                Command::GetError { resp } => {
                    let result = stage.get_error().await;
                    let _ = resp.send(result);
                }
                Command::GetState { resp } => {
                    let result = stage.state().await;
                    let _ = resp.send(result);
                }
            }
        }

        debug!("Stage command loop exiting, releasing transport");
    }
}

impl Drop for StageManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Cheap clonable client of a [`StageManager`].
#[derive(Clone)]
pub struct StageHandle {
    cmd_sender: mpsc::Sender<Command>,
}

impl StageHandle {
    pub async fn home(&self) -> Result<ControllerState> {
        self.request(|resp| Command::Home { resp }).await
    }

    pub async fn move_absolute(&self, target: f64) -> Result<MoveOutcome> {
        self.request(|resp| Command::Move { target, resp }).await
    }

    pub async fn get_position(&self) -> Result<Option<f64>> {
        self.request(|resp| Command::GetPos { resp }).await
    }

    pub async fn get_error(&self) -> Result<ErrorCode> {
        self.request(|resp| Command::GetError { resp }).await
    }

    pub async fn get_state(&self) -> Result<StateInfo> {
        self.request(|resp| Command::GetState { resp }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<StageResult<T>>) -> Command,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_sender
            .send(build(tx))
            .await
            .map_err(|_| anyhow!("Stage manager is not running"))?;
        let result = rx
            .await
            .map_err(|_| anyhow!("Stage manager stopped before replying"))?;
        Ok(result?)
    }
}

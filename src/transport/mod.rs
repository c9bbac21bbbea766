//! Byte channel to the controller.

pub mod config;
pub mod mock;
pub mod serial;
pub mod simulated;

use std::time::Duration;

pub use config::SerialConfig;
pub use mock::ScriptedTransport;
pub use serial::SerialTransport;
pub use simulated::SimulatedController;

/// Duplex line-oriented channel. Exactly one owner issues requests.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn write(&mut self, bytes: &[u8]) -> std::io::Result<()>;

    /// Next line without its terminator, or an empty string once `timeout`
    /// elapses. Never blocks past `timeout`.
    async fn read_line(&mut self, timeout: Duration) -> std::io::Result<String>;

    /// Drops bytes already buffered from the device.
    async fn discard_input(&mut self) -> std::io::Result<()>;
}

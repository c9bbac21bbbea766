pub mod axis;
pub mod config;
pub mod controller;
pub mod error;
pub mod measurement;
pub mod protocol;
pub mod socket_server;
pub mod stage;
pub mod stage_manager;
pub mod transport;

pub use error::{StageError, StageResult};
pub use stage::Stage;

use serde::{Deserialize, Serialize};

use crate::axis::AxisId;
use crate::controller::completion::CompletionStrategy;
use crate::controller::config::ControllerTiming;
use crate::transport::SerialConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub axis: AxisId,
    pub completion: CompletionStrategy,
    /// Home once right after the port is opened.
    pub home_on_connect: bool,
    pub serial: SerialConfig,
    pub timing: ControllerTiming,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            axis: AxisId::default(),
            completion: CompletionStrategy::default(),
            home_on_connect: true,
            serial: SerialConfig::default(),
            timing: ControllerTiming::default(),
        }
    }
}

use tokio::sync::oneshot;

use crate::axis::state::ControllerState;
use crate::axis::state_info::StateInfo;
use crate::controller::completion::MoveOutcome;
use crate::error::StageResult;
use crate::protocol::error::ErrorCode;

#[derive(Debug)]
pub enum Command {
    Home {
        resp: oneshot::Sender<StageResult<ControllerState>>,
    },
    Move {
        target: f64,
        resp: oneshot::Sender<StageResult<MoveOutcome>>,
    },
    GetPos {
        resp: oneshot::Sender<StageResult<Option<f64>>>,
    },
    GetError {
        resp: oneshot::Sender<StageResult<ErrorCode>>,
    },
    GetState {
        resp: oneshot::Sender<StageResult<StateInfo>>,
    },
}

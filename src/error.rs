//! Error types of the Tokio runtime.

use tick_fsm_core::FsmError;

/// Error returned by [`MachineHandle`](crate::MachineHandle) requests.
#[derive(Debug, thiserror::Error)]
pub enum HandleError {
    /// The machine rejected the operation.
    #[error("FSM error: {0}")]
    Fsm(#[from] FsmError),
    /// The machine task has exited; the request was not processed.
    #[error("machine task is no longer running")]
    Closed,
}

/// Error returned when awaiting a [`MachineTask`](crate::MachineTask).
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The machine task panicked or was aborted.
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Invalid runtime configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The tick interval could not be parsed as a duration such as `"250ms"`.
    #[error("invalid tick interval {value:?}: {source}")]
    Interval {
        value: String,
        #[source]
        source: humantime::DurationError,
    },
    #[error("tick interval must be greater than zero")]
    ZeroInterval,
    /// The command channel size is not an unsigned integer.
    #[error("invalid channel size {value:?}: {source}")]
    ChannelSize {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("channel size must be greater than zero")]
    ZeroChannelSize,
}

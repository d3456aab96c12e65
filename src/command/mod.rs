pub mod codec;
pub mod builder;
pub mod task;

pub use codec::{Command, Opcode, Param, ParamValue};
pub use task::{
    completion_channel, listener_fn, CompletionListener, CompletionMarker, QueueItem, Task,
    TaskOutcome,
};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Empty command line")]
    EmptyLine,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Malformed parameter token: {0}")]
    MalformedParameter(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, CodecError>;

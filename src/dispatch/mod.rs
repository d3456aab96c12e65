//! Command dispatch state machine.
//!
//! Exactly one command is in flight at a time. A command is resolved by a
//! Status record (accepted), an Error record (its unit is culled) or the ack
//! timeout (retried at the head of the queue until the failure budget runs out).
pub mod types;
pub mod worker;

pub use types::*;
pub use worker::Dispatcher;

//! Client library for networked data-acquisition boards.
//!
//! A [`Session`] owns one board connection. Commands built with
//! [`command::builder`] are queued on the session's [`Dispatcher`], which
//! sends them one at a time and waits for the board's Status or Error record.
//! Inbound records are framed and classified by [`message`]; sampled data is
//! handed to a [`DataSink`].
pub mod command;
pub mod config;
pub mod dispatch;
pub mod message;
pub mod session;
pub mod transport;

pub use command::{builder, Command, CompletionListener, Opcode, Param, ParamValue, Task, TaskOutcome};
pub use config::SessionConfig;
pub use dispatch::{CriticalError, CriticalErrorListener, DispatchMetrics, Dispatcher, PurgeMode};
pub use message::{MessageKind, RawMessage};
pub use session::{BroadcastSink, DataEvent, DataSink, Session};
pub use transport::{Connection, Connector, EthernetConnector, SerialConnector, Transport};

use serde::{Deserialize, Serialize};

/// Number of digital outputs reported in a digital output record.
pub const DIGITAL_OUTPUT_STATES: usize = 16;

/// Free-text board message (debug, status, error, command echo).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMessage {
    /// Text following the `Message: ` tag, or the trimmed record when absent
    pub body: String,
    /// Unmodified record
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogReading {
    pub channel: u8,
    /// Board timestamp
    pub timestamp: u64,
    /// Raw ADC count
    pub reading: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitalReading {
    pub channel: u8,
    pub timestamp: u64,
    pub high: bool,
}

/// Snapshot of every digital output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitalOutputState {
    /// Index 0 = most significant bit of the reported mask
    pub outputs: [bool; DIGITAL_OUTPUT_STATES],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PwmReading {
    pub channel: u8,
    pub timestamp: u64,
    /// Edge transitions counted during the sample window
    pub transitions: u32,
    /// Percentage of the window spent high
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Debug,
    Status,
    Error,
    CommandEcho,
    AnalogData,
    DigitalData,
    DigitalOutputData,
    PwmData,
}

/// A classified inbound record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawMessage {
    Debug(TextMessage),
    Status(TextMessage),
    Error {
        message: TextMessage,
        /// Raised by the board's network stack
        network: bool,
    },
    CommandEcho(TextMessage),
    AnalogData(AnalogReading),
    DigitalData(DigitalReading),
    DigitalOutputData(DigitalOutputState),
    PwmData(PwmReading),
}

impl RawMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            RawMessage::Debug(_) => MessageKind::Debug,
            RawMessage::Status(_) => MessageKind::Status,
            RawMessage::Error { .. } => MessageKind::Error,
            RawMessage::CommandEcho(_) => MessageKind::CommandEcho,
            RawMessage::AnalogData(_) => MessageKind::AnalogData,
            RawMessage::DigitalData(_) => MessageKind::DigitalData,
            RawMessage::DigitalOutputData(_) => MessageKind::DigitalOutputData,
            RawMessage::PwmData(_) => MessageKind::PwmData,
        }
    }

    /// Input channel for channel-bearing data messages.
    pub fn channel(&self) -> Option<u8> {
        match self {
            RawMessage::AnalogData(r) => Some(r.channel),
            RawMessage::DigitalData(r) => Some(r.channel),
            RawMessage::PwmData(r) => Some(r.channel),
            _ => None,
        }
    }

    /// True for sampled data that is published to the data sink.
    pub fn is_data(&self) -> bool {
        matches!(
            self,
            RawMessage::AnalogData(_)
                | RawMessage::DigitalData(_)
                | RawMessage::DigitalOutputData(_)
                | RawMessage::PwmData(_)
        )
    }

    pub fn text(&self) -> Option<&TextMessage> {
        match self {
            RawMessage::Debug(t) | RawMessage::Status(t) | RawMessage::CommandEcho(t) => Some(t),
            RawMessage::Error { message, .. } => Some(message),
            _ => None,
        }
    }
}

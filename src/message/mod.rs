pub mod types;
pub mod parser;
pub mod framer;

pub use types::*;
pub use parser::{classify, classify_or_drop};
pub use framer::{RecordFramer, RECORD_SEPARATOR};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Unrecognized record")]
    Unrecognized,

    #[error("Deprecated {0} record format, upgrade the board firmware")]
    DeprecatedFirmware(&'static str),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Invalid output mask: {0}")]
    InvalidHex(String),
}

pub type Result<T> = std::result::Result<T, ParseError>;

//! Splits the inbound byte stream into records.
use std::io;

use futures_util::stream::{self, Stream, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use super::parser::classify_or_drop;
use super::types::RawMessage;

/// Byte separating inbound records.
pub const RECORD_SEPARATOR: u8 = 0x1E;

pub const DEFAULT_MAX_RECORD_LEN: usize = 64 * 1024;

pub struct RecordFramer<R> {
    reader: BufReader<R>,
    max_record_len: usize,
    dropped: u64,
}

impl<R: AsyncRead + Unpin> RecordFramer<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_len(reader, DEFAULT_MAX_RECORD_LEN)
    }

    pub fn with_max_len(reader: R, max_record_len: usize) -> Self {
        Self {
            reader: BufReader::new(reader),
            max_record_len,
            dropped: 0,
        }
    }

    /// Records discarded so far (empty or oversized).
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Next non-empty record, or `None` once the source is exhausted.
    ///
    /// A trailing record without separator is returned at end of stream.
    pub async fn next_record(&mut self) -> io::Result<Option<String>> {
        loop {
            let mut record = Vec::new();
            let mut oversized = false;
            let mut terminated = false;

            loop {
                let available = self.reader.fill_buf().await?;
                if available.is_empty() {
                    break;
                }
                let (take, used) = match available.iter().position(|&b| b == RECORD_SEPARATOR) {
                    Some(pos) => {
                        terminated = true;
                        (pos, pos + 1)
                    }
                    None => (available.len(), available.len()),
                };
                if !oversized {
                    if record.len() + take > self.max_record_len {
                        oversized = true;
                        record.clear();
                    } else {
                        record.extend_from_slice(&available[..take]);
                    }
                }
                self.reader.consume(used);
                if terminated {
                    break;
                }
            }

            if oversized {
                self.dropped += 1;
                log::warn!("Dropping record longer than {} bytes", self.max_record_len);
            } else if !record.iter().all(|b| b.is_ascii_whitespace()) {
                return Ok(Some(String::from_utf8_lossy(&record).into_owned()));
            } else if terminated {
                self.dropped += 1;
                log::warn!("Dropping empty record");
            }

            if !terminated {
                return Ok(None);
            }
        }
    }

    /// Lazy stream of records; ends at end of input or after the first read error.
    pub fn into_stream(self) -> impl Stream<Item = io::Result<String>> {
        stream::unfold(Some(self), |state| async move {
            let mut framer = state?;
            match framer.next_record().await {
                Ok(Some(record)) => Some((Ok(record), Some(framer))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    /// Records classified into messages; unparseable records are logged and skipped.
    pub fn into_messages(self) -> impl Stream<Item = io::Result<RawMessage>> {
        self.into_stream().filter_map(|item| async move {
            match item {
                Ok(record) => classify_or_drop(&record).map(Ok),
                Err(e) => Some(Err(e)),
            }
        })
    }
}

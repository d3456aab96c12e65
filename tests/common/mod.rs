#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use daqlink::command::{listener_fn, CompletionListener, TaskOutcome};
use daqlink::dispatch::{CriticalError, CriticalErrorListener};
use daqlink::transport::{self, Transport, TransportError};

pub const STATUS_RECORD: &[u8] = b"Status Message\r\nMessage: ok\r\n\x1e";
pub const ERROR_RECORD: &[u8] = b"Error Message\r\nMessage: rejected\r\n\x1e";

/// Transport that records each written command line.
pub struct MockTransport {
    connected: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    writes_tx: mpsc::UnboundedSender<String>,
}

/// Test-side view of a [`MockTransport`].
pub struct MockBoard {
    pub connected: Arc<AtomicBool>,
    pub fail_writes: Arc<AtomicBool>,
    writes_rx: mpsc::UnboundedReceiver<String>,
}

pub fn mock_transport() -> (Box<dyn Transport>, MockBoard) {
    let connected = Arc::new(AtomicBool::new(true));
    let fail_writes = Arc::new(AtomicBool::new(false));
    let (writes_tx, writes_rx) = mpsc::unbounded_channel();
    let transport = MockTransport {
        connected: connected.clone(),
        fail_writes: fail_writes.clone(),
        writes_tx,
    };
    (Box::new(transport), MockBoard { connected, fail_writes, writes_rx })
}

#[async_trait]
impl Transport for MockTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn write(&mut self, data: &[u8]) -> transport::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            self.connected.store(false, Ordering::SeqCst);
            return Err(TransportError::IoError(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock write failure",
            )));
        }
        let line = String::from_utf8_lossy(data).trim_end_matches('\r').to_string();
        let _ = self.writes_tx.send(line);
        Ok(())
    }
}

impl MockBoard {
    /// Wait for the next written line.
    pub async fn next_write(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(60), self.writes_rx.recv())
            .await
            .expect("timed out waiting for a write")
            .expect("transport dropped")
    }

    /// A line already written but not yet taken, if any.
    pub fn try_write(&mut self) -> Option<String> {
        self.writes_rx.try_recv().ok()
    }
}

/// Let spawned tasks run without advancing the clock.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

pub fn critical_recorder() -> (Arc<dyn CriticalErrorListener>, Arc<Mutex<Vec<CriticalError>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let listener: Arc<dyn CriticalErrorListener> = Arc::new(move |error: CriticalError| {
        sink.lock().unwrap().push(error);
    });
    (listener, seen)
}

pub fn outcome_recorder() -> (Arc<dyn CompletionListener>, Arc<Mutex<Vec<TaskOutcome>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let listener = listener_fn(move |outcome| sink.lock().unwrap().push(outcome));
    (listener, seen)
}

/// Board loop: reply to every received command line with `reply`, forwarding
/// the line to `lines_tx`.
pub async fn answer_every_line<S>(stream: S, reply: &'static [u8], lines_tx: mpsc::UnboundedSender<String>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\r', &mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let text = String::from_utf8_lossy(&line).trim_end_matches('\r').to_string();
        let _ = lines_tx.send(text);
        if write_half.write_all(reply).await.is_err() {
            break;
        }
    }
}

/// TCP board that acknowledges every command line with a Status record.
/// Returns the port and a channel of received lines.
pub async fn spawn_acking_board() -> (u16, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (lines_tx, lines_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(answer_every_line(socket, STATUS_RECORD, lines_tx.clone()));
        }
    });

    (port, lines_rx)
}

/// Read one `\r`-terminated command line from the board side of a stream.
pub async fn read_command<R: AsyncBufRead + Unpin>(reader: &mut R) -> String {
    let mut line = Vec::new();
    reader.read_until(b'\r', &mut line).await.unwrap();
    String::from_utf8_lossy(&line).trim_end_matches('\r').to_string()
}

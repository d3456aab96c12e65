pub mod ethernet;
pub mod serial;

pub use ethernet::EthernetConnector;
pub use serial::{SerialConnector, SerialDeviceInfo};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Not connected")]
    NotConnected,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Outbound half of a board connection.
#[async_trait]
pub trait Transport: Send {
    fn is_connected(&self) -> bool;

    /// Write all of `data` and flush.
    async fn write(&mut self, data: &[u8]) -> Result<()>;
}

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// An opened board connection, split into its two directions.
pub struct Connection {
    pub reader: BoxedReader,
    pub writer: Box<dyn Transport>,
}

impl Connection {
    /// Split any duplex byte stream.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Box::new(reader),
            writer: Box::new(StreamTransport::new(writer)),
        }
    }
}

/// Opens connections to one board.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Connection>;

    /// Human-readable endpoint, used in logs.
    fn describe(&self) -> String;
}

/// [`Transport`] over any async writer.
pub struct StreamTransport<W> {
    writer: W,
    connected: Arc<AtomicBool>,
}

impl<W: AsyncWrite + Send + Unpin> StreamTransport<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Flag shared with the owner; clearing it marks the transport disconnected.
    pub fn connected_flag(&self) -> Arc<AtomicBool> {
        self.connected.clone()
    }
}

#[async_trait]
impl<W: AsyncWrite + Send + Unpin> Transport for StreamTransport<W> {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let result = async {
            self.writer.write_all(data).await?;
            self.writer.flush().await
        }
        .await;
        if let Err(e) = result {
            self.connected.store(false, Ordering::SeqCst);
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_stream_transport_writes_and_flags() {
        let (client, mut board) = tokio::io::duplex(64);
        let mut connection = Connection::from_stream(client);
        assert!(connection.writer.is_connected());
        connection.writer.write(b"HALT\r").await.unwrap();

        let mut buf = [0u8; 5];
        board.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"HALT\r");
    }

    #[tokio::test]
    async fn test_cleared_flag_blocks_writes() {
        let (client, _board) = tokio::io::duplex(64);
        let mut transport = StreamTransport::new(client);
        transport.connected_flag().store(false, Ordering::SeqCst);
        assert!(matches!(transport.write(b"x").await, Err(TransportError::NotConnected)));
    }
}

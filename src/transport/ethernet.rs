use std::time::Duration;
use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{Connection, Connector, Result, TransportError};

/// Telnet command port exposed by the board.
pub const TELNET_PORT: u16 = 9801;
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Telnet-over-TCP connection to a board.
#[derive(Debug, Clone)]
pub struct EthernetConnector {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl EthernetConnector {
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_port(host, TELNET_PORT)
    }

    pub fn with_port(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

#[async_trait]
impl Connector for EthernetConnector {
    async fn connect(&self) -> Result<Connection> {
        let addr = (self.host.as_str(), self.port);
        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::ConnectionFailed(format!("{} timed out", self.describe())))?
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", self.describe(), e)))?;
        stream.set_nodelay(true)?;

        log::info!("Connected to board at {}", self.describe());
        Ok(Connection::from_stream(stream))
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connects_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 9];
            socket.read_exact(&mut buf).await.unwrap();
            buf
        });

        let connector = EthernetConnector::with_port("127.0.0.1", port);
        let mut connection = connector.connect().await.unwrap();
        connection.writer.write(b"IDENTIFY\r").await.unwrap();
        assert_eq!(&accept.await.unwrap(), b"IDENTIFY\r");
    }

    #[tokio::test]
    async fn test_refused_connection_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let result = EthernetConnector::with_port("127.0.0.1", port).connect().await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }
}

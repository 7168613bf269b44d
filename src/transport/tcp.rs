//! Length-prefixed framing over TCP.
//!
//! Every buffer on every camera port is preceded by a little-endian `u32`
//! holding the total frame size, prefix included:
//!
//! ```text
//! +-----------------+---------------------------+
//! | Length (u32 LE) | Buffer (length - 4 bytes) |
//! +-----------------+---------------------------+
//! ```

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use super::{Channel, Connector, Port};
use crate::config::ClientConfig;

/// Size of the length prefix
const LENGTH_PREFIX: usize = 4;

/// Largest frame accepted from the camera. Live-view JPEGs stay well below.
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

/// A byte stream carrying length-prefixed buffers.
#[derive(Debug)]
pub struct FramedChannel<S> {
    stream: S,
}

impl<S> FramedChannel<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S> Channel for FramedChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let total = u32::try_from(bytes.len() + LENGTH_PREFIX)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "buffer too large"))?;
        let mut frame = Vec::with_capacity(bytes.len() + LENGTH_PREFIX);
        frame.extend_from_slice(&total.to_le_bytes());
        frame.extend_from_slice(bytes);
        self.stream.write_all(&frame).await?;
        self.stream.flush().await
    }

    async fn read(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        let total = match self.stream.read_u32_le().await {
            Ok(total) => total as usize,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                buf.clear();
                return Ok(0);
            }
            Err(e) => return Err(e),
        };
        if !(LENGTH_PREFIX..=MAX_FRAME_LEN).contains(&total) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid frame length {}", total),
            ));
        }
        buf.resize(total - LENGTH_PREFIX, 0);
        self.stream.read_exact(buf).await?;
        Ok(buf.len())
    }
}

/// Connects to the camera's fixed ports over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    control_port: u16,
    async_port: u16,
    live_view_port: u16,
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            host: config.host.clone(),
            control_port: config.control_port,
            async_port: config.async_port,
            live_view_port: config.live_view_port,
            connect_timeout: config.connect_timeout(),
        }
    }

    fn port_number(&self, port: Port) -> u16 {
        match port {
            Port::Control => self.control_port,
            Port::AsyncNotification => self.async_port,
            Port::LiveView => self.live_view_port,
        }
    }
}

impl Connector for TcpConnector {
    type Channel = FramedChannel<TcpStream>;

    async fn connect(&self, port: Port) -> io::Result<Self::Channel> {
        let addr = (self.host.as_str(), self.port_number(port));
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
        stream.set_nodelay(true)?;
        debug!(%port, host = %self.host, port_number = addr.1, "connected");
        Ok(FramedChannel::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_write_prefixes_length() {
        let mock = Builder::new()
            .write(&[0x0c, 0x00, 0x00, 0x00, 0x01, 0x00, 0x03, 0x10, 0x05, 0x00, 0x00, 0x00])
            .build();
        let mut channel = FramedChannel::new(mock);
        channel
            .write(&[0x01, 0x00, 0x03, 0x10, 0x05, 0x00, 0x00, 0x00])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_read_strips_length() {
        let mock = Builder::new()
            .read(&[0x0c, 0x00, 0x00, 0x00])
            .read(&[0x03, 0x00, 0x01, 0x20])
            .read(&[0x05, 0x00, 0x00, 0x00])
            .build();
        let mut channel = FramedChannel::new(mock);
        let mut buf = Vec::new();
        let n = channel.read(&mut buf).await.unwrap();
        assert_eq!(n, 8);
        assert_eq!(buf, vec![0x03, 0x00, 0x01, 0x20, 0x05, 0x00, 0x00, 0x00]);
    }

    #[tokio::test]
    async fn test_read_eof_is_zero() {
        let mock = Builder::new().build();
        let mut channel = FramedChannel::new(mock);
        let mut buf = vec![1, 2, 3];
        assert_eq!(channel.read(&mut buf).await.unwrap(), 0);
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_read_rejects_bad_length() {
        let mock = Builder::new().read(&[0x02, 0x00, 0x00, 0x00]).build();
        let mut channel = FramedChannel::new(mock);
        let mut buf = Vec::new();
        let err = channel.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}

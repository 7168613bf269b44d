//! Channel abstraction over the camera's three TCP endpoints.
//!
//! The session only needs to connect a channel by role, write one buffer
//! and read one buffer. [`tcp`] provides the real implementation; tests
//! plug in a simulated camera.

pub mod tcp;

use std::fmt;
use std::future::Future;
use std::io;

pub use tcp::{FramedChannel, TcpConnector};

/// Role of a camera endpoint. Each role is served on its own fixed port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Port {
    /// Request/response exchanges and settings queries
    Control,
    /// Push-style completion signals, opened after the handshake
    AsyncNotification,
    /// Unsolicited live-view frame stream
    LiveView,
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Port::Control => f.write_str("control"),
            Port::AsyncNotification => f.write_str("async-notification"),
            Port::LiveView => f.write_str("live-view"),
        }
    }
}

/// One connected, buffer-oriented channel.
pub trait Channel: Send + 'static {
    /// Write one complete buffer.
    fn write(&mut self, bytes: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Read one complete buffer into `buf`, replacing its contents.
    ///
    /// Returns the buffer length; zero means the peer closed the channel.
    fn read(&mut self, buf: &mut Vec<u8>) -> impl Future<Output = io::Result<usize>> + Send;
}

/// Opens channels to the camera by role.
pub trait Connector: Send + Sync {
    type Channel: Channel;

    fn connect(&self, port: Port) -> impl Future<Output = io::Result<Self::Channel>> + Send;
}

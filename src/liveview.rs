//! Live-view frame reader.
//!
//! The camera pushes one buffer per preview frame on its own port. Each
//! buffer starts with a 14-byte preamble followed by a JPEG image. The
//! reader task owns the channel; the only state shared with the caller is
//! the stop flag and a frame counter.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::ParseError;
use crate::session::Session;
use crate::transport::{Channel, Connector, Port};

pub const PREAMBLE_LEN: usize = 14;

/// Initial read buffer, sized for a typical preview JPEG
const FRAME_BUFFER_CAPACITY: usize = 1024 * 1024;

/// Leading bytes of a live-view buffer.
///
/// Only the frame counter at offset 4 is understood; the rest is kept as
/// received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePreamble {
    raw: [u8; PREAMBLE_LEN],
}

impl FramePreamble {
    /// Counter the camera increments once per frame sent.
    pub fn frame_number(&self) -> u32 {
        u32::from_le_bytes([self.raw[4], self.raw[5], self.raw[6], self.raw[7]])
    }

    pub fn raw(&self) -> &[u8; PREAMBLE_LEN] {
        &self.raw
    }
}

/// One received live-view buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub preamble: FramePreamble,
    buffer: Vec<u8>,
}

impl Frame {
    pub fn parse(buffer: Vec<u8>) -> std::result::Result<Self, ParseError> {
        let raw: [u8; PREAMBLE_LEN] = buffer
            .get(..PREAMBLE_LEN)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(ParseError::InsufficientData {
                needed: PREAMBLE_LEN,
                available: buffer.len(),
            })?;
        Ok(Self {
            preamble: FramePreamble { raw },
            buffer,
        })
    }

    /// The embedded JPEG image.
    pub fn jpeg(&self) -> &[u8] {
        &self.buffer[PREAMBLE_LEN..]
    }

    /// The whole buffer as received.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }
}

/// Handle to a running live-view reader.
pub struct LiveView {
    stop: Arc<AtomicBool>,
    received: Arc<AtomicU64>,
    grace: Duration,
    handle: JoinHandle<Result<()>>,
}

impl LiveView {
    /// Connect the live-view port and start reading frames into `frames`.
    ///
    /// Only allowed once the session handshake is complete.
    pub async fn start<C: Connector>(
        session: &Session<C>,
        frames: mpsc::Sender<Frame>,
    ) -> Result<Self> {
        session.require_ready("live view")?;
        let channel = session
            .connector()
            .connect(Port::LiveView)
            .await
            .map_err(|source| Error::TransportUnavailable {
                port: Port::LiveView,
                source,
            })?;
        info!("live view started");
        Ok(Self::spawn(channel, session.live_view_poll(), frames))
    }

    /// Start a reader on an already connected channel.
    ///
    /// `grace` bounds how long [`LiveView::stop`] waits for an in-flight read.
    pub fn spawn<T: Channel>(channel: T, grace: Duration, frames: mpsc::Sender<Frame>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let received = Arc::new(AtomicU64::new(0));
        let handle = tokio::spawn(read_frames(
            channel,
            Arc::clone(&stop),
            Arc::clone(&received),
            frames,
        ));
        Self {
            stop,
            received,
            grace,
            handle,
        }
    }

    pub fn frames_received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the reader and join it. Returns the number of frames delivered.
    ///
    /// The flag is checked between reads; a reader still blocked on the
    /// camera after the grace period is aborted and then joined, so the
    /// channel is never read after this returns.
    pub async fn stop(mut self) -> Result<u64> {
        self.stop.store(true, Ordering::Release);
        let result = match tokio::time::timeout(self.grace, &mut self.handle).await {
            Ok(joined) => joined,
            Err(_) => {
                debug!("live view reader blocked, aborting");
                self.handle.abort();
                match (&mut self.handle).await {
                    Err(e) if e.is_cancelled() => Ok(Ok(())),
                    other => other,
                }
            }
        };
        let frames = self.frames_received();
        info!(frames, "live view stopped");
        match result {
            Ok(outcome) => outcome.map(|()| frames),
            Err(e) => Err(Error::Io(std::io::Error::other(e))),
        }
    }
}

async fn read_frames<T: Channel>(
    mut channel: T,
    stop: Arc<AtomicBool>,
    received: Arc<AtomicU64>,
    frames: mpsc::Sender<Frame>,
) -> Result<()> {
    let mut buf = Vec::with_capacity(FRAME_BUFFER_CAPACITY);
    while !stop.load(Ordering::Acquire) {
        let n = channel.read(&mut buf).await?;
        if n == 0 {
            info!("live view closed by camera");
            break;
        }
        let frame = match Frame::parse(std::mem::take(&mut buf)) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "dropping short live view buffer");
                continue;
            }
        };
        debug!(
            received = n,
            frame_number = frame.preamble.frame_number(),
            preamble = %hex::encode(frame.preamble.raw()),
            "live view frame"
        );
        if frames.send(frame).await.is_err() {
            debug!("frame consumer gone");
            break;
        }
        received.fetch_add(1, Ordering::Relaxed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    /// Yields queued buffers, then blocks forever.
    struct QueuedFrames(VecDeque<Vec<u8>>);

    impl Channel for QueuedFrames {
        async fn write(&mut self, _bytes: &[u8]) -> io::Result<()> {
            Ok(())
        }

        async fn read(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
            match self.0.pop_front() {
                Some(frame) => {
                    *buf = frame;
                    Ok(buf.len())
                }
                None => std::future::pending().await,
            }
        }
    }

    fn frame_bytes(number: u32, jpeg: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0u8; PREAMBLE_LEN];
        bytes[4..8].copy_from_slice(&number.to_le_bytes());
        bytes.extend_from_slice(jpeg);
        bytes
    }

    #[test]
    fn test_parse_frame() {
        let frame = Frame::parse(frame_bytes(42, &[0xff, 0xd8, 0xff])).unwrap();
        assert_eq!(frame.preamble.frame_number(), 42);
        assert_eq!(frame.jpeg(), &[0xff, 0xd8, 0xff]);
        assert_eq!(frame.buffer().len(), PREAMBLE_LEN + 3);
        assert!(Frame::parse(vec![0; 13]).is_err());
    }

    #[tokio::test]
    async fn test_reader_delivers_frames_and_stops() {
        let channel = QueuedFrames(VecDeque::from(vec![
            frame_bytes(1, &[0xff, 0xd8]),
            vec![0x00, 0x01],
            frame_bytes(2, &[0xff, 0xd8]),
        ]));
        let (tx, mut rx) = mpsc::channel(8);
        let live_view = LiveView::spawn(channel, Duration::from_millis(20), tx);

        assert_eq!(rx.recv().await.unwrap().preamble.frame_number(), 1);
        assert_eq!(rx.recv().await.unwrap().preamble.frame_number(), 2);

        let frames = live_view.stop().await.unwrap();
        assert_eq!(frames, 2);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_reader_ends_when_camera_closes() {
        struct Closed;
        impl Channel for Closed {
            async fn write(&mut self, _bytes: &[u8]) -> io::Result<()> {
                Ok(())
            }
            async fn read(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
                buf.clear();
                Ok(0)
            }
        }

        let (tx, _rx) = mpsc::channel(1);
        let live_view = LiveView::spawn(Closed, Duration::from_millis(20), tx);
        assert_eq!(live_view.stop().await.unwrap(), 0);
    }
}

//! Video recording start/stop pairing.
//!
//! The camera identifies a recording by the correlation id of the request
//! that started it; stopping must echo that id in the stop payload.

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::protocol::{self, MessageType};
use crate::session::Session;
use crate::transport::Connector;

/// Tracks the one recording a session may have running.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecordingTracker {
    active: Option<u32>,
}

impl RecordingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the running recording, if any.
    pub fn active(&self) -> Option<u32> {
        self.active
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Start recording and remember its id.
    pub async fn start<C: Connector>(&mut self, session: &mut Session<C>) -> Result<u32> {
        if let Some(id) = self.active {
            return Err(Error::ProtocolSequenceViolation(format!(
                "recording {} already active, stop it first",
                id
            )));
        }
        session.require_ready("start_record")?;

        let message = protocol::build(session.ids(), MessageType::StartRecord, &[])?;
        session.exchange(&message).await?;
        self.active = Some(message.id());
        info!(id = message.id(), "recording started");
        Ok(message.id())
    }

    /// Stop the recording identified by `id`.
    ///
    /// Rejected without I/O when nothing is recording. If the camera refuses
    /// the id, the tracked recording stays active.
    pub async fn stop<C: Connector>(&mut self, session: &mut Session<C>, id: u32) -> Result<()> {
        let Some(active) = self.active else {
            return Err(Error::ProtocolSequenceViolation(
                "not recording, start a recording first".to_string(),
            ));
        };
        session.require_ready("stop_record")?;
        if active != id {
            warn!(active, id, "stopping a recording other than the tracked one");
        }

        let message = protocol::build(session.ids(), MessageType::StopRecord, &id.to_le_bytes())?;
        session.exchange(&message).await?;
        self.active = None;
        info!(id, "recording stopped");
        Ok(())
    }

    /// Stop the tracked recording.
    pub async fn stop_active<C: Connector>(&mut self, session: &mut Session<C>) -> Result<()> {
        match self.active {
            Some(id) => self.stop(session, id).await,
            None => Err(Error::ProtocolSequenceViolation(
                "not recording, start a recording first".to_string(),
            )),
        }
    }
}

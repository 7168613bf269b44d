//! Control session: lifecycle, exchange primitives and queries.
//!
//! A session owns the control channel and, once the handshake is done, the
//! async-notification channel. Exchanges run strictly one at a time: each
//! call writes one request and awaits its reply before returning.
//!
//! Lifecycle on the control channel:
//!
//! ```text
//! connect -> hello -> start -> (capabilities, camera_remote) -> ... -> stop -> terminate
//! ```
//!
//! Operations issued out of that order are rejected before any I/O.
//! Commands and queries need [`Phase::Ready`].

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::protocol::{
    self, INDEX_COMMAND, INDEX_TERMINATE, IdGenerator, Message, MessageType,
};
use crate::settings::{CapabilitySet, PropertyValues};
use crate::transport::{Channel, Connector, Port};

/// Correlation id the hello message always carries
pub const HELLO_ID: u32 = 0x8f53_e4f2;

/// Fixed client identity block following the hello id
const HELLO_IDENTITY: [u8; 16] = [
    0xad, 0xa5, 0x48, 0x5d, 0x87, 0xb2, 0x7f, 0x0b, 0xd3, 0xd5, 0xde, 0xd0, 0x02, 0x78, 0xa8, 0xc0,
];

/// Space for the UTF-16LE client name, NUL padded
const HELLO_NAME_LEN: usize = 54;

/// Payload of the single-part query returning every property value
const SETTINGS_QUERY: [u8; 4] = [0x12, 0xd2, 0x00, 0x00];

/// Where a session stands in the control-channel lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Control channel open, nothing sent yet
    Connected,
    /// Hello acknowledged
    Registered,
    /// Start acknowledged; rest of the handshake in progress
    Started,
    /// Handshake complete, async-notification channel open
    Ready,
    /// Stop and terminate sent
    Closed,
}

pub struct Session<C: Connector> {
    connector: C,
    control: C::Channel,
    notifications: Option<C::Channel>,
    ids: IdGenerator,
    phase: Phase,
    read_timeout: Duration,
    live_view_poll: Duration,
    capabilities: CapabilitySet,
    settings: PropertyValues,
    buf: Vec<u8>,
}

impl<C: Connector> Session<C> {
    /// Connect the control channel and run the full handshake.
    ///
    /// If the handshake fails after start was acknowledged, stop and
    /// terminate are still sent before the error is returned.
    pub async fn connect(connector: C, config: &ClientConfig) -> Result<Self> {
        let control = connector
            .connect(Port::Control)
            .await
            .map_err(|source| Error::TransportUnavailable {
                port: Port::Control,
                source,
            })?;
        let mut session = Session::new(connector, control, config);
        if let Err(e) = session.open(&config.client_name).await {
            if matches!(session.phase, Phase::Started | Phase::Ready) {
                if let Err(close_error) = session.close().await {
                    warn!(error = %close_error, "stop after failed handshake");
                }
            }
            return Err(e);
        }
        Ok(session)
    }

    /// Wrap an already connected control channel. No message is sent.
    pub fn new(connector: C, control: C::Channel, config: &ClientConfig) -> Self {
        Self {
            connector,
            control,
            notifications: None,
            ids: IdGenerator::new(),
            phase: Phase::Connected,
            read_timeout: config.read_timeout(),
            live_view_poll: config.live_view_poll(),
            capabilities: CapabilitySet::default(),
            settings: PropertyValues::default(),
            buf: Vec::with_capacity(1024),
        }
    }

    /// Handshake: hello, start, capability query, remote mode, then the
    /// async-notification channel.
    pub async fn open(&mut self, client_name: &str) -> Result<()> {
        self.hello(client_name).await?;
        self.start().await?;
        self.fetch_capabilities().await?;
        info!(
            descriptors = self.capabilities.descriptors().len(),
            "received camera capabilities"
        );

        let remote = protocol::build(&mut self.ids, MessageType::CameraRemote, &[])?;
        self.roundtrip(&remote).await?;

        let notifications = self
            .connector
            .connect(Port::AsyncNotification)
            .await
            .map_err(|source| Error::TransportUnavailable {
                port: Port::AsyncNotification,
                source,
            })?;
        self.notifications = Some(notifications);
        self.phase = Phase::Ready;
        info!("camera remote session open");
        Ok(())
    }

    /// Register with the camera. Must be the first control-channel message.
    pub(crate) async fn hello(&mut self, client_name: &str) -> Result<()> {
        self.require_phase(Phase::Connected, "hello")?;
        let message = hello_message(client_name)?;
        self.write_message(&message).await?;

        let received = self.read_control(MessageType::Hello).await?;
        let header = protocol::decode_header(&self.buf[..received]).map_err(|e| {
            warn!(bytes = %hex::encode(&self.buf[..received]), "malformed hello reply");
            Error::exchange(MessageType::Hello, e.to_string())
        })?;
        debug!(index = header.index, code = header.code, "hello acknowledged");
        self.phase = Phase::Registered;
        Ok(())
    }

    /// Second handshake message, directly after hello.
    pub(crate) async fn start(&mut self) -> Result<()> {
        self.require_phase(Phase::Registered, "start")?;
        let message = protocol::build(&mut self.ids, MessageType::Start, &[0x01])?;
        self.roundtrip(&message).await?;
        self.phase = Phase::Started;
        Ok(())
    }

    /// Send stop, then the header-only terminate packet.
    ///
    /// Terminate is written even when the camera rejects stop; the stop
    /// failure is then returned.
    pub async fn close(&mut self) -> Result<()> {
        self.require_open("stop")?;
        let stop = protocol::build(&mut self.ids, MessageType::Stop, &[])?;
        let stopped = self.roundtrip(&stop).await;

        let terminate = protocol::encode_header(INDEX_TERMINATE, MessageType::Stop);
        debug!(
            message_type = %MessageType::Stop,
            code = MessageType::Stop.code(),
            bytes = %hex::encode(terminate),
            "send terminate"
        );
        self.phase = Phase::Closed;
        self.control.write(&terminate).await.map_err(|e| {
            warn!(error = %e, "terminate write failed");
            Error::exchange(MessageType::Stop, e.to_string())
        })?;
        info!("camera remote session closed");
        stopped
    }

    /// Encode and write one message without awaiting a reply.
    pub async fn send(&mut self, message: &Message) -> Result<()> {
        self.require_open("send")?;
        self.write_message(message).await
    }

    /// Send one message and require an affirmative response to it.
    pub async fn exchange(&mut self, message: &Message) -> Result<()> {
        self.require_open("exchange")?;
        self.roundtrip(message).await
    }

    /// Send the first part unacknowledged, then exchange the second.
    ///
    /// Only the final part is acknowledged by the camera.
    pub async fn two_part_exchange(&mut self, first: &Message, second: &Message) -> Result<()> {
        self.require_open("two_part exchange")?;
        if first.id() != second.id() || first.index().checked_add(1) != Some(second.index()) {
            return Err(Error::ProtocolSequenceViolation(format!(
                "parts of a two_part sequence must share id {} with consecutive indices",
                first.id()
            )));
        }
        self.write_message(first).await?;
        self.roundtrip(second).await
    }

    /// Exchange that may carry a data packet before the final response.
    /// Returns the data payload, empty when the camera sent none.
    pub async fn query(&mut self, message: &Message) -> Result<Vec<u8>> {
        self.require_open("query")?;
        self.write_message(message).await?;
        let received = self.read_control(message.message_type()).await?;
        if protocol::is_success(message.id(), &self.buf[..received]) {
            return Ok(Vec::new());
        }
        let data = protocol::data_payload(message.id(), &self.buf[..received])
            .map(<[u8]>::to_vec)
            .map_err(|e| {
                warn!(
                    message_type = %message.message_type(),
                    bytes = %hex::encode(&self.buf[..received]),
                    "unexpected reply to query"
                );
                Error::exchange(message.message_type(), e.to_string())
            })?;

        let received = self.read_control(message.message_type()).await?;
        self.expect_success(message, received)?;
        Ok(data)
    }

    /// Query the capability list. Done once, during the handshake.
    pub async fn fetch_capabilities(&mut self) -> Result<&CapabilitySet> {
        self.require_open("camera_capabilities")?;
        let message = protocol::build(&mut self.ids, MessageType::CameraCapabilities, &[])?;
        let data = self.query(&message).await?;
        self.capabilities = CapabilitySet::parse(&data);
        if !self.capabilities.is_complete() {
            debug!(bytes = %hex::encode(&data), "capability payload kept undecoded");
        }
        Ok(&self.capabilities)
    }

    /// Poll every property value, replacing the snapshot.
    pub async fn fetch_settings(&mut self) -> Result<&PropertyValues> {
        self.require_ready("current settings")?;
        let message = protocol::build(&mut self.ids, MessageType::SinglePart, &SETTINGS_QUERY)?;
        let data = self.query(&message).await?;
        self.settings = PropertyValues::parse(&data).map_err(|e| {
            warn!(bytes = %hex::encode(&data), error = %e, "malformed settings payload");
            Error::Parse(e)
        })?;
        Ok(&self.settings)
    }

    /// Release the shutter and wait for the capture notification.
    ///
    /// Returns the raw notification buffer from the async channel.
    pub async fn shutter(&mut self) -> Result<Vec<u8>> {
        self.require_ready("shutter")?;
        let Some(mut notifications) = self.notifications.take() else {
            return Err(Error::ProtocolSequenceViolation(
                "async-notification channel not open".to_string(),
            ));
        };
        let notice = self.release_shutter(&mut notifications).await;
        self.notifications = Some(notifications);
        notice
    }

    async fn release_shutter(&mut self, notifications: &mut C::Channel) -> Result<Vec<u8>> {
        let message = protocol::build(&mut self.ids, MessageType::Shutter, &[])?;
        self.roundtrip(&message).await?;

        let mut notice = Vec::new();
        let received = read_with_timeout(notifications, &mut notice, self.read_timeout)
            .await
            .map_err(|e| {
                warn!(error = %e, "no capture notification");
                Error::exchange(MessageType::Shutter, e)
            })?;
        debug!(
            received,
            bytes = %hex::encode(&notice),
            "capture notification"
        );
        Ok(notice)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Snapshot from the last successful settings query.
    pub fn settings(&self) -> &PropertyValues {
        &self.settings
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn live_view_poll(&self) -> Duration {
        self.live_view_poll
    }

    /// Replace the correlation id source.
    pub fn set_id_generator(&mut self, ids: IdGenerator) {
        self.ids = ids;
    }

    pub(crate) fn ids(&mut self) -> &mut IdGenerator {
        &mut self.ids
    }

    /// Commands and queries need the full handshake.
    pub(crate) fn require_ready(&self, operation: &str) -> Result<()> {
        self.require_phase(Phase::Ready, operation)
    }

    /// Raw traffic is allowed from start until close.
    fn require_open(&self, operation: &str) -> Result<()> {
        match self.phase {
            Phase::Started | Phase::Ready => Ok(()),
            phase => Err(Error::ProtocolSequenceViolation(format!(
                "{} requires a started session, current phase is {:?}",
                operation, phase
            ))),
        }
    }

    fn require_phase(&self, expected: Phase, operation: &str) -> Result<()> {
        if self.phase != expected {
            return Err(Error::ProtocolSequenceViolation(format!(
                "{} requires session phase {:?}, current phase is {:?}",
                operation, expected, self.phase
            )));
        }
        Ok(())
    }

    async fn write_message(&mut self, message: &Message) -> Result<()> {
        let bytes = protocol::encode(message);
        debug!(
            message_type = %message.message_type(),
            code = message.message_type().code(),
            id = message.id(),
            bytes = %hex::encode(&bytes),
            "send"
        );
        self.control.write(&bytes).await.map_err(|e| {
            warn!(
                message_type = %message.message_type(),
                bytes = %hex::encode(&bytes),
                error = %e,
                "write failed"
            );
            Error::exchange(message.message_type(), e.to_string())
        })
    }

    async fn roundtrip(&mut self, message: &Message) -> Result<()> {
        self.write_message(message).await?;
        let received = self.read_control(message.message_type()).await?;
        self.expect_success(message, received)
    }

    async fn read_control(&mut self, message_type: MessageType) -> Result<usize> {
        let received = read_with_timeout(&mut self.control, &mut self.buf, self.read_timeout)
            .await
            .map_err(|e| {
                warn!(%message_type, error = %e, "no reply");
                Error::exchange(message_type, e)
            })?;
        debug!(
            received,
            bytes = %hex::encode(&self.buf[..received]),
            "receive"
        );
        Ok(received)
    }

    fn expect_success(&self, message: &Message, received: usize) -> Result<()> {
        let reply = &self.buf[..received];
        if protocol::is_success(message.id(), reply) {
            return Ok(());
        }
        warn!(
            message_type = %message.message_type(),
            code = message.message_type().code(),
            id = message.id(),
            reply = %hex::encode(reply),
            "camera rejected request"
        );
        let reason = match protocol::decode_header(reply) {
            Ok(header) if header.id != Some(message.id()) => format!(
                "reply id {:?} does not match request id {}",
                header.id,
                message.id()
            ),
            Ok(header) => format!("status 0x{:04x}", header.code),
            Err(e) => e.to_string(),
        };
        Err(Error::exchange(message.message_type(), reason))
    }
}

/// Read one buffer, treating a timeout or a closed channel as failure.
async fn read_with_timeout<T: Channel>(
    channel: &mut T,
    buf: &mut Vec<u8>,
    timeout: Duration,
) -> std::result::Result<usize, String> {
    match tokio::time::timeout(timeout, channel.read(buf)).await {
        Err(_) => Err(format!("no reply within {:?}", timeout)),
        Ok(Err(e)) => Err(e.to_string()),
        Ok(Ok(0)) => Err("channel closed".to_string()),
        Ok(Ok(n)) => Ok(n),
    }
}

/// Build the registration message carrying `client_name`.
pub fn hello_message(client_name: &str) -> Result<Message> {
    let name: Vec<u16> = client_name.encode_utf16().collect();
    if name.len() >= HELLO_NAME_LEN / 2 {
        return Err(Error::UnknownOrInvalidValue(format!(
            "client name {:?} too long",
            client_name
        )));
    }
    let mut payload = Vec::with_capacity(HELLO_IDENTITY.len() + HELLO_NAME_LEN);
    payload.extend_from_slice(&HELLO_IDENTITY);
    for unit in name {
        payload.extend_from_slice(&unit.to_le_bytes());
    }
    payload.resize(HELLO_IDENTITY.len() + HELLO_NAME_LEN, 0);
    Ok(Message::new(INDEX_COMMAND, MessageType::Hello, HELLO_ID, payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PREFIX_LEN;

    #[test]
    fn test_hello_layout() {
        let message = hello_message("Fuji").unwrap();
        let bytes = protocol::encode(&message);
        assert_eq!(bytes.len(), PREFIX_LEN + 70);
        assert_eq!(&bytes[..8], &[0x01, 0x00, 0x00, 0x00, 0xf2, 0xe4, 0x53, 0x8f]);
        assert_eq!(&bytes[8..24], &HELLO_IDENTITY);
        assert_eq!(&bytes[24..32], &[b'F', 0, b'u', 0, b'j', 0, b'i', 0]);
        assert!(bytes[32..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_hello_name_limit() {
        assert!(hello_message(&"n".repeat(26)).is_ok());
        assert!(hello_message(&"n".repeat(27)).is_err());
    }
}

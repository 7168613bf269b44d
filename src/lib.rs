//! Client for the remote-control protocol of Fujifilm WiFi cameras.
//!
//! The camera serves three TCP ports: control (request/response), async
//! notifications and a live-view JPEG stream. [`Session`] runs the control
//! handshake and exchanges, [`control`] drives settings toward requested
//! values, [`RecordingTracker`] pairs video start/stop and [`LiveView`]
//! reads preview frames on their own task.

pub mod config;
pub mod control;
pub mod error;
pub mod liveview;
pub mod protocol;
pub mod recording;
pub mod session;
pub mod settings;
pub mod transport;


pub use config::ClientConfig;
pub use control::{Convergence, Outcome, StepCommand, StepProperty};
pub use error::{Error, Result};
pub use liveview::{Frame, FramePreamble, LiveView};
pub use recording::RecordingTracker;
pub use session::{Phase, Session};
pub use settings::{AutoFocusPoint, CapabilitySet, Property, PropertyValues};
pub use transport::{Channel, Connector, Port, TcpConnector};

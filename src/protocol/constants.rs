//! Wire constants for the Fujifilm WiFi remote protocol.
//!
//! These constants define the 16-bit message type codes carried in the
//! header of every control-channel message. They are fixed by the camera
//! firmware and must never be renumbered.

use std::fmt;

/// Registration handshake, always the first message on the control channel
pub const MSG_HELLO: u16 = 0x0000;

/// Session start, always the second message
pub const MSG_START: u16 = 0x1002;

/// Session stop, sent before the terminate packet
pub const MSG_STOP: u16 = 0x1003;

pub const MSG_IMAGE_INFO_BY_INDEX: u16 = 0x1008;
pub const MSG_THUMBNAIL_BY_INDEX: u16 = 0x100a;

/// Shutter release
pub const MSG_SHUTTER: u16 = 0x100e;

/// Single-part property query
pub const MSG_SINGLE_PART: u16 = 0x1015;

/// Two-part property write (code first, value second)
pub const MSG_TWO_PART: u16 = 0x1016;

pub const MSG_FULL_IMAGE: u16 = 0x101b;

/// Last command before remote control becomes available
pub const MSG_CAMERA_REMOTE: u16 = 0x101c;

pub const MSG_START_RECORD: u16 = 0x9020;

/// Stop recording, carries the id of the start-record request
pub const MSG_STOP_RECORD: u16 = 0x9021;

pub const MSG_CAMERA_LAST_IMAGE: u16 = 0x9022;
pub const MSG_FOCUS_POINT: u16 = 0x9026;
pub const MSG_FOCUS_UNLOCK: u16 = 0x9027;
pub const MSG_CAMERA_CAPABILITIES: u16 = 0x902b;

/// Relative shutter speed step
pub const MSG_SHUTTER_SPEED: u16 = 0x902c;

/// Relative aperture step (one third stop)
pub const MSG_APERTURE: u16 = 0x902d;

/// Relative exposure compensation step
pub const MSG_EXPOSURE_CORRECTION: u16 = 0x902e;

/// Header index of an ordinary request, and of the first part of a two-part one
pub const INDEX_COMMAND: u16 = 1;

/// Header index of a camera data packet
pub const INDEX_DATA: u16 = 2;

/// Header index of the final response packet
pub const INDEX_RESPONSE: u16 = 3;

/// Header index reserved for the terminate packet
pub const INDEX_TERMINATE: u16 = 0;

/// Status code the camera puts in the type slot of an affirmative response
pub const STATUS_OK: u16 = 0x2001;

/// Size of `{u16 index, u16 type}`
pub const HEADER_LEN: usize = 4;

/// Size of the header plus the `u32` correlation id
pub const PREFIX_LEN: usize = HEADER_LEN + 4;

/// Default camera address when it acts as access point
pub const DEFAULT_CAMERA_HOST: &str = "192.168.0.1";

pub const CONTROL_SERVER_PORT: u16 = 55740;
pub const ASYNC_RESPONSE_SERVER_PORT: u16 = 55741;
pub const JPG_STREAM_SERVER_PORT: u16 = 55742;

/// Closed catalogue of message types the client sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Hello,
    Start,
    Stop,
    ImageInfoByIndex,
    ThumbnailByIndex,
    Shutter,
    SinglePart,
    TwoPart,
    FullImage,
    CameraRemote,
    StartRecord,
    StopRecord,
    CameraLastImage,
    FocusPoint,
    FocusUnlock,
    CameraCapabilities,
    ShutterSpeed,
    Aperture,
    ExposureCorrection,
}

impl MessageType {
    /// Every known type, in wire-code order.
    pub const ALL: [MessageType; 19] = [
        MessageType::Hello,
        MessageType::Start,
        MessageType::Stop,
        MessageType::ImageInfoByIndex,
        MessageType::ThumbnailByIndex,
        MessageType::Shutter,
        MessageType::SinglePart,
        MessageType::TwoPart,
        MessageType::FullImage,
        MessageType::CameraRemote,
        MessageType::StartRecord,
        MessageType::StopRecord,
        MessageType::CameraLastImage,
        MessageType::FocusPoint,
        MessageType::FocusUnlock,
        MessageType::CameraCapabilities,
        MessageType::ShutterSpeed,
        MessageType::Aperture,
        MessageType::ExposureCorrection,
    ];

    pub fn code(self) -> u16 {
        match self {
            MessageType::Hello => MSG_HELLO,
            MessageType::Start => MSG_START,
            MessageType::Stop => MSG_STOP,
            MessageType::ImageInfoByIndex => MSG_IMAGE_INFO_BY_INDEX,
            MessageType::ThumbnailByIndex => MSG_THUMBNAIL_BY_INDEX,
            MessageType::Shutter => MSG_SHUTTER,
            MessageType::SinglePart => MSG_SINGLE_PART,
            MessageType::TwoPart => MSG_TWO_PART,
            MessageType::FullImage => MSG_FULL_IMAGE,
            MessageType::CameraRemote => MSG_CAMERA_REMOTE,
            MessageType::StartRecord => MSG_START_RECORD,
            MessageType::StopRecord => MSG_STOP_RECORD,
            MessageType::CameraLastImage => MSG_CAMERA_LAST_IMAGE,
            MessageType::FocusPoint => MSG_FOCUS_POINT,
            MessageType::FocusUnlock => MSG_FOCUS_UNLOCK,
            MessageType::CameraCapabilities => MSG_CAMERA_CAPABILITIES,
            MessageType::ShutterSpeed => MSG_SHUTTER_SPEED,
            MessageType::Aperture => MSG_APERTURE,
            MessageType::ExposureCorrection => MSG_EXPOSURE_CORRECTION,
        }
    }

    /// Look up a wire code. Unknown codes return `None`; they may be
    /// received but are never constructed.
    pub fn from_code(code: u16) -> Option<MessageType> {
        let message_type = match code {
            MSG_HELLO => MessageType::Hello,
            MSG_START => MessageType::Start,
            MSG_STOP => MessageType::Stop,
            MSG_IMAGE_INFO_BY_INDEX => MessageType::ImageInfoByIndex,
            MSG_THUMBNAIL_BY_INDEX => MessageType::ThumbnailByIndex,
            MSG_SHUTTER => MessageType::Shutter,
            MSG_SINGLE_PART => MessageType::SinglePart,
            MSG_TWO_PART => MessageType::TwoPart,
            MSG_FULL_IMAGE => MessageType::FullImage,
            MSG_CAMERA_REMOTE => MessageType::CameraRemote,
            MSG_START_RECORD => MessageType::StartRecord,
            MSG_STOP_RECORD => MessageType::StopRecord,
            MSG_CAMERA_LAST_IMAGE => MessageType::CameraLastImage,
            MSG_FOCUS_POINT => MessageType::FocusPoint,
            MSG_FOCUS_UNLOCK => MessageType::FocusUnlock,
            MSG_CAMERA_CAPABILITIES => MessageType::CameraCapabilities,
            MSG_SHUTTER_SPEED => MessageType::ShutterSpeed,
            MSG_APERTURE => MessageType::Aperture,
            MSG_EXPOSURE_CORRECTION => MessageType::ExposureCorrection,
            _ => return None,
        };
        Some(message_type)
    }

    /// Fixed payload size for this type, determined from captured traffic.
    pub fn payload_len(self) -> usize {
        match self {
            MessageType::Hello => 70,
            MessageType::Stop | MessageType::FocusUnlock => 0,
            MessageType::Start
            | MessageType::ImageInfoByIndex
            | MessageType::ThumbnailByIndex
            | MessageType::Shutter
            | MessageType::SinglePart
            | MessageType::TwoPart
            | MessageType::FullImage
            | MessageType::CameraRemote
            | MessageType::StartRecord
            | MessageType::StopRecord
            | MessageType::CameraLastImage
            | MessageType::FocusPoint
            | MessageType::CameraCapabilities
            | MessageType::ShutterSpeed
            | MessageType::Aperture
            | MessageType::ExposureCorrection => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageType::Hello => "hello",
            MessageType::Start => "start",
            MessageType::Stop => "stop",
            MessageType::ImageInfoByIndex => "image_info_by_index",
            MessageType::ThumbnailByIndex => "thumbnail_by_index",
            MessageType::Shutter => "shutter",
            MessageType::SinglePart => "single_part",
            MessageType::TwoPart => "two_part",
            MessageType::FullImage => "full_image",
            MessageType::CameraRemote => "camera_remote",
            MessageType::StartRecord => "start_record",
            MessageType::StopRecord => "stop_record",
            MessageType::CameraLastImage => "camera_last_image",
            MessageType::FocusPoint => "focus_point",
            MessageType::FocusUnlock => "focus_unlock",
            MessageType::CameraCapabilities => "camera_capabilities",
            MessageType::ShutterSpeed => "shutter_speed",
            MessageType::Aperture => "aperture",
            MessageType::ExposureCorrection => "exposure_correction",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

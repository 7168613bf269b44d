//! Camera properties and the current-settings snapshot.
//!
//! Property codes are the camera's 16-bit device property identifiers.
//! Units are fixed per property: aperture is the f-number × 100, exposure
//! compensation is EV × 1000 (two's complement), shutter speed uses the
//! encoding described at [`ss_to_microsec`].

use std::collections::BTreeMap;
use std::fmt;
use std::io::Cursor;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::protocol::{ParseError, read_u16, read_u32};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Property {
    WhiteBalance,
    Aperture,
    FocusMode,
    Flash,
    ShootingMode,
    ExposureCompensation,
    SelfTimer,
    FilmSimulation,
    ImageFormat,
    RecmodeEnable,
    FSsControl,
    Iso,
    MovieIso,
    FocusPoint,
    FocusLock,
    DeviceError,
    ImageSpaceSd,
    MovieRemainingTime,
    ShutterSpeed,
    ImageAspect,
    BatteryLevel,
}

impl Property {
    pub const ALL: [Property; 21] = [
        Property::WhiteBalance,
        Property::Aperture,
        Property::FocusMode,
        Property::Flash,
        Property::ShootingMode,
        Property::ExposureCompensation,
        Property::SelfTimer,
        Property::FilmSimulation,
        Property::ImageFormat,
        Property::RecmodeEnable,
        Property::FSsControl,
        Property::Iso,
        Property::MovieIso,
        Property::FocusPoint,
        Property::FocusLock,
        Property::DeviceError,
        Property::ImageSpaceSd,
        Property::MovieRemainingTime,
        Property::ShutterSpeed,
        Property::ImageAspect,
        Property::BatteryLevel,
    ];

    pub fn code(self) -> u16 {
        match self {
            Property::WhiteBalance => 0x5005,
            Property::Aperture => 0x5007,
            Property::FocusMode => 0x500a,
            Property::Flash => 0x500c,
            Property::ShootingMode => 0x500e,
            Property::ExposureCompensation => 0x5010,
            Property::SelfTimer => 0x5012,
            Property::FilmSimulation => 0xd001,
            Property::ImageFormat => 0xd018,
            Property::RecmodeEnable => 0xd019,
            Property::FSsControl => 0xd028,
            Property::Iso => 0xd02a,
            Property::MovieIso => 0xd02b,
            Property::FocusPoint => 0xd17c,
            Property::FocusLock => 0xd209,
            Property::DeviceError => 0xd21b,
            Property::ImageSpaceSd => 0xd229,
            Property::MovieRemainingTime => 0xd22a,
            Property::ShutterSpeed => 0xd240,
            Property::ImageAspect => 0xd241,
            Property::BatteryLevel => 0xd242,
        }
    }

    pub fn from_code(code: u16) -> Option<Property> {
        Property::ALL.into_iter().find(|p| p.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            Property::WhiteBalance => "white_balance",
            Property::Aperture => "aperture",
            Property::FocusMode => "focus_mode",
            Property::Flash => "flash",
            Property::ShootingMode => "shooting_mode",
            Property::ExposureCompensation => "exposure_compensation",
            Property::SelfTimer => "self_timer",
            Property::FilmSimulation => "film_simulation",
            Property::ImageFormat => "image_format",
            Property::RecmodeEnable => "recmode_enable",
            Property::FSsControl => "f_ss_control",
            Property::Iso => "iso",
            Property::MovieIso => "movie_iso",
            Property::FocusPoint => "focus_point",
            Property::FocusLock => "focus_lock",
            Property::DeviceError => "device_error",
            Property::ImageSpaceSd => "image_space_sd",
            Property::MovieRemainingTime => "movie_remaining_time",
            Property::ShutterSpeed => "shutter_speed",
            Property::ImageAspect => "image_aspect",
            Property::BatteryLevel => "battery_level",
        }
    }

    /// Closed set of legal values for enumerated properties.
    pub fn known_values(self) -> Option<&'static [(u32, &'static str)]> {
        match self {
            Property::WhiteBalance => Some(WHITE_BALANCE_VALUES),
            Property::FilmSimulation => Some(FILM_SIMULATION_VALUES),
            Property::Flash => Some(FLASH_VALUES),
            Property::SelfTimer => Some(SELF_TIMER_VALUES),
            _ => None,
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub const WHITE_BALANCE_VALUES: &[(u32, &str)] = &[
    (0x0002, "auto"),
    (0x0004, "fine"),
    (0x0006, "incandescent"),
    (0x8001, "fluorescent_1"),
    (0x8002, "fluorescent_2"),
    (0x8003, "fluorescent_3"),
    (0x8006, "shade"),
    (0x8007, "color_temperature"),
    (0x8008, "custom"),
    (0x800a, "underwater"),
];

pub const FILM_SIMULATION_VALUES: &[(u32, &str)] = &[
    (1, "provia"),
    (2, "velvia"),
    (3, "astia"),
    (4, "monochrome"),
    (5, "sepia"),
    (6, "pro_neg_hi"),
    (7, "pro_neg_std"),
    (8, "monochrome_ye_filter"),
    (9, "monochrome_r_filter"),
    (10, "monochrome_g_filter"),
    (11, "classic_chrome"),
    (12, "acros"),
    (13, "acros_ye"),
    (14, "acros_r"),
    (15, "acros_g"),
    (16, "eterna"),
];

pub const FLASH_VALUES: &[(u32, &str)] = &[
    (0x0001, "auto"),
    (0x0002, "off"),
    (0x0003, "fill"),
    (0x0004, "red_eye_auto"),
    (0x0005, "red_eye_fill"),
    (0x0006, "external_sync"),
    (0x8001, "on"),
    (0x8002, "red_eye"),
    (0x8003, "red_eye_on"),
    (0x8004, "red_eye_sync"),
    (0x8005, "red_eye_rear"),
    (0x8006, "slow_sync"),
    (0x8007, "rear_sync"),
    (0x8008, "commander"),
    (0x8009, "disabled"),
    (0x800a, "enabled"),
];

pub const SELF_TIMER_VALUES: &[(u32, &str)] = &[
    (0, "off"),
    (1, "1s"),
    (2, "2s"),
    (3, "5s"),
    (4, "10s"),
];

/// Check a candidate value before it is ever sent.
///
/// Enumerated properties accept only their listed values; the camera's
/// behaviour for anything else is unknown. Other properties are not
/// constrained here.
pub fn is_known_value(property: Property, value: u32) -> bool {
    match property.known_values() {
        Some(table) => table.iter().any(|(known, _)| *known == value),
        None => true,
    }
}

/// Name of an enumerated value, if it has one.
pub fn value_name(property: Property, value: u32) -> Option<&'static str> {
    property
        .known_values()?
        .iter()
        .find(|(known, _)| *known == value)
        .map(|(_, name)| *name)
}

/// Bit marking a fractional shutter speed
const SS_FRACTION_FLAG: u32 = 0x8000_0000;

/// Convert the camera's shutter speed encoding to microseconds.
///
/// With bit 31 set the low bits hold the denominator of `1/n` seconds
/// scaled by 1000; otherwise the value is the exposure in milliseconds.
/// Zero maps to zero.
pub fn ss_to_microsec(ss: u32) -> u64 {
    if ss & SS_FRACTION_FLAG != 0 {
        match u64::from(ss & !SS_FRACTION_FLAG) {
            0 => 0,
            denominator => 1_000_000_000 / denominator,
        }
    } else {
        u64::from(ss) * 1_000
    }
}

/// Last reported value of every property, replaced wholesale per query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PropertyValues {
    values: BTreeMap<Property, u32>,
    /// Codes outside [`Property`], kept as reported
    unrecognized: BTreeMap<u16, u32>,
}

impl PropertyValues {
    /// Parse a settings data payload: `u16 count` then `count` entries of
    /// `{u16 code, u32 value}`.
    pub fn parse(payload: &[u8]) -> std::result::Result<Self, ParseError> {
        let len = payload.len();
        let mut cursor = Cursor::new(payload);
        let count = read_u16(&mut cursor, len)?;

        let mut settings = PropertyValues::default();
        for _ in 0..count {
            let code = read_u16(&mut cursor, len)?;
            let value = read_u32(&mut cursor, len)?;
            match Property::from_code(code) {
                Some(property) => {
                    settings.values.insert(property, value);
                }
                None => {
                    settings.unrecognized.insert(code, value);
                }
            }
        }
        Ok(settings)
    }

    pub fn get(&self, property: Property) -> Option<u32> {
        self.values.get(&property).copied()
    }

    pub fn unrecognized(&self) -> &BTreeMap<u16, u32> {
        &self.unrecognized
    }

    pub fn iter(&self) -> impl Iterator<Item = (Property, u32)> + '_ {
        self.values.iter().map(|(p, v)| (*p, *v))
    }

    pub fn len(&self) -> usize {
        self.values.len() + self.unrecognized.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encode back into the settings payload layout.
    #[cfg(test)]
    pub(crate) fn to_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(2 + self.len() * 6);
        payload.extend_from_slice(&(self.len() as u16).to_le_bytes());
        let entries = self
            .values
            .iter()
            .map(|(p, v)| (p.code(), *v))
            .chain(self.unrecognized.iter().map(|(c, v)| (*c, *v)));
        for (code, value) in entries {
            payload.extend_from_slice(&code.to_le_bytes());
            payload.extend_from_slice(&value.to_le_bytes());
        }
        payload
    }

    #[cfg(test)]
    pub(crate) fn set(&mut self, property: Property, value: u32) {
        self.values.insert(property, value);
    }
}

pub const FOCUS_POINTS_X: u8 = 13;
pub const FOCUS_POINTS_Y: u8 = 7;

/// Auto-focus point on the camera's 13 × 7 grid, 1-based.
///
/// The camera must be in AF-S mode for the point to take effect; that is
/// left to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AutoFocusPoint {
    x: u8,
    y: u8,
}

impl AutoFocusPoint {
    pub fn new(x: u32, y: u32) -> Result<Self> {
        let in_grid = (1..=u32::from(FOCUS_POINTS_X)).contains(&x)
            && (1..=u32::from(FOCUS_POINTS_Y)).contains(&y);
        if !in_grid {
            return Err(Error::UnknownOrInvalidValue(format!(
                "focus point {}x{} outside {}x{} grid",
                x, y, FOCUS_POINTS_X, FOCUS_POINTS_Y
            )));
        }
        Ok(Self {
            x: x as u8,
            y: y as u8,
        })
    }

    pub fn x(&self) -> u8 {
        self.x
    }

    pub fn y(&self) -> u8 {
        self.y
    }

    /// Payload of a `focus_point` message.
    pub fn payload(&self) -> [u8; 4] {
        [self.y, self.x, 0x02, 0x03]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_codes_round_trip() {
        for property in Property::ALL {
            assert_eq!(Property::from_code(property.code()), Some(property));
        }
        assert_eq!(Property::from_code(0x1234), None);
    }

    #[test]
    fn test_known_values() {
        assert!(is_known_value(Property::WhiteBalance, 0x0002));
        assert!(is_known_value(Property::WhiteBalance, 0x800a));
        assert!(!is_known_value(Property::WhiteBalance, 0x0003));
        assert!(!is_known_value(Property::WhiteBalance, 0));
        assert!(is_known_value(Property::FilmSimulation, 16));
        assert!(!is_known_value(Property::FilmSimulation, 17));
        assert!(!is_known_value(Property::SelfTimer, 5));
        assert!(is_known_value(Property::Iso, 3200));
        assert_eq!(value_name(Property::Flash, 0x8007), Some("rear_sync"));
    }

    #[test]
    fn test_shutter_speed_conversion() {
        assert_eq!(ss_to_microsec(0x8000_0000 | 250_000), 4_000);
        assert_eq!(ss_to_microsec(0x8000_0000 | 1_000), 1_000_000);
        assert_eq!(ss_to_microsec(2_000), 2_000_000);
        assert_eq!(ss_to_microsec(0x8000_0000), 0);
        assert_eq!(ss_to_microsec(0), 0);
    }

    #[test]
    fn test_parse_settings() {
        let payload = [
            0x03, 0x00, // count
            0x07, 0x50, 0x90, 0x01, 0x00, 0x00, // aperture 400
            0x2a, 0xd0, 0x80, 0x0c, 0x00, 0x00, // iso 3200
            0x34, 0x12, 0x01, 0x00, 0x00, 0x00, // unknown 0x1234
        ];
        let settings = PropertyValues::parse(&payload).unwrap();
        assert_eq!(settings.get(Property::Aperture), Some(400));
        assert_eq!(settings.get(Property::Iso), Some(3200));
        assert_eq!(settings.get(Property::Flash), None);
        assert_eq!(settings.unrecognized().get(&0x1234), Some(&1));
        assert_eq!(settings.len(), 3);
        assert_eq!(settings.to_payload(), payload.to_vec());
    }

    #[test]
    fn test_parse_truncated_settings() {
        let payload = [0x02, 0x00, 0x07, 0x50, 0x90, 0x01, 0x00, 0x00, 0x2a];
        assert!(matches!(
            PropertyValues::parse(&payload),
            Err(ParseError::InsufficientData { .. })
        ));
        assert!(PropertyValues::parse(&[]).is_err());
    }

    #[test]
    fn test_focus_point_bounds() {
        let point = AutoFocusPoint::new(13, 7).unwrap();
        assert_eq!(point.payload(), [7, 13, 0x02, 0x03]);
        assert!(AutoFocusPoint::new(0, 3).is_err());
        assert!(AutoFocusPoint::new(14, 3).is_err());
        assert!(AutoFocusPoint::new(5, 8).is_err());
    }
}

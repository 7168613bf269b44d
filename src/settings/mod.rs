//! Typed view of camera capabilities and current settings.

mod capability;
mod property;

pub use capability::{CapabilityDescriptor, CapabilitySet};
pub use property::{
    AutoFocusPoint, FILM_SIMULATION_VALUES, FLASH_VALUES, FOCUS_POINTS_X, FOCUS_POINTS_Y,
    Property, PropertyValues, SELF_TIMER_VALUES, WHITE_BALANCE_VALUES, is_known_value,
    ss_to_microsec, value_name,
};

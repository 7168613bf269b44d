//! Settings writes and the relative-step convergence loop.
//!
//! Enumerated properties and ISO take an absolute value in a two-part
//! write. Aperture, shutter speed and exposure compensation can only be
//! nudged one step at a time, so reaching a target means stepping and
//! re-polling until the value lands, stops moving, or would have to turn
//! back.

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::protocol::{self, MessageType};
use crate::session::Session;
use crate::settings::{AutoFocusPoint, Property, PropertyValues, is_known_value, ss_to_microsec};
use crate::transport::Connector;

/// Hard cap on step commands per convergence, above any real step range.
pub const MAX_CONVERGENCE_STEPS: u32 = 256;

/// Aperture targets must stay below f/64.
pub const MAX_APERTURE: u32 = 6400;

/// Properties the camera only exposes as relative steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepProperty {
    Aperture,
    ShutterSpeed,
    ExposureCompensation,
}

/// Wire command of one step message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepCommand {
    Decrement,
    Increment,
}

impl StepCommand {
    fn payload(self) -> [u8; 4] {
        match self {
            StepCommand::Decrement => 0u32.to_le_bytes(),
            StepCommand::Increment => 1u32.to_le_bytes(),
        }
    }
}

/// Movement of a property's comparison key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Lower,
    Raise,
}

impl Direction {
    fn toward(target: i64, current: i64) -> Direction {
        if target < current {
            Direction::Lower
        } else {
            Direction::Raise
        }
    }
}

impl StepProperty {
    pub fn property(self) -> Property {
        match self {
            StepProperty::Aperture => Property::Aperture,
            StepProperty::ShutterSpeed => Property::ShutterSpeed,
            StepProperty::ExposureCompensation => Property::ExposureCompensation,
        }
    }

    pub fn message_type(self) -> MessageType {
        match self {
            StepProperty::Aperture => MessageType::Aperture,
            StepProperty::ShutterSpeed => MessageType::ShutterSpeed,
            StepProperty::ExposureCompensation => MessageType::ExposureCorrection,
        }
    }

    /// Comparison key of a reported value: f-number × 100, exposure time in
    /// microseconds, or signed EV × 1000.
    pub fn key(self, raw: u32) -> i64 {
        match self {
            StepProperty::Aperture => i64::from(raw),
            StepProperty::ShutterSpeed => ss_to_microsec(raw) as i64,
            StepProperty::ExposureCompensation => i64::from(raw as i32),
        }
    }

    /// Whether a reported value can be stepped from.
    fn is_valid(self, raw: u32) -> bool {
        match self {
            StepProperty::Aperture | StepProperty::ShutterSpeed => self.key(raw) > 0,
            StepProperty::ExposureCompensation => true,
        }
    }

    /// Step command that moves the key in `direction`. A shutter speed
    /// increment shortens the exposure.
    pub fn command(self, direction: Direction) -> StepCommand {
        match (self, direction) {
            (StepProperty::ShutterSpeed, Direction::Lower) => StepCommand::Increment,
            (StepProperty::ShutterSpeed, Direction::Raise) => StepCommand::Decrement,
            (_, Direction::Lower) => StepCommand::Decrement,
            (_, Direction::Raise) => StepCommand::Increment,
        }
    }
}

/// How a convergence run ended. Only a failed exchange is an error; every
/// variant here is a normal terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Value already equal to the target; nothing sent
    AlreadyAtTarget,
    /// Reported value cannot be stepped from; nothing sent
    InvalidCurrent,
    Reached,
    /// A step left the value unchanged, usually a hardware limit
    Stalled,
    /// Continuing would require stepping back the other way
    Overshot,
    /// [`MAX_CONVERGENCE_STEPS`] sent without settling
    StepLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Convergence {
    pub outcome: Outcome,
    /// Step commands sent
    pub steps: u32,
    /// Raw value from the last successful settings fetch
    pub achieved: Option<u32>,
}

impl Convergence {
    pub fn reached(&self) -> bool {
        matches!(self.outcome, Outcome::Reached | Outcome::AlreadyAtTarget)
    }
}

impl<C: Connector> Session<C> {
    /// Write an absolute value, then refresh the settings snapshot.
    ///
    /// Enumerated values are checked against the known-value table before
    /// anything is sent. Relative-only properties are rejected.
    pub async fn set_property(&mut self, property: Property, value: u32) -> Result<&PropertyValues> {
        self.require_ready("set property")?;
        if matches!(
            property,
            Property::Aperture | Property::ShutterSpeed | Property::ExposureCompensation
        ) {
            return Err(Error::UnknownOrInvalidValue(format!(
                "{} only supports relative steps",
                property
            )));
        }
        if !is_known_value(property, value) {
            return Err(Error::UnknownOrInvalidValue(format!(
                "{} is not a known {} value",
                value, property
            )));
        }

        let first =
            protocol::build(self.ids(), MessageType::TwoPart, &property.code().to_le_bytes())?;
        let second = protocol::build_followup(&first, &value.to_le_bytes())?;
        debug!(%property, value, "write property");
        self.two_part_exchange(&first, &second).await?;
        self.fetch_settings().await
    }

    /// Move the auto-focus point. The camera must be in AF-S mode.
    pub async fn set_focus_point(&mut self, point: AutoFocusPoint) -> Result<&PropertyValues> {
        self.require_ready("focus point")?;
        let message = protocol::build(self.ids(), MessageType::FocusPoint, &point.payload())?;
        debug!(x = point.x(), y = point.y(), "set focus point");
        self.exchange(&message).await?;
        self.fetch_settings().await
    }

    pub async fn unlock_focus(&mut self) -> Result<&PropertyValues> {
        self.require_ready("focus unlock")?;
        let message = protocol::build(self.ids(), MessageType::FocusUnlock, &[])?;
        self.exchange(&message).await?;
        self.fetch_settings().await
    }

    /// Send one step command.
    pub async fn step_once(&mut self, property: StepProperty, command: StepCommand) -> Result<()> {
        self.require_ready("step")?;
        let message = protocol::build(self.ids(), property.message_type(), &command.payload())?;
        self.exchange(&message).await
    }

    /// Send `|count|` step commands, decrementing for negative counts, then
    /// refresh the snapshot. Zero sends nothing.
    pub async fn step(&mut self, property: StepProperty, count: i32) -> Result<&PropertyValues> {
        self.require_ready("step")?;
        let command = if count < 0 {
            StepCommand::Decrement
        } else {
            StepCommand::Increment
        };
        for _ in 0..count.unsigned_abs() {
            self.step_once(property, command).await?;
        }
        self.fetch_settings().await
    }

    /// Step aperture toward `f_number_x100` (f/4.0 is 400).
    pub async fn set_aperture(&mut self, f_number_x100: u32) -> Result<Convergence> {
        if f_number_x100 == 0 || f_number_x100 >= MAX_APERTURE {
            return Err(Error::UnknownOrInvalidValue(format!(
                "aperture {} outside 1..{}",
                f_number_x100, MAX_APERTURE
            )));
        }
        self.converge(StepProperty::Aperture, i64::from(f_number_x100))
            .await
    }

    /// Step shutter speed toward an exposure time in microseconds.
    pub async fn set_shutter_speed(&mut self, micros: u64) -> Result<Convergence> {
        if micros == 0 {
            return Err(Error::UnknownOrInvalidValue(
                "shutter speed must be positive".to_string(),
            ));
        }
        let target = i64::try_from(micros).map_err(|_| {
            Error::UnknownOrInvalidValue(format!("shutter speed {}us out of range", micros))
        })?;
        self.converge(StepProperty::ShutterSpeed, target).await
    }

    /// Step exposure compensation toward `ev_x1000` (+1/3 EV is 333).
    pub async fn set_exposure_compensation(&mut self, ev_x1000: i32) -> Result<Convergence> {
        self.converge(StepProperty::ExposureCompensation, i64::from(ev_x1000))
            .await
    }

    /// Drive `property` toward `target`, expressed in the property's
    /// comparison key (see [`StepProperty::key`]).
    ///
    /// Each iteration sends one step and re-polls. The loop ends when the
    /// value matches, stops moving, or would need the opposite direction.
    /// The caller inspects [`Convergence::outcome`] to learn whether the
    /// target was reached.
    pub async fn converge(&mut self, property: StepProperty, target: i64) -> Result<Convergence> {
        self.require_ready("converge")?;
        let mut current = self.current_value(property).await?;
        if !property.is_valid(current) {
            return Ok(Convergence {
                outcome: Outcome::InvalidCurrent,
                steps: 0,
                achieved: Some(current),
            });
        }
        if property.key(current) == target {
            return Ok(Convergence {
                outcome: Outcome::AlreadyAtTarget,
                steps: 0,
                achieved: Some(current),
            });
        }

        let direction = Direction::toward(target, property.key(current));
        let command = property.command(direction);
        let mut steps = 0;
        let outcome = loop {
            if steps == MAX_CONVERGENCE_STEPS {
                break Outcome::StepLimit;
            }
            let last = current;
            self.step_once(property, command).await?;
            steps += 1;
            current = self.current_value(property).await?;
            debug!(?property, last, current, target, "step");

            let key = property.key(current);
            if key == target {
                break Outcome::Reached;
            }
            if current == last {
                break Outcome::Stalled;
            }
            if Direction::toward(target, key) != direction {
                break Outcome::Overshot;
            }
        };

        info!(?property, ?outcome, steps, achieved = current, target, "convergence finished");
        Ok(Convergence {
            outcome,
            steps,
            achieved: Some(current),
        })
    }

    async fn current_value(&mut self, property: StepProperty) -> Result<u32> {
        let settings = self.fetch_settings().await?;
        settings.get(property.property()).ok_or_else(|| {
            Error::exchange(
                MessageType::SinglePart,
                format!("settings reply has no {} value", property.property()),
            )
        })
    }
}

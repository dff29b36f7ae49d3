//! Motor driver: owns the STEP/DIR/ENABLE GPIOs and nothing else.
//!
//! Generic over `embedded-hal` 1.0 pin types the way
//! `other_examples/FrenchPOC-stepper-motion-rs`'s `StepperMotor` is, so the
//! same driver compiles against real GPIO pins on the target and against
//! [`crate::sim::SimPin`] in tests.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

/// Minimum STEP pulse width, in microseconds, the driver datasheet requires.
pub const STEP_PULSE_US: u32 = 3;
/// Minimum settle time after a direction change before the next step, in microseconds.
pub const DIR_CHANGE_HOLD_US: u32 = 5;

/// Errors from the underlying GPIO layer. The engine degrades to
/// [`crate::state::SystemState::Error`] on receipt; this type exists so the
/// pin-level failure is observable in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinError;

/// Direction of travel as seen by the motor driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Increasing step count.
    Forward,
    /// Decreasing step count.
    Backward,
}

/// Thin capability wrapping the three motor GPIOs.
pub struct MotorDriver<Step, Dir, Enable, Delay>
where
    Step: OutputPin,
    Dir: OutputPin,
    Enable: OutputPin,
    Delay: DelayNs,
{
    step_pin: Step,
    dir_pin: Dir,
    enable_pin: Enable,
    delay: Delay,
    direction: Direction,
    enabled: bool,
}

impl<Step, Dir, Enable, Delay> MotorDriver<Step, Dir, Enable, Delay>
where
    Step: OutputPin,
    Dir: OutputPin,
    Enable: OutputPin,
    Delay: DelayNs,
{
    /// Configure pins to their idle state: disabled, forward, pulse low.
    pub fn init(mut step_pin: Step, mut dir_pin: Dir, mut enable_pin: Enable, delay: Delay) -> Result<Self, PinError> {
        step_pin.set_low().map_err(|_| PinError)?;
        dir_pin.set_low().map_err(|_| PinError)?;
        enable_pin.set_high().map_err(|_| PinError)?; // active-low: high == disabled
        Ok(Self {
            step_pin,
            dir_pin,
            enable_pin,
            delay,
            direction: Direction::Forward,
            enabled: false,
        })
    }

    /// Emit one STEP pulse. The caller is responsible for having selected
    /// the correct direction beforehand via [`Self::set_direction`].
    pub fn step(&mut self) -> Result<(), PinError> {
        self.step_pin.set_high().map_err(|_| PinError)?;
        self.delay.delay_us(STEP_PULSE_US);
        self.step_pin.set_low().map_err(|_| PinError)?;
        self.delay.delay_us(STEP_PULSE_US);
        Ok(())
    }

    /// Set the direction line, waiting out the hold time only if it actually changed.
    pub fn set_direction(&mut self, direction: Direction) -> Result<(), PinError> {
        if self.direction == direction {
            return Ok(());
        }
        match direction {
            Direction::Forward => self.dir_pin.set_low().map_err(|_| PinError)?,
            Direction::Backward => self.dir_pin.set_high().map_err(|_| PinError)?,
        }
        self.direction = direction;
        self.delay.delay_us(DIR_CHANGE_HOLD_US);
        Ok(())
    }

    /// Current direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Enable the driver (active-low line pulled low).
    pub fn enable(&mut self) -> Result<(), PinError> {
        self.enable_pin.set_low().map_err(|_| PinError)?;
        self.enabled = true;
        Ok(())
    }

    /// Disable the driver (active-low line released high).
    pub fn disable(&mut self) -> Result<(), PinError> {
        self.enable_pin.set_high().map_err(|_| PinError)?;
        self.enabled = false;
        Ok(())
    }

    /// Whether the driver is currently enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Capability a motion controller needs to advance the carriage by one
/// step, without knowing which concrete GPIO pins back the driver.
pub trait StepSink {
    /// Set direction (if needed) and emit one step pulse.
    fn step_in(&mut self, direction: Direction) -> Result<(), PinError>;
}

impl<Step, Dir, Enable, Delay> StepSink for MotorDriver<Step, Dir, Enable, Delay>
where
    Step: OutputPin,
    Dir: OutputPin,
    Enable: OutputPin,
    Delay: DelayNs,
{
    fn step_in(&mut self, direction: Direction) -> Result<(), PinError> {
        self.set_direction(direction)?;
        self.step()
    }
}

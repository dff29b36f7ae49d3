//! Capability traits the engine needs from its host platform.
//!
//! The motion core is generic over these traits rather than over a concrete
//! MCU HAL, the way `other_examples/FrenchPOC-stepper-motion-rs` keeps its
//! `StepperMotor` generic over `embedded_hal::digital::OutputPin` and
//! `embedded_hal::delay::DelayNs`. That keeps the controllers fully testable
//! on a host via [`crate::sim`] while compiling unchanged against real GPIO
//! pin types on the target.

use embedded_hal::digital::InputPin;

/// A free-running microsecond clock. Must not wrap within any interval the
/// engine measures (a `u64` counter at microsecond resolution overflows
/// after ~584,000 years, which is sufficient).
pub trait MicrosClock {
    /// Current time in microseconds since an arbitrary epoch.
    fn now_us(&self) -> u64;

    /// Current time in milliseconds since the same epoch as [`Self::now_us`].
    fn now_ms(&self) -> u64 {
        self.now_us() / 1000
    }
}

/// A single debounced-capable limit-contact input (active-low: pressed reads low).
pub trait ContactInput {
    /// Underlying GPIO input pin type.
    type Pin: InputPin;

    /// Raw (undebounced) pin access.
    fn pin(&mut self) -> &mut Self::Pin;
}

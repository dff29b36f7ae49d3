//! Software-simulated platform used by the test suites, and by the `sim`
//! demo binary when hardware isn't available.
//!
//! Stands in for `crate::platform`'s traits the way a host build of the
//! teacher's drivers stands in for real hardware in its own test modules.

#![cfg(any(test, feature = "sim"))]

use std::cell::Cell;
use std::convert::Infallible;
use std::rc::Rc;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

use crate::platform::{ContactInput, MicrosClock};

/// A clock driven entirely by [`SimClock::advance`]; never reads wall time.
#[derive(Debug, Default)]
pub struct SimClock {
    us: Cell<u64>,
}

impl SimClock {
    /// Advance the simulated clock by `us` microseconds.
    pub fn advance(&self, us: u64) {
        self.us.set(self.us.get() + us);
    }
}

impl MicrosClock for SimClock {
    fn now_us(&self) -> u64 {
        self.us.get()
    }
}

/// A GPIO pin backed by a shared boolean cell, high = logic high.
///
/// Cloning a `SimPin` shares the underlying cell (via `Rc`), so a test can
/// hold one handle to press/release a contact while another handle is
/// moved into the driver/sensor under test.
#[derive(Debug, Clone, Default)]
pub struct SimPin {
    high: Rc<Cell<bool>>,
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high.set(false);
        Ok(())
    }
    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high.set(true);
        Ok(())
    }
}

impl InputPin for SimPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.high.get())
    }
    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.high.get())
    }
}

impl SimPin {
    /// Directly force the pin level, simulating external wiring (e.g. a
    /// test pressing a limit contact).
    pub fn force(&self, level: bool) {
        self.high.set(level);
    }

    /// Current level.
    pub fn level(&self) -> bool {
        self.high.get()
    }
}

/// A [`DelayNs`] impl that just advances a shared [`SimClock`] without
/// actually blocking the test thread. Owns an `Rc`-free plain reference by
/// being constructed fresh per call site in test code (the clock itself is
/// `Cell`-based so `&SimClock` is enough to mutate it).
pub struct SimDelay<'a>(pub &'a SimClock);

impl DelayNs for SimDelay<'_> {
    fn delay_ns(&mut self, ns: u32) {
        self.0.advance((ns as u64).div_ceil(1000));
    }
    fn delay_us(&mut self, us: u32) {
        self.0.advance(us as u64);
    }
    fn delay_ms(&mut self, ms: u32) {
        self.0.advance(ms as u64 * 1000);
    }
}

/// A simulated limit contact.
#[derive(Default)]
pub struct SimContact {
    pub pin: SimPin,
}

impl SimContact {
    /// Press the contact (active-low: drives the pin low).
    pub fn press(&self) {
        self.pin.force(false);
    }
    /// Release the contact.
    pub fn release(&self) {
        self.pin.force(true);
    }
}

impl ContactInput for SimContact {
    type Pin = SimPin;

    fn pin(&mut self) -> &mut Self::Pin {
        &mut self.pin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_advances_monotonically() {
        let clock = SimClock::default();
        assert_eq!(clock.now_us(), 0);
        clock.advance(1500);
        assert_eq!(clock.now_us(), 1500);
        assert_eq!(clock.now_ms(), 1);
    }

    #[test]
    fn contact_press_release_toggles_level() {
        let mut contact = SimContact::default();
        assert!(contact.pin().is_high().unwrap());
        contact.press();
        assert!(contact.pin().is_low().unwrap());
        contact.release();
        assert!(contact.pin().is_high().unwrap());
    }

    #[test]
    fn delay_advances_clock_by_requested_amount() {
        let clock = SimClock::default();
        let mut delay = SimDelay(&clock);
        delay.delay_us(5);
        delay.delay_ms(1);
        assert_eq!(clock.now_us(), 1005);
    }
}

//! Limit-contact sensors: debounced reads and the drift checks the
//! stepping routines of [`crate::vaet`], [`crate::oscillation`] and
//! [`crate::chaos`] consult near either end of travel.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::InputPin;

/// Default number of samples used to debounce the end contact.
pub const END_DEBOUNCE_SAMPLES: u8 = 5;
/// Default number of samples used to debounce the start contact.
pub const START_DEBOUNCE_SAMPLES: u8 = 3;

/// The two limit-contact inputs plus the delay used between debounce samples.
pub struct ContactSensors<StartPin, EndPin, Delay>
where
    StartPin: InputPin,
    EndPin: InputPin,
    Delay: DelayNs,
{
    start: StartPin,
    end: EndPin,
    delay: Delay,
}

impl<StartPin, EndPin, Delay> ContactSensors<StartPin, EndPin, Delay>
where
    StartPin: InputPin,
    EndPin: InputPin,
    Delay: DelayNs,
{
    /// Wrap the two contact pins and a delay provider.
    pub fn new(start: StartPin, end: EndPin, delay: Delay) -> Self {
        Self { start, end, delay }
    }

    /// Debounced read of the start contact (active-low: pressed == true).
    pub fn is_start_active(&mut self, n: u8, delay_us: u32) -> bool {
        Self::majority(&mut self.start, &mut self.delay, n, delay_us)
    }

    /// Debounced read of the end contact (active-low: pressed == true).
    pub fn is_end_active(&mut self, n: u8, delay_us: u32) -> bool {
        Self::majority(&mut self.end, &mut self.delay, n, delay_us)
    }

    /// Raw, undebounced start-contact read.
    pub fn is_start_raw(&mut self) -> bool {
        self.start.is_low().unwrap_or(false)
    }

    /// Raw, undebounced end-contact read.
    pub fn is_end_raw(&mut self) -> bool {
        self.end.is_low().unwrap_or(false)
    }

    /// Majority vote over `n` samples spaced `delay_us` apart, exiting
    /// early once a majority can no longer flip.
    fn majority<P: InputPin>(pin: &mut P, delay: &mut Delay, n: u8, delay_us: u32) -> bool {
        let n = n.max(1);
        let needed = n / 2 + 1;
        let mut active = 0u8;
        let mut inactive = 0u8;
        for i in 0..n {
            if pin.is_low().unwrap_or(false) {
                active += 1;
            } else {
                inactive += 1;
            }
            if active >= needed {
                return true;
            }
            if inactive >= needed {
                return false;
            }
            if i + 1 < n {
                delay.delay_us(delay_us);
            }
        }
        active >= needed
    }

    /// Hard-drift check near the start of travel: only fires while within
    /// `test_zone_steps` of `min_step`, to avoid paying the debounce cost
    /// across the bulk of travel.
    pub fn check_hard_drift_start(&mut self, current_step: i64, min_step: i64, test_zone_steps: i64) -> bool {
        if current_step - min_step > test_zone_steps {
            return false;
        }
        self.is_start_active(START_DEBOUNCE_SAMPLES, 50)
    }

    /// Hard-drift check near the end of travel.
    pub fn check_hard_drift_end(&mut self, current_step: i64, max_step: i64, test_zone_steps: i64) -> bool {
        if max_step - current_step > test_zone_steps {
            return false;
        }
        self.is_end_active(END_DEBOUNCE_SAMPLES, 50)
    }
}

/// Capability a motion controller needs to check for a limit-contact
/// activation near either end of travel, without knowing the concrete pin
/// types backing the sensors.
pub trait DriftSensor {
    /// See [`ContactSensors::check_hard_drift_start`].
    fn hard_drift_start(&mut self, current_step: i64, min_step: i64, test_zone_steps: i64) -> bool;
    /// See [`ContactSensors::check_hard_drift_end`].
    fn hard_drift_end(&mut self, current_step: i64, max_step: i64, test_zone_steps: i64) -> bool;
}

impl<StartPin, EndPin, Delay> DriftSensor for ContactSensors<StartPin, EndPin, Delay>
where
    StartPin: InputPin,
    EndPin: InputPin,
    Delay: DelayNs,
{
    fn hard_drift_start(&mut self, current_step: i64, min_step: i64, test_zone_steps: i64) -> bool {
        self.check_hard_drift_start(current_step, min_step, test_zone_steps)
    }
    fn hard_drift_end(&mut self, current_step: i64, max_step: i64, test_zone_steps: i64) -> bool {
        self.check_hard_drift_end(current_step, max_step, test_zone_steps)
    }
}

/// Pure soft-drift check: if `current_step` has overrun `min_step` by less
/// than `buffer_steps`, return a corrected in-bounds value. Returns `None`
/// if there is no overrun to correct.
pub fn check_and_correct_drift_start(current_step: i64, min_step: i64, buffer_steps: i64) -> Option<i64> {
    if current_step < min_step && min_step - current_step <= buffer_steps {
        Some(min_step)
    } else {
        None
    }
}

/// Pure soft-drift check at the end of travel; symmetric with
/// [`check_and_correct_drift_start`].
pub fn check_and_correct_drift_end(current_step: i64, max_step: i64, buffer_steps: i64) -> Option<i64> {
    if current_step > max_step && current_step - max_step <= buffer_steps {
        Some(max_step)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimClock, SimContact, SimDelay};

    fn sensors(clock: &SimClock) -> (SimContact, SimContact, ContactSensors<crate::sim::SimPin, crate::sim::SimPin, SimDelay<'_>>) {
        let start = SimContact::default();
        let end = SimContact::default();
        let cs = ContactSensors::new(start.pin.clone(), end.pin.clone(), SimDelay(clock));
        (start, end, cs)
    }

    #[test]
    fn majority_vote_requires_majority_not_unanimity() {
        let clock = SimClock::default();
        let (start, _end, mut cs) = sensors(&clock);
        start.press();
        assert!(cs.is_start_active(5, 10));
        start.release();
        assert!(!cs.is_start_active(5, 10));
    }

    #[test]
    fn hard_drift_ignored_outside_test_zone() {
        let clock = SimClock::default();
        let (_start, end, mut cs) = sensors(&clock);
        end.press();
        // current_step far from max_step: zone not entered, contact ignored.
        assert!(!cs.check_hard_drift_end(0, 10_000, 200));
    }

    #[test]
    fn hard_drift_detected_inside_test_zone() {
        let clock = SimClock::default();
        let (_start, end, mut cs) = sensors(&clock);
        end.press();
        assert!(cs.check_hard_drift_end(9_950, 10_000, 200));
    }

    #[test]
    fn soft_drift_start_corrects_small_overrun_only() {
        assert_eq!(check_and_correct_drift_start(-3, 0, 5), Some(0));
        assert_eq!(check_and_correct_drift_start(-10, 0, 5), None);
        assert_eq!(check_and_correct_drift_start(5, 0, 5), None);
    }

    #[test]
    fn soft_drift_end_corrects_small_overrun_only() {
        assert_eq!(check_and_correct_drift_end(10_003, 10_000, 5), Some(10_000));
        assert_eq!(check_and_correct_drift_end(10_020, 10_000, 5), None);
    }
}

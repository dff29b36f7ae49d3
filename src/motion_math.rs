//! Pure, deterministic motion formulas shared by every controller.
//!
//! Nothing in this module touches the clock, the motor, or any mutex; every
//! function is a total function of its arguments, which keeps the whole
//! trajectory surface unit-testable without a simulated platform.

use core::f64::consts::PI;

/// Minimum step delay the hardware tolerates, in microseconds.
pub const MIN_STEP_DELAY_US: u32 = 20;

/// Convert a distance in millimeters to a step count.
pub fn mm_to_steps(mm: f64, steps_per_mm: f64) -> i64 {
    (mm * steps_per_mm).round() as i64
}

/// Convert a step count back to millimeters.
pub fn steps_to_mm(steps: i64, steps_per_mm: f64) -> f64 {
    steps as f64 / steps_per_mm
}

/// Map a coarse 0..=max_level speed level to cycles per minute.
pub fn speed_to_cpm(level: f64, max_level: f64) -> f64 {
    (level * 10.0).clamp(0.0, max_level * 10.0)
}

/// Step delay, in microseconds, for one half-cycle of a VAET traversal.
///
/// Returns `1000` for degenerate input (zero or negative distance/level),
/// matching the "safe default" behavior expected of a malformed command.
pub fn vaet_step_delay_us(
    distance_mm: f64,
    level: f64,
    steps_per_mm: f64,
    max_level: f64,
    step_execution_time_us: f64,
    speed_compensation_factor: f64,
) -> u32 {
    let steps_per_dir = mm_to_steps(distance_mm, steps_per_mm);
    if steps_per_dir <= 0 || level <= 0.0 {
        return 1000;
    }
    let cpm = speed_to_cpm(level, max_level);
    if cpm <= 0.0 {
        return 1000;
    }
    let half_cycle_ms = 30_000.0 / cpm;
    let raw_us = half_cycle_ms * 1000.0 / steps_per_dir as f64;
    let delay = (raw_us - step_execution_time_us) / speed_compensation_factor;
    delay.max(MIN_STEP_DELAY_US as f64).round() as u32
}

/// Step delay, in microseconds, for a chaos-pattern speed level.
pub fn chaos_step_delay_us(
    level: f64,
    steps_per_mm: f64,
    speed_compensation_factor: f64,
    max_step_delay_us: u32,
) -> u32 {
    let mm_per_s = level * 10.0;
    let sps = mm_per_s * steps_per_mm;
    if sps <= 0.0 {
        return 10_000;
    }
    let raw_us = 1_000_000.0 / sps;
    let delay = (raw_us / speed_compensation_factor).round() as u32;
    delay.clamp(MIN_STEP_DELAY_US, max_step_delay_us)
}

/// Step delay, in microseconds, for the pursuit controller given the
/// current position error in millimeters.
pub fn pursuit_step_delay_us(
    error_mm: f64,
    max_level: f64,
    steps_per_mm: f64,
    speed_compensation_factor: f64,
) -> u32 {
    let err = error_mm.abs();
    let level = if err > 5.0 {
        max_level
    } else if err > 1.0 {
        max_level * (0.6 + 0.4 * (err - 1.0) / 4.0)
    } else {
        max_level * 0.6
    };
    let mm_per_s = level * 10.0;
    let mut sps = mm_per_s * steps_per_mm;
    sps = sps.clamp(30.0, 6000.0);
    let raw_us = 1_000_000.0 / sps;
    (raw_us / speed_compensation_factor)
        .round()
        .max(MIN_STEP_DELAY_US as f64) as u32
}

/// Shape of the zone-effect speed curve, evaluated at `progress` where
/// `0.0` is zone entry and `1.0` is zone exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SpeedCurve {
    /// Linear falloff.
    Linear,
    /// Half-cosine falloff.
    Sine,
    /// Inverted quadratic falloff.
    TriangleInv,
    /// Inverted quarter-sine falloff.
    SineInv,
}

impl SpeedCurve {
    fn value(self, progress: f64) -> f64 {
        let p = progress.clamp(0.0, 1.0);
        match self {
            SpeedCurve::Linear => 1.0 - p,
            SpeedCurve::Sine => 1.0 - (1.0 - (PI * p).cos()) / 2.0,
            SpeedCurve::TriangleInv => (1.0 - p) * (1.0 - p),
            SpeedCurve::SineInv => (((1.0 - p) * PI) / 2.0).sin(),
        }
    }
}

/// What a zone effect does to the step delay as the carriage enters it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SpeedEffect {
    /// No modulation.
    None,
    /// Lengthen the delay (slow down) approaching the zone boundary.
    Decel,
    /// Shorten the delay (speed up) approaching the zone boundary.
    Accel,
}

/// Multiplicative factor applied to the base step delay inside a zone.
///
/// `intensity` is 0..=100. Values above 1.0 lengthen the delay (slower
/// motion); values below 1.0 shorten it.
pub fn zone_speed_factor(effect: SpeedEffect, curve: SpeedCurve, intensity: u8, progress: f64) -> f64 {
    let max_intensity = 1.0 + (intensity.min(100) as f64 / 100.0) * 9.0;
    let c = curve.value(progress);
    match effect {
        SpeedEffect::None => 1.0,
        SpeedEffect::Decel => 1.0 + c * (max_intensity - 1.0),
        SpeedEffect::Accel => 1.0 - (1.0 - c) * (1.0 - 1.0 / max_intensity),
    }
}

/// Oscillation waveform kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Waveform {
    /// Sinusoidal.
    Sine,
    /// Linear triangle wave.
    Triangle,
    /// Hard square wave.
    Square,
}

/// Evaluate a normalized waveform at fractional phase `phase` (`0.0..1.0`),
/// returning a value in `[-1.0, 1.0]`.
pub fn waveform_value(kind: Waveform, phase: f64) -> f64 {
    let p = phase.rem_euclid(1.0);
    match kind {
        Waveform::Sine => -(2.0 * PI * p).cos(),
        Waveform::Triangle => {
            if p < 0.5 {
                -1.0 + 4.0 * p
            } else {
                3.0 - 4.0 * p
            }
        }
        Waveform::Square => {
            if p < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
    }
}

/// Cap an oscillation frequency so that peak linear speed stays under
/// `osc_max_speed_mms`. Returns the requested frequency unchanged if it is
/// already within the cap, or amplitude is zero.
pub fn cap_oscillation_frequency(requested_hz: f64, amplitude_mm: f64, osc_max_speed_mms: f64) -> f64 {
    if amplitude_mm <= 0.0 {
        return requested_hz;
    }
    let cap = osc_max_speed_mms / (2.0 * PI * amplitude_mm);
    requested_hz.min(cap)
}

/// Base per-pattern chaos duration parameters.
#[derive(Debug, Clone, Copy)]
pub struct ChaosDurationConfig {
    /// Minimum pattern duration before any craziness reduction, in ms.
    pub duration_min_ms: f64,
    /// Maximum pattern duration before any craziness reduction, in ms.
    pub duration_max_ms: f64,
    /// How much craziness (0..1) shortens the minimum duration, in ms.
    pub duration_craziness_reduction_ms: f64,
}

/// Compute the safe `[min, max]` duration window (in ms) for a chaos
/// pattern given a craziness scalar in `[0.0, 1.0]`.
pub fn chaos_safe_duration(cfg: ChaosDurationConfig, craziness: f64, max_factor: f64) -> (f64, f64) {
    let c = craziness.clamp(0.0, 1.0);
    let min = (cfg.duration_min_ms - cfg.duration_craziness_reduction_ms * c).max(100.0);
    let max_raw = cfg.duration_max_ms - (cfg.duration_max_ms - cfg.duration_min_ms) * c * max_factor;
    let max = max_raw.max(min + 100.0);
    (min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mm_steps_round_trip() {
        assert_eq!(mm_to_steps(10.0, 100.0), 1000);
        assert_eq!(steps_to_mm(1000, 100.0), 10.0);
    }

    #[test]
    fn speed_to_cpm_clamps() {
        assert_eq!(speed_to_cpm(5.0, 20.0), 50.0);
        assert_eq!(speed_to_cpm(1000.0, 20.0), 200.0);
        assert_eq!(speed_to_cpm(-5.0, 20.0), 0.0);
    }

    #[test]
    fn vaet_delay_degenerate_inputs_return_default() {
        assert_eq!(vaet_step_delay_us(0.0, 5.0, 100.0, 20.0, 50.0, 1.0), 1000);
        assert_eq!(vaet_step_delay_us(10.0, 0.0, 100.0, 20.0, 50.0, 1.0), 1000);
    }

    #[test]
    fn vaet_delay_never_below_floor() {
        let d = vaet_step_delay_us(1000.0, 20.0, 100.0, 20.0, 50.0, 1.0);
        assert!(d >= MIN_STEP_DELAY_US);
    }

    #[test]
    fn chaos_delay_zero_speed_is_slow_default() {
        assert_eq!(chaos_step_delay_us(0.0, 100.0, 1.0, 10_000), 10_000);
    }

    #[test]
    fn chaos_delay_clamped_to_max() {
        let d = chaos_step_delay_us(0.001, 100.0, 1.0, 5_000);
        assert_eq!(d, 5_000);
    }

    #[test]
    fn pursuit_delay_monotonic_in_error() {
        let near = pursuit_step_delay_us(0.5, 20.0, 100.0, 1.0);
        let mid = pursuit_step_delay_us(3.0, 20.0, 100.0, 1.0);
        let far = pursuit_step_delay_us(10.0, 20.0, 100.0, 1.0);
        assert!(far <= mid);
        assert!(mid <= near);
    }

    #[test]
    fn zone_factor_none_is_identity() {
        assert_eq!(zone_speed_factor(SpeedEffect::None, SpeedCurve::Linear, 50, 0.3), 1.0);
    }

    #[test]
    fn zone_factor_decel_is_above_one_entering_zone() {
        let f = zone_speed_factor(SpeedEffect::Decel, SpeedCurve::Linear, 100, 0.0);
        assert!(f > 1.0);
        let f_exit = zone_speed_factor(SpeedEffect::Decel, SpeedCurve::Linear, 100, 1.0);
        assert!((f_exit - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zone_factor_accel_is_below_one_entering_zone() {
        let f = zone_speed_factor(SpeedEffect::Accel, SpeedCurve::Linear, 100, 0.0);
        assert!(f < 1.0);
        let f_exit = zone_speed_factor(SpeedEffect::Accel, SpeedCurve::Linear, 100, 1.0);
        assert!((f_exit - 1.0).abs() < 1e-9);
    }

    #[test]
    fn waveform_bounds() {
        for kind in [Waveform::Sine, Waveform::Triangle, Waveform::Square] {
            for i in 0..20 {
                let v = waveform_value(kind, i as f64 / 20.0);
                assert!((-1.0..=1.0).contains(&v), "{kind:?} out of bounds at {i}");
            }
        }
    }

    #[test]
    fn waveform_square_is_discontinuous_at_half() {
        assert_eq!(waveform_value(Waveform::Square, 0.25), 1.0);
        assert_eq!(waveform_value(Waveform::Square, 0.75), -1.0);
    }

    #[test]
    fn oscillation_cap_triggers_exactly_above_threshold() {
        let amplitude = 50.0;
        let max_speed = 628.0; // ~= 2*pi*2*50
        let requested = 2.0;
        let capped = cap_oscillation_frequency(requested, amplitude, max_speed);
        assert!(capped <= requested);
        let low = cap_oscillation_frequency(0.5, amplitude, max_speed);
        assert_eq!(low, 0.5);
    }

    #[test]
    fn oscillation_cap_passthrough_for_zero_amplitude() {
        assert_eq!(cap_oscillation_frequency(5.0, 0.0, 100.0), 5.0);
    }

    #[test]
    fn chaos_duration_window_shrinks_with_craziness() {
        let cfg = ChaosDurationConfig {
            duration_min_ms: 1000.0,
            duration_max_ms: 5000.0,
            duration_craziness_reduction_ms: 500.0,
        };
        let (min0, max0) = chaos_safe_duration(cfg, 0.0, 1.0);
        let (min1, max1) = chaos_safe_duration(cfg, 1.0, 1.0);
        assert!(min1 <= min0);
        assert!(max1 <= max0);
        assert!(max1 >= min1 + 100.0);
    }
}

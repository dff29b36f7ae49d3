//! The eleven named chaos trajectory generators and their selection weights.

use rand::Rng;

use crate::motion_math;

/// One of the eleven named chaos trajectory generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ChaosPattern {
    /// Repeatedly re-draws a random target within the amplitude window.
    Zigzag,
    /// Linearly sweeps between two random extremes, reversing at each endpoint.
    Sweep,
    /// Two-phase: outward then return, re-picking amplitude at each phase change.
    Pulse,
    /// Slow random walk; target wanders by small random deltas.
    Drift,
    /// Large random jumps at high speed.
    Burst,
    /// Continuous sinusoidal motion.
    Wave,
    /// Deterministic back-and-forth at constant amplitude.
    Pendulum,
    /// Amplitude grows from 10% to 100% of the window over the pattern's duration.
    Spiral,
    /// Slow sinusoid with an occasional internal pause.
    Calm,
    /// Fast outward, slow return, then a pause.
    BruteForce,
    /// Slow outward, fast return — the mirror of [`ChaosPattern::BruteForce`].
    Liberator,
}

/// All eleven patterns, in a fixed order used for weighted selection.
pub const ALL: [ChaosPattern; 11] = [
    ChaosPattern::Zigzag,
    ChaosPattern::Sweep,
    ChaosPattern::Pulse,
    ChaosPattern::Drift,
    ChaosPattern::Burst,
    ChaosPattern::Wave,
    ChaosPattern::Pendulum,
    ChaosPattern::Spiral,
    ChaosPattern::Calm,
    ChaosPattern::BruteForce,
    ChaosPattern::Liberator,
];

impl ChaosPattern {
    /// Relative selection weight. CALM is biased to 10% of the total when
    /// every pattern is enabled; the remaining ten share the other 90%
    /// uniformly.
    pub fn weight(self) -> u32 {
        match self {
            ChaosPattern::Calm => 10,
            _ => 9,
        }
    }

    /// This pattern's bit in [`EnabledPatterns`].
    pub fn flag(self) -> EnabledPatterns {
        match self {
            ChaosPattern::Zigzag => EnabledPatterns::ZIGZAG,
            ChaosPattern::Sweep => EnabledPatterns::SWEEP,
            ChaosPattern::Pulse => EnabledPatterns::PULSE,
            ChaosPattern::Drift => EnabledPatterns::DRIFT,
            ChaosPattern::Burst => EnabledPatterns::BURST,
            ChaosPattern::Wave => EnabledPatterns::WAVE,
            ChaosPattern::Pendulum => EnabledPatterns::PENDULUM,
            ChaosPattern::Spiral => EnabledPatterns::SPIRAL,
            ChaosPattern::Calm => EnabledPatterns::CALM,
            ChaosPattern::BruteForce => EnabledPatterns::BRUTE_FORCE,
            ChaosPattern::Liberator => EnabledPatterns::LIBERATOR,
        }
    }
}

bitflags::bitflags! {
    /// Bitmap of which patterns [`pick_pattern`] may draw from.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    pub struct EnabledPatterns: u16 {
        const ZIGZAG      = 1 << 0;
        const SWEEP       = 1 << 1;
        const PULSE       = 1 << 2;
        const DRIFT       = 1 << 3;
        const BURST       = 1 << 4;
        const WAVE        = 1 << 5;
        const PENDULUM    = 1 << 6;
        const SPIRAL      = 1 << 7;
        const CALM        = 1 << 8;
        const BRUTE_FORCE = 1 << 9;
        const LIBERATOR   = 1 << 10;
    }
}

impl Default for EnabledPatterns {
    /// All eleven patterns eligible.
    fn default() -> Self {
        Self::all()
    }
}

/// Tuning constants for one pattern's speed and duration draw.
#[derive(Debug, Clone, Copy)]
pub struct PatternBaseConfig {
    /// Minimum speed level fraction (of `max_speed_level`).
    pub speed_min: f64,
    /// Maximum speed level fraction.
    pub speed_max: f64,
    /// Additional speed fraction added at full craziness.
    pub speed_craziness_boost: f64,
    /// Duration window before craziness narrows it.
    pub duration: motion_math::ChaosDurationConfig,
    /// Minimum amplitude-jump fraction of the configured amplitude.
    pub amplitude_jump_min: f64,
    /// Maximum amplitude-jump fraction.
    pub amplitude_jump_max: f64,
}

/// Base config per pattern. Values are illustrative constants tuned for a
/// visually distinct feel per pattern rather than derived from a formula.
pub fn base_config(pattern: ChaosPattern) -> PatternBaseConfig {
    use ChaosPattern as P;
    let duration = |min_ms: f64, max_ms: f64, reduction_ms: f64| motion_math::ChaosDurationConfig {
        duration_min_ms: min_ms,
        duration_max_ms: max_ms,
        duration_craziness_reduction_ms: reduction_ms,
    };
    match pattern {
        P::Zigzag => PatternBaseConfig {
            speed_min: 0.6,
            speed_max: 1.0,
            speed_craziness_boost: 0.3,
            duration: duration(300.0, 900.0, 200.0),
            amplitude_jump_min: 0.3,
            amplitude_jump_max: 1.0,
        },
        P::Sweep => PatternBaseConfig {
            speed_min: 0.3,
            speed_max: 0.7,
            speed_craziness_boost: 0.2,
            duration: duration(1500.0, 4000.0, 800.0),
            amplitude_jump_min: 0.6,
            amplitude_jump_max: 1.0,
        },
        P::Pulse => PatternBaseConfig {
            speed_min: 0.5,
            speed_max: 0.9,
            speed_craziness_boost: 0.2,
            duration: duration(800.0, 2000.0, 400.0),
            amplitude_jump_min: 0.4,
            amplitude_jump_max: 0.9,
        },
        P::Drift => PatternBaseConfig {
            speed_min: 0.1,
            speed_max: 0.3,
            speed_craziness_boost: 0.1,
            duration: duration(2000.0, 6000.0, 1000.0),
            amplitude_jump_min: 0.02,
            amplitude_jump_max: 0.15,
        },
        P::Burst => PatternBaseConfig {
            speed_min: 0.8,
            speed_max: 1.0,
            speed_craziness_boost: 0.2,
            duration: duration(150.0, 500.0, 100.0),
            amplitude_jump_min: 0.6,
            amplitude_jump_max: 1.0,
        },
        P::Wave => PatternBaseConfig {
            speed_min: 0.3,
            speed_max: 0.6,
            speed_craziness_boost: 0.1,
            duration: duration(2000.0, 5000.0, 500.0),
            amplitude_jump_min: 1.0,
            amplitude_jump_max: 1.0,
        },
        P::Pendulum => PatternBaseConfig {
            speed_min: 0.4,
            speed_max: 0.6,
            speed_craziness_boost: 0.1,
            duration: duration(2000.0, 5000.0, 500.0),
            amplitude_jump_min: 1.0,
            amplitude_jump_max: 1.0,
        },
        P::Spiral => PatternBaseConfig {
            speed_min: 0.4,
            speed_max: 0.8,
            speed_craziness_boost: 0.2,
            duration: duration(2000.0, 6000.0, 1000.0),
            amplitude_jump_min: 1.0,
            amplitude_jump_max: 1.0,
        },
        P::Calm => PatternBaseConfig {
            speed_min: 0.1,
            speed_max: 0.25,
            speed_craziness_boost: 0.0,
            duration: duration(3000.0, 8000.0, 1000.0),
            amplitude_jump_min: 0.8,
            amplitude_jump_max: 1.0,
        },
        P::BruteForce => PatternBaseConfig {
            speed_min: 0.7,
            speed_max: 1.0,
            speed_craziness_boost: 0.0,
            duration: duration(1000.0, 3000.0, 500.0),
            amplitude_jump_min: 0.8,
            amplitude_jump_max: 1.0,
        },
        P::Liberator => PatternBaseConfig {
            speed_min: 0.1,
            speed_max: 0.3,
            speed_craziness_boost: 0.0,
            duration: duration(1000.0, 3000.0, 500.0),
            amplitude_jump_min: 0.8,
            amplitude_jump_max: 1.0,
        },
    }
}

/// Pick a pattern at random from `enabled`, weighted per [`ChaosPattern::weight`].
/// Falls back to [`ChaosPattern::Drift`] if `enabled` is empty (caller error).
pub fn pick_pattern(rng: &mut impl Rng, enabled: EnabledPatterns) -> ChaosPattern {
    let candidates: heapless::Vec<ChaosPattern, 11> =
        ALL.iter().copied().filter(|p| enabled.contains(p.flag())).collect();
    if candidates.is_empty() {
        return ChaosPattern::Drift;
    }
    let total: u32 = candidates.iter().map(|p| p.weight()).sum();
    let mut roll = rng.gen_range(0..total);
    for &p in candidates.iter() {
        if roll < p.weight() {
            return p;
        }
        roll -= p.weight();
    }
    candidates[candidates.len() - 1]
}

/// Per-tick target position (millimeters), for patterns whose trajectory
/// only depends on elapsed time within the pattern and is otherwise
/// stateless (deterministic patterns). Random-walk/re-pick patterns are
/// driven instead by [`crate::chaos::ChaosController`] directly, since they
/// need to latch sub-targets across ticks.
pub fn deterministic_target_mm(
    pattern: ChaosPattern,
    center_mm: f64,
    amplitude_mm: f64,
    elapsed_ms: f64,
    duration_ms: f64,
) -> Option<f64> {
    let frac = (elapsed_ms / duration_ms.max(1.0)).clamp(0.0, 1.0);
    match pattern {
        ChaosPattern::Wave => {
            let cycles = 3.0;
            let phase = frac * cycles;
            Some(center_mm + amplitude_mm * motion_math::waveform_value(motion_math::Waveform::Sine, phase))
        }
        ChaosPattern::Pendulum => {
            let cycles = 2.0;
            let phase = frac * cycles;
            Some(center_mm + amplitude_mm * motion_math::waveform_value(motion_math::Waveform::Triangle, phase))
        }
        ChaosPattern::Spiral => {
            let growth = 0.1 + 0.9 * frac;
            let cycles = 4.0;
            let phase = frac * cycles;
            Some(center_mm + amplitude_mm * growth * motion_math::waveform_value(motion_math::Waveform::Sine, phase))
        }
        ChaosPattern::Calm => {
            let hz = 0.2 + 0.8 * (1.0 - frac);
            let phase = elapsed_ms / 1000.0 * hz;
            Some(center_mm + amplitude_mm * motion_math::waveform_value(motion_math::Waveform::Sine, phase))
        }
        ChaosPattern::Sweep => {
            // One full triangle cycle per run: out to one extreme, back
            // through center to the other, reversing exactly at each end.
            Some(center_mm + amplitude_mm * motion_math::waveform_value(motion_math::Waveform::Triangle, frac))
        }
        ChaosPattern::Pulse => Some(center_mm + amplitude_mm * outward_then_return(frac, 0.5, 0.5)),
        ChaosPattern::BruteForce => {
            // Fast outward, slow return, then a pause sitting at center.
            Some(center_mm + amplitude_mm * outward_then_return(frac, 0.25, 0.65))
        }
        ChaosPattern::Liberator => {
            // Mirror of BruteForce: slow outward, fast return.
            Some(center_mm + amplitude_mm * outward_then_return(frac, 0.65, 0.25))
        }
        _ => None,
    }
}

/// Piecewise ramp from `0.0` up to `1.0` over `[0, out_frac]`, back down to
/// `0.0` over `(out_frac, out_frac + return_frac]`, then held at `0.0` for
/// whatever fraction of `[0, 1]` remains (the pause).
fn outward_then_return(frac: f64, out_frac: f64, return_frac: f64) -> f64 {
    if frac < out_frac {
        frac / out_frac
    } else if frac < out_frac + return_frac {
        1.0 - (frac - out_frac) / return_frac
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn weight_biases_calm_to_ten_percent_of_total() {
        let total: u32 = ALL.iter().map(|p| p.weight()).sum();
        assert_eq!(ChaosPattern::Calm.weight() * 10, total);
    }

    #[test]
    fn pick_pattern_stays_within_enabled_set() {
        let mut rng = StdRng::seed_from_u64(42);
        let enabled = EnabledPatterns::DRIFT | EnabledPatterns::BURST;
        for _ in 0..100 {
            let p = pick_pattern(&mut rng, enabled);
            assert!(matches!(p, ChaosPattern::Drift | ChaosPattern::Burst));
        }
    }

    #[test]
    fn pick_pattern_empty_set_falls_back_to_drift() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(pick_pattern(&mut rng, EnabledPatterns::empty()), ChaosPattern::Drift);
    }

    #[test]
    fn wave_target_stays_within_amplitude_window() {
        for i in 0..=20 {
            let t = deterministic_target_mm(ChaosPattern::Wave, 50.0, 10.0, i as f64 * 100.0, 2000.0).unwrap();
            assert!((40.0..=60.0).contains(&t));
        }
    }

    #[test]
    fn spiral_amplitude_grows_over_time() {
        let early = deterministic_target_mm(ChaosPattern::Spiral, 50.0, 10.0, 0.0, 1000.0).unwrap();
        let late = deterministic_target_mm(ChaosPattern::Spiral, 50.0, 10.0, 999.0, 1000.0).unwrap();
        assert!((early - 50.0).abs() <= (late - 50.0).abs() + 1e-6 || (late - 50.0).abs() > 1.0);
    }

    #[test]
    fn zigzag_and_drift_have_no_deterministic_target() {
        assert_eq!(deterministic_target_mm(ChaosPattern::Zigzag, 0.0, 1.0, 0.0, 100.0), None);
        assert_eq!(deterministic_target_mm(ChaosPattern::Drift, 0.0, 1.0, 0.0, 100.0), None);
    }

    #[test]
    fn sweep_reverses_at_each_endpoint() {
        let start = deterministic_target_mm(ChaosPattern::Sweep, 50.0, 10.0, 0.0, 1000.0).unwrap();
        let quarter = deterministic_target_mm(ChaosPattern::Sweep, 50.0, 10.0, 250.0, 1000.0).unwrap();
        let half = deterministic_target_mm(ChaosPattern::Sweep, 50.0, 10.0, 500.0, 1000.0).unwrap();
        // Triangle wave: trough at frac 0, center at the quarter point, peak
        // at frac 0.5 — the two extremes it sweeps between, reversing there.
        assert!((start - 40.0).abs() < 1e-6);
        assert!((quarter - 50.0).abs() < 1e-6);
        assert!((half - 60.0).abs() < 1e-6);
    }

    #[test]
    fn pulse_returns_to_center_after_outward_leg() {
        let center = 50.0;
        let out = deterministic_target_mm(ChaosPattern::Pulse, center, 10.0, 500.0, 1000.0).unwrap();
        let back = deterministic_target_mm(ChaosPattern::Pulse, center, 10.0, 999.0, 1000.0).unwrap();
        assert!((out - (center + 10.0)).abs() < 1e-6);
        assert!(back < out);
    }

    #[test]
    fn brute_force_and_liberator_are_mirrored_timing() {
        let brute = deterministic_target_mm(ChaosPattern::BruteForce, 0.0, 10.0, 250.0, 1000.0).unwrap();
        let liberator = deterministic_target_mm(ChaosPattern::Liberator, 0.0, 10.0, 250.0, 1000.0).unwrap();
        // At the same elapsed fraction, BruteForce (fast-out, 0.25 wide) has
        // already reached its far extreme while Liberator (slow-out, 0.65
        // wide) is still only partway through climbing toward it.
        assert!(brute > liberator);
    }

    #[test]
    fn brute_force_pauses_at_center_after_its_round_trip() {
        let t = deterministic_target_mm(ChaosPattern::BruteForce, 5.0, 10.0, 950.0, 1000.0).unwrap();
        assert!((t - 5.0).abs() < 1e-6);
    }
}

//! # VAET Motion Core — simulation demo
//!
//! Drives an [`Engine`] against the software-simulated platform
//! ([`vaet_motion_core::sim`]) instead of real GPIO: homes the axis, then
//! runs a short VAET cycle, logging a telemetry snapshot periodically.
//! Built only with `--features sim`; the library itself has no binary
//! dependency on the simulated platform.

use std::rc::Rc;
use std::thread;
use std::time::Duration;

use tracing::info;

use vaet_motion_core::calibration::HomingPhase;
use vaet_motion_core::command::Command;
use vaet_motion_core::config::EngineConfig;
use vaet_motion_core::contacts::ContactSensors;
use vaet_motion_core::engine::Engine;
use vaet_motion_core::motor::MotorDriver;
use vaet_motion_core::platform::MicrosClock;
use vaet_motion_core::sim::{SimClock, SimContact, SimDelay, SimPin};
use vaet_motion_core::state::SystemState;

/// `Engine` owns its clock by value; this thin handle lets it share the
/// `Rc`-backed `SimClock` cell with the `SimDelay` borrows used to build
/// the simulated motor and contacts.
#[derive(Clone)]
struct ClockHandle(Rc<SimClock>);

impl MicrosClock for ClockHandle {
    fn now_us(&self) -> u64 {
        self.0.now_us()
    }
}

fn main() {
    tracing_subscriber::fmt::init();
    info!("vaet_motion_core simulation demo starting");

    let clock = Rc::new(SimClock::default());
    let start_contact = SimContact::default();
    let end_contact = SimContact::default();

    let motor = MotorDriver::init(
        SimPin::default(),
        SimPin::default(),
        SimPin::default(),
        SimDelay(&clock),
    )
    .expect("motor pins never fail to initialize in simulation");
    let contacts = ContactSensors::new(
        start_contact.pin.clone(),
        end_contact.pin.clone(),
        SimDelay(&clock),
    );

    let mut engine = Engine::new(motor, contacts, ClockHandle(clock.clone()), EngineConfig::default());

    info!("homing axis");
    engine.handle_command(Command::Calibrate).unwrap();
    loop {
        if engine.last_known_step() <= -500 && !matches!(engine.calibrator_phase(), HomingPhase::LeavingStart) {
            start_contact.press();
        }
        if engine.last_known_step() >= 2_000 && matches!(engine.calibrator_phase(), HomingPhase::MovingToEnd) {
            end_contact.press();
        }
        clock.advance(50);
        engine.process();
        if matches!(engine.calibrator_phase(), HomingPhase::LeavingStart) {
            start_contact.release();
        }
        if matches!(engine.calibrator_phase(), HomingPhase::LeavingEnd) {
            end_contact.release();
        }
        if engine.state() == SystemState::Ready {
            break;
        }
        thread::sleep(Duration::from_micros(1));
    }
    info!(total_distance_mm = engine.snapshot().total_distance_mm, "homing complete");

    engine.handle_command(Command::Start { distance_mm: 20.0, level: 10.0 }).unwrap();

    let mut cycle_count = 0u64;
    loop {
        clock.advance(50);
        engine.process();
        cycle_count += 1;
        if cycle_count % 1000 == 0 {
            let snapshot = engine.snapshot();
            info!(
                cycle_count,
                state = ?snapshot.system_state,
                position_mm = snapshot.current_position_mm,
                "tick"
            );
        }
        if cycle_count >= 200_000 {
            break;
        }
        thread::sleep(Duration::from_micros(1));
    }

    engine.handle_command(Command::Stop).unwrap();
    info!("demo complete");
}

//! Scripted finger for `--simulate` runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use sweet_machine::SimTouchPad;
use tracing::debug;

const IDLE: Duration = Duration::from_millis(300);
const HOLD: Duration = Duration::from_millis(120);
const CHATTER: Duration = Duration::from_micros(300);

/// Repeats a bouncy press/release cycle on `pad` until `stop` is set.
///
/// Each cycle starts with a sub-threshold glitch, then contact chatter
/// around a real press and again around the release.
pub fn spawn_touch_script(pad: SimTouchPad, stop: Arc<AtomicBool>) -> thread::JoinHandle<u64> {
    thread::spawn(move || {
        let mut cycles = 0u64;
        while !stop.load(Ordering::Relaxed) {
            thread::sleep(IDLE);
            if stop.load(Ordering::Relaxed) {
                break;
            }

            pad.press();
            pad.release();

            for _ in 0..3 {
                pad.press();
                thread::sleep(CHATTER);
                pad.release();
                thread::sleep(CHATTER);
            }
            pad.press();
            thread::sleep(HOLD);

            for _ in 0..3 {
                pad.release();
                thread::sleep(CHATTER);
                pad.press();
                thread::sleep(CHATTER);
            }
            pad.release();

            cycles += 1;
            debug!(cycles, "Simulated touch cycle");
        }
        cycles
    })
}

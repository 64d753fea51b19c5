use crate::infra::metrics::{
    init_metrics, serve_metrics, MACHINE_HEALTHY, MACHINE_RUNNING, SELF_TESTS, TOUCH_ACTIVE,
    TOUCH_EVENTS,
};
use std::thread;
use sweet_machine::{Machine, MachineState, Touch};
use tracing::info;

pub fn init() {
    init_metrics();
}

pub fn start_metrics_server(addr: Option<&str>) -> Option<thread::JoinHandle<()>> {
    addr.map(|addr| {
        info!(addr = %addr, "Starting metrics server");
        serve_metrics(addr.to_string())
    })
}

pub fn record_touch(touch: Touch) {
    TOUCH_EVENTS.with_label_values(&[touch.as_str()]).inc();
    TOUCH_ACTIVE.set(i64::from(touch.is_touching()));
}

pub fn record_self_test() {
    SELF_TESTS.inc();
}

/// Mirror the machine's lifecycle into the running/healthy gauges.
/// Returns the health flag that was published.
pub fn observe_machine(machine: &Machine) -> bool {
    let healthy = machine.is_healthy();
    MACHINE_RUNNING.set(i64::from(machine.state() == MachineState::Running));
    MACHINE_HEALTHY.set(i64::from(healthy));
    healthy
}

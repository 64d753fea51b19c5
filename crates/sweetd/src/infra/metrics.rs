//! Prometheus metrics for the sweetd daemon.
//!
//! Metric statics register themselves in [`REGISTRY`] on first use;
//! [`init_metrics`] touches each one so they are exported from startup.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Header, Request, Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Touch Metrics
// ============================================================================

/// Clean touch transitions, labelled `kind=started|ended`
pub static TOUCH_EVENTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "sweetd_touch_events_total",
            "Debounced touch transitions delivered to the consumer",
        ),
        &["kind"],
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// 1 while a confirmed touch is in progress
pub static TOUCH_ACTIVE: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new(
        "sweetd_touch_active",
        "Touch in progress (1=touching, 0=idle)",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Machine Metrics
// ============================================================================

pub static MACHINE_RUNNING: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new(
        "sweetd_machine_running",
        "Machine workers started and not yet stopped (1=running)",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

pub static MACHINE_HEALTHY: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new(
        "sweetd_machine_healthy",
        "All machine workers alive (1=healthy, 0=fault or stopped)",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

pub static SELF_TESTS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "sweetd_self_tests_total",
        "Buzzer self-tests completed",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Start the metrics HTTP server on the given address.
/// Returns a join handle for the server thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to start metrics server on {}: {}", bind_addr, e);
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            match request.url() {
                "/metrics" => respond_metrics(request),
                "/health" => respond_flag(request, MACHINE_HEALTHY.get() == 1, "OK", "Unhealthy"),
                "/ready" => respond_flag(request, MACHINE_RUNNING.get() == 1, "Ready", "Not Ready"),
                _ => {
                    let _ =
                        request.respond(Response::from_string("Not Found").with_status_code(404));
                }
            }
        }
    })
}

fn respond_metrics(request: Request) {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
        let _ = request.respond(Response::from_string("Internal Server Error").with_status_code(500));
        return;
    }

    let mut response = Response::from_data(buffer);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], encoder.format_type().as_bytes()) {
        response.add_header(header);
    }
    let _ = request.respond(response);
}

fn respond_flag(request: Request, up: bool, ok: &str, not_ok: &str) {
    let response = if up {
        Response::from_string(ok)
    } else {
        Response::from_string(not_ok).with_status_code(503)
    };
    let _ = request.respond(response);
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    for kind in ["started", "ended"] {
        let _ = TOUCH_EVENTS.with_label_values(&[kind]).get();
    }
    let _ = TOUCH_ACTIVE.get();
    let _ = MACHINE_RUNNING.get();
    let _ = MACHINE_HEALTHY.get();
    let _ = SELF_TESTS.get();
}

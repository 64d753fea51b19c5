use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber. `log` records from `sweet_machine` are
/// picked up through the subscriber's log bridge.
pub fn init_tracing(json_output: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sweetd=debug,sweet_machine=debug"));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json_output {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().pretty()).try_init()
    };

    if let Err(e) = installed {
        eprintln!("tracing already initialised: {e}");
    }
}

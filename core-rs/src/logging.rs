//! tracing subscriber setup for the portmesh binary

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when RUST_LOG is unset
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "portmesh_core=debug,portmesh=debug,info"
    } else {
        "portmesh_core=info,portmesh=info,warn"
    }
}

/// Install a compact stderr logger; RUST_LOG overrides the default filter
pub fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .try_init();
}

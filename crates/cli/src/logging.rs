use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVES: &str = "sedes=info,sedes_consolidate=info,sedes_io=info";

/// Install the global subscriber. Logs go to stderr; stdout is reserved for
/// `--json` output. `RUST_LOG` overrides the default directives.
pub fn init_logging(json: bool, quiet: bool) {
    let default = if quiet { "warn" } else { DEFAULT_DIRECTIVES };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let registry = tracing_subscriber::registry().with(filter);
    // A second init (tests, embedding) keeps the first subscriber
    let _ = if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).try_init()
    } else {
        registry.with(fmt::layer().with_target(false).with_writer(std::io::stderr)).try_init()
    };
}

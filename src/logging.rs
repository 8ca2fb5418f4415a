// src/logging.rs
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "scholar_publications=info,bulk_sync=info,tower_http=info,warn";
const DEBUG_FILTER: &str = "scholar_publications=debug,bulk_sync=debug,tower_http=debug,info";

/// Install the global subscriber. `RUST_LOG` wins over both defaults.
///
/// `LOG_FORMAT=json` switches to one JSON object per line. Calling this twice is a no-op.
pub fn init_tracing(debug: bool) {
    let fallback = if debug { DEBUG_FILTER } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/*!
 * Tracing Setup
 * Structured tracing initialization for embedders
 */

use tracing::info;
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Install a global tracing subscriber. `RUST_LOG` selects the filter
/// (default: info). Embedders that bring their own subscriber skip this.
pub fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_span_events(FmtSpan::CLOSE)
                .compact(),
        )
        .init();
    info!("Structured tracing initialized");
}

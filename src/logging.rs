//! Tracing subscriber bootstrap.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs a stderr fmt subscriber.
///
/// Priority: `RUST_LOG` > `filter` > `info`. Calling it again is a no-op.
pub fn init_logging(filter: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .ok();
}

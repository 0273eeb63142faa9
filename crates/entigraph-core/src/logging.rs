use crate::LoggingConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `config.level`. Calling this twice is harmless: the
/// second install fails and is ignored.
pub fn init_tracing(config: &LoggingConfig) {
    let result = tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.level.clone())),
        )
        .with(tracing_subscriber::fmt::layer().with_target(config.with_target))
        .try_init();
    if let Err(e) = result {
        tracing::debug!("tracing subscriber already installed: {}", e);
    }
}

use crate::layer::LoggerLayer;
use crate::logger::Logger;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::Subscriber;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::Registry;

/// Subscriber that routes every `tracing` event through `logger`.
///
/// Events more verbose than the most verbose sink threshold are filtered
/// out before a record is built.
pub fn subscriber(logger: &Logger) -> impl Subscriber + Send + Sync {
    let filter = logger
        .max_level()
        .map(LevelFilter::from_level)
        .unwrap_or(LevelFilter::OFF);
    Registry::default().with(LoggerLayer::new(logger.clone()).with_filter(filter))
}

/// Install [`subscriber`] as the process-wide default.
///
/// **Effects**
///
/// After this, `tracing::info!` and friends anywhere in the process land
/// in the logger's sinks alongside records logged through the
/// [`Logger`] handle directly. Fails if a global subscriber is already
/// set.
pub fn install(logger: &Logger) -> Result<(), SetGlobalDefaultError> {
    tracing::subscriber::set_global_default(subscriber(logger))
}

use crate::Environment;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, prelude::*};

/// Install color-eyre with location sections on and env sections off.
///
/// Call early in `main()`. Repeated calls are ignored.
pub fn install_color_eyre() {
    let _ = color_eyre::config::HookBuilder::default()
        .display_location_section(true)
        .display_env_section(false)
        .install();
}

/// Default filter directive when neither `RUST_LOG` nor `LOG_LEVEL` is set.
fn default_directive(environment: &Environment) -> String {
    if environment.is_production() {
        "info".to_string()
    } else {
        "debug,qdrant_client=info,ort=warn,hyper=info,h2=info".to_string()
    }
}

/// Build the log filter.
///
/// Precedence: `RUST_LOG`, then `LOG_LEVEL` (a bare level such as `INFO`),
/// then the environment default.
fn build_filter(environment: &Environment) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let directive = std::env::var("LOG_LEVEL")
        .ok()
        .map(|level| level.trim().to_ascii_lowercase())
        .filter(|level| !level.is_empty())
        .unwrap_or_else(|| default_directive(environment));

    EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(default_directive(environment)))
}

/// Initialize tracing with environment-aware output and span-trace capture.
///
/// - **Production** (`APP_ENV=production`): flattened JSON lines, no targets
/// - **Development**: pretty multi-line output
///
/// Both install `tracing_error::ErrorLayer` so eyre reports carry span traces.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing(environment: &Environment) {
    let filter = build_filter(environment);

    let result = if environment.is_production() {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .flatten_event(true),
            )
            .with(tracing_error::ErrorLayer::default())
            .with(filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false)
                    .pretty(),
            )
            .with(tracing_error::ErrorLayer::default())
            .with(filter)
            .try_init()
    };

    match result {
        Ok(_) => info!(environment = ?environment, "Tracing initialized"),
        Err(_) => debug!("Tracing already initialized, skipping re-initialization"),
    }
}

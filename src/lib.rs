pub mod commands;
pub mod config;
pub mod models;
pub mod pipeline; // Prepare (batch segmentation) + analyze (interactive counting)
pub mod pipeline_config;
pub mod time_estimation;

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let result = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .try_init();

    if result.is_ok() {
        tracing::info!("Cristae starting v{}", config::APP_VERSION);
    }
}

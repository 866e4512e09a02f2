pub mod config;
pub mod fhir;
pub mod markup;
pub mod pipeline;

pub use pipeline::{
    LensError, LensRun, MockSimplifier, OllamaClient, PlainLanguageLens, SimplificationCapability,
};

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber, honouring `RUST_LOG`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();
}

//! Incremental localisation sync for Paradox game mods.
//!
//! Upstream locale files are diffed entry by entry against the stored
//! translations, new or changed entries go through a rate-limited translator
//! queue and a structural validator, and accepted results are cached and
//! written back atomically.

pub mod cancellation;
pub mod config;
pub mod domain;
pub mod invalidation;
pub mod locale;
pub mod memo;
pub mod pipeline;
pub mod report;
pub mod scheduler;
pub mod translate;
pub mod validator;

pub use config::EngineConfig;
pub use pipeline::{Pipeline, PipelineError, RunSummary};

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// `locsync=info` filter. Calling it again is a no-op.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("locsync=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if result.is_ok() {
        tracing::info!(json, "tracing initialized");
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_init_tracing_twice_is_harmless() {
        super::init_tracing(false);
        super::init_tracing(true);
    }
}

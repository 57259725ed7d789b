//! Osun: a small line-oriented scripting language for wiring up HTTP
//! handlers and data calls, plus the host library it runs against.

pub mod cli;
pub mod config;
pub mod host;
pub mod script;
pub mod watch;

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Install the log subscriber (stderr).
///
/// Enabled when `RUST_LOG` is set, or at `osun=debug` when `debug` is true;
/// otherwise logging stays off so stdout and stderr carry only script output
/// and diagnostics.  Safe to call more than once.
pub fn init_tracing(debug: bool) {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let filter = match std::env::var("RUST_LOG") {
            Ok(_) => EnvFilter::from_default_env(),
            Err(_) if debug => EnvFilter::new("osun=debug"),
            Err(_) => return,
        };
        let _ = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .with(filter)
            .try_init();
    });
}

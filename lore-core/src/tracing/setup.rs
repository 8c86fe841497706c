//! Tracing initialization and configuration.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Initialize the Lore tracing/logging system.
///
/// Reads `LORE_LOG` for per-subsystem log levels.
/// Format: `LORE_LOG=lore_storage=debug,lore_core=info`
///
/// Falls back to `lore=debug` when `LORE_DEBUG` is set, otherwise
/// `lore=info`.
///
/// This function is idempotent — calling it multiple times is safe.
pub fn init_tracing() {
    INIT.call_once(|| {
        let default_filter = if debug_enabled() {
            "lore_core=debug,lore_storage=debug"
        } else {
            "lore_core=info,lore_storage=info"
        };
        let filter = EnvFilter::try_from_env("LORE_LOG")
            .unwrap_or_else(|_| EnvFilter::new(default_filter));

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .with(filter)
            .init();
    });
}

fn debug_enabled() -> bool {
    matches!(
        std::env::var("LORE_DEBUG").as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

// src/logging.rs

//! Logging setup built on `tracing-subscriber`.
//!
//! The loader only emits events through the `tracing` macros, so hosts that
//! install their own subscriber can ignore this module. Binaries and tools
//! that want output on stderr call [`init_logging`] once at startup.

use std::str::FromStr;

use anyhow::Result;
use tracing::Level;

/// Install the global fmt subscriber.
///
/// The level is `explicit` when given; otherwise the `LOADDAG_LOG`
/// environment variable is consulted (any of `trace`/`debug`/`info`/
/// `warn`/`error`, case-insensitive; anything else is ignored), falling
/// back to `info`. Call at most once.
pub fn init_logging(explicit: Option<Level>) -> Result<()> {
    let level = explicit.or_else(env_level).unwrap_or(Level::INFO);

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .init();

    Ok(())
}

fn env_level() -> Option<Level> {
    let raw = std::env::var("LOADDAG_LOG").ok()?;
    parse_level(&raw)
}

fn parse_level(raw: &str) -> Option<Level> {
    Level::from_str(raw.trim()).ok()
}

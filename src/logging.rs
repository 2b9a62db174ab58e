// ABOUTME: Structured logging setup built on the tracing ecosystem
// ABOUTME: Initializes an EnvFilter-driven fmt subscriber for the gateway process
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Production logging and structured output
//!
//! The gateway logs through `tracing`; the hosting process calls
//! [`init_from_env`] once at startup. `RUST_LOG` controls filtering, with a
//! sensible default that keeps dependency noise down.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directive when `RUST_LOG` is not set
const DEFAULT_DIRECTIVE: &str = "info,hyper=warn,reqwest=warn";

/// Initialize the global tracing subscriber from the environment
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_from_env() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()?;

    Ok(())
}

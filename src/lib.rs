// ABOUTME: Main library entry point for the orchestrate gateway
// ABOUTME: OAuth2 PKCE login, downstream token minting and the streaming chat relay
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

#![deny(unsafe_code)]

//! # Orchestrate Gateway
//!
//! Two small integrations against a hosted conversational-AI service:
//!
//! - **Login flow**: OAuth2 Authorization Code + PKCE against an identity
//!   provider, then minting of a second, internally-signed token whose user
//!   payload is encrypted with the recipient service's public key.
//! - **Chat relay**: a backend client that drives the service's streaming
//!   chat completions endpoint and decodes its Server-Sent-Events frames
//!   into typed update events.
//!
//! The HTTP framework, static files and browser UI are collaborators: every
//! operation here is an async method returning a serializable value, ready to
//! be mounted as a route.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use orchestrate_gateway::config::GatewayConfig;
//! use orchestrate_gateway::crypto::KeyRing;
//! use orchestrate_gateway::oauth::AuthGateway;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = GatewayConfig::from_env()?;
//! let keys = Arc::new(KeyRing::load(
//!     &config.keys.signing_key_path,
//!     &config.keys.recipient_key_path,
//! ));
//! let gateway = AuthGateway::new(&config, keys);
//!
//! let redirect = gateway.begin_login().await?;
//! println!("send the browser to {}", redirect.authorize_url);
//! # Ok(())
//! # }
//! ```

/// Streaming chat relay: bearer-token cache, SSE decoding, update dispatch
pub mod chat;

/// Configuration management from environment variables
pub mod config;

/// Cryptographic key material for token minting
pub mod crypto;

/// Unified error handling system with standard error codes
pub mod errors;

/// Structured logging setup
pub mod logging;

/// OAuth2 login flow and downstream token minting
pub mod oauth;

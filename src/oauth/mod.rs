// ABOUTME: OAuth2 Authorization Code + PKCE login flow and downstream token minting
// ABOUTME: Module root wiring pkce, session store, exchanger, minter and the gateway service
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! OAuth2 login flow against the identity provider and minting of the
//! downstream token presented to the conversational service

pub mod client;
pub mod flow;
pub mod mint;
pub mod pkce;
pub mod session;

pub use client::{decode_identity_claims, CodeExchanger, IdentityClaims, ProviderTokens};
pub use flow::{AuthGateway, CallbackOutcome, CallbackParams, CurrentUser, LoginRedirect};
pub use mint::{inspect_compact_token, TokenMinter, TokenStructureReport, UserPayload};
pub use pkce::{generate_state, PkceParams};
pub use session::{FlowSession, FlowStage, SessionStore};

// ABOUTME: Auth gateway service: login initiation, callback validation, token retrieval
// ABOUTME: Drives the Started -> Authorized -> TokenExchanged -> Minted session state machine
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Auth Gateway
//!
//! The typed service surface a front-end collaborator mounts as HTTP routes:
//! initiate-login, callback, downstream-token retrieval, current-user,
//! token-structure validation, public configuration, and logout. Each
//! operation returns a serializable value or an [`AppError`] whose code maps
//! to a response status.
//!
//! Per session the flow is a one-way state machine:
//! `Started -> Authorized -> TokenExchanged -> Minted`, with `Failed`
//! reachable from anywhere. The CSRF state nonce is consumed on the first
//! callback, so a replayed callback can never re-enter the exchange.

use crate::config::GatewayConfig;
use crate::crypto::KeyRing;
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::oauth::client::{decode_identity_claims, CodeExchanger, IdentityClaims};
use crate::oauth::mint::{inspect_compact_token, TokenMinter, TokenStructureReport};
use crate::oauth::pkce::{generate_state, PkceParams};
use crate::oauth::session::{FlowStage, SessionStore};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Query parameters delivered on the provider's redirect back
#[derive(Debug, Default, Clone)]
pub struct CallbackParams {
    /// Authorization code
    pub code: Option<String>,
    /// Returned CSRF state
    pub state: Option<String>,
    /// Provider-reported error code, if the user was bounced
    pub error: Option<String>,
    /// Provider-reported error description
    pub error_description: Option<String>,
}

/// Result of initiating a login
#[derive(Debug, Serialize)]
pub struct LoginRedirect {
    /// Session identifier to place in the HTTP-only cookie
    pub session_id: String,
    /// Provider authorization URL to redirect the browser to
    pub authorize_url: String,
    /// Cookie lifetime, matching the unauthenticated session TTL
    pub cookie_max_age_secs: u64,
}

/// Result of a successful callback
#[derive(Debug, Serialize)]
pub struct CallbackOutcome {
    /// Always true on success
    pub authenticated: bool,
    /// Decoded identity claims
    pub user: Value,
    /// Whether a downstream token was minted (false when keys are absent)
    pub downstream_token_minted: bool,
    /// Provider token type
    pub token_type: Option<String>,
    /// Provider access-token lifetime in seconds
    pub expires_in: Option<u64>,
    /// Granted scope
    pub scope: Option<String>,
}

/// Current-user response for an authenticated session
#[derive(Debug, Serialize)]
pub struct CurrentUser {
    /// Decoded identity claims
    pub user: IdentityClaims,
    /// Always true (unauthenticated sessions error instead)
    pub authenticated: bool,
    /// Whether a downstream token exists for the session
    pub has_downstream_token: bool,
}

/// Non-secret downstream-service settings exposed to the browser
#[derive(Debug, Serialize)]
pub struct PublicConfig {
    /// Orchestration instance identifier
    pub orchestration_id: String,
    /// Host URL of the conversational service
    pub host_url: String,
    /// Agent identifier
    pub agent_id: String,
    /// Agent environment identifier
    pub agent_environment_id: String,
}

/// Login-flow service owning the session store, exchanger and minter
pub struct AuthGateway {
    sessions: SessionStore,
    exchanger: CodeExchanger,
    minter: TokenMinter,
    public: PublicConfig,
    cookie_max_age_secs: u64,
}

impl AuthGateway {
    /// Assemble the gateway from configuration and loaded key material
    #[must_use]
    pub fn new(config: &GatewayConfig, keys: Arc<KeyRing>) -> Self {
        Self {
            sessions: SessionStore::new(config.session),
            exchanger: CodeExchanger::new(config.identity.clone()),
            minter: TokenMinter::new(keys, config.downstream.clone()),
            public: PublicConfig {
                orchestration_id: config.downstream.orchestration_id.clone(),
                host_url: config.downstream.host_url.clone(),
                agent_id: config.downstream.agent_id.clone(),
                agent_environment_id: config.downstream.agent_environment_id.clone(),
            },
            cookie_max_age_secs: config.session.ttl_secs,
        }
    }

    /// Access the underlying session store (sweeps, diagnostics)
    #[must_use]
    pub const fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Start a login: generate PKCE + state, create the session, build the redirect
    ///
    /// # Errors
    ///
    /// Returns an error if the configured authorize URL is malformed.
    pub async fn begin_login(&self) -> AppResult<LoginRedirect> {
        let pkce = PkceParams::generate();
        let state = generate_state();
        let authorize_url = self.exchanger.authorization_url(&state, &pkce)?;
        let session_id = self.sessions.create(pkce.code_verifier, state).await;

        info!(%session_id, "login initiated, redirecting to identity provider");

        Ok(LoginRedirect {
            session_id,
            authorize_url,
            cookie_max_age_secs: self.cookie_max_age_secs,
        })
    }

    /// Validate the provider callback and complete the code exchange
    ///
    /// # Errors
    ///
    /// - `ProviderExchangeFailed` when the provider reported an error or the
    ///   exchange itself failed
    /// - `InvalidRequest` when code, state or the session cookie is missing
    /// - `CsrfMismatch` when the state does not match (session-not-found and
    ///   replayed callbacks included)
    pub async fn handle_callback(
        &self,
        params: &CallbackParams,
        session_id: Option<&str>,
    ) -> AppResult<CallbackOutcome> {
        if let Some(error) = &params.error {
            if let Some(sid) = session_id {
                self.mark_failed(sid).await;
            }
            return Err(AppError::provider_exchange(format!(
                "provider returned an error: {error} - {}",
                params.error_description.as_deref().unwrap_or("no description")
            )));
        }

        let (Some(code), Some(returned_state), Some(sid)) =
            (params.code.as_deref(), params.state.as_deref(), session_id)
        else {
            return Err(AppError::invalid_request(
                "callback requires code, state and a session cookie",
            ));
        };

        // Consume the stored state and grab the verifier in one critical
        // section; a second callback for the same session finds no state left.
        let mut stored_state = None;
        let mut code_verifier = None;
        let found = self
            .sessions
            .update(sid, |session| {
                stored_state = session.take_state();
                code_verifier = Some(session.code_verifier.clone());
                session.stage = FlowStage::Authorized;
            })
            .await;

        let state_matches = stored_state.as_deref() == Some(returned_state);
        if !found || !state_matches {
            if found {
                self.mark_failed(sid).await;
            }
            warn!(session_id = sid, "callback state validation failed");
            return Err(AppError::csrf_mismatch());
        }
        let code_verifier = code_verifier.unwrap_or_default();

        let tokens = match self.exchanger.exchange_code(code, &code_verifier).await {
            Ok(tokens) => tokens,
            Err(e) => {
                self.mark_failed(sid).await;
                return Err(e);
            }
        };

        let identity = match decode_identity_claims(&tokens.id_token) {
            Ok(identity) => identity,
            Err(e) => {
                self.mark_failed(sid).await;
                return Err(e);
            }
        };

        info!(
            session_id = sid,
            user = identity.display_name().unwrap_or("unknown"),
            "user authenticated"
        );

        self.sessions
            .update(sid, |session| {
                session.stage = FlowStage::TokenExchanged;
                session.identity = Some(identity.clone());
                session.provider_access_token = Some(tokens.access_token.clone());
            })
            .await;

        let downstream_token_minted = match self.minter.mint(&identity, &tokens.access_token) {
            Ok(token) => {
                self.sessions
                    .update(sid, |session| {
                        session.stage = FlowStage::Minted;
                        session.downstream_token = Some(token);
                    })
                    .await;
                true
            }
            Err(e) if e.code == ErrorCode::KeysUnavailable => {
                warn!(session_id = sid, "keys unavailable, continuing without a downstream token");
                false
            }
            Err(e) => {
                self.mark_failed(sid).await;
                return Err(e);
            }
        };

        Ok(CallbackOutcome {
            authenticated: true,
            user: Value::Object(identity.0),
            downstream_token_minted,
            token_type: tokens.token_type,
            expires_in: tokens.expires_in,
            scope: tokens.scope,
        })
    }

    /// Fetch the session's downstream token, re-minting it if absent
    ///
    /// # Errors
    ///
    /// - `NotAuthenticated` for unknown or unauthenticated sessions
    /// - `KeysUnavailable` when minting is disabled
    pub async fn downstream_token(&self, session_id: &str) -> AppResult<String> {
        let session = self
            .sessions
            .get(session_id)
            .await
            .ok_or_else(AppError::not_authenticated)?;
        if !session.is_authenticated() {
            return Err(AppError::not_authenticated());
        }

        if let Some(token) = session.downstream_token {
            return Ok(token);
        }

        // The token is derived deterministically from the stored identity and
        // access token, so recomputing it here preserves its meaning.
        let identity = session
            .identity
            .ok_or_else(|| AppError::internal("authenticated session lost its identity claims"))?;
        let access_token = session
            .provider_access_token
            .ok_or_else(|| AppError::internal("authenticated session lost its access token"))?;

        let token = self.minter.mint(&identity, &access_token)?;
        let cached = token.clone();
        self.sessions
            .update(session_id, |session| {
                session.stage = FlowStage::Minted;
                session.downstream_token = Some(cached);
            })
            .await;

        Ok(token)
    }

    /// Identity claims and token status for an authenticated session
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` for unknown or unauthenticated sessions.
    pub async fn current_user(&self, session_id: &str) -> AppResult<CurrentUser> {
        let session = self
            .sessions
            .get(session_id)
            .await
            .ok_or_else(AppError::not_authenticated)?;
        if !session.is_authenticated() {
            return Err(AppError::not_authenticated());
        }

        Ok(CurrentUser {
            user: session.identity.unwrap_or_default(),
            authenticated: true,
            has_downstream_token: session.downstream_token.is_some(),
        })
    }

    /// Structural report over the session's downstream token
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` when the session has no downstream token.
    pub async fn validate_token_structure(
        &self,
        session_id: &str,
    ) -> AppResult<TokenStructureReport> {
        let session = self
            .sessions
            .get(session_id)
            .await
            .ok_or_else(AppError::not_authenticated)?;
        if !session.is_authenticated() {
            return Err(AppError::not_authenticated());
        }
        let token = session
            .downstream_token
            .ok_or_else(AppError::not_authenticated)?;

        inspect_compact_token(&token)
    }

    /// Non-secret configuration for the browser embed
    #[must_use]
    pub const fn public_config(&self) -> &PublicConfig {
        &self.public
    }

    /// Delete the session; returns whether one existed
    pub async fn logout(&self, session_id: &str) -> bool {
        let existed = self.sessions.remove(session_id).await;
        if existed {
            info!(session_id, "session logged out");
        }
        existed
    }

    async fn mark_failed(&self, session_id: &str) {
        self.sessions
            .update(session_id, |session| session.stage = FlowStage::Failed)
            .await;
    }
}

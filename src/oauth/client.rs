// ABOUTME: Authorization-code exchanger for the identity provider's OAuth2 endpoints
// ABOUTME: Builds the authorize redirect and trades code + PKCE verifier for provider tokens
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Authorization-Code Exchanger
//!
//! Server-to-server half of the Authorization Code + PKCE flow: building the
//! authorization redirect URL and exchanging the returned code (plus the
//! session's verifier) for the provider's access and identity tokens.
//!
//! The identity token's *payload* is decoded to obtain user claims; its
//! signature is deliberately not verified here. The token arrives over the
//! provider's TLS channel in direct response to our own exchange request,
//! and that channel is the trust boundary this demo accepts. Hardening would
//! verify the signature against the provider's published keys first.

use crate::config::IdentityProviderConfig;
use crate::errors::{AppError, AppResult};
use crate::oauth::pkce::PkceParams;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};
use url::Url;

/// Tokens returned by the provider's token endpoint
#[derive(Debug, Clone)]
pub struct ProviderTokens {
    /// Opaque access token for the provider's own APIs
    pub access_token: String,
    /// Signed identity token whose payload carries the user claims
    pub id_token: String,
    /// Token type, normally `Bearer`
    pub token_type: Option<String>,
    /// Access-token lifetime in seconds
    pub expires_in: Option<u64>,
    /// Granted scope
    pub scope: Option<String>,
}

/// Wire shape of the token endpoint response
#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    id_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<u64>,
    scope: Option<String>,
}

/// Claims decoded from the identity token payload, kept as an opaque map
///
/// Accessors cover the fields downstream-token minting needs; everything
/// else passes through untouched (e.g. for the current-user response).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityClaims(pub serde_json::Map<String, Value>);

impl IdentityClaims {
    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Provider-unique user id: `sub`, falling back to `oid`
    #[must_use]
    pub fn subject_id(&self) -> Option<&str> {
        self.str_field("sub").or_else(|| self.str_field("oid"))
    }

    /// Provider object id: `oid`, falling back to `sub`
    #[must_use]
    pub fn object_id(&self) -> Option<&str> {
        self.str_field("oid").or_else(|| self.str_field("sub"))
    }

    /// Login name: `preferred_username`, falling back to `upn`
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.str_field("preferred_username")
            .or_else(|| self.str_field("upn"))
    }

    /// Display name: `name`, falling back to the login name
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.str_field("name").or_else(|| self.username())
    }

    /// Email address, falling back to the login name
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.str_field("email").or_else(|| self.username())
    }

    /// Tenant / organization identifier (`tid`)
    #[must_use]
    pub fn tenant_id(&self) -> Option<&str> {
        self.str_field("tid")
    }

    /// Whether any claims were decoded at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// OAuth2 client performing the Authorization Code + PKCE exchange
pub struct CodeExchanger {
    http: reqwest::Client,
    config: IdentityProviderConfig,
}

impl CodeExchanger {
    /// Create an exchanger for the configured provider
    #[must_use]
    pub fn new(config: IdentityProviderConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Build the authorization redirect URL for a login attempt
    ///
    /// # Errors
    ///
    /// Returns an error if the configured authorize URL is malformed.
    pub fn authorization_url(&self, state: &str, pkce: &PkceParams) -> AppResult<String> {
        let mut url = Url::parse(&self.config.authorize_url)
            .map_err(|e| AppError::internal(format!("invalid authorize URL: {e}")))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.full_scope())
            .append_pair("state", state)
            .append_pair("code_challenge", &pkce.code_challenge)
            .append_pair("code_challenge_method", pkce.code_challenge_method);

        Ok(url.into())
    }

    /// Exchange an authorization code for provider tokens
    ///
    /// # Errors
    ///
    /// Returns `ProviderExchangeFailed` if the request fails, the endpoint
    /// responds non-success, or the body lacks the expected tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> AppResult<ProviderTokens> {
        debug!("exchanging authorization code at provider token endpoint");

        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", code_verifier),
        ];

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                error!("token endpoint request failed: {e}");
                AppError::provider_exchange(format!("token endpoint unreachable: {e}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AppError::provider_exchange(format!("failed to read token response: {e}"))
        })?;

        if !status.is_success() {
            error!(%status, "token endpoint rejected the exchange");
            return Err(AppError::provider_exchange(format!(
                "token endpoint returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: TokenEndpointResponse = serde_json::from_str(&body).map_err(|e| {
            AppError::provider_exchange(format!("unparsable token response: {e}"))
        })?;

        let id_token = parsed.id_token.ok_or_else(|| {
            AppError::provider_exchange("token response is missing an id_token")
        })?;

        Ok(ProviderTokens {
            access_token: parsed.access_token,
            id_token,
            token_type: parsed.token_type,
            expires_in: parsed.expires_in,
            scope: parsed.scope,
        })
    }
}

/// Decode the payload segment of a compact identity token
///
/// The signature segment is ignored (see the module docs for the trust
/// boundary this implies).
///
/// # Errors
///
/// Returns `ProviderExchangeFailed` if the token is not compact-serialized
/// or its payload is not base64url JSON.
pub fn decode_identity_claims(id_token: &str) -> AppResult<IdentityClaims> {
    let mut segments = id_token.split('.');
    let payload = match (segments.next(), segments.next()) {
        (Some(_header), Some(payload)) if !payload.is_empty() => payload,
        _ => {
            return Err(AppError::provider_exchange(
                "identity token is not in compact serialization",
            ))
        }
    };

    let bytes = URL_SAFE_NO_PAD.decode(payload).map_err(|e| {
        AppError::provider_exchange(format!("identity token payload is not base64url: {e}"))
    })?;

    let claims: serde_json::Map<String, Value> = serde_json::from_slice(&bytes).map_err(|e| {
        AppError::provider_exchange(format!("identity token payload is not JSON: {e}"))
    })?;

    Ok(IdentityClaims(claims))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    fn fake_id_token(claims: &Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
        format!("{header}.{payload}.fakesig")
    }

    #[test]
    fn test_decode_identity_claims_reads_payload_only() {
        let token = fake_id_token(&json!({
            "sub": "user-1",
            "tid": "tenant-1",
            "name": "Demo User",
            "preferred_username": "demo@example.com"
        }));

        let claims = decode_identity_claims(&token).unwrap();
        assert_eq!(claims.subject_id(), Some("user-1"));
        assert_eq!(claims.tenant_id(), Some("tenant-1"));
        assert_eq!(claims.display_name(), Some("Demo User"));
        assert_eq!(claims.email(), Some("demo@example.com"));
    }

    #[test]
    fn test_decode_identity_claims_rejects_garbage() {
        assert!(decode_identity_claims("not-a-token").is_err());
        assert!(decode_identity_claims("a.!!!.c").is_err());
    }

    #[test]
    fn test_claim_fallbacks() {
        let token = fake_id_token(&json!({"oid": "obj-9", "upn": "upn@example.com"}));
        let claims = decode_identity_claims(&token).unwrap();
        assert_eq!(claims.subject_id(), Some("obj-9"));
        assert_eq!(claims.object_id(), Some("obj-9"));
        assert_eq!(claims.username(), Some("upn@example.com"));
        assert_eq!(claims.email(), Some("upn@example.com"));
    }

    #[test]
    fn test_authorization_url_carries_pkce_and_state() {
        let exchanger = CodeExchanger::new(IdentityProviderConfig {
            authorize_url: "https://idp.example.com/authorize".into(),
            token_url: "https://idp.example.com/token".into(),
            client_id: "client-1".into(),
            client_secret: "secret".into(),
            scope: "api://demo/.default".into(),
            redirect_uri: "http://localhost:8080/callback".into(),
        });

        let pkce = PkceParams::generate();
        let url = exchanger.authorization_url("state-123", &pkce).unwrap();
        let parsed = Url::parse(&url).unwrap();
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert!(pairs.contains(&("response_type".into(), "code".into())));
        assert!(pairs.contains(&("state".into(), "state-123".into())));
        assert!(pairs.contains(&("code_challenge".into(), pkce.code_challenge.clone())));
        assert!(pairs.contains(&("code_challenge_method".into(), "S256".into())));
        // The verifier itself never appears on the authorization request
        assert!(!url.contains(&pkce.code_verifier));
    }
}

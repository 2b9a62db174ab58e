// ABOUTME: Downstream token minting: encrypt the user payload, then sign the claim set
// ABOUTME: Also provides the structural token inspection backing the validate operation
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Downstream Token Minter
//!
//! Builds the second, internally-signed bearer credential presented to the
//! conversational service. The nested user payload (display name, namespaced
//! user id, the provider's bearer token, email, tenant id) is serialized as
//! UTF-8 JSON and encrypted with the recipient's public key *before* the
//! outer claim set is signed with RS256, so confidentiality and integrity
//! stay layered: every holder can verify the token, only the recipient
//! private key can read the payload.

use crate::config::DownstreamConfig;
use crate::crypto::KeyRing;
use crate::errors::{AppError, AppResult};
use crate::oauth::client::IdentityClaims;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, Header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Fixed downstream token lifetime
const TOKEN_TTL_SECS: i64 = 3600;

/// Outer claim set of a minted downstream token
///
/// `user_payload` holds the base64 ciphertext of [`UserPayload`]; the
/// plaintext never appears in the signed token.
#[derive(Debug, Serialize, Deserialize)]
pub struct DownstreamClaims {
    /// Namespaced subject derived from the provider user id
    pub sub: String,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// Issued-at (epoch seconds)
    pub iat: i64,
    /// Expiry (epoch seconds, `iat` + 1 hour)
    pub exp: i64,
    /// Login name the downstream service shows for the user
    #[serde(rename = "woUserId", skip_serializing_if = "Option::is_none")]
    pub wo_user_id: Option<String>,
    /// Tenant the user belongs to
    #[serde(rename = "woTenantId", skip_serializing_if = "Option::is_none")]
    pub wo_tenant_id: Option<String>,
    /// Encrypted user payload (base64 ciphertext)
    pub user_payload: String,
}

/// Plaintext of the encrypted payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPayload {
    /// Free-form marker describing how the user authenticated
    pub custom_message: String,
    /// Display name
    pub name: Option<String>,
    /// Provider object id
    pub custom_user_id: Option<String>,
    /// The provider's bearer token, forwarded for downstream SSO
    pub sso_token: String,
    /// Email address
    pub email: Option<String>,
    /// Tenant / organization identifier
    pub tenant_id: Option<String>,
}

/// Mints downstream tokens from identity claims and the provider access token
pub struct TokenMinter {
    keys: Arc<KeyRing>,
    config: DownstreamConfig,
}

impl TokenMinter {
    /// Create a minter over the given key material
    #[must_use]
    pub fn new(keys: Arc<KeyRing>, config: DownstreamConfig) -> Self {
        Self { keys, config }
    }

    /// Whether minting is currently possible
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.keys.is_complete()
    }

    /// Mint a compact downstream token for an authenticated user
    ///
    /// # Errors
    ///
    /// Returns `KeysUnavailable` if either key is missing; signing and
    /// encryption failures propagate, never silently.
    pub fn mint(&self, identity: &IdentityClaims, provider_access_token: &str) -> AppResult<String> {
        if !self.keys.is_complete() {
            return Err(AppError::keys_unavailable());
        }

        let subject_id = identity
            .subject_id()
            .ok_or_else(|| AppError::internal("identity claims carry no subject id"))?;

        let payload = UserPayload {
            custom_message: "Authenticated via identity provider".to_owned(),
            name: identity.display_name().map(str::to_owned),
            custom_user_id: identity.object_id().map(str::to_owned),
            sso_token: provider_access_token.to_owned(),
            email: identity.email().map(str::to_owned),
            tenant_id: identity.tenant_id().map(str::to_owned),
        };

        let plaintext = serde_json::to_vec(&payload)
            .map_err(|e| AppError::internal(format!("payload serialization failed: {e}")))?;
        let user_payload = self.keys.encrypt_for_recipient(&plaintext)?;

        let iat = Utc::now().timestamp();
        let claims = DownstreamClaims {
            sub: format!("{}{subject_id}", self.config.subject_prefix),
            iss: self.config.token_issuer.clone(),
            aud: self.config.token_audience.clone(),
            iat,
            exp: iat + TOKEN_TTL_SECS,
            wo_user_id: identity.username().map(str::to_owned),
            wo_tenant_id: identity.tenant_id().map(str::to_owned),
            user_payload,
        };

        let token = encode(&Header::new(Algorithm::RS256), &claims, self.keys.signing_key()?)
            .map_err(|e| AppError::internal(format!("token signing failed: {e}")))?;

        debug!(
            parts = token.split('.').count(),
            length = token.len(),
            "minted downstream token"
        );

        Ok(token)
    }
}

/// Structural report over a compact token, with the encrypted payload redacted
#[derive(Debug, Serialize)]
pub struct TokenStructureReport {
    /// Whether the token has the expected three segments
    pub valid: bool,
    /// Number of period-separated segments
    pub parts_count: usize,
    /// Decoded protected header
    pub header: Value,
    /// Decoded claim set; `user_payload` replaced by `"[ENCRYPTED]"`
    pub payload: Value,
    /// Length of the signature segment in characters
    pub signature_length: usize,
    /// Serialization format name
    pub format: &'static str,
    /// Truncated preview of the three segments
    pub structure: String,
}

/// Inspect a compact token's structure without verifying its signature
///
/// # Errors
///
/// Returns an error if the header or payload segments are not base64url JSON.
pub fn inspect_compact_token(token: &str) -> AppResult<TokenStructureReport> {
    let parts: Vec<&str> = token.split('.').collect();
    let parts_count = parts.len();

    let decode_json = |segment: &str| -> AppResult<Value> {
        let bytes = URL_SAFE_NO_PAD
            .decode(segment)
            .map_err(|e| AppError::internal(format!("token segment is not base64url: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AppError::internal(format!("token segment is not JSON: {e}")))
    };

    let header = decode_json(parts.first().copied().unwrap_or_default())?;
    let mut payload = decode_json(parts.get(1).copied().unwrap_or_default())?;
    if let Some(obj) = payload.as_object_mut() {
        if obj.contains_key("user_payload") {
            obj.insert("user_payload".to_owned(), Value::from("[ENCRYPTED]"));
        }
    }

    let signature = parts.get(2).copied().unwrap_or_default();
    let preview = |segment: &str| segment.chars().take(20).collect::<String>();

    Ok(TokenStructureReport {
        valid: parts_count == 3,
        parts_count,
        header,
        payload,
        signature_length: signature.len(),
        format: "JWS Compact Serialization",
        structure: format!(
            "{}...{}...{}...",
            preview(parts.first().copied().unwrap_or_default()),
            preview(parts.get(1).copied().unwrap_or_default()),
            preview(signature)
        ),
    })
}

// ABOUTME: Cached client-credential bearer token for the chat completions API
// ABOUTME: Single-flight fetch under a mutex with a fixed expiry safety skew
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Cached Bearer-Token Provider
//!
//! Exchanges the configured API key for a bearer token via the
//! client-credential grant and caches it until shortly before expiry. The
//! cache mutex is held across the check-then-fetch, so concurrent requests
//! hitting a cold or expired cache result in exactly one upstream fetch.

use crate::config::ChatApiConfig;
use crate::errors::{AppError, AppResult};
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Client-credential grant type of the token endpoint
const APIKEY_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";

/// Safety margin subtracted from the advertised expiry
const EXPIRY_SKEW_MS: i64 = 60_000;

/// Cached token with its absolute expiry
#[derive(Debug, Clone)]
struct CachedBearerToken {
    access_token: String,
    expires_at_epoch_ms: i64,
}

impl CachedBearerToken {
    fn is_valid(&self) -> bool {
        Utc::now().timestamp_millis() + EXPIRY_SKEW_MS < self.expires_at_epoch_ms
    }
}

/// Wire shape of the token endpoint response
#[derive(Debug, Deserialize)]
struct TokenFetchResponse {
    access_token: String,
    expires_in: i64,
}

/// Fetches and caches the chat API bearer token
pub struct BearerTokenProvider {
    http: reqwest::Client,
    token_url: String,
    api_key: String,
    cache: Mutex<Option<CachedBearerToken>>,
}

impl BearerTokenProvider {
    /// Create a provider for the configured token endpoint
    #[must_use]
    pub fn new(config: &ChatApiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url: config.token_url.clone(),
            api_key: config.api_key.clone(),
            cache: Mutex::new(None),
        }
    }

    /// Return a valid bearer token, fetching a new one only when needed
    ///
    /// # Errors
    ///
    /// Returns `TokenFetchFailed` if the endpoint is unreachable, responds
    /// non-success, or returns an unparsable body. The cache is left
    /// unchanged on failure.
    pub async fn get_token(&self) -> AppResult<String> {
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.as_ref() {
            if cached.is_valid() {
                return Ok(cached.access_token.clone());
            }
        }

        debug!("bearer token cache cold or expired, fetching");

        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", APIKEY_GRANT_TYPE),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                error!("bearer token endpoint unreachable: {e}");
                AppError::token_fetch(format!("token endpoint unreachable: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(%status, "bearer token endpoint rejected the request");
            return Err(AppError::token_fetch(format!(
                "token endpoint returned {status}"
            )));
        }

        let parsed: TokenFetchResponse = response
            .json()
            .await
            .map_err(|e| AppError::token_fetch(format!("unparsable token response: {e}")))?;

        let entry = CachedBearerToken {
            access_token: parsed.access_token,
            expires_at_epoch_ms: Utc::now().timestamp_millis() + parsed.expires_in * 1000,
        };
        let token = entry.access_token.clone();
        *cache = Some(entry);

        Ok(token)
    }
}

// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Collects identity-provider, downstream-service, chat-API and key-material settings
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Environment-based configuration management
//!
//! All settings come from environment variables. [`GatewayConfig::from_env`]
//! reports every missing required variable in a single [`ErrorCode::ConfigMissing`]
//! error so a misconfigured deployment fails fast with the complete list.
//!
//! [`ErrorCode::ConfigMissing`]: crate::errors::ErrorCode::ConfigMissing

use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Default port used to derive the redirect URI when none is configured
const DEFAULT_HTTP_PORT: u16 = 8080;

/// Soft time-to-live for unauthenticated sessions (matches the cookie lifetime)
const DEFAULT_SESSION_TTL_SECS: u64 = 600;

/// Upper bound on concurrently tracked sessions
const DEFAULT_SESSION_CAPACITY: usize = 10_000;

/// Identity provider (OAuth2 Authorization Code + PKCE) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityProviderConfig {
    /// Authorization endpoint the browser is redirected to
    pub authorize_url: String,
    /// Token endpoint for the server-to-server code exchange
    pub token_url: String,
    /// OAuth2 client identifier
    pub client_id: String,
    /// OAuth2 client secret
    pub client_secret: String,
    /// Provider-specific scope appended to `openid profile email`
    pub scope: String,
    /// Redirect URI registered with the provider
    pub redirect_uri: String,
}

impl IdentityProviderConfig {
    /// Full scope string sent on the authorization request
    #[must_use]
    pub fn full_scope(&self) -> String {
        format!("openid profile email {}", self.scope)
    }
}

/// Downstream conversational-service settings used when minting tokens
/// and when rendering the public embed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownstreamConfig {
    /// Host URL of the hosted conversational service
    pub host_url: String,
    /// Orchestration instance identifier
    pub orchestration_id: String,
    /// Agent identifier
    pub agent_id: String,
    /// Agent environment identifier
    pub agent_environment_id: String,
    /// `iss` claim placed in minted tokens
    pub token_issuer: String,
    /// `aud` claim placed in minted tokens
    pub token_audience: String,
    /// Prefix namespacing the provider user id into the `sub` claim
    pub subject_prefix: String,
}

/// Key material locations; absence disables minting but not the login flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyConfig {
    /// PEM file holding the RSA signing private key
    pub signing_key_path: PathBuf,
    /// PEM file holding the recipient's RSA public key
    pub recipient_key_path: PathBuf,
}

/// Chat-relay settings (client-credential token endpoint + completions API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatApiConfig {
    /// Client-credential token endpoint
    pub token_url: String,
    /// API key exchanged for bearer tokens
    pub api_key: String,
    /// Base URL of the chat completions API
    pub api_base: String,
    /// Service instance identifier
    pub instance_id: String,
    /// Agent the relay converses with
    pub agent_id: String,
}

impl ChatApiConfig {
    /// Streaming chat completions endpoint for the configured instance/agent
    #[must_use]
    pub fn completions_url(&self) -> String {
        format!(
            "{}/instances/{}/v1/orchestrate/{}/chat/completions",
            self.api_base.trim_end_matches('/'),
            self.instance_id,
            self.agent_id
        )
    }
}

/// Session store tuning
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unauthenticated-phase time-to-live in seconds
    pub ttl_secs: u64,
    /// LRU capacity bound
    pub capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_SESSION_TTL_SECS,
            capacity: DEFAULT_SESSION_CAPACITY,
        }
    }
}

/// Top-level gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Port the HTTP collaborator listens on; used for the default redirect URI
    pub http_port: u16,
    /// Identity provider settings
    pub identity: IdentityProviderConfig,
    /// Downstream service / token-minting settings
    pub downstream: DownstreamConfig,
    /// Key material locations
    pub keys: KeyConfig,
    /// Chat relay settings
    pub chat: ChatApiConfig,
    /// Session store tuning
    pub session: SessionConfig,
}

impl GatewayConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] with code `ConfigMissing` naming every absent
    /// required variable.
    pub fn from_env() -> AppResult<Self> {
        let mut missing = Vec::new();

        let authorize_url = required("IDP_AUTHORIZE_URL", &mut missing);
        let token_url = required("IDP_TOKEN_URL", &mut missing);
        let client_id = required("IDP_CLIENT_ID", &mut missing);
        let client_secret = required("IDP_CLIENT_SECRET", &mut missing);
        let scope = required("IDP_SCOPE", &mut missing);

        let orchestration_id = required("ORCHESTRATE_ORCHESTRATION_ID", &mut missing);
        let agent_id = required("ORCHESTRATE_AGENT_ID", &mut missing);
        let agent_environment_id = required("ORCHESTRATE_AGENT_ENVIRONMENT_ID", &mut missing);

        let chat_token_url = required("CHAT_TOKEN_URL", &mut missing);
        let chat_api_key = required("CHAT_API_KEY", &mut missing);
        let chat_api_base = required("CHAT_API_BASE", &mut missing);
        let chat_instance_id = required("CHAT_INSTANCE_ID", &mut missing);
        let chat_agent_id = required("CHAT_AGENT_ID", &mut missing);

        if !missing.is_empty() {
            return Err(AppError::config_missing(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let http_port = env::var("SERVER_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_HTTP_PORT);

        let redirect_uri = env::var("REDIRECT_URI")
            .unwrap_or_else(|_| format!("http://localhost:{http_port}/callback"));

        let session = SessionConfig {
            ttl_secs: env::var("SESSION_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_SESSION_TTL_SECS),
            capacity: env::var("SESSION_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_SESSION_CAPACITY),
        };

        Ok(Self {
            http_port,
            identity: IdentityProviderConfig {
                authorize_url,
                token_url,
                client_id,
                client_secret,
                scope,
                redirect_uri,
            },
            downstream: DownstreamConfig {
                host_url: env_or("ORCHESTRATE_HOST_URL", "https://dl.orchestrate.example.com"),
                orchestration_id,
                agent_id,
                agent_environment_id,
                token_issuer: env_or("TOKEN_ISSUER", "orchestrate-gateway"),
                token_audience: env_or("TOKEN_AUDIENCE", "orchestrate"),
                subject_prefix: env_or("TOKEN_SUBJECT_PREFIX", "sso-"),
            },
            keys: KeyConfig {
                signing_key_path: PathBuf::from(env_or("SIGNING_KEY_PATH", "keys/private_key.pem")),
                recipient_key_path: PathBuf::from(env_or(
                    "RECIPIENT_PUBLIC_KEY_PATH",
                    "keys/recipient_public_key.pem",
                )),
            },
            chat: ChatApiConfig {
                token_url: chat_token_url,
                api_key: chat_api_key,
                api_base: chat_api_base,
                instance_id: chat_instance_id,
                agent_id: chat_agent_id,
            },
            session,
        })
    }
}

/// Read a required variable, recording its name when absent or empty
fn required(key: &'static str, missing: &mut Vec<&'static str>) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => {
            missing.push(key);
            String::new()
        }
    }
}

/// Read an optional variable with a default
fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_scope_includes_base_scopes() {
        let identity = IdentityProviderConfig {
            authorize_url: "https://idp.example.com/authorize".into(),
            token_url: "https://idp.example.com/token".into(),
            client_id: "client".into(),
            client_secret: "secret".into(),
            scope: "api://demo/.default".into(),
            redirect_uri: "http://localhost:8080/callback".into(),
        };
        assert_eq!(
            identity.full_scope(),
            "openid profile email api://demo/.default"
        );
    }

    #[test]
    fn test_completions_url_shape() {
        let chat = ChatApiConfig {
            token_url: "https://iam.example.com/token".into(),
            api_key: "key".into(),
            api_base: "https://api.example.com/".into(),
            instance_id: "inst-1".into(),
            agent_id: "agent-1".into(),
        };
        assert_eq!(
            chat.completions_url(),
            "https://api.example.com/instances/inst-1/v1/orchestrate/agent-1/chat/completions"
        );
    }
}

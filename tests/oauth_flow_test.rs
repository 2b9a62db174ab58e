// ABOUTME: Integration tests for the login flow: PKCE, CSRF validation, code exchange
// ABOUTME: Drives AuthGateway end-to-end against a stubbed identity provider
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright ©2025 Async-IO.org

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use orchestrate_gateway::crypto::KeyRing;
use orchestrate_gateway::errors::ErrorCode;
use orchestrate_gateway::oauth::pkce::challenge_for;
use orchestrate_gateway::oauth::{AuthGateway, CallbackParams};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn callback(code: &str, state: &str) -> CallbackParams {
    CallbackParams {
        code: Some(code.to_owned()),
        state: Some(state.to_owned()),
        error: None,
        error_description: None,
    }
}

fn query_params(url: &str) -> HashMap<String, String> {
    Url::parse(url)
        .unwrap()
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn token_endpoint_response(id_claims: &serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": "provider-access-token",
        "id_token": common::fake_id_token(id_claims),
        "token_type": "Bearer",
        "expires_in": 3599,
        "scope": "openid profile email"
    }))
}

fn default_claims() -> serde_json::Value {
    json!({
        "sub": "user-123",
        "oid": "obj-123",
        "tid": "tenant-1",
        "name": "Demo User",
        "preferred_username": "demo@example.com",
        "email": "demo@example.com"
    })
}

#[tokio::test]
async fn test_begin_login_builds_pkce_authorize_url() {
    let server = MockServer::start().await;
    let keys = common::TestKeys::generate();
    let gateway = AuthGateway::new(&common::gateway_config(&server.uri()), Arc::new(keys.key_ring()));

    let redirect = gateway.begin_login().await.unwrap();
    let params = query_params(&redirect.authorize_url);

    assert_eq!(params["response_type"], "code");
    assert_eq!(params["client_id"], "client-1");
    assert_eq!(params["code_challenge_method"], "S256");
    assert_eq!(params["state"].len(), 64);
    assert!(params["scope"].starts_with("openid profile email"));
    assert_eq!(redirect.cookie_max_age_secs, 600);
    assert!(!redirect.session_id.is_empty());
}

#[tokio::test]
async fn test_mismatched_state_yields_csrf_and_no_token_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let keys = common::TestKeys::generate();
    let gateway = AuthGateway::new(&common::gateway_config(&server.uri()), Arc::new(keys.key_ring()));

    let redirect = gateway.begin_login().await.unwrap();
    let err = gateway
        .handle_callback(&callback("some-code", "not-the-state"), Some(&redirect.session_id))
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::CsrfMismatch);
    server.verify().await;
}

#[tokio::test]
async fn test_unknown_session_treated_as_csrf_mismatch() {
    let server = MockServer::start().await;
    let keys = common::TestKeys::generate();
    let gateway = AuthGateway::new(&common::gateway_config(&server.uri()), Arc::new(keys.key_ring()));

    let err = gateway
        .handle_callback(&callback("code", "state"), Some("no-such-session"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::CsrfMismatch);
}

#[tokio::test]
async fn test_missing_parameters_are_invalid_request() {
    let server = MockServer::start().await;
    let keys = common::TestKeys::generate();
    let gateway = AuthGateway::new(&common::gateway_config(&server.uri()), Arc::new(keys.key_ring()));
    let redirect = gateway.begin_login().await.unwrap();

    // No session cookie
    let err = gateway
        .handle_callback(&callback("code", "state"), None)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidRequest);

    // No code
    let params = CallbackParams {
        code: None,
        state: Some("state".into()),
        error: None,
        error_description: None,
    };
    let err = gateway
        .handle_callback(&params, Some(&redirect.session_id))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidRequest);
}

#[tokio::test]
async fn test_provider_error_aborts_flow() {
    let server = MockServer::start().await;
    let keys = common::TestKeys::generate();
    let gateway = AuthGateway::new(&common::gateway_config(&server.uri()), Arc::new(keys.key_ring()));
    let redirect = gateway.begin_login().await.unwrap();

    let params = CallbackParams {
        code: None,
        state: None,
        error: Some("access_denied".into()),
        error_description: Some("user cancelled".into()),
    };
    let err = gateway
        .handle_callback(&params, Some(&redirect.session_id))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ProviderExchangeFailed);
    assert!(err.message.contains("access_denied"));
}

#[tokio::test]
async fn test_full_login_flow_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code_verifier="))
        .respond_with(token_endpoint_response(&default_claims()))
        .expect(1)
        .mount(&server)
        .await;

    let keys = common::TestKeys::generate();
    let gateway = AuthGateway::new(&common::gateway_config(&server.uri()), Arc::new(keys.key_ring()));

    let redirect = gateway.begin_login().await.unwrap();
    let params = query_params(&redirect.authorize_url);

    let outcome = gateway
        .handle_callback(
            &callback("auth-code-1", &params["state"]),
            Some(&redirect.session_id),
        )
        .await
        .unwrap();

    assert!(outcome.authenticated);
    assert!(outcome.downstream_token_minted);
    assert_eq!(outcome.user["name"], "Demo User");
    assert_eq!(outcome.token_type.as_deref(), Some("Bearer"));

    // The exchange sent the verifier matching the challenge from the redirect
    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8(requests[0].body.clone()).unwrap();
    let form: HashMap<String, String> = url::form_urlencoded::parse(body.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    assert_eq!(challenge_for(&form["code_verifier"]), params["code_challenge"]);
    assert_eq!(form["code"], "auth-code-1");

    // Authenticated surface: user, token, structural validation
    let user = gateway.current_user(&redirect.session_id).await.unwrap();
    assert!(user.authenticated);
    assert!(user.has_downstream_token);
    assert!(!user.user.is_empty());

    let token = gateway.downstream_token(&redirect.session_id).await.unwrap();
    assert_eq!(token.split('.').count(), 3);

    let report = gateway
        .validate_token_structure(&redirect.session_id)
        .await
        .unwrap();
    assert!(report.valid);
    assert_eq!(report.parts_count, 3);
    assert_eq!(report.payload["user_payload"], "[ENCRYPTED]");

    // Logout tears the session down
    assert!(gateway.logout(&redirect.session_id).await);
    let err = gateway
        .downstream_token(&redirect.session_id)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotAuthenticated);

    server.verify().await;
}

#[tokio::test]
async fn test_replayed_callback_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(token_endpoint_response(&default_claims()))
        .expect(1)
        .mount(&server)
        .await;

    let keys = common::TestKeys::generate();
    let gateway = AuthGateway::new(&common::gateway_config(&server.uri()), Arc::new(keys.key_ring()));

    let redirect = gateway.begin_login().await.unwrap();
    let params = query_params(&redirect.authorize_url);
    let cb = callback("auth-code-1", &params["state"]);

    gateway
        .handle_callback(&cb, Some(&redirect.session_id))
        .await
        .unwrap();

    // The state nonce was consumed by the first callback
    let err = gateway
        .handle_callback(&cb, Some(&redirect.session_id))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::CsrfMismatch);
    server.verify().await;
}

#[tokio::test]
async fn test_failed_exchange_surfaces_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant"
        })))
        .mount(&server)
        .await;

    let keys = common::TestKeys::generate();
    let gateway = AuthGateway::new(&common::gateway_config(&server.uri()), Arc::new(keys.key_ring()));

    let redirect = gateway.begin_login().await.unwrap();
    let params = query_params(&redirect.authorize_url);

    let err = gateway
        .handle_callback(
            &callback("bad-code", &params["state"]),
            Some(&redirect.session_id),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ProviderExchangeFailed);

    // The session is left unauthenticated
    let err = gateway.current_user(&redirect.session_id).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::NotAuthenticated);
}

#[tokio::test]
async fn test_missing_keys_degrade_without_aborting_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(token_endpoint_response(&default_claims()))
        .mount(&server)
        .await;

    let gateway = AuthGateway::new(
        &common::gateway_config(&server.uri()),
        Arc::new(KeyRing::empty()),
    );

    let redirect = gateway.begin_login().await.unwrap();
    let params = query_params(&redirect.authorize_url);

    let outcome = gateway
        .handle_callback(
            &callback("auth-code-1", &params["state"]),
            Some(&redirect.session_id),
        )
        .await
        .unwrap();

    assert!(outcome.authenticated);
    assert!(!outcome.downstream_token_minted);

    let user = gateway.current_user(&redirect.session_id).await.unwrap();
    assert!(user.authenticated);
    assert!(!user.has_downstream_token);

    let err = gateway
        .downstream_token(&redirect.session_id)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::KeysUnavailable);
}

#[tokio::test]
async fn test_public_config_exposes_no_secrets() {
    let server = MockServer::start().await;
    let keys = common::TestKeys::generate();
    let gateway = AuthGateway::new(&common::gateway_config(&server.uri()), Arc::new(keys.key_ring()));

    let public = gateway.public_config();
    let json = serde_json::to_string(public).unwrap();
    assert!(json.contains("orch-1"));
    assert!(!json.contains("client-secret"));
}

// ABOUTME: Shared helpers for integration tests
// ABOUTME: Test key generation, fake identity tokens and config builders
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright ©2025 Async-IO.org

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use orchestrate_gateway::config::{
    ChatApiConfig, DownstreamConfig, GatewayConfig, IdentityProviderConfig, KeyConfig,
    SessionConfig,
};
use orchestrate_gateway::crypto::KeyRing;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use serde_json::Value;
use std::path::PathBuf;

/// RSA key size for tests; 2048 keeps generation fast
const TEST_RSA_BITS: usize = 2048;

/// Signing and recipient key material for a test gateway
pub struct TestKeys {
    pub signing_private_pem: String,
    pub signing_public_pem: String,
    pub recipient_private: RsaPrivateKey,
    pub recipient_public_pem: String,
}

impl TestKeys {
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;

        let signing = RsaPrivateKey::new(&mut rng, TEST_RSA_BITS).unwrap();
        let signing_private_pem = signing.to_pkcs1_pem(LineEnding::LF).unwrap().to_string();
        let signing_public_pem = RsaPublicKey::from(&signing)
            .to_public_key_pem(LineEnding::LF)
            .unwrap();

        let recipient_private = RsaPrivateKey::new(&mut rng, TEST_RSA_BITS).unwrap();
        let recipient_public_pem = RsaPublicKey::from(&recipient_private)
            .to_public_key_pem(LineEnding::LF)
            .unwrap();

        Self {
            signing_private_pem,
            signing_public_pem,
            recipient_private,
            recipient_public_pem,
        }
    }

    pub fn key_ring(&self) -> KeyRing {
        KeyRing::from_pems(&self.signing_private_pem, &self.recipient_public_pem).unwrap()
    }

    /// Decrypt a base64 ciphertext blob produced with the recipient public key
    pub fn decrypt_payload(&self, blob: &str) -> Vec<u8> {
        let ciphertext = STANDARD.decode(blob).unwrap();
        let block_size = TEST_RSA_BITS / 8;
        let mut plaintext = Vec::new();
        for block in ciphertext.chunks(block_size) {
            plaintext.extend(
                self.recipient_private
                    .decrypt(Pkcs1v15Encrypt, block)
                    .unwrap(),
            );
        }
        plaintext
    }
}

/// Build a compact identity token with the given claims and a fake signature
pub fn fake_id_token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
    format!("{header}.{payload}.test-signature")
}

/// Downstream-service config used across tests
pub fn downstream_config() -> DownstreamConfig {
    DownstreamConfig {
        host_url: "https://chat.example.com".into(),
        orchestration_id: "orch-1".into(),
        agent_id: "agent-1".into(),
        agent_environment_id: "env-1".into(),
        token_issuer: "orchestrate-gateway".into(),
        token_audience: "orchestrate".into(),
        subject_prefix: "sso-".into(),
    }
}

/// Chat API config pointed at a stub server base URL
pub fn chat_config(base_url: &str) -> ChatApiConfig {
    ChatApiConfig {
        token_url: format!("{base_url}/identity/token"),
        api_key: "test-api-key".into(),
        api_base: base_url.into(),
        instance_id: "inst-1".into(),
        agent_id: "agent-1".into(),
    }
}

/// Full gateway config with identity endpoints pointed at a stub server
pub fn gateway_config(idp_base_url: &str) -> GatewayConfig {
    GatewayConfig {
        http_port: 8080,
        identity: IdentityProviderConfig {
            authorize_url: format!("{idp_base_url}/authorize"),
            token_url: format!("{idp_base_url}/token"),
            client_id: "client-1".into(),
            client_secret: "client-secret".into(),
            scope: "api://demo/.default".into(),
            redirect_uri: "http://localhost:8080/callback".into(),
        },
        downstream: downstream_config(),
        keys: KeyConfig {
            signing_key_path: PathBuf::from("keys/private_key.pem"),
            recipient_key_path: PathBuf::from("keys/recipient_public_key.pem"),
        },
        chat: chat_config(idp_base_url),
        session: SessionConfig {
            ttl_secs: 600,
            capacity: 64,
        },
    }
}

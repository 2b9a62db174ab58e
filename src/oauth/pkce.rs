// ABOUTME: PKCE and state parameter generation for the authorization request
// ABOUTME: Pure entropy-source functions; the caller persists both values in the session
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! PKCE (RFC 7636) verifier/challenge pairs and CSRF state nonces

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Bytes of entropy behind each verifier and state value
const ENTROPY_BYTES: usize = 32;

/// PKCE parameters for an authorization request with the S256 challenge method
#[derive(Debug, Clone)]
pub struct PkceParams {
    /// Secret kept server-side and sent only on the code exchange
    pub code_verifier: String,
    /// `base64url(SHA-256(code_verifier))`, sent on the authorization request
    pub code_challenge: String,
    /// Always `S256`
    pub code_challenge_method: &'static str,
}

impl PkceParams {
    /// Generate a fresh verifier/challenge pair
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; ENTROPY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let code_verifier = URL_SAFE_NO_PAD.encode(bytes);
        let code_challenge = challenge_for(&code_verifier);

        Self {
            code_verifier,
            code_challenge,
            code_challenge_method: "S256",
        }
    }
}

/// Compute the S256 challenge for a verifier
///
/// `challenge = BASE64URL(SHA256(verifier))`, no padding.
#[must_use]
pub fn challenge_for(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generate a single-use CSRF state nonce, hex-encoded
#[must_use]
pub fn generate_state() -> String {
    let mut bytes = [0u8; ENTROPY_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_matches_sha256_of_verifier() {
        let pkce = PkceParams::generate();
        assert_eq!(pkce.code_challenge, challenge_for(&pkce.code_verifier));
        assert_eq!(pkce.code_challenge_method, "S256");
    }

    #[test]
    fn test_verifier_is_url_safe_and_unpadded() {
        let pkce = PkceParams::generate();
        // 32 bytes -> 43 base64url chars, no '=' padding
        assert_eq!(pkce.code_verifier.len(), 43);
        assert!(pkce
            .code_verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_state_is_hex_of_32_bytes() {
        let state = generate_state();
        assert_eq!(state.len(), 64);
        assert!(state.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generations_do_not_collide() {
        let a = PkceParams::generate();
        let b = PkceParams::generate();
        assert_ne!(a.code_verifier, b.code_verifier);
        assert_ne!(generate_state(), generate_state());
    }

    #[test]
    fn test_verifiers_unique_across_many_generations() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(PkceParams::generate().code_verifier));
        }
    }
}

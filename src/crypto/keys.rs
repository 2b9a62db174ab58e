// ABOUTME: RSA key material for token signing and recipient-key payload encryption
// ABOUTME: Missing key files disable minting only; the rest of the login flow proceeds
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Key Material
//!
//! Two keys back downstream-token minting: an RSA private key that signs the
//! compact token (RS256) and the recipient's RSA public key that encrypts the
//! nested user payload. Both are loaded from PEM files at startup. If either
//! file is absent or unparsable the ring is incomplete and minting fails with
//! `KeysUnavailable`, while login and chat relay continue unaffected.

use crate::errors::{AppError, AppResult};
use base64::{engine::general_purpose, Engine as _};
use jsonwebtoken::EncodingKey;
use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{pkcs1::DecodeRsaPublicKey, pkcs8::DecodePublicKey, Pkcs1v15Encrypt, RsaPublicKey};
use std::path::Path;
use tracing::{info, warn};

/// PKCS#1 v1.5 padding overhead in bytes per encrypted block
const PKCS1_PADDING_OVERHEAD: usize = 11;

/// Signing and encryption key material for downstream token minting
pub struct KeyRing {
    signing_key: Option<EncodingKey>,
    recipient_key: Option<RsaPublicKey>,
}

impl KeyRing {
    /// An empty ring; minting is disabled
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            signing_key: None,
            recipient_key: None,
        }
    }

    /// Load both keys from PEM files
    ///
    /// Missing or unparsable files are logged and leave the corresponding
    /// slot empty rather than failing startup.
    #[must_use]
    pub fn load(signing_path: &Path, recipient_path: &Path) -> Self {
        let signing_key = match std::fs::read(signing_path) {
            Ok(pem) => match EncodingKey::from_rsa_pem(&pem) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!(path = %signing_path.display(), error = %e, "signing key PEM is not a valid RSA key");
                    None
                }
            },
            Err(e) => {
                warn!(path = %signing_path.display(), error = %e, "signing key not found; downstream token minting disabled");
                None
            }
        };

        let recipient_key = match std::fs::read_to_string(recipient_path) {
            Ok(pem) => match parse_public_key_pem(&pem) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!(path = %recipient_path.display(), error = %e, "recipient key PEM is not a valid RSA public key");
                    None
                }
            },
            Err(e) => {
                warn!(path = %recipient_path.display(), error = %e, "recipient public key not found; downstream token minting disabled");
                None
            }
        };

        if signing_key.is_some() && recipient_key.is_some() {
            info!("signing and recipient keys loaded");
        }

        Self {
            signing_key,
            recipient_key,
        }
    }

    /// Build a ring from in-memory PEM strings
    ///
    /// # Errors
    ///
    /// Returns an error if either PEM fails to parse.
    pub fn from_pems(signing_pem: &str, recipient_pem: &str) -> AppResult<Self> {
        let signing_key = EncodingKey::from_rsa_pem(signing_pem.as_bytes())
            .map_err(|e| AppError::internal(format!("invalid signing key PEM: {e}")))?;
        let recipient_key = parse_public_key_pem(recipient_pem)
            .map_err(|e| AppError::internal(format!("invalid recipient key PEM: {e}")))?;

        Ok(Self {
            signing_key: Some(signing_key),
            recipient_key: Some(recipient_key),
        })
    }

    /// Whether both keys are present and minting is possible
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.signing_key.is_some() && self.recipient_key.is_some()
    }

    /// The RS256 signing key
    ///
    /// # Errors
    ///
    /// Returns `KeysUnavailable` if the key was not loaded.
    pub fn signing_key(&self) -> AppResult<&EncodingKey> {
        self.signing_key
            .as_ref()
            .ok_or_else(AppError::keys_unavailable)
    }

    /// Encrypt a payload with the recipient public key
    ///
    /// PKCS#1 v1.5 encryption, block-chunked so payloads larger than one RSA
    /// modulus still produce a single base64 ciphertext blob. Only the holder
    /// of the recipient private key can recover the plaintext.
    ///
    /// # Errors
    ///
    /// Returns `KeysUnavailable` if the recipient key was not loaded, or an
    /// internal error if encryption itself fails.
    pub fn encrypt_for_recipient(&self, plaintext: &[u8]) -> AppResult<String> {
        let key = self
            .recipient_key
            .as_ref()
            .ok_or_else(AppError::keys_unavailable)?;

        let block_size = key.size() - PKCS1_PADDING_OVERHEAD;
        let mut rng = OsRng;
        let mut ciphertext = Vec::with_capacity(plaintext.len() + key.size());

        for chunk in plaintext.chunks(block_size) {
            let block = key
                .encrypt(&mut rng, Pkcs1v15Encrypt, chunk)
                .map_err(|e| AppError::internal(format!("payload encryption failed: {e}")))?;
            ciphertext.extend_from_slice(&block);
        }

        Ok(general_purpose::STANDARD.encode(ciphertext))
    }
}

/// Parse an RSA public key from SPKI (`BEGIN PUBLIC KEY`) or PKCS#1
/// (`BEGIN RSA PUBLIC KEY`) PEM encodings
fn parse_public_key_pem(pem: &str) -> Result<RsaPublicKey, rsa::pkcs8::spki::Error> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|spki_err| RsaPublicKey::from_pkcs1_pem(pem).map_err(|_| spki_err))
}

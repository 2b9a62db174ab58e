// ABOUTME: Cryptographic key management for downstream token minting
// ABOUTME: Loads the RSA signing key and recipient public key from PEM files
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Cryptographic utilities and key management

pub mod keys;

pub use keys::KeyRing;

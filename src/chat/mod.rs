// ABOUTME: Chat relay subsystem: bearer-token cache, SSE decoding, update dispatch
// ABOUTME: Module root for the streaming path between the chat API and the consumer
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Streaming chat relay against the hosted conversational-AI API

pub mod client;
pub mod delta;
pub mod sse;
pub mod token_cache;

pub use client::{relay_updates, ChatClient, UpdateStream};
pub use delta::{dispatch, ChatUpdate, StreamDelta};
pub use sse::SseLineBuffer;
pub use token_cache::BearerTokenProvider;

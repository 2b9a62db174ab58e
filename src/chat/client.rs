// ABOUTME: Streaming chat relay client for the hosted conversational-AI API
// ABOUTME: Authenticated POST, then a pull-based stream of typed chat updates
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Chat Relay Client
//!
//! Sends one user message to the chat completions endpoint (`stream: true`)
//! and exposes the response as a lazy, finite stream of [`ChatUpdate`]
//! values. Malformed frames are skipped; a read-level failure emits exactly
//! one error update and then surfaces the failure itself, ending the stream.
//! Dropping the stream cancels the request and releases its buffers.

use crate::chat::delta::{dispatch, ChatUpdate, StreamDelta};
use crate::chat::sse::SseLineBuffer;
use crate::chat::token_cache::BearerTokenProvider;
use crate::config::ChatApiConfig;
use crate::errors::{AppError, AppResult};
use bytes::Bytes;
use futures_util::stream::unfold;
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::{debug, error};
use uuid::Uuid;

/// Stream of typed updates produced by one chat request
pub type UpdateStream = Pin<Box<dyn Stream<Item = Result<ChatUpdate, AppError>> + Send>>;

/// Wire shape of the chat completions request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    messages: Vec<WireMessage<'a>>,
    agent_id: &'a str,
    context: &'a Value,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Client relaying chat messages to the conversational service
pub struct ChatClient {
    http: reqwest::Client,
    config: ChatApiConfig,
    tokens: Arc<BearerTokenProvider>,
}

impl ChatClient {
    /// Create a client with its own bearer-token cache
    #[must_use]
    pub fn new(config: ChatApiConfig) -> Self {
        let tokens = Arc::new(BearerTokenProvider::new(&config));
        Self::with_token_provider(config, tokens)
    }

    /// Create a client sharing an existing bearer-token cache
    #[must_use]
    pub fn with_token_provider(config: ChatApiConfig, tokens: Arc<BearerTokenProvider>) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            tokens,
        }
    }

    /// Send a user message and stream back the agent's updates
    ///
    /// # Errors
    ///
    /// - `TokenFetchFailed` when no bearer token could be obtained
    /// - `StreamConnectionError` when the chat endpoint is unreachable or
    ///   responds non-success before any frame is streamed
    pub async fn send_message(&self, message: &str, context: &Value) -> AppResult<UpdateStream> {
        let bearer = self.tokens.get_token().await?;

        let request = ChatCompletionRequest {
            messages: vec![WireMessage {
                role: "user",
                content: message,
            }],
            agent_id: &self.config.agent_id,
            context,
            stream: true,
        };

        let response = self
            .http
            .post(self.config.completions_url())
            .header("Accept", "application/json")
            .header("Authorization", format!("Bearer {bearer}"))
            .header("X-Session-ID", format!("session_{}", Uuid::new_v4()))
            .header("X-Conversation-ID", format!("conv_{}", Uuid::new_v4()))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("chat endpoint unreachable: {e}");
                AppError::stream_connection(format!("chat endpoint unreachable: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, "chat endpoint rejected the request");
            return Err(AppError::stream_connection(format!(
                "chat endpoint returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        Ok(relay_updates(response.bytes_stream()))
    }
}

/// State threaded through the update stream
struct RelayState {
    lines: SseLineBuffer,
    pending: VecDeque<Result<ChatUpdate, AppError>>,
    ended: bool,
}

impl RelayState {
    fn ingest(&mut self, payload: &str) {
        match StreamDelta::decode(payload) {
            Ok(delta) => {
                if let Some(update) = dispatch(delta) {
                    self.pending.push_back(Ok(update));
                }
            }
            // Malformed frames are not fatal; the stream continues
            Err(e) => debug!("skipping malformed stream frame: {e}"),
        }
    }
}

/// Turn a raw SSE byte stream into a stream of typed chat updates
///
/// Generic over the byte stream's error type so tests can drive it without a
/// live HTTP response.
pub fn relay_updates<S, E>(byte_stream: S) -> UpdateStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = RelayState {
        lines: SseLineBuffer::new(),
        pending: VecDeque::new(),
        ended: false,
    };

    // unfold keeps the line buffer alive across reads: drain pending updates
    // first, then pull the next chunk.
    let stream = unfold(
        (Box::pin(byte_stream), state),
        |(mut bytes, mut state)| async move {
            loop {
                if let Some(item) = state.pending.pop_front() {
                    return Some((item, (bytes, state)));
                }
                if state.ended {
                    return None;
                }

                match bytes.next().await {
                    Some(Ok(chunk)) => {
                        for payload in state.lines.feed(&chunk) {
                            state.ingest(&payload);
                        }
                    }
                    Some(Err(e)) => {
                        state.ended = true;
                        state.pending.push_back(Ok(ChatUpdate::Error {
                            content: format!("Connection error: {e}"),
                        }));
                        state
                            .pending
                            .push_back(Err(AppError::stream_connection(e.to_string())));
                    }
                    None => {
                        state.ended = true;
                        if let Some(payload) = state.lines.flush() {
                            state.ingest(&payload);
                        }
                    }
                }
            }
        },
    );

    Box::pin(stream)
}

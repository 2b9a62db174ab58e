// ABOUTME: Decoding of streamed completion frames into typed deltas and updates
// ABOUTME: Unknown or absent delta shapes become a no-op variant, never a decode error
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Stream Delta Decoding and Dispatch
//!
//! Each SSE frame payload is a JSON document of the shape
//! `{"choices":[{"delta":{content?, step_details?}}]}`. The delta is decoded
//! into the [`StreamDelta`] tagged union and then dispatched into the
//! [`ChatUpdate`] the consumer sees. Step details discriminate on their
//! `type` field; anything unrecognized maps to [`StreamDelta::Unknown`] and
//! produces no update.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire shape of one streamed completion frame
#[derive(Debug, Deserialize)]
struct CompletionFrame {
    #[serde(default)]
    choices: Vec<FrameChoice>,
}

#[derive(Debug, Deserialize)]
struct FrameChoice {
    #[serde(default)]
    delta: FrameDelta,
}

#[derive(Debug, Default, Deserialize)]
struct FrameDelta {
    content: Option<String>,
    step_details: Option<StepDetails>,
}

/// Discriminated step details carried by tool-related deltas
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum StepDetails {
    /// The agent is invoking one or more tools
    #[serde(rename = "tool_calls")]
    ToolCalls {
        #[serde(default)]
        tool_calls: Vec<ToolCallDetails>,
    },
    /// A tool finished and returned content
    #[serde(rename = "tool_response")]
    ToolResponse {
        #[serde(default)]
        content: Value,
    },
    /// Any other step type; ignored
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ToolCallDetails {
    name: Option<String>,
    #[serde(default)]
    args: Value,
}

/// One decoded delta from the completion stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamDelta {
    /// A fragment of response text
    Text {
        /// The text fragment
        content: String,
    },
    /// The agent started a tool invocation
    ToolCall {
        /// Name of the invoked tool
        tool_name: String,
        /// Invocation arguments
        args: Value,
    },
    /// A tool produced its result
    ToolResponse {
        /// Raw result content
        content: Value,
    },
    /// Nothing actionable in this frame
    Unknown,
}

impl StreamDelta {
    /// Decode one frame payload into a delta
    ///
    /// # Errors
    ///
    /// Returns the JSON error when the payload is not valid JSON; callers
    /// treat that as a skippable malformed frame.
    pub fn decode(payload: &str) -> Result<Self, serde_json::Error> {
        let frame: CompletionFrame = serde_json::from_str(payload)?;
        Ok(frame
            .choices
            .into_iter()
            .next()
            .map_or(Self::Unknown, |choice| Self::classify(choice.delta)))
    }

    fn classify(delta: FrameDelta) -> Self {
        match delta.step_details {
            Some(StepDetails::ToolCalls { tool_calls }) => {
                let call = tool_calls.into_iter().next().unwrap_or(ToolCallDetails {
                    name: None,
                    args: Value::Null,
                });
                Self::ToolCall {
                    tool_name: call.name.unwrap_or_default(),
                    args: if call.args.is_null() {
                        Value::Object(serde_json::Map::new())
                    } else {
                        call.args
                    },
                }
            }
            Some(StepDetails::ToolResponse { content }) => Self::ToolResponse { content },
            Some(StepDetails::Other) | None => match delta.content {
                Some(content) if !content.is_empty() => Self::Text { content },
                _ => Self::Unknown,
            },
        }
    }
}

/// Typed update delivered to the stream consumer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatUpdate {
    /// Response text; each increment is surfaced immediately as complete
    Response {
        /// The response text
        content: String,
        /// Always true: text deltas are standalone, not accumulated
        is_complete: bool,
    },
    /// The agent is using a tool
    ToolActivity {
        /// Human-readable description of the invocation
        content: String,
        /// Name of the invoked tool
        tool_name: String,
        /// Invocation arguments
        args: Value,
    },
    /// A tool returned its result
    ToolResult {
        /// Raw result content
        content: Value,
    },
    /// The stream's connection failed; emitted once before the failure itself
    Error {
        /// Description of the failure
        content: String,
    },
}

/// Map a decoded delta onto the update the consumer receives
///
/// [`StreamDelta::Unknown`] produces no update.
#[must_use]
pub fn dispatch(delta: StreamDelta) -> Option<ChatUpdate> {
    match delta {
        StreamDelta::Text { content } => Some(ChatUpdate::Response {
            content,
            is_complete: true,
        }),
        StreamDelta::ToolCall { tool_name, args } => Some(ChatUpdate::ToolActivity {
            content: format!("Using {tool_name} tool with args: {args}"),
            tool_name,
            args,
        }),
        StreamDelta::ToolResponse { content } => Some(ChatUpdate::ToolResult { content }),
        StreamDelta::Unknown => None,
    }
}

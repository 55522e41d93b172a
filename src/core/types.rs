//! Shared types used across Switchboard modules
//!
//! Contains conversation turns, attachments, provider-neutral message parts,
//! tool declarations and call results.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::SwitchboardError;

/// Identity of one of the built-in agents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentId {
    #[default]
    #[serde(rename = "generalist")]
    Generalist,
    #[serde(rename = "researcher")]
    Researcher,
    #[serde(rename = "analyst")]
    Analyst,
    #[serde(rename = "coder")]
    Coder,
    #[serde(rename = "carSpecialist")]
    CarSpecialist,
}

impl AgentId {
    /// Every agent, in routing-table order
    pub const ALL: [AgentId; 5] = [
        AgentId::Generalist,
        AgentId::Researcher,
        AgentId::Analyst,
        AgentId::Coder,
        AgentId::CarSpecialist,
    ];

    /// Wire name used in prompts, config files and classification schemas
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentId::Generalist => "generalist",
            AgentId::Researcher => "researcher",
            AgentId::Analyst => "analyst",
            AgentId::Coder => "coder",
            AgentId::CarSpecialist => "carSpecialist",
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentId {
    type Err = SwitchboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        AgentId::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| SwitchboardError::UnknownAgent(trimmed.to_string()))
    }
}

/// Author of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Model => write!(f, "model"),
        }
    }
}

/// Body of an attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum AttachmentPayload {
    /// Base64-encoded bytes (images and other binary files)
    Base64(String),
    /// Raw text content
    Text(String),
}

/// A file attached to a turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub content_type: String,
    pub payload: AttachmentPayload,
    pub size_bytes: u64,
}

impl Attachment {
    /// Build an attachment from bytes already read into memory.
    ///
    /// Images and anything that is not valid UTF-8 are stored as base64,
    /// everything else as text.
    pub fn from_bytes(
        name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        let content_type = content_type.into();
        let size_bytes = bytes.len() as u64;

        let payload = if content_type.starts_with("image/") {
            AttachmentPayload::Base64(BASE64_STANDARD.encode(&bytes))
        } else {
            match String::from_utf8(bytes) {
                Ok(text) => AttachmentPayload::Text(text),
                Err(e) => AttachmentPayload::Base64(BASE64_STANDARD.encode(e.into_bytes())),
            }
        };

        Self {
            name: name.into(),
            content_type,
            payload,
            size_bytes,
        }
    }

    /// Build a text attachment
    pub fn text(name: impl Into<String>, content_type: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            name: name.into(),
            content_type: content_type.into(),
            size_bytes: text.len() as u64,
            payload: AttachmentPayload::Text(text),
        }
    }

    /// Convert to the part sent to the model
    pub fn to_part(&self) -> Part {
        match &self.payload {
            AttachmentPayload::Base64(data) => Part::InlineData {
                mime_type: self.content_type.clone(),
                data: strip_data_url(data).to_string(),
            },
            AttachmentPayload::Text(text) => Part::Text(format!(
                "\nFile: {}\n```\n{}\n```",
                self.name, text
            )),
        }
    }

    /// Whether the payload is binary
    pub fn is_binary(&self) -> bool {
        matches!(self.payload, AttachmentPayload::Base64(_))
    }
}

/// Drop a `data:<mime>;base64,` prefix if one is present
fn strip_data_url(data: &str) -> &str {
    if data.starts_with("data:") {
        if let Some((_, rest)) = data.split_once(',') {
            return rest;
        }
    }
    data
}

/// One message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub id: String,
    pub role: Role,
    /// Grows while streaming, immutable afterwards
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_streaming: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
}

impl Turn {
    /// Create a finished user turn
    pub fn user(content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            created_at: Utc::now(),
            is_streaming: false,
            attachments,
            agent_id: None,
        }
    }

    /// Create an empty, streaming model turn for the given agent
    pub fn placeholder(agent_id: AgentId) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Model,
            content: String::new(),
            created_at: Utc::now(),
            is_streaming: true,
            attachments: Vec::new(),
            agent_id: Some(agent_id),
        }
    }

    /// Create a finished model turn (history seeding, tests)
    pub fn model(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Model,
            content: content.into(),
            created_at: Utc::now(),
            is_streaming: false,
            attachments: Vec::new(),
            agent_id: None,
        }
    }

    /// Convert to provider content: attachments first, then text.
    ///
    /// Never yields an empty part list; a turn with nothing to say is sent
    /// as a single whitespace text part.
    pub fn to_content(&self) -> Content {
        let mut parts: Vec<Part> = self.attachments.iter().map(Attachment::to_part).collect();

        if !self.content.is_empty() {
            parts.push(Part::Text(self.content.clone()));
        }

        if parts.is_empty() {
            parts.push(Part::Text(" ".to_string()));
        }

        Content {
            role: self.role,
            parts,
        }
    }
}

/// A provider-neutral piece of message content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    Text(String),
    InlineData { mime_type: String, data: String },
    FunctionCall(ToolCall),
    FunctionResponse {
        id: String,
        name: String,
        response: serde_json::Value,
    },
}

impl Part {
    /// Text carried by this part, if any
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Ordered parts authored by one role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call id, unique within a round
    pub id: String,
    /// Name of the tool to invoke
    pub name: String,
    /// JSON arguments for the tool
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Create a new tool call
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Merge a repeated call's arguments into the collected ones.
///
/// Objects are merged key by key with later keys winning; anything else is
/// replaced by the later value unless that value is null.
pub fn merge_arguments(existing: &mut serde_json::Value, incoming: serde_json::Value) {
    match (existing, incoming) {
        (serde_json::Value::Object(current), serde_json::Value::Object(update)) => {
            current.extend(update);
        }
        (_, serde_json::Value::Null) => {}
        (slot, value) => *slot = value,
    }
}

/// Declaration of a function the model may call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Name of the function, unique within an agent
    pub name: String,
    /// Description of what the function does
    pub description: String,
    /// JSON Schema for the parameters
    pub parameters: serde_json::Value,
}

impl ToolDeclaration {
    /// Create a new function declaration
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A tool an agent exposes to the model
#[derive(Debug, Clone, PartialEq)]
pub enum AgentTool {
    /// Client-executed function
    Function(ToolDeclaration),
    /// Provider-side web search grounding
    WebSearch,
}

/// Success value or human-readable failure message
pub type ToolOutcome = std::result::Result<serde_json::Value, String>;

/// Result of one executed call, still keyed by the call id
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    pub call_id: String,
    pub tool_name: String,
    pub outcome: ToolOutcome,
}

impl CallResult {
    /// Create a successful result
    pub fn success(call: &ToolCall, value: serde_json::Value) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            outcome: Ok(value),
        }
    }

    /// Create a failed result
    pub fn failure(call: &ToolCall, message: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            outcome: Err(message.into()),
        }
    }

    /// Whether the call succeeded
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Convert to the function-response part fed back to the model
    pub fn to_part(&self) -> Part {
        let response = match &self.outcome {
            Ok(value) => serde_json::json!({ "result": value }),
            Err(message) => serde_json::json!({ "error": message }),
        };

        Part::FunctionResponse {
            id: self.call_id.clone(),
            name: self.tool_name.clone(),
            response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id_round_trips_wire_names() {
        for id in AgentId::ALL {
            assert_eq!(id.as_str().parse::<AgentId>().unwrap(), id);
        }
        assert_eq!("carspecialist".parse::<AgentId>().unwrap(), AgentId::CarSpecialist);
        assert!("pirate".parse::<AgentId>().is_err());
    }

    #[test]
    fn test_image_only_turn_is_not_empty() {
        let image = Attachment::from_bytes("cat.png", "image/png", vec![0x89, 0x50, 0x4e, 0x47]);
        let turn = Turn::user("", vec![image]);

        let content = turn.to_content();
        assert_eq!(content.parts.len(), 1);
        assert!(matches!(
            &content.parts[0],
            Part::InlineData { mime_type, .. } if mime_type == "image/png"
        ));
    }

    #[test]
    fn test_empty_turn_gets_placeholder_part() {
        let turn = Turn::model("");
        let content = turn.to_content();
        assert_eq!(content.parts, vec![Part::Text(" ".to_string())]);
    }

    #[test]
    fn test_text_attachment_is_labelled_with_filename() {
        let notes = Attachment::text("notes.md", "text/markdown", "hello");
        let turn = Turn::user("summarise", vec![notes]);

        let content = turn.to_content();
        assert_eq!(content.parts.len(), 2);
        let block = content.parts[0].as_text().unwrap();
        assert!(block.contains("File: notes.md"));
        assert!(block.contains("hello"));
        assert_eq!(content.parts[1].as_text(), Some("summarise"));
    }

    #[test]
    fn test_non_utf8_bytes_become_base64() {
        let attachment = Attachment::from_bytes("blob.bin", "application/octet-stream", vec![0xff, 0xfe]);
        assert!(attachment.is_binary());
        assert_eq!(attachment.size_bytes, 2);
    }

    #[test]
    fn test_data_url_prefix_is_stripped() {
        let attachment = Attachment {
            name: "dot.gif".to_string(),
            content_type: "image/gif".to_string(),
            payload: AttachmentPayload::Base64("data:image/gif;base64,R0lGOD".to_string()),
            size_bytes: 6,
        };
        assert_eq!(
            attachment.to_part(),
            Part::InlineData {
                mime_type: "image/gif".to_string(),
                data: "R0lGOD".to_string()
            }
        );
    }

    #[test]
    fn test_call_result_parts() {
        let call = ToolCall::new("c1", "calculator", serde_json::json!({"expression": "1+1"}));
        let ok = CallResult::success(&call, serde_json::json!("2")).to_part();
        let err = CallResult::failure(&call, "boom").to_part();

        assert!(matches!(ok, Part::FunctionResponse { ref response, .. } if response["result"] == "2"));
        assert!(matches!(err, Part::FunctionResponse { ref id, ref response, .. } if id == "c1" && response["error"] == "boom"));
    }
}

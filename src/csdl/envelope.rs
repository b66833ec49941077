//! CSDL message envelope.
//!
//! Agents exchange compact objects keyed by single letters:
//! `T` type, `C` content, `R` response format, `cx` context, `p` priority
//! and `m` metadata. [`CsdlMessage`] is the typed view of that shape.

use crate::core::{Error, Result, StructuredMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Priority used when a message does not carry one.
pub const DEFAULT_PRIORITY: u8 = 1;

/// Response format asking for a structured reply.
pub const STRUCTURED_RESPONSE: &str = "s";

/// Metadata key holding the message id.
pub const MESSAGE_ID_KEY: &str = "id";

/// Metadata key linking a reply to the message it answers.
pub const IN_RESPONSE_TO_KEY: &str = "re";

/// Message types, written as short codes on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CsdlMessageType {
    #[serde(rename = "q", alias = "query")]
    Query,
    #[serde(rename = "r", alias = "response")]
    Response,
    #[serde(rename = "rq", alias = "request")]
    Request,
    #[serde(rename = "n", alias = "notification")]
    Notification,
    #[serde(rename = "e", alias = "error")]
    Error,
    #[serde(rename = "co", alias = "coordination")]
    Coordination,
    #[serde(rename = "sy", alias = "synthesis")]
    Synthesis,
    #[serde(rename = "c", alias = "command")]
    Command,
}

impl CsdlMessageType {
    /// Wire code.
    pub fn code(self) -> &'static str {
        match self {
            Self::Query => "q",
            Self::Response => "r",
            Self::Request => "rq",
            Self::Notification => "n",
            Self::Error => "e",
            Self::Coordination => "co",
            Self::Synthesis => "sy",
            Self::Command => "c",
        }
    }

    /// Readable name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Response => "response",
            Self::Request => "request",
            Self::Notification => "notification",
            Self::Error => "error",
            Self::Coordination => "coordination",
            Self::Synthesis => "synthesis",
            Self::Command => "command",
        }
    }
}

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

/// A CSDL message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CsdlMessage {
    /// Message type
    #[serde(rename = "T")]
    pub message_type: CsdlMessageType,
    /// Message body
    #[serde(rename = "C", default)]
    pub content: StructuredMessage,
    /// Expected response format
    #[serde(rename = "R", default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<String>,
    /// Conversation context
    #[serde(rename = "cx", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    /// Priority
    #[serde(rename = "p", default = "default_priority")]
    pub priority: u8,
    /// Free-form metadata
    #[serde(rename = "m", default, skip_serializing_if = "StructuredMessage::is_empty")]
    pub metadata: StructuredMessage,
}

impl CsdlMessage {
    /// Message of the given type with default priority and no extras.
    pub fn new(message_type: CsdlMessageType, content: StructuredMessage) -> Self {
        Self {
            message_type,
            content,
            response_format: None,
            context: None,
            priority: DEFAULT_PRIORITY,
            metadata: StructuredMessage::new(),
        }
    }

    /// Create a query expecting a structured response.
    pub fn query(content: StructuredMessage) -> Self {
        Self::new(CsdlMessageType::Query, content)
            .with_response_format(STRUCTURED_RESPONSE)
    }

    /// Create a query carrying raw text.
    pub fn raw_query(text: &str) -> Self {
        let mut content = StructuredMessage::new();
        content.insert("raw".into(), Value::String(text.to_string()));
        Self::query(content)
    }

    /// Create a response to `original`.
    ///
    /// The reply inherits the priority and, if the original carries an id,
    /// references it under `m.re`.
    pub fn response(original: &CsdlMessage, content: StructuredMessage) -> Self {
        Self::reply_to(original, CsdlMessageType::Response, content)
    }

    /// Create a request.
    pub fn request(content: StructuredMessage) -> Self {
        Self::new(CsdlMessageType::Request, content)
    }

    /// Create a notification.
    pub fn notification(content: StructuredMessage) -> Self {
        Self::new(CsdlMessageType::Notification, content)
    }

    /// Create an error reply to `original`.
    pub fn error(original: &CsdlMessage, error: &str) -> Self {
        let mut content = StructuredMessage::new();
        content.insert("error".into(), Value::String(error.to_string()));
        Self::reply_to(original, CsdlMessageType::Error, content)
    }

    fn reply_to(
        original: &CsdlMessage,
        message_type: CsdlMessageType,
        content: StructuredMessage,
    ) -> Self {
        let mut reply = Self::new(message_type, content).with_priority(original.priority);
        if let Some(id) = original.message_id() {
            reply
                .metadata
                .insert(IN_RESPONSE_TO_KEY.into(), Value::String(id.to_string()));
        }
        reply
    }

    /// Stamp a fresh uuid v4 into `m.id`.
    pub fn with_message_id(mut self) -> Self {
        self.metadata.insert(
            MESSAGE_ID_KEY.into(),
            Value::String(Uuid::new_v4().to_string()),
        );
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_response_format(mut self, format: &str) -> Self {
        self.response_format = Some(format.to_string());
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// The `m.id` value, if any.
    pub fn message_id(&self) -> Option<&str> {
        self.metadata.get(MESSAGE_ID_KEY).and_then(Value::as_str)
    }

    /// The id of the message this one answers, if any.
    pub fn in_response_to(&self) -> Option<&str> {
        self.metadata.get(IN_RESPONSE_TO_KEY).and_then(Value::as_str)
    }

    /// Convert to the edge-schema mapping.
    pub fn to_message(&self) -> Result<StructuredMessage> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(Error::Internal(format!(
                "envelope serialized to a non-object: {}",
                other
            ))),
        }
    }

    /// Read an edge-schema mapping.
    pub fn from_message(msg: &StructuredMessage) -> Result<Self> {
        serde_json::from_value(Value::Object(msg.clone()))
            .map_err(|e| Error::DeserializationError(e.to_string()))
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::DeserializationError(e.to_string()))
    }

    /// Render the content as indented `key: value` lines.
    pub fn to_readable_text(&self) -> String {
        let mut lines = Vec::new();
        render_map(&self.content, 0, &mut lines);
        lines.join("\n")
    }
}

fn render_map(map: &StructuredMessage, indent: usize, lines: &mut Vec<String>) {
    let prefix = "  ".repeat(indent);
    for (key, value) in map {
        match value {
            Value::Object(inner) => {
                lines.push(format!("{}{}:", prefix, key));
                render_map(inner, indent + 1, lines);
            }
            Value::Array(items) => {
                lines.push(format!("{}{}:", prefix, key));
                for item in items {
                    match item {
                        Value::Object(inner) => render_map(inner, indent + 1, lines),
                        other => lines.push(format!("{}  - {}", prefix, scalar(other))),
                    }
                }
            }
            other => lines.push(format!("{}{}: {}", prefix, key, scalar(other))),
        }
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

//! Message records and the boundary the engine consumes them through
//!
//! The history engine is deliberately incurious about message records: it
//! needs an identifier, a role, optional content, an optional creation
//! timestamp, a validation hook, and a canonical encoding for size
//! estimation. Everything else (field layout, sanitization, wire formats)
//! belongs to the calling layer. [`ChatMessage`] is the minimal concrete
//! record shipped with the crate so it is usable and testable on its own.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Shared, immutable handle to a stored message record
///
/// Records are never mutated after insertion, so clones of this handle are
/// cheap and safe to hand out from read operations.
pub type MessageRef = Arc<dyn Message>;

/// The role a message was authored under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt or instruction
    System,

    /// End-user input
    User,

    /// Model output
    Assistant,

    /// Tool or function result
    Tool,

    /// Developer-authored instruction
    Developer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
            Role::Developer => "developer",
        };
        write!(f, "{name}")
    }
}

/// Metadata attached to a message record
///
/// Only `timestamp` matters to the engine (age-based eviction and
/// time-bounded queries); the provenance fields ride along untouched.
/// A record without metadata is excluded from time-bounded queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// When the message was created
    pub timestamp: DateTime<Utc>,

    /// Provider that produced the message, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Model that produced the message, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Identifier of the user the message belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Identifier of the session the message belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Caller-defined extra fields
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub custom_fields: serde_json::Map<String, serde_json::Value>,
}

impl MessageMetadata {
    /// Create metadata stamped with the current time
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    /// Create metadata with an explicit creation timestamp
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            provider: None,
            model: None,
            user_id: None,
            session_id: None,
            custom_fields: serde_json::Map::new(),
        }
    }
}

impl Default for MessageMetadata {
    fn default() -> Self {
        Self::now()
    }
}

/// Errors raised by a record's own validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// The record has an empty identifier
    #[error("message ID must not be empty")]
    EmptyId,

    /// The record's role requires content it does not carry
    #[error("{role} message requires content")]
    MissingContent {
        /// Role of the offending record
        role: Role,
    },
}

/// The record interface the engine stores and queries
///
/// Implementations must be cheap to query: the engine calls `id()` and
/// `metadata()` on hot paths, and `to_json()` exactly once per insertion
/// to estimate the record's byte cost.
pub trait Message: fmt::Debug + Send + Sync {
    /// Unique identifier; must be non-empty for the record to be accepted
    fn id(&self) -> &str;

    /// Role the message was authored under
    fn role(&self) -> Role;

    /// Text content, if the record carries any
    fn content(&self) -> Option<&str>;

    /// Optional participant name
    fn name(&self) -> Option<&str>;

    /// Metadata, if the record carries any
    fn metadata(&self) -> Option<&MessageMetadata>;

    /// Validate the record's own field-level rules
    fn validate(&self) -> Result<(), MessageError>;

    /// Canonical JSON encoding, used for size estimation and snapshots
    fn to_json(&self) -> Result<String, serde_json::Error>;
}

/// Minimal concrete message record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique identifier
    pub id: String,

    /// Authoring role
    pub role: Role,

    /// Text content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Optional participant name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Optional metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl ChatMessage {
    /// Create a message with a generated identifier and current timestamp
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: Some(content.into()),
            name: None,
            metadata: Some(MessageMetadata::now()),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a tool result message
    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }

    /// Create a developer message
    pub fn developer(content: impl Into<String>) -> Self {
        Self::new(Role::Developer, content)
    }

    /// Replace the generated identifier
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the participant name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replace the metadata
    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Wrap the message in a shareable [`MessageRef`]
    pub fn into_ref(self) -> MessageRef {
        Arc::new(self)
    }
}

impl Message for ChatMessage {
    fn id(&self) -> &str {
        &self.id
    }

    fn role(&self) -> Role {
        self.role
    }

    fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn metadata(&self) -> Option<&MessageMetadata> {
        self.metadata.as_ref()
    }

    fn validate(&self) -> Result<(), MessageError> {
        if self.id.is_empty() {
            return Err(MessageError::EmptyId);
        }
        // Assistant messages may legitimately carry no text (tool calls only).
        if self.role != Role::Assistant && self.content.is_none() {
            return Err(MessageError::MissingContent { role: self.role });
        }
        Ok(())
    }

    fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

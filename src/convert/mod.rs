//! Conversion of OpenAI-style chat messages into backend chat turns.
//!
//! The backend only knows two speakers, so `system` messages are folded into
//! the user side and consecutive turns from the same speaker are merged.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Speaker of a chat turn as the backend understands it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "USER")]
    User,
    #[serde(rename = "CHATBOT")]
    Bot,
}

impl Role {
    /// Map an OpenAI role name. Unknown roles yield `None`.
    pub fn from_openai(role: &str) -> Option<Self> {
        match role {
            "user" | "system" => Some(Role::User),
            "assistant" => Some(Role::Bot),
            _ => None,
        }
    }
}

/// One turn of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    #[serde(rename = "message")]
    pub text: String,
}

impl ChatTurn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// Why an inbound message list was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("messages must be an array")]
    NotAnArray,

    #[error("message {index} must be an object")]
    NotAnObject { index: usize },

    #[error("message {index} has an unsupported role")]
    InvalidRole { index: usize },

    #[error("message {index} content must be a string")]
    InvalidContent { index: usize },
}

/// Validate and convert an OpenAI `messages` value, then squash it.
///
/// Any invalid element rejects the whole list. An empty array converts to an
/// empty turn list.
pub fn convert_messages(messages: &Value) -> Result<Vec<ChatTurn>, ConversionError> {
    let items = messages.as_array().ok_or(ConversionError::NotAnArray)?;

    let turns = items
        .iter()
        .enumerate()
        .map(|(index, item)| convert_message(index, item))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(squash_turns(turns))
}

fn convert_message(index: usize, item: &Value) -> Result<ChatTurn, ConversionError> {
    let object = item
        .as_object()
        .ok_or(ConversionError::NotAnObject { index })?;

    let role = object
        .get("role")
        .and_then(Value::as_str)
        .and_then(Role::from_openai)
        .ok_or(ConversionError::InvalidRole { index })?;

    let text = object
        .get("content")
        .and_then(Value::as_str)
        .ok_or(ConversionError::InvalidContent { index })?;

    Ok(ChatTurn::new(role, text))
}

/// Merge runs of same-role turns.
///
/// The running role starts as [`Role::User`] and a turn is flushed every time
/// the role changes, so a conversation opening with a bot turn gains an empty
/// leading user turn. The trailing run is only kept when it has text.
pub fn squash_turns(turns: impl IntoIterator<Item = ChatTurn>) -> Vec<ChatTurn> {
    let mut squashed = Vec::new();
    let mut previous_role = Role::User;
    let mut buffer = String::new();

    for turn in turns {
        if turn.role != previous_role {
            squashed.push(ChatTurn::new(previous_role, std::mem::take(&mut buffer)));
        }
        buffer.push_str(&turn.text);
        previous_role = turn.role;
    }

    if !buffer.is_empty() {
        squashed.push(ChatTurn::new(previous_role, buffer));
    }

    squashed
}

//! Outbound commands and structured replies.

use serde::de::DeserializeOwned;

use super::wire_format::structured_variant;
use crate::codec::JsonCodec;
use crate::error::Result;

/// How the engine is expected to answer a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMode {
    /// Free-form text.
    Text,
    /// JSON produced by the verb's structured variant.
    Structured,
}

/// A request for the engine: command text plus the expected reply mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    text: String,
    mode: ReplyMode,
}

impl Command {
    /// A command answered with plain text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode: ReplyMode::Text,
        }
    }

    /// A command answered with JSON. The verb is given the structured marker
    /// if it does not already carry it.
    pub fn structured(text: impl AsRef<str>) -> Self {
        Self {
            text: structured_variant(text.as_ref()),
            mode: ReplyMode::Structured,
        }
    }

    /// The command line as sent, without terminator.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Expected reply mode.
    pub fn mode(&self) -> ReplyMode {
        self.mode
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Reply to a structured command.
///
/// An empty reply is a valid answer meaning "nothing here", not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuredReply {
    /// The engine printed nothing.
    Empty,
    /// The raw JSON text.
    Payload(String),
}

impl StructuredReply {
    /// Classify trimmed reply text.
    pub fn from_text(text: String) -> Self {
        if text.trim().is_empty() {
            Self::Empty
        } else {
            Self::Payload(text)
        }
    }

    /// Whether the engine printed nothing.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// The JSON text, or `""` for an empty reply.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Empty => "",
            Self::Payload(text) => text,
        }
    }

    /// Decode the payload, mapping an empty reply to `T::default()`.
    pub fn decode<T: DeserializeOwned + Default>(&self) -> Result<T> {
        match self {
            Self::Empty => Ok(T::default()),
            Self::Payload(text) => JsonCodec::decode(text),
        }
    }

    /// Decode the payload, mapping an empty reply to `None`.
    pub fn decode_opt<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match self {
            Self::Empty => Ok(None),
            Self::Payload(text) => JsonCodec::decode(text).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_command_gets_marker() {
        let cmd = Command::structured("pd 4 @ 0x10");
        assert_eq!(cmd.as_str(), "pdj 4 @ 0x10");
        assert_eq!(cmd.mode(), ReplyMode::Structured);
    }

    #[test]
    fn test_text_command_is_verbatim() {
        let cmd = Command::text("?v .");
        assert_eq!(cmd.to_string(), "?v .");
        assert_eq!(cmd.mode(), ReplyMode::Text);
    }

    #[test]
    fn test_empty_reply_decodes_to_default() {
        let reply = StructuredReply::from_text(String::new());
        assert!(reply.is_empty());

        let items: Vec<u8> = reply.decode().unwrap();
        assert!(items.is_empty());
        assert!(reply.decode_opt::<Vec<u8>>().unwrap().is_none());
    }

    #[test]
    fn test_payload_decodes() {
        let reply = StructuredReply::from_text("[1,2,3]".to_string());
        let items: Vec<u8> = reply.decode().unwrap();
        assert_eq!(items, vec![1, 2, 3]);
        assert_eq!(reply.as_str(), "[1,2,3]");
    }

    #[test]
    fn test_malformed_payload_is_decode_error() {
        let reply = StructuredReply::from_text("[1,2".to_string());
        let err = reply.decode::<Vec<u8>>().unwrap_err();
        assert!(matches!(err, crate::EngineError::Json(_)));
    }
}

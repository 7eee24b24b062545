use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::history::Role;

static THINKING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<think>(.*?)</think>").unwrap());

/// A message of the user-visible chat transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
}

impl ChatMessage {
    pub fn new<S: Into<String>>(role: Role, content: S) -> Self {
        Self {
            role,
            content: content.into(),
            thinking: None,
            model_name: None,
        }
    }

    pub fn user<S: Into<String>>(content: S) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// An assistant message whose `<think>...</think>` blocks are moved into
    /// `thinking`.
    pub fn assistant_reply(text: &str) -> Self {
        let thinking: Vec<&str> = THINKING
            .captures_iter(text)
            .filter_map(|captures| captures.get(1))
            .map(|block| block.as_str().trim())
            .filter(|block| !block.is_empty())
            .collect();
        let content = THINKING.replace_all(text, "");

        let mut message = Self::assistant(content.trim());
        if !thinking.is_empty() {
            message.thinking = Some(thinking.join("\n\n"));
        }
        message
    }

    pub fn with_model_name<S: Into<String>>(mut self, model_name: S) -> Self {
        self.model_name = Some(model_name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assistant_reply_splits_thinking() {
        let message =
            ChatMessage::assistant_reply("<think>\nuser wants Paris\n</think>\nIt's 15°C in Paris.");
        assert_eq!(message.content, "It's 15°C in Paris.");
        assert_eq!(message.thinking.as_deref(), Some("user wants Paris"));
        assert_eq!(message.role, Role::Assistant);

        let plain = ChatMessage::assistant_reply("Hello").with_model_name("llama3");
        assert_eq!(plain.thinking, None);
        assert_eq!(plain.model_name.as_deref(), Some("llama3"));
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(ChatMessage::user("hi").with_model_name("m")).unwrap();
        assert_eq!(json["modelName"], "m");
        assert!(json.get("thinking").is_none());
    }
}

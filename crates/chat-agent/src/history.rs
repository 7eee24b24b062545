//! The message log exchanged with the model during one orchestration session.
//!
//! This is separate from the visible chat transcript: it holds the raw
//! protocol prompts and replies, and is only ever appended to.

use serde::{Deserialize, Serialize};

/// Roles to describe the origin of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationMessage {
    pub role: Role,
    pub content: String,
}

impl OrchestrationMessage {
    pub fn new<S: Into<String>>(role: Role, content: S) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user<S: Into<String>>(content: S) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system<S: Into<String>>(content: S) -> Self {
        Self::new(Role::System, content)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    messages: Vec<OrchestrationMessage>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: OrchestrationMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[OrchestrationMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of model replies recorded so far.
    pub fn rounds(&self) -> usize {
        self.messages
            .iter()
            .filter(|message| message.role == Role::Assistant)
            .count()
    }

    pub fn last(&self) -> Option<&OrchestrationMessage> {
        self.messages.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_keeps_order_and_counts_rounds() {
        let mut history = History::new();
        assert!(history.is_empty());

        history.push(OrchestrationMessage::user("prompt"));
        history.push(OrchestrationMessage::assistant("reply"));
        history.push(OrchestrationMessage::system("tool output"));
        history.push(OrchestrationMessage::assistant("final"));

        assert_eq!(history.len(), 4);
        assert_eq!(history.rounds(), 2);
        let roles: Vec<Role> = history.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::System, Role::Assistant]
        );
        assert_eq!(history.last().unwrap().content, "final");
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_value(OrchestrationMessage::system("x")).unwrap();
        assert_eq!(json["role"], "system");
    }
}

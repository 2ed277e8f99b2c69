use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// A role-tagged chat message, the ordered-list alternative to a bare
/// prompt string accepted by [`Llm::complete`] (spec.md §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }
}

/// Either a bare prompt or an ordered list of role-tagged messages
/// (spec.md §4.3's `prompt_or_messages`).
#[derive(Debug, Clone)]
pub enum Prompt {
    Text(String),
    Messages(Vec<Message>),
}

impl Prompt {
    pub fn char_len(&self) -> usize {
        match self {
            Prompt::Text(s) => s.chars().count(),
            Prompt::Messages(msgs) => msgs.iter().map(|m| m.content.chars().count()).sum(),
        }
    }
}

impl From<&str> for Prompt {
    fn from(s: &str) -> Self {
        Prompt::Text(s.to_string())
    }
}

impl From<String> for Prompt {
    fn from(s: String) -> Self {
        Prompt::Text(s)
    }
}

impl From<Vec<Message>> for Prompt {
    fn from(messages: Vec<Message>) -> Self {
        Prompt::Messages(messages)
    }
}

/// The single provider abstraction the gateway is allowed to depend on.
/// No component outside `vigil-model` may implement or invoke this
/// trait directly against a real provider client (spec.md §4.3, "no
/// component outside the gateway module may import a provider client").
#[async_trait]
pub trait Llm: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &Prompt, temperature: f32) -> Result<String, ProviderError>;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

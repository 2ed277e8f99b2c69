use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, CreateEmbeddingRequestArgs,
    EmbeddingInput,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::error::ProviderError;
use crate::provider::{Llm, Prompt, Role};

/// The only concrete provider allowed to import `async_openai` in this
/// workspace (spec.md §4.3, "no component outside the gateway module
/// may import a provider client"). Constructed once at startup and
/// wrapped in a [`crate::gateway::ModelGateway`].
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    chat_model: String,
    embed_model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, chat_model: impl Into<String>, embed_model: impl Into<String>) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: Client::with_config(config),
            chat_model: chat_model.into(),
            embed_model: embed_model.into(),
        }
    }
}

fn to_openai_messages(prompt: &Prompt) -> Vec<ChatCompletionRequestMessage> {
    match prompt {
        Prompt::Text(text) => vec![ChatCompletionRequestUserMessageArgs::default()
            .content(text.as_str())
            .build()
            .expect("user message builder never fails for plain text")
            .into()],
        Prompt::Messages(messages) => messages
            .iter()
            .map(|m| match m.role {
                Role::System => ChatCompletionRequestSystemMessageArgs::default()
                    .content(m.content.as_str())
                    .build()
                    .expect("system message builder never fails for plain text")
                    .into(),
                Role::User | Role::Assistant => ChatCompletionRequestUserMessageArgs::default()
                    .content(m.content.as_str())
                    .build()
                    .expect("user message builder never fails for plain text")
                    .into(),
            })
            .collect(),
    }
}

fn classify_openai_error(err: &async_openai::error::OpenAIError) -> ProviderError {
    match err {
        async_openai::error::OpenAIError::ApiError(api_err) => {
            match api_err.code.as_deref() {
                Some("rate_limit_exceeded") => ProviderError::RateLimit(api_err.message.clone()),
                Some("invalid_api_key") => ProviderError::Auth(api_err.message.clone()),
                _ => ProviderError::Server5xx(api_err.message.clone()),
            }
        }
        async_openai::error::OpenAIError::Reqwest(_) => ProviderError::Connection(err.to_string()),
        other => ProviderError::Other(other.to_string()),
    }
}

#[async_trait]
impl Llm for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, prompt: &Prompt, temperature: f32) -> Result<String, ProviderError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.chat_model)
            .temperature(temperature)
            .messages(to_openai_messages(prompt))
            .build()
            .map_err(|e| ProviderError::Other(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| classify_openai_error(&e))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::Other("empty completion response".into()))
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.embed_model)
            .input(EmbeddingInput::StringArray(texts.to_vec()))
            .build()
            .map_err(|e| ProviderError::Other(e.to_string()))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| classify_openai_error(&e))?;

        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}

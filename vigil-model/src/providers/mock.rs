use async_trait::async_trait;

use crate::error::ProviderError;
use crate::provider::{Llm, Prompt};

/// A deterministic in-memory provider used by tests and by orchestrator
/// components that need an `Arc<dyn Llm>` without network access. Not
/// gated behind a feature: every other crate's test suite links this
/// the way the ancestor workspace's own mock providers are linked
/// directly rather than through a cargo feature.
pub struct MockLlm {
    name: String,
    response: String,
    embedding_dim: usize,
}

impl MockLlm {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            name: "mock".to_string(),
            response: response.into(),
            embedding_dim: 8,
        }
    }

    pub fn named(name: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response: response.into(),
            embedding_dim: 8,
        }
    }
}

#[async_trait]
impl Llm for MockLlm {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, _prompt: &Prompt, _temperature: f32) -> Result<String, ProviderError> {
        Ok(self.response.clone())
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; self.embedding_dim];
                for (i, b) in t.bytes().enumerate() {
                    v[i % self.embedding_dim] += b as f32;
                }
                let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
                v.iter_mut().for_each(|x| *x /= norm);
                v
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn complete_returns_configured_response() {
        let llm = MockLlm::new("hello");
        let out = llm.complete(&Prompt::Text("anything".into()), 0.5).await.unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn embed_is_deterministic_for_same_input() {
        let llm = MockLlm::new("x");
        let a = llm.embed(&["same text".to_string()]).await.unwrap();
        let b = llm.embed(&["same text".to_string()]).await.unwrap();
        assert_eq!(a, b);
    }
}

//! `EmbeddingProvider`: fixed-dimension vectors for text, hot-reloadable.
//!
//! Hot reload is an atomic reference swap (`parking_lot::RwLock<Arc<_>>`),
//! the pattern the design notes call for: a caller that already grabbed the
//! `Arc` for one `embed` call keeps running against the old config even if
//! `reload` lands mid-call, and the next caller to read the lock sees the
//! new one.

use std::sync::Arc;

use async_trait::async_trait;
use gnosis_dsl::fnv1a64;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, ProviderResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingRole {
    Document,
    Query,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingProviderConfig {
    pub provider: String,
    pub model_name: String,
    pub dimensions: usize,
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String], role: EmbeddingRole) -> ProviderResult<Vec<Vec<f32>>>;

    fn config(&self) -> EmbeddingProviderConfig;

    /// Atomically replace the active config; in-flight `embed` calls that
    /// already captured the old config keep running against it.
    fn reload(&self, new_config: EmbeddingProviderConfig) -> ProviderResult<()>;
}

/// A provider that needs no network, useful for tests and as the default
/// development configuration. Deterministic: the vector for a text is an
/// FNV-1a hash of each whitespace token folded into `dimensions` buckets and
/// L2-normalized, so the same text always embeds to the same vector and
/// near-duplicate text embeds close by token overlap.
pub struct MockEmbeddingProvider {
    state: RwLock<Arc<EmbeddingProviderConfig>>,
}

impl MockEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            state: RwLock::new(Arc::new(EmbeddingProviderConfig {
                provider: "mock".to_string(),
                model_name: "token-hash-v1".to_string(),
                dimensions,
            })),
        }
    }

    fn embed_one(text: &str, role: EmbeddingRole, dimensions: usize) -> Vec<f32> {
        let prefixed = match role {
            EmbeddingRole::Document => format!("passage: {text}"),
            EmbeddingRole::Query => format!("query: {text}"),
        };
        let mut buckets = vec![0.0f32; dimensions];
        for token in prefixed.split_whitespace() {
            let h = fnv1a64(token.as_bytes());
            let bucket = (h as usize) % dimensions;
            let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            buckets[bucket] += sign;
        }
        let norm: f32 = buckets.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for b in &mut buckets {
                *b /= norm;
            }
        }
        buckets
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, texts: &[String], role: EmbeddingRole) -> ProviderResult<Vec<Vec<f32>>> {
        let config = self.state.read().clone();
        Ok(texts
            .iter()
            .map(|t| Self::embed_one(t, role, config.dimensions))
            .collect())
    }

    fn config(&self) -> EmbeddingProviderConfig {
        (**self.state.read()).clone()
    }

    fn reload(&self, new_config: EmbeddingProviderConfig) -> ProviderResult<()> {
        *self.state.write() = Arc::new(new_config);
        Ok(())
    }
}

/// HTTP-backed embedding provider (OpenAI-style `/embeddings` endpoint).
/// Compiled only when the `openai` feature is enabled, per the teacher's
/// convention of feature-gating real network providers while keeping a
/// zero-dependency mock always available.
#[cfg(feature = "openai")]
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    state: RwLock<Arc<HttpEmbeddingState>>,
}

#[cfg(feature = "openai")]
struct HttpEmbeddingState {
    config: EmbeddingProviderConfig,
    api_key: String,
    base_url: String,
}

#[cfg(feature = "openai")]
impl HttpEmbeddingProvider {
    pub fn new(config: EmbeddingProviderConfig, api_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            state: RwLock::new(Arc::new(HttpEmbeddingState {
                config,
                api_key,
                base_url,
            })),
        }
    }
}

#[cfg(feature = "openai")]
#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, texts: &[String], role: EmbeddingRole) -> ProviderResult<Vec<Vec<f32>>> {
        let state = self.state.read().clone();
        let _ = role; // OpenAI-style endpoints take no per-role prefix.

        #[derive(serde::Serialize)]
        struct Req<'a> {
            model: &'a str,
            input: &'a [String],
        }
        #[derive(serde::Deserialize)]
        struct RespItem {
            embedding: Vec<f32>,
        }
        #[derive(serde::Deserialize)]
        struct Resp {
            data: Vec<RespItem>,
        }

        let resp = self
            .client
            .post(format!("{}/embeddings", state.base_url))
            .bearer_auth(&state.api_key)
            .json(&Req {
                model: &state.config.model_name,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ProviderError::AuthFailure("embedding provider rejected credentials".into()));
        }
        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited { retry_after_ms: 1000 });
        }
        if !resp.status().is_success() {
            return Err(ProviderError::Api(format!("status {}", resp.status())));
        }

        let body: Resp = resp
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }

    fn config(&self) -> EmbeddingProviderConfig {
        self.state.read().config.clone()
    }

    fn reload(&self, new_config: EmbeddingProviderConfig) -> ProviderResult<()> {
        let mut state = self.state.write();
        let api_key = state.api_key.clone();
        let base_url = state.base_url.clone();
        *state = Arc::new(HttpEmbeddingState {
            config: new_config,
            api_key,
            base_url,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embed_is_deterministic_for_same_text_and_role() {
        let provider = MockEmbeddingProvider::new(16);
        let a = provider
            .embed(&["jet engine".to_string()], EmbeddingRole::Document)
            .await
            .unwrap();
        let b = provider
            .embed(&["jet engine".to_string()], EmbeddingRole::Document)
            .await
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 16);
    }

    #[tokio::test]
    async fn embed_differs_by_role() {
        let provider = MockEmbeddingProvider::new(16);
        let doc = provider
            .embed(&["jet engine".to_string()], EmbeddingRole::Document)
            .await
            .unwrap();
        let query = provider
            .embed(&["jet engine".to_string()], EmbeddingRole::Query)
            .await
            .unwrap();
        assert_ne!(doc, query);
    }

    #[tokio::test]
    async fn reload_changes_dimension_for_subsequent_calls() {
        let provider = MockEmbeddingProvider::new(8);
        assert_eq!(provider.config().dimensions, 8);
        provider
            .reload(EmbeddingProviderConfig {
                provider: "mock".to_string(),
                model_name: "token-hash-v2".to_string(),
                dimensions: 32,
            })
            .unwrap();
        let v = provider
            .embed(&["hello".to_string()], EmbeddingRole::Document)
            .await
            .unwrap();
        assert_eq!(v[0].len(), 32);
    }
}

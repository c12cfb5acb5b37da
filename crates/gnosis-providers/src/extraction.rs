//! `ExtractionProvider`: structured concept/relationship extraction from a
//! text chunk plus rolling context. `extract` retries once internally with a
//! stricter re-prompt on a malformed response and gives up to the caller
//! after that, per the error-handling design's "retry once, then skip"
//! policy for malformed extraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, ProviderResult};

/// One of the up-to-50 concepts from the current ontology most similar to
/// the chunk, given to the provider as grounding context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConcept {
    pub concept_id: String,
    pub label: String,
    pub search_terms: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionSchema {
    /// Relationship type names the provider should prefer, though it may
    /// still propose a novel one — final resolution happens in VocabRegistry.
    pub known_relationship_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptCandidate {
    pub concept_id_suggestion: Option<String>,
    pub label: String,
    pub confidence: f64,
    pub search_terms: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceCandidate {
    pub concept_id_suggestion: String,
    pub quote: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipCandidate {
    pub from: String,
    pub to: String,
    pub relationship_type: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub concepts: Vec<ConceptCandidate>,
    pub instances: Vec<InstanceCandidate>,
    pub relationships: Vec<RelationshipCandidate>,
}

#[async_trait]
pub trait ExtractionProvider: Send + Sync {
    /// A single, possibly-strict-mode extraction call. `strict` asks the
    /// underlying model for a tighter, more schema-conformant re-prompt;
    /// implementations that can't distinguish modes may ignore it.
    async fn raw_extract(
        &self,
        chunk_text: &str,
        context_concepts: &[ContextConcept],
        schema: &ExtractionSchema,
        strict: bool,
    ) -> ProviderResult<ExtractionResult>;

    /// `extract(chunk_text, context_concepts, schema)`: one retry with a
    /// stricter re-prompt on parse failure, surfacing the error to the
    /// caller only after both attempts fail.
    async fn extract(
        &self,
        chunk_text: &str,
        context_concepts: &[ContextConcept],
        schema: &ExtractionSchema,
    ) -> ProviderResult<ExtractionResult> {
        match self.raw_extract(chunk_text, context_concepts, schema, false).await {
            Ok(result) => Ok(result),
            Err(ProviderError::MalformedResponse(reason)) => {
                tracing::warn!(reason = %reason, "extraction parse failure, retrying with stricter prompt");
                self.raw_extract(chunk_text, context_concepts, schema, true).await
            }
            Err(other) => Err(other),
        }
    }
}

/// Deterministic, configurable provider for tests: returns a fixed script of
/// responses in order, cycling once it runs out.
pub struct ScriptedExtractionProvider {
    responses: Vec<ExtractionResult>,
    next: std::sync::atomic::AtomicUsize,
}

impl ScriptedExtractionProvider {
    pub fn new(responses: Vec<ExtractionResult>) -> Self {
        Self {
            responses,
            next: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn always(result: ExtractionResult) -> Self {
        Self::new(vec![result])
    }
}

#[async_trait]
impl ExtractionProvider for ScriptedExtractionProvider {
    async fn raw_extract(
        &self,
        _chunk_text: &str,
        _context_concepts: &[ContextConcept],
        _schema: &ExtractionSchema,
        _strict: bool,
    ) -> ProviderResult<ExtractionResult> {
        if self.responses.is_empty() {
            return Ok(ExtractionResult::default());
        }
        let idx = self.next.fetch_add(1, std::sync::atomic::Ordering::SeqCst) % self.responses.len();
        Ok(self.responses[idx].clone())
    }
}

/// Anthropic Messages API-backed extraction, using tool-use to force the
/// structured `ExtractionResult` shape instead of parsing free text.
/// Compiled only when the `anthropic` feature is enabled, mirroring
/// `embedding::HttpEmbeddingProvider`'s `openai` feature gate.
#[cfg(feature = "anthropic")]
pub struct HttpExtractionProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[cfg(feature = "anthropic")]
impl HttpExtractionProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: "https://api.anthropic.com/v1".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    fn tool_schema() -> serde_json::Value {
        serde_json::json!({
            "name": "record_extraction",
            "description": "Record concepts, evidence instances, and relationships found in the chunk",
            "input_schema": {
                "type": "object",
                "properties": {
                    "concepts": { "type": "array", "items": { "type": "object" } },
                    "instances": { "type": "array", "items": { "type": "object" } },
                    "relationships": { "type": "array", "items": { "type": "object" } }
                },
                "required": ["concepts", "instances", "relationships"]
            }
        })
    }

    fn prompt(chunk_text: &str, context_concepts: &[ContextConcept], schema: &ExtractionSchema, strict: bool) -> String {
        let context_list = context_concepts
            .iter()
            .map(|c| format!("- {} ({})", c.label, c.concept_id))
            .collect::<Vec<_>>()
            .join("\n");
        let strictness = if strict {
            "Your previous response could not be parsed. Call record_extraction exactly once with valid JSON matching the schema precisely."
        } else {
            "Call record_extraction with every concept, evidence quote, and relationship you find."
        };
        format!(
            "{strictness}\n\nKnown relationship types: {:?}\n\nKnown concepts in this ontology:\n{context_list}\n\nChunk text:\n{chunk_text}",
            schema.known_relationship_types
        )
    }
}

#[cfg(feature = "anthropic")]
#[async_trait]
impl ExtractionProvider for HttpExtractionProvider {
    async fn raw_extract(
        &self,
        chunk_text: &str,
        context_concepts: &[ContextConcept],
        schema: &ExtractionSchema,
        strict: bool,
    ) -> ProviderResult<ExtractionResult> {
        #[derive(serde::Serialize)]
        struct Req<'a> {
            model: &'a str,
            max_tokens: u32,
            messages: Vec<serde_json::Value>,
            tools: Vec<serde_json::Value>,
            tool_choice: serde_json::Value,
        }
        #[derive(serde::Deserialize)]
        struct ContentBlock {
            #[serde(rename = "type")]
            kind: String,
            input: Option<ExtractionResult>,
        }
        #[derive(serde::Deserialize)]
        struct Resp {
            content: Vec<ContentBlock>,
        }

        let req = Req {
            model: &self.model,
            max_tokens: 4096,
            messages: vec![serde_json::json!({
                "role": "user",
                "content": Self::prompt(chunk_text, context_concepts, schema, strict),
            })],
            tools: vec![Self::tool_schema()],
            tool_choice: serde_json::json!({ "type": "tool", "name": "record_extraction" }),
        };

        let resp = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&req)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ProviderError::AuthFailure("extraction provider rejected credentials".into()));
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
        body.content
            .into_iter()
            .find(|b| b.kind == "tool_use")
            .and_then(|b| b.input)
            .ok_or_else(|| ProviderError::MalformedResponse("no tool_use block in response".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysMalformed;

    #[async_trait]
    impl ExtractionProvider for AlwaysMalformed {
        async fn raw_extract(
            &self,
            _chunk_text: &str,
            _context_concepts: &[ContextConcept],
            _schema: &ExtractionSchema,
            strict: bool,
        ) -> ProviderResult<ExtractionResult> {
            Err(ProviderError::MalformedResponse(format!("strict={strict}")))
        }
    }

    #[tokio::test]
    async fn extract_retries_once_then_surfaces_error() {
        let provider = AlwaysMalformed;
        let err = provider
            .extract("text", &[], &ExtractionSchema::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(reason) if reason == "strict=true"));
    }

    #[tokio::test]
    async fn scripted_provider_cycles_through_responses() {
        let provider = ScriptedExtractionProvider::new(vec![
            ExtractionResult {
                concepts: vec![ConceptCandidate {
                    concept_id_suggestion: None,
                    label: "A".into(),
                    confidence: 0.9,
                    search_terms: vec![],
                }],
                ..Default::default()
            },
            ExtractionResult::default(),
        ]);
        let first = provider.extract("t", &[], &ExtractionSchema::default()).await.unwrap();
        let second = provider.extract("t", &[], &ExtractionSchema::default()).await.unwrap();
        assert_eq!(first.concepts.len(), 1);
        assert_eq!(second.concepts.len(), 0);
    }
}

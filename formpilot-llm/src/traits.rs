use async_trait::async_trait;
use formpilot_common::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub text: String,
    pub model: Option<String>,
    pub tokens_used: Option<u32>,
}

/// The "ask anything, get a structured answer" capability the pipeline
/// leans on for visual field detection and mapping disambiguation.
///
/// Implementations make no latency guarantee and may be unavailable; every
/// call site wraps usage in a timeout and treats failure as a strategy
/// fallback, never as a fatal pipeline error.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Generate a response to the given prompt with optional system prompt.
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<InferenceResponse>;

    /// Ask a question about a rendered image (page screenshot).
    async fn analyze_image(&self, image: &[u8], prompt: &str) -> Result<InferenceResponse>;

    /// Check if the inference service is reachable.
    async fn health_check(&self) -> Result<bool>;

    /// Get the text model name being used.
    fn model_name(&self) -> &str;
}

/// Try to extract a ```json ... ``` fenced block; fall back to the first
/// brace-delimited span. Models routinely wrap JSON in fences or prose.
pub fn extract_json_block(text: &str) -> Option<String> {
    let re_fence = regex::Regex::new("(?s)```json\\s*([\\[{].*?[\\]}])\\s*```").ok()?;
    if let Some(caps) = re_fence.captures(text) {
        return Some(caps.get(1)?.as_str().to_string());
    }
    let re_plain = regex::Regex::new("(?s)([\\[{].*[\\]}])").ok()?;
    re_plain
        .captures(text)
        .and_then(|c| c.get(1).map(|m| m.as_str().to_string()))
}

use crate::traits::{InferenceClient, InferenceResponse};
use async_trait::async_trait;
use base64::Engine;
use formpilot_common::{PilotError, Result};
use serde_json::{json, Value as JsonValue};
use std::time::Duration;

const OLLAMA_CONNECTION_ERROR: &str = "No running Ollama server detected. Start it with: `ollama serve` (after installing). Install instructions: https://github.com/ollama/ollama";

/// Ollama client for local model inference.
///
/// Text generation uses the configured text model; [`analyze_image`]
/// switches to the vision model (LLaVA-style, screenshot passed as base64).
///
/// [`analyze_image`]: InferenceClient::analyze_image
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    vision_model: String,
}

impl OllamaClient {
    /// Create a new client and verify server availability.
    pub async fn new(
        base_url: String,
        model: String,
        vision_model: String,
        call_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(call_timeout)
            .build()
            .map_err(|e| {
                PilotError::CapabilityUnavailable(format!("failed to create HTTP client: {}", e))
            })?;

        let ollama_client = Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            vision_model,
        };

        // Verify server is reachable before handing the client out
        ollama_client.probe_server().await?;

        Ok(ollama_client)
    }

    async fn probe_server(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|_| PilotError::CapabilityUnavailable(OLLAMA_CONNECTION_ERROR.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(PilotError::CapabilityUnavailable(
                OLLAMA_CONNECTION_ERROR.to_string(),
            ))
        }
    }

    async fn post_generate(&self, payload: JsonValue, model: &str) -> Result<InferenceResponse> {
        let url = format!("{}/api/generate", self.base_url);
        let resp = self.client.post(&url).json(&payload).send().await.map_err(|e| {
            if e.is_timeout() {
                PilotError::Timeout
            } else {
                PilotError::CapabilityUnavailable(format!("generate request failed: {}", e))
            }
        })?;

        if !resp.status().is_success() {
            return Err(PilotError::CapabilityUnavailable(format!(
                "generate failed: HTTP {}",
                resp.status()
            )));
        }

        let val: JsonValue = resp.json().await.map_err(|e| {
            PilotError::CapabilityUnavailable(format!("failed to parse response: {}", e))
        })?;

        let text = val
            .get("response")
            .and_then(|r| r.as_str())
            .unwrap_or("")
            .to_string();

        let tokens_used = val
            .get("eval_count")
            .and_then(|c| c.as_u64())
            .map(|c| c as u32);

        Ok(InferenceResponse {
            text,
            model: Some(model.to_string()),
            tokens_used,
        })
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<InferenceResponse> {
        let mut options = serde_json::Map::new();
        if let Some(temp) = temperature {
            options.insert("temperature".to_string(), json!(temp));
        }
        if let Some(max_tok) = max_tokens {
            options.insert("num_predict".to_string(), json!(max_tok));
        }

        // Combine system prompt with user prompt for Ollama
        let full_prompt = if let Some(sys_prompt) = system_prompt {
            format!("{}\n\nUser: {}\n\nAssistant:", sys_prompt, prompt)
        } else {
            prompt.to_string()
        };

        let payload = json!({
            "model": self.model,
            "prompt": full_prompt,
            "stream": false,
            "options": options
        });

        self.post_generate(payload, &self.model).await
    }

    async fn analyze_image(&self, image: &[u8], prompt: &str) -> Result<InferenceResponse> {
        let image_b64 = base64::engine::general_purpose::STANDARD.encode(image);

        let payload = json!({
            "model": self.vision_model,
            "prompt": prompt,
            "images": [image_b64],
            "stream": false,
            "options": {
                "temperature": 0.1,
                "num_predict": 2048,
            }
        });

        self.post_generate(payload, &self.vision_model).await
    }

    async fn health_check(&self) -> Result<bool> {
        self.probe_server().await.map(|_| true).or(Ok(false))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

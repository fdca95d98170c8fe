use crate::traits::{InferenceClient, InferenceResponse};
use async_trait::async_trait;
use formpilot_common::{PilotError, Result};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Deterministic capability implementation for tests.
///
/// Replies are popped in FIFO order from per-modality queues; an exhausted
/// queue reports the capability as unavailable, which is exactly what the
/// pipeline has to tolerate from the real thing. Every prompt is recorded
/// so tests can assert on what the pipeline asked.
#[derive(Default)]
pub struct ScriptedClient {
    text_replies: Mutex<VecDeque<String>>,
    vision_replies: Mutex<VecDeque<String>>,
    seen_prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next `generate` call.
    pub fn push_text_reply(&self, reply: impl Into<String>) {
        self.text_replies.lock().unwrap().push_back(reply.into());
    }

    /// Queue a reply for the next `analyze_image` call.
    pub fn push_vision_reply(&self, reply: impl Into<String>) {
        self.vision_replies.lock().unwrap().push_back(reply.into());
    }

    /// Prompts observed so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.seen_prompts.lock().unwrap().clone()
    }

    fn pop(&self, queue: &Mutex<VecDeque<String>>, prompt: &str) -> Result<InferenceResponse> {
        self.seen_prompts.lock().unwrap().push(prompt.to_string());
        match queue.lock().unwrap().pop_front() {
            Some(text) => Ok(InferenceResponse {
                text,
                model: Some("scripted".into()),
                tokens_used: None,
            }),
            None => Err(PilotError::CapabilityUnavailable(
                "scripted reply queue exhausted".into(),
            )),
        }
    }
}

#[async_trait]
impl InferenceClient for ScriptedClient {
    async fn generate(
        &self,
        prompt: &str,
        _system_prompt: Option<&str>,
        _max_tokens: Option<u32>,
        _temperature: Option<f32>,
    ) -> Result<InferenceResponse> {
        self.pop(&self.text_replies, prompt)
    }

    async fn analyze_image(&self, _image: &[u8], prompt: &str) -> Result<InferenceResponse> {
        self.pop(&self.vision_replies, prompt)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replies_come_back_in_order() {
        let client = ScriptedClient::new();
        client.push_text_reply("first");
        client.push_text_reply("second");

        let a = client.generate("p1", None, None, None).await.unwrap();
        let b = client.generate("p2", None, None, None).await.unwrap();
        assert_eq!(a.text, "first");
        assert_eq!(b.text, "second");
        assert_eq!(client.prompts(), vec!["p1".to_string(), "p2".to_string()]);
    }

    #[tokio::test]
    async fn exhausted_queue_is_unavailability_not_panic() {
        let client = ScriptedClient::new();
        let err = client.generate("p", None, None, None).await.unwrap_err();
        assert!(matches!(err, PilotError::CapabilityUnavailable(_)));
    }
}

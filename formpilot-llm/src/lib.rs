//! Provider-agnostic inference integration for Formpilot.
//!
//! This crate exposes the [`traits::InferenceClient`] capability interface
//! the detector and mapper depend on, a concrete Ollama-backed client, and
//! a deterministic scripted implementation for tests. A convenience
//! function initializes a client from [`formpilot_config::CapabilityConfig`].
//!
//! # Examples
//! ```no_run
//! use formpilot_config::CapabilityConfig;
//! use formpilot_llm::ensure_capability_ready;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let cfg = CapabilityConfig::None;
//! // `None` yields no client: the pipeline degrades to DOM-only detection.
//! assert!(ensure_capability_ready(&cfg).await.is_none());
//! # }
//! ```
pub mod ollama;
pub mod scripted;
pub mod traits;

use formpilot_config::CapabilityConfig;
use ollama::OllamaClient;
use std::sync::Arc;
use std::time::Duration;
use traits::InferenceClient;

/// Default model recommendations for form analysis tasks
pub const DEFAULT_TEXT_MODEL: &str = "mistral:7b";
pub const DEFAULT_VISION_MODEL: &str = "llava:13b";

/// Initialize the configured capability, if any.
///
/// Returns `None` both when no provider is configured and when the
/// configured provider is unreachable: an absent capability is a degraded
/// mode the pipeline supports, not a startup failure.
pub async fn ensure_capability_ready(
    config: &CapabilityConfig,
) -> Option<Arc<dyn InferenceClient + Send + Sync + 'static>> {
    match config {
        CapabilityConfig::Ollama {
            endpoint,
            model,
            vision_model,
            call_timeout_secs,
        } => {
            match OllamaClient::new(
                endpoint.clone(),
                model.clone(),
                vision_model.clone(),
                Duration::from_secs(*call_timeout_secs),
            )
            .await
            {
                Ok(client) => Some(Arc::new(client)),
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        endpoint = %endpoint,
                        "capability unreachable; continuing DOM-only"
                    );
                    None
                }
            }
        }
        CapabilityConfig::None => None,
    }
}

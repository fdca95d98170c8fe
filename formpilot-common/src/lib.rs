//! Common types and utilities shared across Formpilot crates.
//!
//! This crate defines the shared error taxonomy, observability helpers, and
//! the small enums every other crate needs to talk about a run. It is
//! intentionally lightweight and dependency-minimal so that all crates can
//! depend on it without introducing heavy transitive costs.
//!
//! # Overview
//!
//! - [`PilotError`] and [`Result`]: shared error handling
//! - [`observability`]: centralised tracing/logging initialisation
//! - [`StealthLevel`], [`DocumentKind`], [`CaptchaKind`]: enums shared
//!   between the driver, the pipeline, and configuration
use serde::{Deserialize, Serialize};

pub mod observability;

/// Browser automation stealth level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StealthLevel {
    Lightweight,
    Balanced,
    Maximum,
}

impl Default for StealthLevel {
    fn default() -> Self {
        StealthLevel::Balanced
    }
}

/// Logical document types a candidate can attach to an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Resume,
    CoverLetter,
    Certificate,
    Photo,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Resume => "resume",
            DocumentKind::CoverLetter => "cover_letter",
            DocumentKind::Certificate => "certificate",
            DocumentKind::Photo => "photo",
        }
    }
}

/// Known CAPTCHA families the driver can recognise in the DOM.
///
/// Recognition is a signal, not an error: the state machine decides whether
/// to route to an external solver or abort the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptchaKind {
    Recaptcha,
    Hcaptcha,
    Turnstile,
    Arkose,
}

/// Error types used across the Formpilot system.
///
/// The variants mirror the failure modes the pipeline must distinguish:
/// a page with no detectable fields is not the same as a dead WebDriver,
/// and a stale locator is locally retryable where a navigation error is not.
#[derive(thiserror::Error, Debug)]
pub enum PilotError {
    /// No usable form fields were found after exhausting every strategy.
    #[error("form detection failed: {0}")]
    Detection(String),

    /// The browser driver reported a navigation or transport error.
    #[error("driver failure: {0}")]
    Driver(String),

    /// A locator resolved at detection time no longer points at an
    /// interactable element. Retried locally with bounded re-detection.
    #[error("element not interactable: {0}")]
    NotInteractable(String),

    /// The external visual/LLM capability failed, timed out, or is not
    /// configured. Triggers strategy fallback, never aborts a run by itself.
    #[error("external capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// The artifact store rejected or lost an operation.
    #[error("store error: {0}")]
    Store(String),

    /// Configuration was incomplete or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation exceeded the configured timeout.
    #[error("timeout occurred")]
    Timeout,
}

impl PilotError {
    /// Whether the caller may retry the same operation against a freshly
    /// re-detected locator.
    pub fn is_locally_retryable(&self) -> bool {
        matches!(self, PilotError::NotInteractable(_))
    }
}

/// Convenient alias for results that use [`PilotError`].
pub type Result<T> = std::result::Result<T, PilotError>;

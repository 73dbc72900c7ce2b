//! Gemini integration
//!
//! A `generateContent` client that talks to either Google AI Studio (API key)
//! or Vertex AI (gcloud credentials), a tool-calling agent over the cloud
//! tools, an interactive chat loop and connectivity checks.

pub mod agent;
pub mod chat;
pub mod checks;
pub mod client;

pub use agent::{Agent, AgentTool};
pub use client::{Backend, GeminiClient, GeminiSettings};

use gcp_audit_tools::ToolError;

/// Error types for Gemini calls
#[derive(thiserror::Error, Debug)]
pub enum GeminiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gemini API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Gemini returned no candidates")]
    EmptyResponse,

    #[error("failed to obtain Vertex AI access token: {0}")]
    Token(#[source] ToolError),

    #[error("agent gave no answer after {0} steps")]
    StepLimit(usize),
}

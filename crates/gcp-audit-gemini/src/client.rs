//! `generateContent` client
//!
//! Both backends accept the same request body; they differ only in URL and
//! authentication. AI Studio takes the API key as a query parameter, Vertex AI
//! a bearer token from `gcloud auth print-access-token`.

use gcp_audit_core::json::truncate_chars;
use gcp_audit_tools::GcpTools;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::GeminiError;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_AI_STUDIO_URL: &str = "https://generativelanguage.googleapis.com";

/// Value shipped in sample `.env` files; treated as no key at all
pub const PLACEHOLDER_API_KEY: &str = "your_api_key_here";

/// Model and endpoint settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeminiSettings {
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub ai_studio_url: String,
    /// Defaults to `https://{region}-aiplatform.googleapis.com`
    pub vertex_url: Option<String>,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            ai_studio_url: DEFAULT_AI_STUDIO_URL.to_string(),
            vertex_url: None,
        }
    }
}

impl GeminiSettings {
    /// The API key, unless it is missing, blank or the placeholder
    #[must_use]
    pub fn usable_api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty() && *key != PLACEHOLDER_API_KEY)
    }
}

/// Where requests go and how they authenticate
#[derive(Clone, PartialEq, Eq)]
pub enum Backend {
    AiStudio {
        base_url: String,
        api_key: String,
    },
    Vertex {
        base_url: String,
        project: String,
        location: String,
        access_token: String,
    },
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AiStudio { base_url, .. } => f
                .debug_struct("AiStudio")
                .field("base_url", base_url)
                .finish_non_exhaustive(),
            Self::Vertex {
                base_url,
                project,
                location,
                ..
            } => f
                .debug_struct("Vertex")
                .field("base_url", base_url)
                .field("project", project)
                .field("location", location)
                .finish_non_exhaustive(),
        }
    }
}

impl Backend {
    /// Vertex AI with a fresh token from the active gcloud account
    ///
    /// # Errors
    ///
    /// Returns `GeminiError::Token` if gcloud cannot print an access token
    pub fn vertex(settings: &GeminiSettings, tools: &GcpTools) -> Result<Self, GeminiError> {
        let access_token = tools.access_token().map_err(GeminiError::Token)?;
        let base_url = settings
            .vertex_url
            .clone()
            .unwrap_or_else(|| format!("https://{}-aiplatform.googleapis.com", tools.region()));

        Ok(Self::Vertex {
            base_url,
            project: tools.project().to_string(),
            location: tools.region().to_string(),
            access_token,
        })
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::AiStudio { .. } => "Google AI Studio",
            Self::Vertex { .. } => "Vertex AI",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    #[must_use]
    pub fn user(text: &str) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part::text(text)],
        }
    }

    /// Concatenated text parts
    #[must_use]
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }

    #[must_use]
    pub fn function_calls(&self) -> Vec<FunctionCall> {
        self.parts
            .iter()
            .filter_map(|p| p.function_call.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
}

impl Part {
    #[must_use]
    pub fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn function_response(name: &str, response: Value) -> Self {
        Self {
            function_response: Some(FunctionResponse {
                name: name.to_string(),
                response,
            }),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDeclarations {
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDeclarations>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

impl GenerateResponse {
    /// Content of the first candidate
    ///
    /// # Errors
    ///
    /// Returns `GeminiError::EmptyResponse` when there is none, e.g. after a
    /// safety block
    pub fn into_content(self) -> Result<Content, GeminiError> {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .ok_or(GeminiError::EmptyResponse)
    }
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    backend: Backend,
    model: String,
}

impl GeminiClient {
    #[must_use]
    pub fn new(backend: Backend, model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            backend,
            model: model.to_string(),
        }
    }

    /// Prefer AI Studio when a usable API key is configured, else Vertex AI
    ///
    /// # Errors
    ///
    /// Returns `GeminiError::Token` when falling back to Vertex AI and gcloud
    /// has no credentials
    pub fn from_settings(settings: &GeminiSettings, tools: &GcpTools) -> Result<Self, GeminiError> {
        if let Some(api_key) = settings.usable_api_key() {
            info!("using Google AI Studio Gemini");
            let backend = Backend::AiStudio {
                base_url: settings.ai_studio_url.clone(),
                api_key: api_key.to_string(),
            };
            return Ok(Self::new(backend, &settings.model));
        }

        info!("no usable GOOGLE_API_KEY, using Vertex AI Gemini via gcloud credentials");
        Ok(Self::new(Backend::vertex(settings, tools)?, &settings.model))
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub const fn backend(&self) -> &Backend {
        &self.backend
    }

    fn endpoint(&self) -> String {
        match &self.backend {
            Backend::AiStudio { base_url, .. } => format!(
                "{}/v1beta/models/{}:generateContent",
                base_url.trim_end_matches('/'),
                self.model
            ),
            Backend::Vertex {
                base_url,
                project,
                location,
                ..
            } => format!(
                "{}/v1/projects/{project}/locations/{location}/publishers/google/models/{}:generateContent",
                base_url.trim_end_matches('/'),
                self.model
            ),
        }
    }

    /// Send one `generateContent` request
    ///
    /// # Errors
    ///
    /// Returns `GeminiError::Http` on transport failure and
    /// `GeminiError::Api` on a non-success status
    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, GeminiError> {
        let endpoint = self.endpoint();
        debug!(%endpoint, contents = request.contents.len(), "calling Gemini");

        let builder = self.http.post(&endpoint).json(request);
        let builder = match &self.backend {
            Backend::AiStudio { api_key, .. } => builder.query(&[("key", api_key)]),
            Backend::Vertex { access_token, .. } => builder.bearer_auth(access_token),
        };

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Gemini request failed");
            return Err(GeminiError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        Ok(response.json().await?)
    }

    /// Single-turn prompt, returning the model's text
    ///
    /// # Errors
    ///
    /// Returns `GeminiError` if the request fails or yields no candidate
    pub async fn generate_text(&self, prompt: &str) -> Result<String, GeminiError> {
        let request = GenerateRequest {
            contents: vec![Content::user(prompt)],
            ..GenerateRequest::default()
        };
        Ok(self.generate(&request).await?.into_content()?.text())
    }
}

/// `error.message` from a Google API error body, or the body itself
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| truncate_chars(body.trim(), 300))
}

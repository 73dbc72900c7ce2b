//! Connectivity checks
//!
//! Each check writes a human-readable transcript to `out` and reports success
//! as a bool so the binary can map it to an exit code.

use std::io::{self, Write};

use gcp_audit_core::json::truncate_chars;
use gcp_audit_tools::GcpTools;

use crate::{Agent, Backend, GeminiClient, GeminiSettings};

const RULE_WIDTH: usize = 60;
const PREVIEW_CHARS: usize = 100;
const AGENT_PREVIEW_CHARS: usize = 200;

pub const API_KEY_URL: &str = "https://aistudio.google.com/app/apikey";
pub const AGENT_SMOKE_PROMPT: &str = "What is 2 + 2? Just give me the number.";

fn banner<W: Write>(out: &mut W, title: &str) -> io::Result<()> {
    let rule = "=".repeat(RULE_WIDTH);
    writeln!(out, "{rule}\n{title}\n{rule}")
}

/// Google AI Studio with the configured API key
///
/// # Errors
///
/// Returns an I/O error only if writing to `out` fails
pub async fn check_ai_studio<W: Write>(settings: &GeminiSettings, out: &mut W) -> io::Result<bool> {
    banner(out, "GEMINI SETUP TEST")?;
    writeln!(out, "\n✓ Model configured: {}", settings.model)?;

    let Some(api_key) = settings.usable_api_key() else {
        writeln!(out, "✓ API key present: false")?;
        writeln!(out, "\n❌ ERROR: GOOGLE_API_KEY not set")?;
        writeln!(out, "\nTo fix this:")?;
        writeln!(out, "1. Visit {API_KEY_URL}")?;
        writeln!(out, "2. Create a free API key")?;
        writeln!(out, "3. Export it: GOOGLE_API_KEY=your_key")?;
        return Ok(false);
    };
    writeln!(out, "✓ API key present: true")?;

    writeln!(out, "\n🔄 Testing connection to {}...", settings.model)?;
    let client = GeminiClient::new(
        Backend::AiStudio {
            base_url: settings.ai_studio_url.clone(),
            api_key: api_key.to_string(),
        },
        &settings.model,
    );

    match client
        .generate_text("Say 'Hello from Gemini!' and nothing else.")
        .await
    {
        Ok(text) => {
            writeln!(out, "✓ Response received: {}", truncate_chars(&text, PREVIEW_CHARS))?;
            banner(out, "SUCCESS! Gemini is working correctly.")?;
            Ok(true)
        }
        Err(e) => {
            writeln!(out, "\n❌ ERROR: {e}")?;
            writeln!(out, "\nPossible issues:")?;
            writeln!(out, "- Invalid or expired API key")?;
            writeln!(out, "- Network connectivity")?;
            writeln!(out, "- Model name incorrect")?;
            Ok(false)
        }
    }
}

/// Vertex AI through the active gcloud credentials
///
/// # Errors
///
/// Returns an I/O error only if writing to `out` fails
pub async fn check_vertex<W: Write>(
    settings: &GeminiSettings,
    tools: &GcpTools,
    out: &mut W,
) -> io::Result<bool> {
    writeln!(out)?;
    banner(out, "TESTING VERTEX AI")?;
    writeln!(out, "\n✓ Project: {}", tools.project())?;
    writeln!(out, "✓ Region: {}", tools.region())?;
    writeln!(out, "\n🔄 Testing Vertex AI Gemini...")?;

    let reply = match Backend::vertex(settings, tools) {
        Ok(backend) => {
            GeminiClient::new(backend, &settings.model)
                .generate_text("Say 'Hello from Vertex AI Gemini!' and nothing else.")
                .await
        }
        Err(e) => Err(e),
    };

    match reply {
        Ok(text) => {
            writeln!(out, "✓ Response: {}", truncate_chars(&text, PREVIEW_CHARS))?;
            banner(out, "SUCCESS! Vertex AI Gemini is working!")?;
            Ok(true)
        }
        Err(e) => {
            writeln!(out, "\n❌ Vertex AI test failed: {e}")?;
            Ok(false)
        }
    }
}

/// End-to-end agent smoke test
///
/// # Errors
///
/// Returns an I/O error only if writing to `out` fails
pub async fn check_agent<W: Write>(
    settings: &GeminiSettings,
    tools: GcpTools,
    out: &mut W,
) -> io::Result<bool> {
    banner(out, "TESTING FULL AGENT WITH GEMINI")?;

    let client = match GeminiClient::from_settings(settings, &tools) {
        Ok(client) => client,
        Err(e) => {
            writeln!(out, "\n❌ ERROR: {e}")?;
            return Ok(false);
        }
    };
    let agent = Agent::new(client, tools);

    writeln!(out, "\n✓ Agent initialized successfully")?;
    writeln!(out, "  - Tools discovered: {}", agent.available_tools().len())?;
    writeln!(out, "  - Model: {}", agent.client().model())?;
    writeln!(out, "  - Backend: {}", agent.client().backend().label())?;

    writeln!(out, "\n🔄 Testing agent with a simple task...")?;
    writeln!(out, "   Task: '{AGENT_SMOKE_PROMPT}'")?;

    match agent.think(AGENT_SMOKE_PROMPT).await {
        Ok(answer) => {
            writeln!(out, "\n✓ Agent response: {}", truncate_chars(&answer, AGENT_PREVIEW_CHARS))?;
            writeln!(out)?;
            banner(out, "SUCCESS! Agent is fully operational with Gemini")?;
            Ok(true)
        }
        Err(e) => {
            writeln!(out, "\n❌ ERROR: {e}")?;
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcp_audit_tools::Program;
    use gcp_audit_tools::testing::ScriptedRunner;
    use serde_json::json;
    use wiremock::matchers::{header, method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn reply(text: &str) -> serde_json::Value {
        json!({"candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]})
    }

    fn settings(server: &MockServer, api_key: Option<&str>) -> GeminiSettings {
        GeminiSettings {
            api_key: api_key.map(str::to_string),
            ai_studio_url: server.uri(),
            vertex_url: Some(server.uri()),
            ..GeminiSettings::default()
        }
    }

    fn tools(runner: ScriptedRunner) -> GcpTools {
        GcpTools::new(Box::new(runner), "demo-project", "us-central1")
    }

    #[tokio::test]
    async fn test_missing_key_prints_instructions() {
        let server = MockServer::start().await;
        let mut out = Vec::new();

        let ok = check_ai_studio(&settings(&server, Some("your_api_key_here")), &mut out)
            .await
            .unwrap();

        assert!(!ok);
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("GOOGLE_API_KEY not set"));
        assert!(out.contains(API_KEY_URL));
    }

    #[tokio::test]
    async fn test_ai_studio_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("key", "AIza-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("Hello from Gemini!")))
            .mount(&server)
            .await;
        let mut out = Vec::new();

        assert!(check_ai_studio(&settings(&server, Some("AIza-test")), &mut out).await.unwrap());
        assert!(String::from_utf8(out).unwrap().contains("Response received: Hello from Gemini!"));
    }

    #[tokio::test]
    async fn test_ai_studio_rejected_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"message": "API key not valid."}
            })))
            .mount(&server)
            .await;
        let mut out = Vec::new();

        assert!(!check_ai_studio(&settings(&server, Some("bad")), &mut out).await.unwrap());
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("API key not valid."));
        assert!(out.contains("Possible issues"));
    }

    #[tokio::test]
    async fn test_vertex_uses_gcloud_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer ya29.test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("Hello from Vertex AI Gemini!")))
            .mount(&server)
            .await;
        let runner = ScriptedRunner::new().respond(Program::Gcloud, "print-access-token", "ya29.test\n");
        let mut out = Vec::new();

        let ok = check_vertex(&settings(&server, None), &tools(runner), &mut out)
            .await
            .unwrap();

        assert!(ok);
        assert!(String::from_utf8(out).unwrap().contains("✓ Project: demo-project"));
    }

    #[tokio::test]
    async fn test_vertex_without_credentials() {
        let server = MockServer::start().await;
        let runner = ScriptedRunner::new().fail(
            Program::Gcloud,
            "print-access-token",
            1,
            "You do not currently have an active account selected.",
        );
        let mut out = Vec::new();

        assert!(!check_vertex(&settings(&server, None), &tools(runner), &mut out).await.unwrap());
        assert!(String::from_utf8(out).unwrap().contains("active account"));
    }

    #[tokio::test]
    async fn test_agent_smoke() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply("4")))
            .mount(&server)
            .await;
        let mut out = Vec::new();

        let ok = check_agent(&settings(&server, Some("AIza-test")), tools(ScriptedRunner::new()), &mut out)
            .await
            .unwrap();

        assert!(ok);
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Tools discovered: 12"));
        assert!(out.contains("Agent response: 4"));
    }
}

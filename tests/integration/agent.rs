//! Integration tests for the agent driving real tools against scripted CLIs

use gcp_audit_gemini::{Agent, Backend, GeminiClient};
use gcp_audit_tools::testing::ScriptedRunner;
use gcp_audit_tools::{GcpTools, Program};
use serde_json::{Value, json};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DESCRIBE: &str = r#"{
  "status": {"url": "SERVICE_URL", "conditions": [{"type": "Ready", "status": "True"}]},
  "spec": {"template": {"spec": {"containers": [{
    "image": "gcr.io/demo-project/api:1.4.2",
    "resources": {"limits": {"memory": "512Mi", "cpu": "1"}},
    "env": [
      {"name": "LOG_LEVEL", "value": "info"},
      {"name": "DB_PASSWORD", "valueFrom": {"secretKeyRef": {"name": "db", "key": "password"}}}
    ]
  }]}}}
}"#;

fn call(name: &str, args: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{"content": {"role": "model", "parts": [{"functionCall": {"name": name, "args": args}}]}}]
    }))
}

fn answer(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
    }))
}

fn function_responses(body: &[u8]) -> Vec<Value> {
    let request: Value = serde_json::from_slice(body).unwrap();
    request["contents"]
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|content| content["parts"].as_array().cloned().unwrap_or_default())
        .filter_map(|part| part.get("functionResponse").cloned())
        .collect()
}

#[tokio::test]
async fn test_agent_chains_tools() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status":"ok"}"#))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(call("get_service_details", json!({"service_name": "api"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(call("check_service_health", json!({"service_url": server.uri()})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(answer("api runs 512Mi / 1 CPU and its health check passes."))
        .mount(&server)
        .await;

    let runner = Arc::new(ScriptedRunner::new().respond(
        Program::Gcloud,
        "run services describe api",
        &DESCRIBE.replace("SERVICE_URL", &server.uri()),
    ));
    let tools = GcpTools::new(Box::new(Arc::clone(&runner)), "demo-project", "europe-west1");
    let client = GeminiClient::new(
        Backend::AiStudio {
            base_url: server.uri(),
            api_key: "AIza-test".to_string(),
        },
        "gemini-2.0-flash-exp",
    );

    let reply = Agent::new(client, tools)
        .think("Is the api service healthy and how big is it?")
        .await
        .unwrap();
    assert!(reply.contains("512Mi"));

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].1.contains(&"--region=europe-west1".to_string()));

    let posts: Vec<_> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST")
        .collect();
    assert_eq!(posts.len(), 3);

    let responses = function_responses(&posts[2].body);
    assert_eq!(responses.len(), 2);

    let details = &responses[0]["response"]["content"];
    assert_eq!(details["memory"], "512Mi");
    assert_eq!(details["env_vars"]["DB_PASSWORD"], "SECRET");
    assert_eq!(details["status"], "True");

    let health = &responses[1]["response"]["content"];
    assert_eq!(health["healthy"], true);
    assert_eq!(health["status_code"], 200);
}

#[tokio::test]
async fn test_agent_reports_bad_arguments_to_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(call("get_table_schema", json!({"dataset": "gateway_metrics"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(answer("I need a table name."))
        .mount(&server)
        .await;

    let runner = Arc::new(ScriptedRunner::new());
    let tools = GcpTools::new(Box::new(Arc::clone(&runner)), "demo-project", "us-central1");
    let client = GeminiClient::new(
        Backend::AiStudio {
            base_url: server.uri(),
            api_key: "AIza-test".to_string(),
        },
        "gemini-2.0-flash-exp",
    );

    let reply = Agent::new(client, tools).think("Describe a table").await.unwrap();
    assert_eq!(reply, "I need a table name.");
    assert!(runner.calls().is_empty());

    let requests = server.received_requests().await.unwrap();
    let responses = function_responses(&requests[1].body);
    let error = responses[0]["response"]["error"].as_str().unwrap();
    assert!(error.contains("table"));
}

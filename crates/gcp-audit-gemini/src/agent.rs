//! Tool-calling agent
//!
//! The cloud tools are offered to Gemini as function declarations. Each turn
//! either answers in text or asks for function calls; calls run against the
//! toolbox and their results go back to the model until it answers.

use gcp_audit_tools::{GcpTools, ToolError};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::GeminiError;
use crate::client::{
    Content, FunctionDeclaration, GeminiClient, GenerateRequest, Part, ToolDeclarations,
};

/// Model round trips allowed per question
pub const MAX_STEPS: usize = 8;

/// Functions the agent can call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentTool {
    ListCloudRunServices,
    GetServiceDetails,
    CheckServiceHealth,
    AnalyzeServiceCosts,
    FindDormantServices,
    QueryBigquery,
    ListDatasets,
    GetTableSchema,
    AnalyzeCachePerformance,
    GetTopModelsUsage,
    FindExpensiveQueries,
    AnalyzeWorkflowEfficiency,
}

impl AgentTool {
    pub const ALL: [Self; 12] = [
        Self::ListCloudRunServices,
        Self::GetServiceDetails,
        Self::CheckServiceHealth,
        Self::AnalyzeServiceCosts,
        Self::FindDormantServices,
        Self::QueryBigquery,
        Self::ListDatasets,
        Self::GetTableSchema,
        Self::AnalyzeCachePerformance,
        Self::GetTopModelsUsage,
        Self::FindExpensiveQueries,
        Self::AnalyzeWorkflowEfficiency,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ListCloudRunServices => "list_cloud_run_services",
            Self::GetServiceDetails => "get_service_details",
            Self::CheckServiceHealth => "check_service_health",
            Self::AnalyzeServiceCosts => "analyze_service_costs",
            Self::FindDormantServices => "find_dormant_services",
            Self::QueryBigquery => "query_bigquery",
            Self::ListDatasets => "list_datasets",
            Self::GetTableSchema => "get_table_schema",
            Self::AnalyzeCachePerformance => "analyze_cache_performance",
            Self::GetTopModelsUsage => "get_top_models_usage",
            Self::FindExpensiveQueries => "find_expensive_queries",
            Self::AnalyzeWorkflowEfficiency => "analyze_workflow_efficiency",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::ListCloudRunServices => "Lists Cloud Run services in a region with name, URL and readiness.",
            Self::GetServiceDetails => "Gets memory, CPU, image, environment and status of one Cloud Run service.",
            Self::CheckServiceHealth => "Calls the /health endpoint of a service URL and reports the result.",
            Self::AnalyzeServiceCosts => "Total cost, request count and average latency per service over recent days.",
            Self::FindDormantServices => "Services seen in the request log but without traffic for the given number of days.",
            Self::QueryBigquery => "Executes a standard SQL BigQuery query and returns the rows.",
            Self::ListDatasets => "Lists all BigQuery datasets in the project.",
            Self::GetTableSchema => "Gets the schema, row count and size of a BigQuery table.",
            Self::AnalyzeCachePerformance => "Cache hit rate, savings and hit/miss latency over recent days.",
            Self::GetTopModelsUsage => "Most used AI models with tokens, cost and latency.",
            Self::FindExpensiveQueries => "Individual AI model requests above a cost threshold.",
            Self::AnalyzeWorkflowEfficiency => "Workflow success rate, duration and cost over the last 30 days.",
        }
    }

    /// Parameter schema in the Gemini `Schema` dialect
    #[must_use]
    pub fn parameters(self) -> Value {
        let (properties, required): (Value, &[&str]) = match self {
            Self::ListCloudRunServices => (
                json!({
                    "region": {"type": "STRING", "description": "GCP region, e.g. us-central1"},
                    "limit": {"type": "INTEGER", "description": "Maximum number of services (default 50)"}
                }),
                &[],
            ),
            Self::GetServiceDetails => (
                json!({
                    "service_name": {"type": "STRING", "description": "Cloud Run service name"},
                    "region": {"type": "STRING", "description": "GCP region"}
                }),
                &["service_name"],
            ),
            Self::CheckServiceHealth => (
                json!({"service_url": {"type": "STRING", "description": "Full https URL of the service"}}),
                &["service_url"],
            ),
            Self::AnalyzeServiceCosts | Self::AnalyzeCachePerformance => (
                json!({"days": {"type": "INTEGER", "description": "Days to analyze (default 7)"}}),
                &[],
            ),
            Self::FindDormantServices => (
                json!({"min_days_inactive": {"type": "INTEGER", "description": "Minimum days without traffic (default 7)"}}),
                &[],
            ),
            Self::QueryBigquery => (
                json!({"query": {"type": "STRING", "description": "Standard SQL query"}}),
                &["query"],
            ),
            Self::ListDatasets | Self::AnalyzeWorkflowEfficiency => (json!({}), &[]),
            Self::GetTableSchema => (
                json!({
                    "dataset": {"type": "STRING", "description": "Dataset name"},
                    "table": {"type": "STRING", "description": "Table name"}
                }),
                &["dataset", "table"],
            ),
            Self::GetTopModelsUsage => (
                json!({
                    "days": {"type": "INTEGER", "description": "Days to analyze (default 30)"},
                    "limit": {"type": "INTEGER", "description": "Number of models (default 10)"}
                }),
                &[],
            ),
            Self::FindExpensiveQueries => (
                json!({
                    "days": {"type": "INTEGER", "description": "Days to analyze (default 7)"},
                    "min_cost": {"type": "NUMBER", "description": "Minimum cost in USD (default 1.0)"}
                }),
                &[],
            ),
        };

        json!({"type": "OBJECT", "properties": properties, "required": required})
    }

    #[must_use]
    pub fn declaration(self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }

    /// Run the tool with model-supplied arguments
    ///
    /// # Errors
    ///
    /// Returns `ToolError::InvalidArgs` for missing or mistyped arguments and
    /// whatever the underlying tool returns otherwise
    pub async fn invoke(self, tools: &GcpTools, args: &Value) -> Result<Value, ToolError> {
        let value = match self {
            Self::ListCloudRunServices => {
                let region = opt_str(args, "region")?.unwrap_or_else(|| tools.region().to_string());
                let limit = opt_usize(args, "limit", 50)?;
                to_value(tools.list_services(&region, limit)?)
            }
            Self::GetServiceDetails => {
                let name = req_str(args, "service_name")?;
                let region = opt_str(args, "region")?.unwrap_or_else(|| tools.region().to_string());
                to_value(tools.service_details(&name, &region)?)
            }
            Self::CheckServiceHealth => {
                let url = req_str(args, "service_url")?;
                to_value(tools.check_service_health(&url).await)
            }
            Self::AnalyzeServiceCosts => to_value(tools.service_costs(opt_u32(args, "days", 7)?)?),
            Self::FindDormantServices => {
                to_value(tools.dormant_services(opt_u32(args, "min_days_inactive", 7)?)?)
            }
            Self::QueryBigquery => to_value(tools.query(&req_str(args, "query")?)?),
            Self::ListDatasets => to_value(tools.list_datasets()?),
            Self::GetTableSchema => {
                let dataset = req_str(args, "dataset")?;
                let table = req_str(args, "table")?;
                to_value(tools.table_schema(&dataset, &table)?)
            }
            Self::AnalyzeCachePerformance => {
                to_value(tools.cache_performance(opt_u32(args, "days", 7)?)?)
            }
            Self::GetTopModelsUsage => to_value(tools.top_models_usage(
                opt_u32(args, "days", 30)?,
                opt_usize(args, "limit", 10)?,
            )?),
            Self::FindExpensiveQueries => to_value(tools.expensive_requests(
                opt_u32(args, "days", 7)?,
                opt_f64(args, "min_cost", 1.0)?,
            )?),
            Self::AnalyzeWorkflowEfficiency => to_value(tools.workflow_efficiency()?),
        };
        Ok(value)
    }
}

fn to_value<T: serde::Serialize>(value: T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn req_str(args: &Value, key: &str) -> Result<String, ToolError> {
    opt_str(args, key)?.ok_or_else(|| ToolError::InvalidArgs(format!("missing required argument `{key}`")))
}

fn opt_str(args: &Value, key: &str) -> Result<Option<String>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ToolError::InvalidArgs(format!("`{key}` must be a string, got {other}"))),
    }
}

fn opt_f64(args: &Value, key: &str, default: f64) -> Result<f64, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => gcp_audit_core::json::as_f64(value)
            .ok_or_else(|| ToolError::InvalidArgs(format!("`{key}` must be a number, got {value}"))),
    }
}

fn opt_u64(args: &Value, key: &str, default: u64) -> Result<u64, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => gcp_audit_core::json::as_u64(value).ok_or_else(|| {
            ToolError::InvalidArgs(format!("`{key}` must be a non-negative integer, got {value}"))
        }),
    }
}

fn opt_u32(args: &Value, key: &str, default: u32) -> Result<u32, ToolError> {
    let n = opt_u64(args, key, u64::from(default))?;
    u32::try_from(n).map_err(|_| ToolError::InvalidArgs(format!("`{key}` is too large: {n}")))
}

fn opt_usize(args: &Value, key: &str, default: usize) -> Result<usize, ToolError> {
    let n = opt_u64(args, key, default as u64)?;
    usize::try_from(n).map_err(|_| ToolError::InvalidArgs(format!("`{key}` is too large: {n}")))
}

/// Gemini with the cloud tools attached
pub struct Agent {
    client: GeminiClient,
    tools: GcpTools,
    available_tools: Vec<AgentTool>,
}

impl Agent {
    #[must_use]
    pub fn new(client: GeminiClient, tools: GcpTools) -> Self {
        Self {
            client,
            tools,
            available_tools: AgentTool::ALL.to_vec(),
        }
    }

    #[must_use]
    pub fn available_tools(&self) -> &[AgentTool] {
        &self.available_tools
    }

    #[must_use]
    pub const fn client(&self) -> &GeminiClient {
        &self.client
    }

    fn system_instruction(&self) -> Content {
        Content {
            role: "system".to_string(),
            parts: vec![Part::text(&format!(
                "You are an infrastructure analyst for the GCP project {} (default region {}). \
                 Use the available functions to look up Cloud Run services, BigQuery data and costs \
                 instead of guessing. Answer concisely.",
                self.tools.project(),
                self.tools.region()
            ))],
        }
    }

    /// Answer `prompt`, calling tools as the model requests
    ///
    /// # Errors
    ///
    /// Returns `GeminiError` if a model call fails, the model returns no
    /// candidate, or no text answer arrives within [`MAX_STEPS`] round trips.
    /// Tool failures are reported to the model instead.
    pub async fn think(&self, prompt: &str) -> Result<String, GeminiError> {
        let declarations = vec![ToolDeclarations {
            function_declarations: self
                .available_tools
                .iter()
                .map(|tool| tool.declaration())
                .collect(),
        }];
        let mut request = GenerateRequest {
            contents: vec![Content::user(prompt)],
            tools: declarations,
            system_instruction: Some(self.system_instruction()),
        };

        for step in 0..MAX_STEPS {
            let content = self.client.generate(&request).await?.into_content()?;
            let calls = content.function_calls();
            if calls.is_empty() {
                return Ok(content.text());
            }
            debug!(step, calls = calls.len(), "model requested function calls");

            let mut responses = Vec::with_capacity(calls.len());
            for call in calls {
                let response = match AgentTool::from_name(&call.name) {
                    Some(tool) => match tool.invoke(&self.tools, &call.args).await {
                        Ok(value) => json!({"content": value}),
                        Err(e) => {
                            warn!(tool = %call.name, error = %e, "tool call failed");
                            json!({"error": e.to_string()})
                        }
                    },
                    None => json!({"error": format!("unknown function `{}`", call.name)}),
                };
                responses.push(Part::function_response(&call.name, response));
            }

            request.contents.push(Content {
                role: "model".to_string(),
                ..content
            });
            request.contents.push(Content {
                role: "user".to_string(),
                parts: responses,
            });
        }

        Err(GeminiError::StepLimit(MAX_STEPS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Backend;
    use gcp_audit_tools::Program;
    use gcp_audit_tools::testing::ScriptedRunner;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn agent(server: &MockServer, runner: ScriptedRunner) -> Agent {
        let client = GeminiClient::new(
            Backend::AiStudio {
                base_url: server.uri(),
                api_key: "k".to_string(),
            },
            "gemini-2.0-flash-exp",
        );
        Agent::new(client, GcpTools::new(Box::new(runner), "demo-project", "us-central1"))
    }

    fn text_reply(text: &str) -> Value {
        json!({"candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]})
    }

    fn call_reply(name: &str, args: Value) -> Value {
        json!({"candidates": [{"content": {"role": "model", "parts": [{"functionCall": {"name": name, "args": args}}]}}]})
    }

    #[test]
    fn test_tool_names_round_trip() {
        for tool in AgentTool::ALL {
            assert_eq!(AgentTool::from_name(tool.name()), Some(tool));
            assert_eq!(tool.parameters()["type"], "OBJECT");
        }
        assert_eq!(AgentTool::from_name("rm_rf"), None);
    }

    #[tokio::test]
    async fn test_invoke_validates_arguments() {
        let tools = GcpTools::new(Box::new(ScriptedRunner::new()), "demo-project", "us-central1");

        let err = AgentTool::GetServiceDetails
            .invoke(&tools, &json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("service_name"));

        let err = AgentTool::AnalyzeServiceCosts
            .invoke(&tools, &json!({"days": "a week"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs(_)));
    }

    #[tokio::test]
    async fn test_invoke_uses_default_region() {
        let runner = ScriptedRunner::new().respond(
            Program::Gcloud,
            "--region=us-central1",
            r#"[{"metadata": {"name": "api"}, "status": {"conditions": [{"status": "True"}]}}]"#,
        );
        let tools = GcpTools::new(Box::new(runner), "demo-project", "us-central1");

        let value = AgentTool::ListCloudRunServices
            .invoke(&tools, &json!({"limit": 5.0}))
            .await
            .unwrap();
        assert_eq!(value[0]["name"], "api");
        assert_eq!(value[0]["ready"], true);
    }

    #[tokio::test]
    async fn test_think_answers_directly() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("functionDeclarations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("4")))
            .expect(1)
            .mount(&server)
            .await;

        let agent = agent(&server, ScriptedRunner::new());
        assert_eq!(agent.available_tools().len(), 12);
        assert_eq!(agent.think("What is 2 + 2?").await.unwrap(), "4");
    }

    #[tokio::test]
    async fn test_think_runs_requested_tool() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("functionResponse"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply(
                "You have 2 datasets: gateway_metrics and cache_analytics.",
            )))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(call_reply("list_datasets", json!({}))))
            .mount(&server)
            .await;

        let runner = ScriptedRunner::new().respond(
            Program::Bq,
            "ls",
            r#"[{"datasetReference": {"datasetId": "gateway_metrics"}},
                {"datasetReference": {"datasetId": "cache_analytics"}}]"#,
        );
        let answer = agent(&server, runner)
            .think("Which datasets exist?")
            .await
            .unwrap();
        assert!(answer.contains("gateway_metrics"));

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        let second: Value = serde_json::from_slice(&requests[1].body).unwrap();
        assert_eq!(
            second["contents"][2]["parts"][0]["functionResponse"]["response"]["content"],
            json!(["gateway_metrics", "cache_analytics"])
        );
    }

    #[tokio::test]
    async fn test_tool_errors_go_back_to_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("functionResponse"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("BigQuery is unavailable.")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(call_reply(
                "query_bigquery",
                json!({"query": "SELECT 1"}),
            )))
            .mount(&server)
            .await;

        let runner = ScriptedRunner::new().fail(Program::Bq, "query", 1, "Access Denied");
        let answer = agent(&server, runner).think("Run a query").await.unwrap();
        assert_eq!(answer, "BigQuery is unavailable.");

        let requests = server.received_requests().await.unwrap();
        let second: Value = serde_json::from_slice(&requests[1].body).unwrap();
        let error = second["contents"][2]["parts"][0]["functionResponse"]["response"]["error"]
            .as_str()
            .unwrap();
        assert!(error.contains("Access Denied"));
    }

    #[tokio::test]
    async fn test_step_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(call_reply("list_datasets", json!({}))))
            .mount(&server)
            .await;

        let runner = ScriptedRunner::new().respond(Program::Bq, "ls", "[]");
        let err = agent(&server, runner).think("loop forever").await.unwrap_err();
        assert!(matches!(err, GeminiError::StepLimit(MAX_STEPS)));
    }
}

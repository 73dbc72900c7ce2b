//! Cloud tools for gcp-audit
//!
//! Every tool issues one `gcloud` or `bq` invocation (or one HTTP request),
//! parses the JSON it prints and hands back typed records. Failures come back
//! as [`ToolError`] so callers can degrade a report section instead of
//! aborting the run.

pub mod bigquery;
pub mod cloud_run;
pub mod health;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::{Command as StdCommand, Stdio};
use tracing::{debug, warn};

/// Error types for tool invocations
#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{action} failed (exit {code}): {stderr}")]
    Failed {
        action: String,
        code: i32,
        stderr: String,
    },

    #[error("failed to parse {action} output: {source}")]
    Parse {
        action: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected {action} output: {detail}")]
    Shape { action: String, detail: String },

    #[error("no data available")]
    NoData,

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
}

/// External CLI a tool shells out to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Program {
    Gcloud,
    Bq,
}

impl Program {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Gcloud => "gcloud",
            Self::Bq => "bq",
        }
    }
}

/// Captured result of one process run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[must_use]
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    #[must_use]
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Seam between tools and the processes they run
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` to completion
    ///
    /// # Errors
    ///
    /// Returns `ToolError::Spawn` when the program cannot be started. A
    /// non-zero exit is not an error at this level.
    fn run(&self, program: Program, args: &[String]) -> Result<CommandOutput, ToolError>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for std::sync::Arc<T> {
    fn run(&self, program: Program, args: &[String]) -> Result<CommandOutput, ToolError> {
        (**self).run(program, args)
    }
}

/// Runs the real binaries, blocking until each exits
#[derive(Debug, Clone)]
pub struct SystemRunner {
    gcloud: PathBuf,
    bq: PathBuf,
}

impl SystemRunner {
    #[must_use]
    pub fn new(gcloud: impl Into<PathBuf>, bq: impl Into<PathBuf>) -> Self {
        Self {
            gcloud: gcloud.into(),
            bq: bq.into(),
        }
    }

    fn path(&self, program: Program) -> &PathBuf {
        match program {
            Program::Gcloud => &self.gcloud,
            Program::Bq => &self.bq,
        }
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new("gcloud", "bq")
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: Program, args: &[String]) -> Result<CommandOutput, ToolError> {
        let path = self.path(program);
        debug!(program = %path.display(), args = ?args, "running command");

        let output = StdCommand::new(path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| ToolError::Spawn {
                program: path.display().to_string(),
                source,
            })?;

        Ok(CommandOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Fully qualified BigQuery tables the analysis queries read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRefs {
    /// Per-request gateway log: service, model, tokens, cost, latency
    pub request_logs: String,
    /// Gateway log used for service activity
    pub gateway_request_logs: String,
    pub cache_metrics: String,
    pub workflow_training_data: String,
}

impl TableRefs {
    /// Standard dataset layout inside `project`
    #[must_use]
    pub fn for_project(project: &str) -> Self {
        Self {
            request_logs: format!("{project}.gateway_metrics.request_logs"),
            gateway_request_logs: format!("{project}.gateway_metrics.gateway_request_logs"),
            cache_metrics: format!("{project}.cache_analytics.cache_metrics"),
            workflow_training_data: format!("{project}.workflow_analytics.workflow_training_data"),
        }
    }
}

/// Handle bundling the runner with the project the tools operate on
pub struct GcpTools {
    runner: Box<dyn CommandRunner>,
    project: String,
    region: String,
    tables: TableRefs,
    http: reqwest::Client,
}

impl GcpTools {
    #[must_use]
    pub fn new(runner: Box<dyn CommandRunner>, project: &str, region: &str) -> Self {
        Self {
            runner,
            project: project.to_string(),
            region: region.to_string(),
            tables: TableRefs::for_project(project),
            http: reqwest::Client::new(),
        }
    }

    #[must_use]
    pub fn with_tables(mut self, tables: TableRefs) -> Self {
        self.tables = tables;
        self
    }

    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    #[must_use]
    pub const fn tables(&self) -> &TableRefs {
        &self.tables
    }

    #[must_use]
    pub const fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// OAuth access token of the active gcloud account
    ///
    /// # Errors
    ///
    /// Returns `ToolError` if gcloud fails or prints nothing
    pub fn access_token(&self) -> Result<String, ToolError> {
        let stdout = self.invoke(
            Program::Gcloud,
            &["auth", "print-access-token"],
            "print access token",
        )?;
        let token = stdout.trim();
        if token.is_empty() {
            return Err(ToolError::Shape {
                action: "print access token".to_string(),
                detail: "empty token".to_string(),
            });
        }
        Ok(token.to_string())
    }

    /// Run a command and return its stdout, turning a non-zero exit into an error
    fn invoke<S: AsRef<str>>(
        &self,
        program: Program,
        args: &[S],
        action: &str,
    ) -> Result<String, ToolError> {
        let args: Vec<String> = args.iter().map(|a| a.as_ref().to_string()).collect();
        let output = self.runner.run(program, &args)?;

        if output.code != 0 {
            warn!(program = program.name(), code = output.code, "{action} failed");
            return Err(ToolError::Failed {
                action: action.to_string(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        Ok(output.stdout)
    }

    /// Run a command and parse its stdout as JSON; empty output parses as `[]`
    fn invoke_json<S: AsRef<str>>(
        &self,
        program: Program,
        args: &[S],
        action: &str,
    ) -> Result<serde_json::Value, ToolError> {
        let stdout = self.invoke(program, args, action)?;
        parse_json(&stdout, action)
    }
}

fn parse_json(stdout: &str, action: &str) -> Result<serde_json::Value, ToolError> {
    if stdout.trim().is_empty() {
        return Ok(serde_json::Value::Array(Vec::new()));
    }
    serde_json::from_str(stdout).map_err(|source| ToolError::Parse {
        action: action.to_string(),
        source,
    })
}

fn expect_array(value: serde_json::Value, action: &str) -> Result<Vec<serde_json::Value>, ToolError> {
    match value {
        serde_json::Value::Array(items) => Ok(items),
        other => Err(ToolError::Shape {
            action: action.to_string(),
            detail: format!("expected a JSON array, got {}", kind(&other)),
        }),
    }
}

const fn kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    fn tools(runner: ScriptedRunner) -> GcpTools {
        GcpTools::new(Box::new(runner), "demo-project", "us-central1")
    }

    #[test]
    fn test_table_refs_for_project() {
        let tables = TableRefs::for_project("p1");
        assert_eq!(tables.request_logs, "p1.gateway_metrics.request_logs");
        assert_eq!(tables.cache_metrics, "p1.cache_analytics.cache_metrics");
    }

    #[test]
    fn test_invoke_reports_stderr_on_failure() {
        let runner = ScriptedRunner::new().fail(Program::Bq, "ls", 2, "Access Denied\n");
        let err = tools(runner)
            .invoke(Program::Bq, &["ls"], "list datasets")
            .unwrap_err();

        match err {
            ToolError::Failed { code, stderr, .. } => {
                assert_eq!(code, 2);
                assert_eq!(stderr, "Access Denied");
            }
            other => panic!("Expected Failed error, got {other:?}"),
        }
    }

    #[test]
    fn test_non_json_output_is_parse_error() {
        let runner = ScriptedRunner::new().respond(Program::Bq, "ls", "Waiting on bqjob...");
        let err = tools(runner)
            .invoke_json(Program::Bq, &["ls"], "list datasets")
            .unwrap_err();
        assert!(matches!(err, ToolError::Parse { .. }));
        assert!(err.to_string().contains("list datasets"));
    }

    #[test]
    fn test_empty_output_is_empty_array() {
        let runner = ScriptedRunner::new().respond(Program::Bq, "query", "  \n");
        let value = tools(runner)
            .invoke_json(Program::Bq, &["query"], "query")
            .unwrap();
        assert_eq!(value, serde_json::json!([]));
    }

    #[test]
    fn test_access_token_trimmed() {
        let runner = ScriptedRunner::new().respond(Program::Gcloud, "print-access-token", "ya29.token\n");
        assert_eq!(tools(runner).access_token().unwrap(), "ya29.token");
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let runner = SystemRunner::new("/nonexistent/gcloud-binary", "/nonexistent/bq-binary");
        let err = runner.run(Program::Gcloud, &[]).unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
        assert!(err.to_string().contains("/nonexistent/gcloud-binary"));
    }

    #[test]
    fn test_expect_array_rejects_objects() {
        let err = expect_array(serde_json::json!({"a": 1}), "list services").unwrap_err();
        assert!(err.to_string().contains("an object"));
    }
}

//! BigQuery tools
//!
//! Queries run through `bq query` in standard SQL with JSON output. The
//! analysis helpers read the gateway, cache and workflow tables named by
//! [`TableRefs`](crate::TableRefs).

use gcp_audit_core::{
    CachePerformance, ExpensiveRequest, ModelUsage, Row, TableSchema, WorkflowEfficiency, json,
};
use serde_json::Value;

use crate::{GcpTools, Program, ToolError, expect_array};

/// Rows returned by the expensive request query
pub const EXPENSIVE_REQUEST_LIMIT: usize = 20;

impl GcpTools {
    /// Execute a standard SQL query in the configured project
    ///
    /// # Errors
    ///
    /// Returns `ToolError` if `bq` fails, prints something other than JSON,
    /// or prints JSON that is not an array of objects
    pub fn query(&self, sql: &str) -> Result<Vec<Row>, ToolError> {
        let project_flag = format!("--project_id={}", self.project);
        let value = self.invoke_json(
            Program::Bq,
            &[
                "query",
                "--use_legacy_sql=false",
                "--format=json",
                project_flag.as_str(),
                sql,
            ],
            "query",
        )?;

        expect_array(value, "query")?
            .into_iter()
            .map(|row| match row {
                Value::Object(map) => Ok(map),
                other => Err(ToolError::Shape {
                    action: "query".to_string(),
                    detail: format!("expected rows to be objects, got {other}"),
                }),
            })
            .collect()
    }

    /// Dataset ids in the configured project
    ///
    /// # Errors
    ///
    /// Returns `ToolError` if `bq ls` fails or its output cannot be parsed
    pub fn list_datasets(&self) -> Result<Vec<String>, ToolError> {
        let project_flag = format!("--project_id={}", self.project);
        let value = self.invoke_json(
            Program::Bq,
            &["ls", project_flag.as_str(), "--format=json"],
            "list datasets",
        )?;

        Ok(expect_array(value, "list datasets")?
            .iter()
            .filter_map(|ds| json::pointer(ds, &["datasetReference", "datasetId"]))
            .filter_map(json::as_text)
            .collect())
    }

    /// Schema and size of `dataset.table`
    ///
    /// # Errors
    ///
    /// Returns `ToolError` if `bq show` fails or its output cannot be parsed
    pub fn table_schema(&self, dataset: &str, table: &str) -> Result<TableSchema, ToolError> {
        let target = format!("{}:{dataset}.{table}", self.project);
        let value = self.invoke_json(
            Program::Bq,
            &["show", "--format=json", target.as_str()],
            "get schema",
        )?;

        let fields = json::pointer(&value, &["schema", "fields"])
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(TableSchema {
            dataset: dataset.to_string(),
            table: table.to_string(),
            fields,
            num_rows: value.get("numRows").and_then(json::as_u64),
            size_bytes: value.get("numBytes").and_then(json::as_u64),
        })
    }

    /// Cache hit rate, savings and latency split over the last `days`
    ///
    /// # Errors
    ///
    /// Returns `ToolError::NoData` when the query yields no row
    pub fn cache_performance(&self, days: u32) -> Result<CachePerformance, ToolError> {
        let sql = format!(
            "SELECT
  COUNT(*) AS total_requests,
  SUM(CASE WHEN cache_hit THEN 1 ELSE 0 END) AS cache_hits,
  ROUND(SUM(CASE WHEN cache_hit THEN 1 ELSE 0 END) * 100.0 / COUNT(*), 2) AS hit_rate,
  SUM(savings) AS total_savings_usd,
  AVG(CASE WHEN cache_hit THEN latency_ms ELSE NULL END) AS avg_cache_latency,
  AVG(CASE WHEN NOT cache_hit THEN latency_ms ELSE NULL END) AS avg_miss_latency
FROM `{table}`
WHERE timestamp >= TIMESTAMP_SUB(CURRENT_TIMESTAMP(), INTERVAL {days} DAY)",
            table = self.tables.cache_metrics,
        );

        first_row(self.query(&sql)?).map(|row| CachePerformance::from_row(&row))
    }

    /// Most expensive models over the last `days`
    ///
    /// # Errors
    ///
    /// Returns `ToolError` if the query fails
    pub fn top_models_usage(&self, days: u32, limit: usize) -> Result<Vec<ModelUsage>, ToolError> {
        let sql = format!(
            "SELECT
  model,
  COUNT(*) AS request_count,
  SUM(input_tokens) AS total_input_tokens,
  SUM(output_tokens) AS total_output_tokens,
  ROUND(SUM(cost), 2) AS total_cost_usd,
  ROUND(AVG(latency_ms), 0) AS avg_latency_ms
FROM `{table}`
WHERE timestamp >= TIMESTAMP_SUB(CURRENT_TIMESTAMP(), INTERVAL {days} DAY)
  AND model IS NOT NULL
GROUP BY model
ORDER BY total_cost_usd DESC
LIMIT {limit}",
            table = self.tables.request_logs,
        );

        Ok(self.query(&sql)?.iter().map(ModelUsage::from_row).collect())
    }

    /// Individual requests costing at least `min_cost` USD
    ///
    /// # Errors
    ///
    /// Returns `ToolError` if the query fails
    pub fn expensive_requests(
        &self,
        days: u32,
        min_cost: f64,
    ) -> Result<Vec<ExpensiveRequest>, ToolError> {
        if !min_cost.is_finite() {
            return Err(ToolError::InvalidArgs(format!("min_cost must be finite, got {min_cost}")));
        }

        let sql = format!(
            "SELECT
  request_hash,
  model,
  input_tokens,
  output_tokens,
  cost AS cost_usd,
  latency_ms,
  timestamp
FROM `{table}`
WHERE timestamp >= TIMESTAMP_SUB(CURRENT_TIMESTAMP(), INTERVAL {days} DAY)
  AND cost >= {min_cost}
ORDER BY cost DESC
LIMIT {EXPENSIVE_REQUEST_LIMIT}",
            table = self.tables.request_logs,
        );

        Ok(self.query(&sql)?.iter().map(ExpensiveRequest::from_row).collect())
    }

    /// Workflow success rate, duration and cost over the last 30 days
    ///
    /// # Errors
    ///
    /// Returns `ToolError::NoData` when the query yields no row
    pub fn workflow_efficiency(&self) -> Result<WorkflowEfficiency, ToolError> {
        let sql = format!(
            "SELECT
  COUNT(*) AS total_executions,
  SUM(CASE WHEN success THEN 1 ELSE 0 END) AS successful,
  ROUND(SUM(CASE WHEN success THEN 1 ELSE 0 END) * 100.0 / COUNT(*), 2) AS success_rate,
  ROUND(AVG(duration_ms), 0) AS avg_duration_ms,
  ROUND(AVG(total_cost), 4) AS avg_cost_usd
FROM `{table}`
WHERE timestamp >= TIMESTAMP_SUB(CURRENT_TIMESTAMP(), INTERVAL 30 DAY)",
            table = self.tables.workflow_training_data,
        );

        first_row(self.query(&sql)?).map(|row| WorkflowEfficiency::from_row(&row))
    }
}

fn first_row(rows: Vec<Row>) -> Result<Row, ToolError> {
    rows.into_iter().next().ok_or(ToolError::NoData)
}

//! Cloud Run tools
//!
//! Service listing and description go through `gcloud run services`; traffic
//! and cost come from the gateway request log in BigQuery.

use gcp_audit_core::{ServiceActivity, ServiceCost, ServiceDetails, ServiceSummary, json};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::{GcpTools, Program, ToolError, expect_array};

/// Placeholder for resource limits and images the service does not declare
pub const UNKNOWN: &str = "unknown";

/// Shown instead of env var values that come from a secret reference
pub const SECRET_PLACEHOLDER: &str = "SECRET";

/// Lookback used when measuring service activity
pub const ACTIVITY_WINDOW_DAYS: u32 = 30;

impl GcpTools {
    /// Cloud Run services in `region`, at most `limit` of them
    ///
    /// # Errors
    ///
    /// Returns `ToolError` if `gcloud` fails or its output cannot be parsed
    pub fn list_services(&self, region: &str, limit: usize) -> Result<Vec<ServiceSummary>, ToolError> {
        let region_flag = format!("--region={region}");
        let project_flag = format!("--project={}", self.project);
        let value = self.invoke_json(
            Program::Gcloud,
            &[
                "run",
                "services",
                "list",
                region_flag.as_str(),
                project_flag.as_str(),
                "--format=json",
            ],
            "list services",
        )?;

        Ok(expect_array(value, "list services")?
            .iter()
            .take(limit)
            .map(|svc| ServiceSummary {
                name: text_at(svc, &["metadata", "name"]).unwrap_or_default(),
                url: text_at(svc, &["status", "url"]),
                region: region.to_string(),
                ready: first_condition_status(svc).as_deref() == Some("True"),
            })
            .collect())
    }

    /// Resource limits, image and environment of one service
    ///
    /// # Errors
    ///
    /// Returns `ToolError` if `gcloud` fails or its output cannot be parsed
    pub fn service_details(&self, service_name: &str, region: &str) -> Result<ServiceDetails, ToolError> {
        let region_flag = format!("--region={region}");
        let project_flag = format!("--project={}", self.project);
        let service = self.invoke_json(
            Program::Gcloud,
            &[
                "run",
                "services",
                "describe",
                service_name,
                region_flag.as_str(),
                project_flag.as_str(),
                "--format=json",
            ],
            "get service details",
        )?;

        let container = json::pointer(&service, &["spec", "template", "spec", "containers"])
            .and_then(Value::as_array)
            .and_then(|containers| containers.first());
        let limit = |key: &str| {
            container
                .and_then(|c| json::pointer(c, &["resources", "limits", key]))
                .and_then(json::as_text)
                .unwrap_or_else(|| UNKNOWN.to_string())
        };

        let env_vars: BTreeMap<String, String> = container
            .and_then(|c| c.get("env"))
            .and_then(Value::as_array)
            .map(|env| {
                env.iter()
                    .filter_map(|var| {
                        let name = var.get("name").and_then(json::as_text)?;
                        let value = var
                            .get("value")
                            .and_then(json::as_text)
                            .unwrap_or_else(|| SECRET_PLACEHOLDER.to_string());
                        Some((name, value))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(ServiceDetails {
            name: service_name.to_string(),
            url: text_at(&service, &["status", "url"]),
            memory: limit("memory"),
            cpu: limit("cpu"),
            image: container
                .and_then(|c| c.get("image"))
                .and_then(json::as_text)
                .unwrap_or_else(|| UNKNOWN.to_string()),
            env_vars,
            status: first_condition_status(&service),
        })
    }

    /// Spend, volume and latency per service over the last `days`, top 20 by cost
    ///
    /// # Errors
    ///
    /// Returns `ToolError` if the cost query fails
    pub fn service_costs(&self, days: u32) -> Result<Vec<ServiceCost>, ToolError> {
        let sql = format!(
            "SELECT
  service_name,
  SUM(cost) AS total_cost,
  COUNT(*) AS request_count,
  AVG(latency_ms) AS avg_latency
FROM `{table}`
WHERE timestamp >= TIMESTAMP_SUB(CURRENT_TIMESTAMP(), INTERVAL {days} DAY)
GROUP BY service_name
ORDER BY total_cost DESC
LIMIT 20",
            table = self.tables.request_logs,
        );

        Ok(self.query(&sql)?.iter().map(ServiceCost::from_row).collect())
    }

    /// Services present in the request log but silent for `min_days_inactive` days
    ///
    /// # Errors
    ///
    /// Returns `ToolError` if the query fails
    pub fn dormant_services(&self, min_days_inactive: u32) -> Result<Vec<String>, ToolError> {
        let sql = format!(
            "SELECT DISTINCT service_name
FROM `{table}`
WHERE service_name NOT IN (
  SELECT DISTINCT service_name
  FROM `{table}`
  WHERE timestamp >= TIMESTAMP_SUB(CURRENT_TIMESTAMP(), INTERVAL {min_days_inactive} DAY)
)
LIMIT 50",
            table = self.tables.request_logs,
        );

        Ok(self
            .query(&sql)?
            .iter()
            .filter_map(|row| json::str_field(row, "service_name"))
            .collect())
    }

    /// Request count and days since the last request, per service
    ///
    /// # Errors
    ///
    /// Returns `ToolError` if the activity query fails
    pub fn service_activity(&self, window_days: u32) -> Result<Vec<ServiceActivity>, ToolError> {
        let sql = format!(
            "SELECT
  service_name,
  COUNT(*) AS request_count,
  MAX(timestamp) AS last_request,
  TIMESTAMP_DIFF(CURRENT_TIMESTAMP(), MAX(timestamp), DAY) AS days_since_last_request
FROM `{table}`
WHERE timestamp >= TIMESTAMP_SUB(CURRENT_TIMESTAMP(), INTERVAL {window_days} DAY)
GROUP BY service_name
ORDER BY days_since_last_request DESC",
            table = self.tables.gateway_request_logs,
        );

        Ok(self
            .query(&sql)?
            .iter()
            .filter_map(ServiceActivity::from_row)
            .collect())
    }
}

fn text_at(value: &Value, path: &[&str]) -> Option<String> {
    json::pointer(value, path).and_then(json::as_text)
}

fn first_condition_status(service: &Value) -> Option<String> {
    json::pointer(service, &["status", "conditions"])
        .and_then(Value::as_array)
        .and_then(|conditions| conditions.first())
        .and_then(|condition| condition.get("status"))
        .and_then(json::as_text)
}

//! Shared data model for gcp-audit
//!
//! Plain records mirroring `gcloud`/`bq` JSON output, the activity bands used
//! to spot idle services, and the small amount of arithmetic the reports do.

pub mod activity;
pub mod json;
pub mod stats;

use serde::Serialize;
use std::collections::BTreeMap;

/// One row of a BigQuery result set
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Entry of `gcloud run services list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSummary {
    pub name: String,
    pub url: Option<String>,
    pub region: String,
    pub ready: bool,
}

/// Configuration of a single Cloud Run service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDetails {
    pub name: String,
    pub url: Option<String>,
    pub memory: String,
    pub cpu: String,
    pub image: String,
    /// Literal values; variables sourced from secrets show as `SECRET`
    pub env_vars: BTreeMap<String, String>,
    pub status: Option<String>,
}

/// Result of probing a service's `/health` endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub url: String,
    pub status_code: Option<u16>,
    pub healthy: bool,
    pub response: Option<String>,
    pub error: Option<String>,
}

/// Request activity of one service over the lookback window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceActivity {
    pub service_name: String,
    pub request_count: u64,
    /// `None` when the log row carried no usable timestamp difference
    pub days_since_last_request: Option<u64>,
}

/// Aggregated spend of one service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceCost {
    pub service_name: String,
    pub total_cost: f64,
    pub request_count: u64,
    pub avg_latency: f64,
}

/// Response cache effectiveness over a window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachePerformance {
    pub total_requests: u64,
    pub cache_hits: u64,
    /// Percentage in `0..=100`
    pub hit_rate: f64,
    pub total_savings_usd: f64,
    pub avg_cache_latency: f64,
    pub avg_miss_latency: f64,
}

impl CachePerformance {
    /// How many times faster a cache hit is than a miss
    #[must_use]
    pub fn speedup(&self) -> Option<f64> {
        stats::speedup(self.avg_miss_latency, self.avg_cache_latency)
    }
}

/// Usage and spend of one model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelUsage {
    pub model: String,
    pub request_count: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cost_usd: f64,
    pub avg_latency_ms: f64,
}

/// A single costly gateway request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpensiveRequest {
    pub request_hash: Option<String>,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub latency_ms: f64,
    pub timestamp: Option<String>,
}

/// Workflow execution outcomes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowEfficiency {
    pub total_executions: u64,
    pub successful: u64,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub avg_cost_usd: f64,
}

/// Schema and size of a BigQuery table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSchema {
    pub dataset: String,
    pub table: String,
    pub fields: Vec<serde_json::Value>,
    pub num_rows: Option<u64>,
    pub size_bytes: Option<u64>,
}

impl ServiceCost {
    /// Build from a cost query row
    #[must_use]
    pub fn from_row(row: &Row) -> Self {
        Self {
            service_name: json::str_or(row, "service_name", "Unknown"),
            total_cost: json::f64_or_zero(row, "total_cost"),
            request_count: json::u64_or_zero(row, "request_count"),
            avg_latency: json::f64_or_zero(row, "avg_latency"),
        }
    }
}

impl ServiceActivity {
    /// Build from an activity query row; rows without a service name are skipped
    #[must_use]
    pub fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            service_name: json::str_field(row, "service_name")?,
            request_count: json::u64_or_zero(row, "request_count"),
            // future-dated log rows give a negative diff; they count as today
            days_since_last_request: json::i64_field(row, "days_since_last_request")
                .map(|days| days.max(0).unsigned_abs()),
        })
    }
}

impl CachePerformance {
    #[must_use]
    pub fn from_row(row: &Row) -> Self {
        Self {
            total_requests: json::u64_or_zero(row, "total_requests"),
            cache_hits: json::u64_or_zero(row, "cache_hits"),
            hit_rate: json::f64_or_zero(row, "hit_rate"),
            total_savings_usd: json::f64_or_zero(row, "total_savings_usd"),
            avg_cache_latency: json::f64_or_zero(row, "avg_cache_latency"),
            avg_miss_latency: json::f64_or_zero(row, "avg_miss_latency"),
        }
    }
}

impl ModelUsage {
    #[must_use]
    pub fn from_row(row: &Row) -> Self {
        Self {
            model: json::str_or(row, "model", "Unknown"),
            request_count: json::u64_or_zero(row, "request_count"),
            total_input_tokens: json::u64_or_zero(row, "total_input_tokens"),
            total_output_tokens: json::u64_or_zero(row, "total_output_tokens"),
            total_cost_usd: json::f64_or_zero(row, "total_cost_usd"),
            avg_latency_ms: json::f64_or_zero(row, "avg_latency_ms"),
        }
    }
}

impl ExpensiveRequest {
    #[must_use]
    pub fn from_row(row: &Row) -> Self {
        Self {
            request_hash: json::str_field(row, "request_hash"),
            model: json::str_or(row, "model", "Unknown"),
            input_tokens: json::u64_or_zero(row, "input_tokens"),
            output_tokens: json::u64_or_zero(row, "output_tokens"),
            cost_usd: json::f64_or_zero(row, "cost_usd"),
            latency_ms: json::f64_or_zero(row, "latency_ms"),
            timestamp: json::str_field(row, "timestamp"),
        }
    }
}

impl WorkflowEfficiency {
    #[must_use]
    pub fn from_row(row: &Row) -> Self {
        Self {
            total_executions: json::u64_or_zero(row, "total_executions"),
            successful: json::u64_or_zero(row, "successful"),
            success_rate: json::f64_or_zero(row, "success_rate"),
            avg_duration_ms: json::f64_or_zero(row, "avg_duration_ms"),
            avg_cost_usd: json::f64_or_zero(row, "avg_cost_usd"),
        }
    }
}

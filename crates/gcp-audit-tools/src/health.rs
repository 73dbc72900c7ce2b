//! Service health probe

use gcp_audit_core::{HealthReport, json::truncate_chars};
use std::time::Duration;
use tracing::debug;

use crate::GcpTools;

pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest response body kept in a [`HealthReport`]
pub const MAX_BODY_CHARS: usize = 500;

impl GcpTools {
    /// GET `{service_url}/health`
    ///
    /// Never fails: transport errors produce an unhealthy report carrying the
    /// error message.
    pub async fn check_service_health(&self, service_url: &str) -> HealthReport {
        check_health(&self.http, service_url).await
    }
}

/// Probe `{service_url}/health` with the given client
pub async fn check_health(client: &reqwest::Client, service_url: &str) -> HealthReport {
    let endpoint = format!("{}/health", service_url.trim_end_matches('/'));
    debug!(%endpoint, "checking service health");

    let response = match client.get(&endpoint).timeout(HEALTH_TIMEOUT).send().await {
        Ok(response) => response,
        Err(e) => return unhealthy(service_url, &e.to_string()),
    };

    let status = response.status();
    match response.text().await {
        Ok(body) => HealthReport {
            url: service_url.to_string(),
            status_code: Some(status.as_u16()),
            healthy: status == reqwest::StatusCode::OK,
            response: Some(truncate_chars(&body, MAX_BODY_CHARS)),
            error: None,
        },
        Err(e) => HealthReport {
            status_code: Some(status.as_u16()),
            ..unhealthy(service_url, &e.to_string())
        },
    }
}

fn unhealthy(url: &str, error: &str) -> HealthReport {
    HealthReport {
        url: url.to_string(),
        status_code: None,
        healthy: false,
        response: None,
        error: Some(error.to_string()),
    }
}

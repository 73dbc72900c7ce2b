//! Integration tests for the tools -> reports pipeline

use gcp_audit_report::{AuditSettings, CostSettings, ReportError, analyze_costs, audit_services};
use gcp_audit_tools::testing::ScriptedRunner;
use gcp_audit_tools::{GcpTools, Program};
use std::sync::Arc;

const SERVICES: &str = r#"[
  {"metadata": {"name": "api-gateway"}, "status": {"url": "https://api-gateway.run.app", "conditions": [{"status": "True"}]}},
  {"metadata": {"name": "pdf-renderer"}, "status": {"url": "https://pdf-renderer.run.app", "conditions": [{"status": "True"}]}},
  {"metadata": {"name": "nightly-sync"}, "status": {"url": "https://nightly-sync.run.app", "conditions": [{"status": "True"}]}},
  {"metadata": {"name": "old-dashboard"}, "status": {"url": "https://old-dashboard.run.app", "conditions": [{"status": "False"}]}},
  {"metadata": {"name": "never-called"}, "status": {"conditions": []}}
]"#;

const ACTIVITY: &str = r#"[
  {"service_name": "old-dashboard", "request_count": "12", "days_since_last_request": "29"},
  {"service_name": "nightly-sync", "request_count": "30", "days_since_last_request": "14"},
  {"service_name": "pdf-renderer", "request_count": "880", "days_since_last_request": "7"},
  {"service_name": "api-gateway", "request_count": "120500", "days_since_last_request": "0"}
]"#;

fn audit_runner() -> ScriptedRunner {
    ScriptedRunner::new()
        .respond(Program::Gcloud, "run services list", SERVICES)
        .respond(Program::Bq, "gateway_request_logs", ACTIVITY)
}

#[test]
fn test_audit_pipeline_buckets_and_savings() {
    let runner = Arc::new(audit_runner());
    let tools = GcpTools::new(Box::new(Arc::clone(&runner)), "demo-project", "us-central1");

    let audit = audit_services(&tools, &AuditSettings::default()).unwrap();
    let b = &audit.breakdown;

    assert!(audit.activity_available);
    assert_eq!(b.total(), 5);
    assert_eq!(b.active.len(), 2, "day 7 is still active");
    assert_eq!(b.dormant.len(), 1, "day 14 is still dormant");
    assert_eq!(b.inactive.len(), 1);
    assert_eq!(b.untracked.len(), 1);
    assert_eq!(b.untracked[0].name, "never-called");
    assert_eq!(b.dormant[0].name, "nightly-sync");
    assert_eq!(b.inactive[0].name, "old-dashboard");

    assert_eq!(audit.savings.idle_services, 2);
    assert!((audit.savings.monthly() - 3.0).abs() < 1e-9);
    assert!((audit.savings.annual() - 36.0).abs() < 1e-9);

    let text = audit.to_string();
    assert!(text.contains("Total Services:        5"));
    assert!(text.contains("120,500"));
    assert!(text.contains("$3.00"));

    let calls = runner.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].1.contains(&"--project=demo-project".to_string()));
    assert!(calls[1].1.iter().any(|a| a.contains("demo-project.gateway_metrics.gateway_request_logs")));
}

#[test]
fn test_audit_threshold_moves_boundary() {
    let tools = GcpTools::new(Box::new(audit_runner()), "demo-project", "us-central1");
    let settings = AuditSettings {
        dormancy_threshold_days: 30,
        ..AuditSettings::default()
    };

    let audit = audit_services(&tools, &settings).unwrap();

    assert_eq!(audit.breakdown.dormant.len(), 2);
    assert!(audit.breakdown.inactive.is_empty());
}

#[test]
fn test_audit_without_activity_data() {
    let runner = ScriptedRunner::new()
        .respond(Program::Gcloud, "run services list", SERVICES)
        .fail(Program::Bq, "query", 1, "Not found: Table demo-project:gateway_metrics.gateway_request_logs");
    let tools = GcpTools::new(Box::new(runner), "demo-project", "us-central1");

    let audit = audit_services(&tools, &AuditSettings::default()).unwrap();

    assert!(!audit.activity_available);
    assert_eq!(audit.breakdown.untracked.len(), 5);
    assert_eq!(audit.savings.idle_services, 0);
}

#[test]
fn test_audit_fails_on_malformed_listing() {
    let runner = ScriptedRunner::new().respond(Program::Gcloud, "run services list", "Listing services... done");
    let tools = GcpTools::new(Box::new(runner), "demo-project", "us-central1");

    let err = audit_services(&tools, &AuditSettings::default()).unwrap_err();
    assert!(matches!(err, ReportError::ListServices(_)));
    assert!(err.to_string().starts_with("Error fetching services"));
}

#[test]
fn test_cost_analysis_pipeline() {
    let runner = ScriptedRunner::new()
        .respond(Program::Gcloud, "run services list", SERVICES)
        .respond(
            Program::Bq,
            "SUM(cost) AS total_cost,",
            r#"[{"service_name": "api-gateway", "total_cost": "41.5", "request_count": "120500", "avg_latency": "212.4"}]"#,
        )
        .respond(
            Program::Bq,
            "SELECT DISTINCT service_name",
            r#"[{"service_name": "old-dashboard"}, {"service_name": "nightly-sync"}]"#,
        )
        .respond(
            Program::Bq,
            "cache_metrics",
            r#"[{"total_requests": "1000", "cache_hits": "320", "hit_rate": "32.0", "total_savings_usd": "4.1", "avg_cache_latency": "20", "avg_miss_latency": "900"}]"#,
        )
        .respond(
            Program::Bq,
            "total_cost_usd",
            r#"[{"model": "gemini-2.0-flash", "request_count": "900", "total_input_tokens": "450000", "total_output_tokens": "90000", "total_cost_usd": "3.2", "avg_latency_ms": "640"}]"#,
        )
        .respond(Program::Bq, "cost >=", "[]");
    let tools = GcpTools::new(Box::new(runner), "demo-project", "us-central1");

    let analysis = analyze_costs(&tools, &CostSettings::default());

    assert_eq!(analysis.services.as_ref().unwrap().len(), 5);
    assert_eq!(analysis.dormant.as_ref().unwrap().len(), 2);
    assert!(analysis.expensive.as_ref().unwrap().is_empty());

    let recs = analysis.recommendations();
    assert_eq!(recs.len(), 3);
    assert!(recs[0].contains("Review 2 dormant services"));
    assert!(recs[1].contains("32.0%"));
    assert!(recs[2].contains("$41.50"));

    let text = analysis.to_string();
    assert!(text.contains("Speedup Factor:     45.0x faster with cache"));
    assert!(text.contains("450,000"));
    assert!(text.contains("✅ Analysis Complete!"));
}

#[test]
fn test_cost_analysis_survives_broken_cli() {
    let runner = ScriptedRunner::new().missing(Program::Gcloud).missing(Program::Bq);
    let tools = GcpTools::new(Box::new(runner), "demo-project", "us-central1");

    let analysis = analyze_costs(&tools, &CostSettings::default());

    assert!(analysis.services.is_err());
    assert!(analysis.cache.is_err());
    assert!(analysis.recommendations().is_empty());
    assert!(analysis.to_string().contains("Insufficient data for recommendations"));
}

//! Runtime configuration
//!
//! Sources are merged in this order, later ones winning:
//!
//! 1. Built-in defaults
//! 2. YAML file (`gcp-audit.yaml`, or `--config` / `GCP_AUDIT_CONFIG`); a
//!    missing file is skipped
//! 3. `GCP_AUDIT_*` environment variables, `__` separating nested keys, e.g.
//!    `GCP_AUDIT_AUDIT__DORMANCY_THRESHOLD_DAYS=30`
//! 4. `GOOGLE_CLOUD_PROJECT`, `GOOGLE_CLOUD_REGION` and `GOOGLE_API_KEY`
//! 5. `--project` / `--region` flags
//!
//! ```yaml
//! project: my-project
//! region: europe-west1
//! tables:
//!   cache_metrics: other-project.cache.metrics
//! gemini:
//!   model: gemini-2.0-flash-exp
//! ```

use clap::Args;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use gcp_audit_gemini::GeminiSettings;
use gcp_audit_report::{AuditSettings, CostSettings};
use gcp_audit_tools::TableRefs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_PROJECT: &str = "truckerbooks-mvp-prod";
pub const DEFAULT_REGION: &str = "us-central1";
pub const DEFAULT_CONFIG_FILE: &str = "gcp-audit.yaml";

/// Flags that feed configuration loading
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to configuration file
    #[arg(short = 'c', long, env = "GCP_AUDIT_CONFIG", default_value = DEFAULT_CONFIG_FILE, global = true)]
    pub config: PathBuf,

    /// GCP project, overriding config and environment
    #[arg(long, global = true)]
    pub project: Option<String>,

    /// Default region, overriding config and environment
    #[arg(long, global = true)]
    pub region: Option<String>,
}

impl Default for ConfigArgs {
    fn default() -> Self {
        Self {
            config: PathBuf::from(DEFAULT_CONFIG_FILE),
            project: None,
            region: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub project: String,
    pub region: String,
    pub gcloud_bin: PathBuf,
    pub bq_bin: PathBuf,
    pub tables: TablesConfig,
    pub audit: AuditConfig,
    pub gemini: GeminiSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: DEFAULT_PROJECT.to_string(),
            region: DEFAULT_REGION.to_string(),
            gcloud_bin: PathBuf::from("gcloud"),
            bq_bin: PathBuf::from("bq"),
            tables: TablesConfig::default(),
            audit: AuditConfig::default(),
            gemini: GeminiSettings::default(),
        }
    }
}

/// Table overrides; unset tables live in the configured project
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TablesConfig {
    pub request_logs: Option<String>,
    pub gateway_request_logs: Option<String>,
    pub cache_metrics: Option<String>,
    pub workflow_training_data: Option<String>,
}

impl TablesConfig {
    #[must_use]
    pub fn resolve(&self, project: &str) -> TableRefs {
        let defaults = TableRefs::for_project(project);
        TableRefs {
            request_logs: self.request_logs.clone().unwrap_or(defaults.request_logs),
            gateway_request_logs: self
                .gateway_request_logs
                .clone()
                .unwrap_or(defaults.gateway_request_logs),
            cache_metrics: self.cache_metrics.clone().unwrap_or(defaults.cache_metrics),
            workflow_training_data: self
                .workflow_training_data
                .clone()
                .unwrap_or(defaults.workflow_training_data),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    pub dormancy_threshold_days: u64,
    /// Flat monthly cost assumed for each idle service
    pub idle_service_monthly_cost: f64,
    pub service_limit: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        let defaults = AuditSettings::default();
        Self {
            dormancy_threshold_days: defaults.dormancy_threshold_days,
            idle_service_monthly_cost: defaults.idle_service_monthly_cost,
            service_limit: defaults.service_limit,
        }
    }
}

impl Config {
    pub fn figment(args: &ConfigArgs) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()))
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("GCP_AUDIT_").split("__").ignore(&["config"]))
            .merge(
                Env::raw()
                    .only(&["GOOGLE_CLOUD_PROJECT"])
                    .map(|_| "project".into()),
            )
            .merge(
                Env::raw()
                    .only(&["GOOGLE_CLOUD_REGION"])
                    .map(|_| "region".into()),
            )
            .merge(
                Env::raw()
                    .only(&["GOOGLE_API_KEY"])
                    .map(|_| "gemini.api_key".into()),
            );

        if let Some(project) = &args.project {
            figment = figment.merge(Serialized::default("project", project));
        }
        if let Some(region) = &args.region {
            figment = figment.merge(Serialized::default("region", region));
        }
        figment
    }

    /// Load and validate the merged configuration
    ///
    /// # Errors
    ///
    /// Returns a `figment::Error` for malformed sources, unknown keys or
    /// values that fail [`Config::validate`]
    pub fn load(args: &ConfigArgs) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no command can work with
    ///
    /// # Errors
    ///
    /// Returns a `figment::Error` naming the offending field
    pub fn validate(&self) -> Result<(), figment::Error> {
        if self.project.trim().is_empty() {
            return Err(figment::Error::from("project must not be empty".to_string()));
        }
        if self.region.trim().is_empty() {
            return Err(figment::Error::from("region must not be empty".to_string()));
        }
        let cost = self.audit.idle_service_monthly_cost;
        if !cost.is_finite() || cost <= 0.0 {
            return Err(figment::Error::from(format!(
                "audit.idle_service_monthly_cost must be positive, got {cost}"
            )));
        }
        if self.audit.service_limit == 0 {
            return Err(figment::Error::from(
                "audit.service_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn table_refs(&self) -> TableRefs {
        self.tables.resolve(&self.project)
    }

    #[must_use]
    pub fn audit_settings(&self) -> AuditSettings {
        AuditSettings {
            region: self.region.clone(),
            service_limit: self.audit.service_limit,
            dormancy_threshold_days: self.audit.dormancy_threshold_days,
            idle_service_monthly_cost: self.audit.idle_service_monthly_cost,
        }
    }

    #[must_use]
    pub fn cost_settings(&self) -> CostSettings {
        CostSettings {
            region: self.region.clone(),
            ..CostSettings::default()
        }
    }
}

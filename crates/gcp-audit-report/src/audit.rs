//! Service audit: find dormant and unused Cloud Run services

use gcp_audit_core::activity::{ACTIVE_WINDOW_DAYS, ActivityBreakdown, DEFAULT_DORMANCY_THRESHOLD_DAYS};
use gcp_audit_core::stats::{
    DEFAULT_IDLE_SERVICE_MONTHLY_COST, SavingsEstimate, group_thousands, percentage,
};
use gcp_audit_tools::GcpTools;
use gcp_audit_tools::cloud_run::ACTIVITY_WINDOW_DAYS;
use std::fmt;
use tracing::{info, warn};

use crate::{ReportError, and_more, heavy_rule, light_rule};

const ACTIVE_SHOWN: usize = 10;
const INACTIVE_SHOWN: usize = 20;
const UNTRACKED_SHOWN: usize = 15;

/// Below this share of active services the audit suggests consolidation
const LOW_ACTIVE_PERCENTAGE: f64 = 50.0;

#[derive(Debug, Clone, PartialEq)]
pub struct AuditSettings {
    pub region: String,
    pub service_limit: usize,
    pub dormancy_threshold_days: u64,
    pub idle_service_monthly_cost: f64,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            region: "us-central1".to_string(),
            service_limit: 500,
            dormancy_threshold_days: DEFAULT_DORMANCY_THRESHOLD_DAYS,
            idle_service_monthly_cost: DEFAULT_IDLE_SERVICE_MONTHLY_COST,
        }
    }
}

/// Everything the audit report shows
#[derive(Debug, Clone)]
pub struct ServiceAudit {
    pub generated_at: String,
    pub region: String,
    pub breakdown: ActivityBreakdown,
    /// False when the activity query failed and every service counts as untracked
    pub activity_available: bool,
    pub savings: SavingsEstimate,
}

/// List services, join them with their recent traffic and bucket them
///
/// # Errors
///
/// Returns `ReportError` if the service listing fails or comes back empty.
/// A failed activity query only degrades the report.
pub fn audit_services(tools: &GcpTools, settings: &AuditSettings) -> Result<ServiceAudit, ReportError> {
    let services = tools
        .list_services(&settings.region, settings.service_limit)
        .map_err(ReportError::ListServices)?;
    if services.is_empty() {
        return Err(ReportError::NoServices {
            region: settings.region.clone(),
        });
    }
    info!(count = services.len(), "fetched Cloud Run services");

    let (activity, activity_available) = match tools.service_activity(ACTIVITY_WINDOW_DAYS) {
        Ok(activity) => (activity, true),
        Err(e) => {
            warn!(error = %e, "could not query activity data, treating services as untracked");
            (Vec::new(), false)
        }
    };

    let breakdown =
        ActivityBreakdown::categorize(&services, &activity, settings.dormancy_threshold_days);
    let savings = SavingsEstimate::new(breakdown.idle(), settings.idle_service_monthly_cost);

    Ok(ServiceAudit {
        generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        region: settings.region.clone(),
        breakdown,
        activity_available,
        savings,
    })
}

/// Day range of the dormant band, `None` when the active window covers it
fn dormant_range(threshold: u64) -> Option<String> {
    (threshold > ACTIVE_WINDOW_DAYS).then(|| format!("{}-{threshold} days", ACTIVE_WINDOW_DAYS + 1))
}

impl ServiceAudit {
    fn write_summary(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.breakdown;
        let total = b.total();
        let threshold = b.dormancy_threshold_days;

        writeln!(f, "\n📊 Service Activity Summary")?;
        heavy_rule(f)?;
        writeln!(f, "Total Services:        {total}")?;
        writeln!(
            f,
            "Active (<= {ACTIVE_WINDOW_DAYS} days):    {} ({:.1}%)",
            b.active.len(),
            percentage(b.active.len(), total)
        )?;
        writeln!(
            f,
            "Dormant ({}):    {} ({:.1}%)",
            dormant_range(threshold).unwrap_or_else(|| "none".to_string()),
            b.dormant.len(),
            percentage(b.dormant.len(), total)
        )?;
        writeln!(
            f,
            "Inactive (>{} days):   {} ({:.1}%)",
            threshold.max(ACTIVE_WINDOW_DAYS),
            b.inactive.len(),
            percentage(b.inactive.len(), total)
        )?;
        writeln!(
            f,
            "Unknown/Untracked:     {} ({:.1}%)",
            b.untracked.len(),
            percentage(b.untracked.len(), total)
        )?;
        heavy_rule(f)?;
        writeln!(f)
    }

    fn write_buckets(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.breakdown;

        if !b.active.is_empty() {
            let mut active = b.active.clone();
            active.sort_by(|x, y| y.request_count.cmp(&x.request_count));

            writeln!(f, "✅ Active Services ({})", active.len())?;
            light_rule(f)?;
            for svc in active.iter().take(ACTIVE_SHOWN) {
                writeln!(f, "  • {}", svc.name)?;
                writeln!(
                    f,
                    "    Requests: {} | Last: {} days ago",
                    group_thousands(svc.request_count),
                    svc.days_since_last_request
                )?;
            }
            and_more(f, ACTIVE_SHOWN, active.len())?;
            writeln!(f)?;
        }

        if !b.dormant.is_empty() {
            let mut dormant = b.dormant.clone();
            dormant.sort_by(|x, y| y.days_since_last_request.cmp(&x.days_since_last_request));

            writeln!(
                f,
                "⚠️  Dormant Services ({}) - Review for potential removal",
                dormant.len()
            )?;
            light_rule(f)?;
            for svc in &dormant {
                writeln!(f, "  • {}", svc.name)?;
                writeln!(
                    f,
                    "    Last activity: {} days ago | Requests: {}",
                    svc.days_since_last_request,
                    group_thousands(svc.request_count)
                )?;
            }
            writeln!(f)?;
        }

        if !b.inactive.is_empty() {
            let mut inactive = b.inactive.clone();
            inactive.sort_by(|x, y| y.days_since_last_request.cmp(&x.days_since_last_request));

            writeln!(
                f,
                "🔴 Inactive Services ({}) - Strong candidates for removal",
                inactive.len()
            )?;
            light_rule(f)?;
            for svc in inactive.iter().take(INACTIVE_SHOWN) {
                writeln!(f, "  • {}", svc.name)?;
                writeln!(
                    f,
                    "    Last activity: {}+ days ago | Requests: {}",
                    svc.days_since_last_request,
                    group_thousands(svc.request_count)
                )?;
            }
            and_more(f, INACTIVE_SHOWN, inactive.len())?;
            writeln!(f)?;
        }

        if !b.untracked.is_empty() {
            writeln!(
                f,
                "❓ Untracked Services ({}) - Not in activity logs",
                b.untracked.len()
            )?;
            light_rule(f)?;
            for svc in b.untracked.iter().take(UNTRACKED_SHOWN) {
                writeln!(f, "  • {}", svc.name)?;
            }
            and_more(f, UNTRACKED_SHOWN, b.untracked.len())?;
            writeln!(f)?;
        }

        Ok(())
    }

    fn write_recommendations(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.breakdown;
        let threshold = b.dormancy_threshold_days;
        let mut n = 0;

        writeln!(f, "\n💡 Recommendations")?;
        heavy_rule(f)?;

        if b.idle() > 0 {
            n += 1;
            writeln!(f, "{n}. Review {} dormant/inactive services for removal", b.idle())?;
            if let Some(range) = dormant_range(threshold) {
                writeln!(
                    f,
                    "   - Dormant: {} services with {range} inactivity",
                    b.dormant.len()
                )?;
            }
            writeln!(
                f,
                "   - Inactive: {} services with {}+ days inactivity",
                b.inactive.len(),
                threshold.max(ACTIVE_WINDOW_DAYS)
            )?;
            writeln!(f)?;
        }

        if !b.untracked.is_empty() {
            n += 1;
            writeln!(f, "{n}. Investigate {} untracked services", b.untracked.len())?;
            writeln!(f, "   - May be internal services without logging")?;
            writeln!(f, "   - May be legacy services no longer used")?;
            writeln!(f)?;
        }

        let active_percentage = percentage(b.active.len(), b.total());
        if active_percentage < LOW_ACTIVE_PERCENTAGE {
            n += 1;
            writeln!(
                f,
                "{n}. ⚠️  Only {active_percentage:.1}% of services are actively used"
            )?;
            writeln!(f, "   - Consider consolidating similar services")?;
            writeln!(f, "   - Archive or remove unused services")?;
            writeln!(f)?;
        }

        if n == 0 {
            writeln!(f, "No action needed: every service saw traffic recently.")?;
            writeln!(f)?;
        }

        Ok(())
    }

    fn write_cost_impact(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n💰 Estimated Cost Impact")?;
        heavy_rule(f)?;
        writeln!(f, "Dormant/Inactive services: {}", self.savings.idle_services)?;
        writeln!(
            f,
            "Estimated cost per idle service: ${:.2}/month",
            self.savings.per_service_monthly
        )?;
        writeln!(f, "Potential monthly savings: ${:.2}", self.savings.monthly())?;
        writeln!(f, "Annual savings: ${:.2}", self.savings.annual())?;
        writeln!(f)
    }

    fn write_next_steps(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n✅ Next Steps")?;
        heavy_rule(f)?;
        writeln!(f, "1. Review each dormant service and confirm if still needed")?;
        writeln!(f, "2. For services to remove:")?;
        writeln!(
            f,
            "   gcloud run services delete SERVICE_NAME --region={}",
            self.region
        )?;
        writeln!(f)?;
        writeln!(f, "3. For services to keep but reduce costs:")?;
        writeln!(
            f,
            "   gcloud run services update SERVICE_NAME --region={} --min-instances=0",
            self.region
        )?;
        writeln!(f)?;
        writeln!(f, "4. Export list for documentation:")?;
        writeln!(f, "   gcp-audit audit > audit_report.txt")?;
        writeln!(f)
    }
}

impl fmt::Display for ServiceAudit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n🔍 GCP Service Audit Report")?;
        heavy_rule(f)?;
        writeln!(f, "Generated: {}", self.generated_at)?;
        heavy_rule(f)?;
        writeln!(f)?;

        writeln!(f, "✓ Found {} Cloud Run services", self.breakdown.total())?;
        if !self.activity_available {
            writeln!(
                f,
                "⚠️  Could not query activity data - some services may not be tracked"
            )?;
        }

        self.write_summary(f)?;
        self.write_buckets(f)?;
        self.write_recommendations(f)?;
        self.write_cost_impact(f)?;
        self.write_next_steps(f)?;

        heavy_rule(f)?;
        writeln!(f, "✅ Audit Complete!")?;
        heavy_rule(f)
    }
}

//! Infrastructure cost analysis
//!
//! Seven sections, each backed by one tool call. A failing tool only blanks
//! its own section.

use gcp_audit_core::stats::{HEALTHY_CACHE_HIT_RATE, group_thousands};
use gcp_audit_core::{CachePerformance, ExpensiveRequest, ModelUsage, ServiceCost, ServiceSummary};
use gcp_audit_tools::{GcpTools, ToolError};
use std::fmt;
use tracing::warn;

use crate::{and_more, heavy_rule, section};

const COSTS_SHOWN: usize = 10;
const DORMANT_SHOWN: usize = 15;
const EXPENSIVE_SHOWN: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct CostSettings {
    pub region: String,
    pub overview_limit: usize,
    pub cost_window_days: u32,
    pub dormant_after_days: u32,
    pub cache_window_days: u32,
    pub model_window_days: u32,
    pub model_limit: usize,
    pub expensive_window_days: u32,
    pub expensive_min_cost: f64,
}

impl Default for CostSettings {
    fn default() -> Self {
        Self {
            region: "us-central1".to_string(),
            overview_limit: 10,
            cost_window_days: 7,
            dormant_after_days: 7,
            cache_window_days: 7,
            model_window_days: 30,
            model_limit: 10,
            expensive_window_days: 7,
            expensive_min_cost: 1.0,
        }
    }
}

/// Results of every tool the cost report calls
#[derive(Debug)]
pub struct CostAnalysis {
    pub settings: CostSettings,
    pub services: Result<Vec<ServiceSummary>, ToolError>,
    pub costs: Result<Vec<ServiceCost>, ToolError>,
    pub dormant: Result<Vec<String>, ToolError>,
    pub cache: Result<CachePerformance, ToolError>,
    pub models: Result<Vec<ModelUsage>, ToolError>,
    pub expensive: Result<Vec<ExpensiveRequest>, ToolError>,
}

/// Run every cost query in turn; never fails as a whole
#[must_use]
pub fn analyze_costs(tools: &GcpTools, settings: &CostSettings) -> CostAnalysis {
    CostAnalysis {
        services: logged(
            "service overview",
            tools.list_services(&settings.region, settings.overview_limit),
        ),
        costs: logged("service costs", tools.service_costs(settings.cost_window_days)),
        dormant: logged(
            "dormant services",
            tools.dormant_services(settings.dormant_after_days),
        ),
        cache: logged(
            "cache performance",
            tools.cache_performance(settings.cache_window_days),
        ),
        models: logged(
            "model usage",
            tools.top_models_usage(settings.model_window_days, settings.model_limit),
        ),
        expensive: logged(
            "expensive requests",
            tools.expensive_requests(settings.expensive_window_days, settings.expensive_min_cost),
        ),
        settings: settings.clone(),
    }
}

fn logged<T>(what: &str, result: Result<T, ToolError>) -> Result<T, ToolError> {
    if let Err(e) = &result {
        warn!(error = %e, "{what} unavailable");
    }
    result
}

impl CostAnalysis {
    /// One line per finding worth acting on
    #[must_use]
    pub fn recommendations(&self) -> Vec<String> {
        let mut out = Vec::new();

        if let Ok(dormant) = &self.dormant {
            if !dormant.is_empty() {
                out.push(format!(
                    "🔸 Review {} dormant services for potential decommissioning",
                    dormant.len()
                ));
            }
        }

        if let Ok(cache) = &self.cache {
            if cache.hit_rate < HEALTHY_CACHE_HIT_RATE {
                out.push(format!(
                    "🔸 Cache hit rate is {:.1}% - consider optimizing cache keys",
                    cache.hit_rate
                ));
            } else {
                out.push(format!(
                    "✅ Cache performance is good ({:.1}% hit rate)",
                    cache.hit_rate
                ));
            }
        }

        if let Some(top) = self.costs.as_ref().ok().and_then(|costs| costs.first()) {
            out.push(format!(
                "🔸 Top service cost: ${:.2} - review for optimization opportunities",
                top.total_cost
            ));
        }

        out
    }

    fn write_services(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        section(f, "📊 Cloud Run Services Overview")?;
        match &self.services {
            Ok(services) if !services.is_empty() => {
                writeln!(f, "Total services found: {}", services.len())?;
                writeln!(f, "\nFirst {} services:", self.settings.overview_limit)?;
                for svc in services.iter().take(self.settings.overview_limit) {
                    let status = if svc.ready { "✅" } else { "❌" };
                    writeln!(
                        f,
                        "  {status} {} - {}",
                        svc.name,
                        svc.url.as_deref().unwrap_or("N/A")
                    )?;
                }
                Ok(())
            }
            Ok(_) => writeln!(f, "❌ Error: no services found"),
            Err(e) => writeln!(f, "❌ Error: {e}"),
        }
    }

    fn write_costs(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        section(
            f,
            &format!("💰 Service Costs (Last {} Days)", self.settings.cost_window_days),
        )?;
        match &self.costs {
            Ok(costs) if !costs.is_empty() => {
                writeln!(f, "Found {} services with cost data:\n", costs.len())?;
                for (i, svc) in costs.iter().take(COSTS_SHOWN).enumerate() {
                    writeln!(f, "{:2}. {}", i + 1, svc.service_name)?;
                    writeln!(
                        f,
                        "    Cost: ${:.2} | Requests: {} | Avg Latency: {:.0}ms",
                        svc.total_cost,
                        group_thousands(svc.request_count),
                        svc.avg_latency
                    )?;
                }
                Ok(())
            }
            _ => writeln!(f, "⚠️  No cost data available (table may not exist yet)"),
        }
    }

    fn write_dormant(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        section(
            f,
            &format!(
                "💤 Dormant Services (No Traffic in {} Days)",
                self.settings.dormant_after_days
            ),
        )?;
        match &self.dormant {
            Ok(dormant) if !dormant.is_empty() => {
                writeln!(f, "Found {} dormant services:\n", dormant.len())?;
                for svc in dormant.iter().take(DORMANT_SHOWN) {
                    writeln!(f, "  • {svc}")?;
                }
                if dormant.len() > DORMANT_SHOWN {
                    writeln!(f)?;
                }
                and_more(f, DORMANT_SHOWN, dormant.len())
            }
            Ok(_) => writeln!(f, "✅ No dormant services found"),
            Err(_) => writeln!(f, "⚠️  Dormant service data not available"),
        }
    }

    fn write_cache(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        section(f, "🔄 Cache Performance")?;
        let Ok(cache) = &self.cache else {
            return writeln!(f, "⚠️  Cache data not available");
        };

        writeln!(f, "Total Requests:     {}", group_thousands(cache.total_requests))?;
        writeln!(f, "Cache Hits:         {}", group_thousands(cache.cache_hits))?;
        writeln!(f, "Hit Rate:           {:.1}%", cache.hit_rate)?;
        writeln!(f, "Total Savings:      ${:.2}", cache.total_savings_usd)?;
        writeln!(f, "Avg Cache Latency:  {:.0}ms", cache.avg_cache_latency)?;
        writeln!(f, "Avg Miss Latency:   {:.0}ms", cache.avg_miss_latency)?;
        if let Some(speedup) = cache.speedup() {
            writeln!(f, "Speedup Factor:     {speedup:.1}x faster with cache")?;
        }
        Ok(())
    }

    fn write_models(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        section(
            f,
            &format!(
                "🤖 Top AI Models Usage (Last {} Days)",
                self.settings.model_window_days
            ),
        )?;
        match &self.models {
            Ok(models) if !models.is_empty() => {
                writeln!(f, "Found {} models:\n", models.len())?;
                for (i, model) in models.iter().enumerate() {
                    writeln!(f, "{:2}. {}", i + 1, model.model)?;
                    writeln!(
                        f,
                        "    Cost: ${:.2} | Requests: {}",
                        model.total_cost_usd,
                        group_thousands(model.request_count)
                    )?;
                    writeln!(
                        f,
                        "    Tokens: {} in / {} out | Latency: {:.0}ms",
                        group_thousands(model.total_input_tokens),
                        group_thousands(model.total_output_tokens),
                        model.avg_latency_ms
                    )?;
                }
                Ok(())
            }
            _ => writeln!(f, "⚠️  Model usage data not available"),
        }
    }

    fn write_expensive(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let min_cost = self.settings.expensive_min_cost;
        section(
            f,
            &format!(
                "💸 Most Expensive Queries (Last {} Days)",
                self.settings.expensive_window_days
            ),
        )?;
        match &self.expensive {
            Ok(expensive) if expensive.is_empty() => {
                writeln!(f, "✅ No expensive queries found (all < ${min_cost:.2})")
            }
            Ok(expensive) => {
                writeln!(
                    f,
                    "Found {} expensive queries (>${min_cost:.2}):\n",
                    expensive.len()
                )?;
                for (i, req) in expensive.iter().take(EXPENSIVE_SHOWN).enumerate() {
                    writeln!(f, "{}. Model: {} | Cost: ${:.2}", i + 1, req.model, req.cost_usd)?;
                    writeln!(
                        f,
                        "   Tokens: {} in / {} out | {:.0}ms",
                        group_thousands(req.input_tokens),
                        group_thousands(req.output_tokens),
                        req.latency_ms
                    )?;
                }
                Ok(())
            }
            Err(_) => writeln!(f, "⚠️  Expensive query data not available"),
        }
    }

    fn write_summary(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        section(f, "📋 Summary & Recommendations")?;
        let recommendations = self.recommendations();
        if recommendations.is_empty() {
            writeln!(f, "  ℹ️  Insufficient data for recommendations")?;
        }
        for rec in recommendations {
            writeln!(f, "  {rec}")?;
        }
        Ok(())
    }
}

impl fmt::Display for CostAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n🚀 GCP Infrastructure Cost Analysis")?;
        heavy_rule(f)?;

        self.write_services(f)?;
        self.write_costs(f)?;
        self.write_dormant(f)?;
        self.write_cache(f)?;
        self.write_models(f)?;
        self.write_expensive(f)?;
        self.write_summary(f)?;

        writeln!(f)?;
        heavy_rule(f)?;
        writeln!(f, "✅ Analysis Complete!")?;
        heavy_rule(f)
    }
}

//! Console reports
//!
//! Each report is gathered into a plain struct first and rendered through
//! `Display`, so the text can be checked without touching a cloud.

pub mod audit;
pub mod costs;

pub use audit::{AuditSettings, ServiceAudit, audit_services};
pub use costs::{CostAnalysis, CostSettings, analyze_costs};

use gcp_audit_tools::ToolError;
use std::fmt;

/// Width of the horizontal rules
pub const WIDTH: usize = 70;

/// Error types for reports that cannot be produced at all
#[derive(thiserror::Error, Debug)]
pub enum ReportError {
    #[error("Error fetching services: {0}")]
    ListServices(#[source] ToolError),

    #[error("Error fetching services: no Cloud Run services found in {region}")]
    NoServices { region: String },
}

fn heavy_rule(f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "{}", "=".repeat(WIDTH))
}

fn light_rule(f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "{}", "─".repeat(WIDTH))
}

/// Title framed by heavy rules
fn section(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    writeln!(f)?;
    heavy_rule(f)?;
    writeln!(f, "  {title}")?;
    heavy_rule(f)?;
    writeln!(f)
}

/// Tail line for lists cut at `shown` entries
fn and_more(f: &mut fmt::Formatter<'_>, shown: usize, total: usize) -> fmt::Result {
    if total > shown {
        writeln!(f, "  ... and {} more", total - shown)?;
    }
    Ok(())
}

//! Service activity bands
//!
//! Every listed service lands in exactly one bucket: active, dormant,
//! inactive, or untracked when the request log has never seen it.

use serde::Serialize;
use std::collections::HashMap;

use crate::{ServiceActivity, ServiceSummary};

/// Services with a request in the last `ACTIVE_WINDOW_DAYS` days are active
pub const ACTIVE_WINDOW_DAYS: u64 = 7;

/// Default upper bound of the dormant band
pub const DEFAULT_DORMANCY_THRESHOLD_DAYS: u64 = 14;

/// Day count assumed for a tracked service whose last request is unknown
pub const UNKNOWN_DAYS_SINCE: u64 = 999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityBand {
    Active,
    Dormant,
    Inactive,
}

/// Place a day count into its band
///
/// `days <= 7` is active, `days <= threshold` dormant, anything older
/// inactive. A threshold below the active window leaves the dormant band
/// empty rather than shadowing active services.
#[must_use]
pub const fn classify(days_since_last_request: u64, dormancy_threshold_days: u64) -> ActivityBand {
    if days_since_last_request <= ACTIVE_WINDOW_DAYS {
        ActivityBand::Active
    } else if days_since_last_request <= dormancy_threshold_days {
        ActivityBand::Dormant
    } else {
        ActivityBand::Inactive
    }
}

/// A listed service joined with its activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedService {
    pub name: String,
    pub url: Option<String>,
    pub days_since_last_request: u64,
    pub request_count: u64,
}

/// A listed service absent from the request log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UntrackedService {
    pub name: String,
    pub url: Option<String>,
}

/// Services grouped by band, in listing order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivityBreakdown {
    pub dormancy_threshold_days: u64,
    pub active: Vec<TrackedService>,
    pub dormant: Vec<TrackedService>,
    pub inactive: Vec<TrackedService>,
    pub untracked: Vec<UntrackedService>,
}

impl ActivityBreakdown {
    /// Join the service listing with the activity rows and bucket each service
    #[must_use]
    pub fn categorize(
        services: &[ServiceSummary],
        activity: &[ServiceActivity],
        dormancy_threshold_days: u64,
    ) -> Self {
        let by_name: HashMap<&str, &ServiceActivity> = activity
            .iter()
            .map(|a| (a.service_name.as_str(), a))
            .collect();

        let mut breakdown = Self {
            dormancy_threshold_days,
            ..Self::default()
        };

        for service in services {
            let Some(seen) = by_name.get(service.name.as_str()) else {
                breakdown.untracked.push(UntrackedService {
                    name: service.name.clone(),
                    url: service.url.clone(),
                });
                continue;
            };

            let days = seen.days_since_last_request.unwrap_or(UNKNOWN_DAYS_SINCE);
            let tracked = TrackedService {
                name: service.name.clone(),
                url: service.url.clone(),
                days_since_last_request: days,
                request_count: seen.request_count,
            };
            match classify(days, dormancy_threshold_days) {
                ActivityBand::Active => breakdown.active.push(tracked),
                ActivityBand::Dormant => breakdown.dormant.push(tracked),
                ActivityBand::Inactive => breakdown.inactive.push(tracked),
            }
        }

        breakdown
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.active.len() + self.dormant.len() + self.inactive.len() + self.untracked.len()
    }

    /// Dormant plus inactive: the removal candidates
    #[must_use]
    pub fn idle(&self) -> usize {
        self.dormant.len() + self.inactive.len()
    }
}

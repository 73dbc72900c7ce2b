//! Report arithmetic

use serde::Serialize;

/// Assumed monthly cost of keeping one idle service around
/// (minimum instances, image storage and the like)
pub const DEFAULT_IDLE_SERVICE_MONTHLY_COST: f64 = 1.5;

/// Hit rates below this percentage are flagged for cache key tuning
pub const HEALTHY_CACHE_HIT_RATE: f64 = 50.0;

/// `part` as a percentage of `total`; zero when there is nothing to divide
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Miss latency over hit latency, when both are known
#[must_use]
pub fn speedup(miss_latency: f64, hit_latency: f64) -> Option<f64> {
    (miss_latency > 0.0 && hit_latency > 0.0).then(|| miss_latency / hit_latency)
}

/// Flat-rate estimate of what removing idle services saves
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SavingsEstimate {
    pub idle_services: usize,
    pub per_service_monthly: f64,
}

impl SavingsEstimate {
    #[must_use]
    pub const fn new(idle_services: usize, per_service_monthly: f64) -> Self {
        Self {
            idle_services,
            per_service_monthly,
        }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn monthly(&self) -> f64 {
        self.idle_services as f64 * self.per_service_monthly
    }

    #[must_use]
    pub fn annual(&self) -> f64 {
        self.monthly() * 12.0
    }
}

/// Thousands separators for counts, e.g. `12,345`
#[must_use]
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_percentage() {
        assert!((percentage(1, 4) - 25.0).abs() < 1e-9);
        assert!((percentage(3, 3) - 100.0).abs() < 1e-9);
        assert!(percentage(0, 0).abs() < f64::EPSILON);
        assert!(percentage(5, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_savings() {
        let estimate = SavingsEstimate::new(7, DEFAULT_IDLE_SERVICE_MONTHLY_COST);
        assert!((estimate.monthly() - 10.5).abs() < 1e-9);
        assert!((estimate.annual() - 126.0).abs() < 1e-9);
        assert!(SavingsEstimate::new(0, 1.5).annual().abs() < f64::EPSILON);
    }

    #[test]
    fn test_speedup() {
        assert_eq!(speedup(400.0, 40.0), Some(10.0));
        assert_eq!(speedup(400.0, 0.0), None);
        assert_eq!(speedup(0.0, 40.0), None);
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }

    proptest! {
        #[test]
        fn prop_percentage_within_bounds(total in 1usize..100_000, part_frac in 0.0f64..=1.0) {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
            let part = (total as f64 * part_frac) as usize;
            let pct = percentage(part, total);
            prop_assert!((0.0..=100.0).contains(&pct));
        }

        #[test]
        fn prop_annual_is_twelve_months(idle in 0usize..10_000, cost in 0.0f64..100.0) {
            let estimate = SavingsEstimate::new(idle, cost);
            prop_assert!((estimate.annual() - estimate.monthly() * 12.0).abs() < 1e-6);
        }

        #[test]
        fn prop_grouping_preserves_digits(n in any::<u64>()) {
            prop_assert_eq!(group_thousands(n).replace(',', ""), n.to_string());
        }
    }
}

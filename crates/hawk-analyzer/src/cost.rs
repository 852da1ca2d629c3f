//! Billing collector: month-to-date spend, prior-month fallback, forecast.

use chrono::{Datelike, Months, NaiveDate};
use hawk_cloud::{CloudProvider, CloudResult, CostPeriod, DateRange, Scope};
use hawk_proto::{CostBasis, CostSummary, round2};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Forecast used when the provider cannot produce one.
pub const FORECAST_GROWTH: f64 = 1.05;

/// Breakdown entries below this are noise.
pub const BREAKDOWN_FLOOR: f64 = 0.01;

pub fn month_start(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}

/// Month-to-date window; empty on the first of the month.
pub fn current_window(today: NaiveDate) -> DateRange {
    DateRange::new(month_start(today), today)
}

/// The full calendar month before `today`'s month.
pub fn prior_month_window(today: NaiveDate) -> DateRange {
    let end = month_start(today);
    let start = end.checked_sub_months(Months::new(1)).unwrap_or(end);
    DateRange::new(start, end)
}

/// From today through the end of next month.
pub fn forecast_window(today: NaiveDate) -> DateRange {
    let end = month_start(today)
        .checked_add_months(Months::new(2))
        .unwrap_or(today);
    DateRange::new(today, end)
}

/// `Amazon Elastic Compute Cloud - Compute` → `Elastic Compute Cloud - Compute`.
pub fn service_label(name: &str) -> String {
    name.strip_prefix("Amazon ")
        .or_else(|| name.strip_prefix("AWS "))
        .unwrap_or(name)
        .to_string()
}

pub fn breakdown(period: &CostPeriod) -> BTreeMap<String, f64> {
    let mut out = BTreeMap::new();
    for (service, amount) in &period.groups {
        if *amount < BREAKDOWN_FLOOR {
            continue;
        }
        *out.entry(service_label(service)).or_insert(0.0) += amount;
    }
    out.values_mut().for_each(|v| *v = round2(*v));
    out
}

pub async fn collect(
    provider: &dyn CloudProvider,
    scope: &Scope,
    today: NaiveDate,
) -> CloudResult<CostSummary> {
    let window = current_window(today);
    let mut period = if window.is_empty() {
        CostPeriod::default()
    } else {
        provider.cost_and_usage(scope, window).await?
    };
    let mut basis = CostBasis::MonthToDate;

    if period.amount() <= 0.0 {
        let prior = prior_month_window(today);
        match provider.cost_and_usage(scope, prior).await {
            Ok(last) if last.amount() > 0.0 => {
                info!(start = %prior.start, amount = last.amount(), "no spend this month yet, using prior month");
                period = last;
                basis = CostBasis::PriorMonth;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "prior month cost lookup failed"),
        }
    }

    let current = round2(period.amount());
    let (forecast, forecast_estimated) =
        match provider.cost_forecast(scope, forecast_window(today)).await {
            Ok(amount) => (round2(amount), false),
            Err(e) => {
                warn!(error = %e, "cost forecast unavailable, projecting from current spend");
                (round2(current * FORECAST_GROWTH), true)
            }
        };

    info!(current, forecast, basis = ?basis, "cost collected");
    Ok(CostSummary {
        current,
        forecast,
        forecast_estimated,
        breakdown: breakdown(&period),
        basis,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hawk_cloud::{FailureKind, FixtureCloud, FixtureOp};
    use hawk_proto::AwsCredentials;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn scope() -> Scope {
        Scope::new(AwsCredentials::new("AKIA", "secret"), "us-east-1")
    }

    fn period(groups: &[(&str, f64)]) -> CostPeriod {
        CostPeriod {
            total: None,
            groups: groups.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn test_windows() {
        let today = date(2026, 1, 15);
        assert_eq!(current_window(today), DateRange::new(date(2026, 1, 1), today));
        assert_eq!(
            prior_month_window(today),
            DateRange::new(date(2025, 12, 1), date(2026, 1, 1))
        );
        assert_eq!(forecast_window(today), DateRange::new(today, date(2026, 3, 1)));
        assert!(current_window(date(2026, 1, 1)).is_empty());
    }

    #[test]
    fn test_breakdown_labels_and_floor() {
        let b = breakdown(&period(&[
            ("Amazon Elastic Compute Cloud - Compute", 41.237),
            ("AWS Lambda", 0.004),
            ("Tax", 3.0),
        ]));
        assert_eq!(b.get("Elastic Compute Cloud - Compute"), Some(&41.24));
        assert!(!b.contains_key("Lambda"));
        assert_eq!(b.get("Tax"), Some(&3.0));
    }

    #[tokio::test]
    async fn test_month_to_date_with_forecast() {
        let today = date(2026, 3, 15);
        let cloud = FixtureCloud::default()
            .with_cost(date(2026, 3, 1), period(&[("Amazon EC2", 40.0), ("AWS Lambda", 2.5)]))
            .with_forecast(90.0);
        let summary = collect(&cloud, &scope(), today).await.unwrap();
        assert_eq!(summary.current, 42.5);
        assert_eq!(summary.forecast, 90.0);
        assert!(!summary.forecast_estimated);
        assert_eq!(summary.basis, CostBasis::MonthToDate);
    }

    #[tokio::test]
    async fn test_zero_month_falls_back_to_prior() {
        let today = date(2026, 3, 15);
        let cloud = FixtureCloud::default()
            .with_cost(date(2026, 3, 1), period(&[]))
            .with_cost(date(2026, 2, 1), period(&[("Amazon EC2", 120.0)]));
        let summary = collect(&cloud, &scope(), today).await.unwrap();
        assert_eq!(summary.current, 120.0);
        assert_eq!(summary.basis, CostBasis::PriorMonth);
        assert!(summary.forecast_estimated);
        assert_eq!(summary.forecast, 126.0);
    }

    #[tokio::test]
    async fn test_first_of_month_skips_empty_window() {
        let today = date(2026, 3, 1);
        let cloud = FixtureCloud::default().with_cost(date(2026, 2, 1), period(&[("Amazon EC2", 80.0)]));
        let summary = collect(&cloud, &scope(), today).await.unwrap();
        assert_eq!(summary.current, 80.0);
        assert_eq!(cloud.calls_of(FixtureOp::CostAndUsage).len(), 1);
    }

    #[tokio::test]
    async fn test_current_query_failure_propagates() {
        let cloud = FixtureCloud::default().fail(FixtureOp::CostAndUsage, FailureKind::AccessDenied);
        let err = collect(&cloud, &scope(), date(2026, 3, 15)).await.unwrap_err();
        assert!(err.is_access_denied());
    }
}

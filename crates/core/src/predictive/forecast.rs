//! Monthly revenue forecasting with Holt's linear exponential smoothing.
//!
//! With fewer than `min_history_months` revenue months the forecaster does not
//! model anything: it projects the last known month flat (or a configured base
//! when there is no history) and reports `ConfidenceBasis::Fallback`.
//!
//! Projected values are multiplied by a bounded random factor drawn from the
//! caller's RNG. The jitter only keeps dashboard charts from rendering as a
//! ruler line; it carries no statistical meaning. Disable it with
//! `ForecastConfig::jitter_enabled` when reproducible numbers matter.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::history::{month_label, shift_month, MonthlyRevenuePoint};
use super::tuning::ForecastConfig;
use super::Confidence;

/// Number of months to project, parsed from strings like `"6-months"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastHorizon(pub u32);

impl ForecastHorizon {
    /// Longest horizon accepted from callers and config.
    pub const MAX_MONTHS: u32 = 120;

    /// Reads the leading integer of `period`. Anything unparseable, including a
    /// negative count, is a zero-month horizon.
    pub fn parse(period: &str) -> Self {
        let digits: String = period.trim_start().chars().take_while(char::is_ascii_digit).collect();
        Self(digits.parse().unwrap_or(0))
    }

    pub fn months(&self) -> u32 {
        self.0
    }
}

/// One chart point: either a historical actual or a projection, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub month: String,
    pub historical: Option<f64>,
    pub predicted: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMethod {
    FlatFallback,
    HoltLinear,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueForecast {
    pub points: Vec<ForecastPoint>,
    pub method: ForecastMethod,
    pub horizon_months: u32,
    pub confidence: Confidence,
}

impl RevenueForecast {
    pub fn historical_points(&self) -> impl Iterator<Item = &ForecastPoint> {
        self.points.iter().filter(|point| point.historical.is_some())
    }

    pub fn predicted_points(&self) -> impl Iterator<Item = &ForecastPoint> {
        self.points.iter().filter(|point| point.predicted.is_some())
    }
}

/// Sum of the projected values of a forecast.
pub fn predict_revenue_advanced(forecast: &RevenueForecast) -> f64 {
    forecast.predicted_points().filter_map(|point| point.predicted).sum()
}

/// Final `(level, trend)` after running Holt's method over `values`.
///
/// Seeds `level = values[0]`, `trend = 0`.
pub fn holt_linear(values: &[f64], alpha: f64, beta: f64) -> (f64, f64) {
    let Some((&first, rest)) = values.split_first() else {
        return (0.0, 0.0);
    };

    rest.iter().fold((first, 0.0), |(level, trend), &value| {
        let next_level = alpha * value + (1.0 - alpha) * (level + trend);
        let next_trend = beta * (next_level - level) + (1.0 - beta) * trend;
        (next_level, next_trend)
    })
}

#[derive(Debug, Clone, Default)]
pub struct RevenueForecaster {
    config: ForecastConfig,
}

impl RevenueForecaster {
    pub fn new(config: ForecastConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    pub fn forecast<R: Rng + ?Sized>(
        &self,
        history: &[MonthlyRevenuePoint],
        horizon: ForecastHorizon,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> RevenueForecast {
        let mut points: Vec<ForecastPoint> = history
            .iter()
            .map(|point| ForecastPoint {
                month: point.label.clone(),
                historical: Some(point.revenue),
                predicted: None,
            })
            .collect();

        let anchor = history.last().map(|point| point.date).unwrap_or_else(|| now.date_naive());
        let revenues: Vec<f64> = history.iter().map(|point| point.revenue).collect();
        let months = horizon.months();

        let (method, confidence) = if revenues.len() < self.config.min_history_months {
            tracing::debug!(
                event_name = "analytics.forecast.fallback",
                history_months = revenues.len(),
                horizon_months = months,
                "insufficient revenue history; projecting flat"
            );
            let base = revenues.last().copied().unwrap_or(self.config.default_base_revenue);
            for step in 1..=months {
                let value = base * self.jitter(rng, self.config.fallback_jitter);
                points.push(projected_point(anchor, step, value.max(0.0)));
            }
            (ForecastMethod::FlatFallback, Confidence::fallback(revenues.len()))
        } else {
            let (level, trend) = holt_linear(&revenues, self.config.alpha, self.config.beta);
            for step in 1..=months {
                let value = (level + trend * f64::from(step)).max(0.0);
                let value = value * self.jitter(rng, self.config.projection_jitter);
                points.push(projected_point(anchor, step, value));
            }
            (ForecastMethod::HoltLinear, Confidence::observed(revenues.len()))
        };

        RevenueForecast { points, method, horizon_months: months, confidence }
    }

    fn jitter<R: Rng + ?Sized>(&self, rng: &mut R, half_width: f64) -> f64 {
        if !self.config.jitter_enabled || half_width <= 0.0 {
            return 1.0;
        }
        1.0 + rng.gen_range(-half_width..half_width)
    }
}

fn projected_point(anchor: NaiveDate, step: u32, value: f64) -> ForecastPoint {
    let (year, month) = shift_month(anchor.year(), anchor.month(), step as i32);
    let month = NaiveDate::from_ymd_opt(year, month, 1)
        .map(month_label)
        .unwrap_or_else(|| format!("+{step}m"));

    ForecastPoint { month, historical: None, predicted: Some(value) }
}

#[cfg(test)]
mod tests {
    use super::{holt_linear, predict_revenue_advanced, ForecastHorizon, ForecastMethod, RevenueForecaster};
    use crate::domain::opportunity::{OpportunityStatus, Stage};
    use crate::predictive::fixtures::{at, closed_deal, seeded_rng};
    use crate::predictive::history::HistoricalData;
    use crate::predictive::tuning::ForecastConfig;
    use crate::predictive::ConfidenceBasis;

    fn deterministic() -> RevenueForecaster {
        RevenueForecaster::new(ForecastConfig { jitter_enabled: false, ..ForecastConfig::default() })
    }

    #[test]
    fn horizon_parses_leading_integer() {
        assert_eq!(ForecastHorizon::parse("6-months").months(), 6);
        assert_eq!(ForecastHorizon::parse("12-months").months(), 12);
        assert_eq!(ForecastHorizon::parse(" 3 months").months(), 3);
        assert_eq!(ForecastHorizon::parse("months").months(), 0);
        assert_eq!(ForecastHorizon::parse("-4-months").months(), 0);
        assert_eq!(ForecastHorizon::parse("").months(), 0);
    }

    #[test]
    fn holt_tracks_linear_growth() {
        let (level, trend) = holt_linear(&[100.0, 110.0, 120.0, 130.0, 140.0], 0.3, 0.1);
        assert!(level > 100.0 && level < 140.0);
        assert!(trend > 0.0);
        assert_eq!(holt_linear(&[], 0.3, 0.1), (0.0, 0.0));
        assert_eq!(holt_linear(&[75.0], 0.3, 0.1), (75.0, 0.0));
    }

    #[test]
    fn empty_history_projects_default_base_flat() {
        let forecast = deterministic().forecast(&[], ForecastHorizon(3), at(2024, 6, 10), &mut seeded_rng(1));

        assert_eq!(forecast.method, ForecastMethod::FlatFallback);
        assert_eq!(forecast.confidence.basis, ConfidenceBasis::Fallback);
        assert_eq!(forecast.points.len(), 3);
        assert_eq!(forecast.points[0].month, "Jul 2024");
        assert!(forecast.points.iter().all(|point| point.predicted == Some(100_000.0)));
        assert_eq!(predict_revenue_advanced(&forecast), 300_000.0);
    }

    #[test]
    fn short_history_projects_last_known_revenue() {
        let deals = vec![
            closed_deal("feb", OpportunityStatus::Won, Stage::Proposal, 40_000.0, at(2023, 11, 1), at(2024, 2, 12)),
            closed_deal("mar", OpportunityStatus::Won, Stage::Proposal, 55_000.0, at(2023, 11, 1), at(2024, 3, 20)),
        ];
        let history = HistoricalData::partition(&deals);

        let forecast =
            deterministic().forecast(&history.monthly_revenue, ForecastHorizon(3), at(2024, 9, 1), &mut seeded_rng(4));

        assert_eq!(forecast.method, ForecastMethod::FlatFallback);
        assert_eq!(forecast.confidence.basis, ConfidenceBasis::Fallback);
        assert_eq!(forecast.confidence.sample_size, 2);
        assert_eq!(forecast.points.len(), 2 + 3);
        assert!(forecast.predicted_points().all(|point| point.predicted == Some(55_000.0)));

        let labels: Vec<&str> = forecast.points.iter().map(|point| point.month.as_str()).collect();
        assert_eq!(labels, ["Feb 2024", "Mar 2024", "Apr 2024", "May 2024", "Jun 2024"]);
    }

    #[test]
    fn fallback_jitter_stays_within_ten_percent() {
        let forecaster = RevenueForecaster::default();
        let forecast = forecaster.forecast(&[], ForecastHorizon(24), at(2024, 1, 1), &mut seeded_rng(7));

        for point in forecast.predicted_points() {
            let value = point.predicted.unwrap_or_default();
            assert!((90_000.0..=110_000.0).contains(&value), "{value} outside jitter band");
        }
    }

    #[test]
    fn smoothed_forecast_appends_projections_after_history() {
        let deals: Vec<_> = (1..=6)
            .map(|month| {
                closed_deal(
                    &format!("w{month}"),
                    OpportunityStatus::Won,
                    Stage::Proposal,
                    10_000.0 * f64::from(month),
                    at(2023, 12, 1),
                    at(2024, month, 10),
                )
            })
            .collect();
        let history = HistoricalData::partition(&deals);

        let forecast = deterministic().forecast(
            &history.monthly_revenue,
            ForecastHorizon::parse("6-months"),
            at(2024, 7, 1),
            &mut seeded_rng(3),
        );

        assert_eq!(forecast.method, ForecastMethod::HoltLinear);
        assert_eq!(forecast.points.len(), 6 + 6);
        assert!(forecast
            .points
            .iter()
            .all(|point| point.historical.is_some() != point.predicted.is_some()));
        assert_eq!(forecast.points[6].month, "Jul 2024");
        assert_eq!(forecast.points[11].month, "Dec 2024");

        let predicted: Vec<f64> = forecast.predicted_points().filter_map(|point| point.predicted).collect();
        assert!(predicted.windows(2).all(|pair| pair[1] >= pair[0]), "growing trend projects upward");
    }

    #[test]
    fn projections_are_floored_at_zero() {
        let deals: Vec<_> = [90_000.0, 40_000.0, 5_000.0, 1_000.0]
            .iter()
            .enumerate()
            .map(|(index, value)| {
                closed_deal(
                    &format!("d{index}"),
                    OpportunityStatus::Won,
                    Stage::Negotiation,
                    *value,
                    at(2023, 1, 1),
                    at(2024, index as u32 + 1, 5),
                )
            })
            .collect();
        let history = HistoricalData::partition(&deals);

        let forecast =
            deterministic().forecast(&history.monthly_revenue, ForecastHorizon(12), at(2024, 5, 1), &mut seeded_rng(9));
        assert!(forecast.predicted_points().all(|point| point.predicted.unwrap_or(-1.0) >= 0.0));
    }

    #[test]
    fn same_seed_yields_identical_forecast() {
        let forecaster = RevenueForecaster::default();
        let first = forecaster.forecast(&[], ForecastHorizon(6), at(2024, 1, 1), &mut seeded_rng(42));
        let second = forecaster.forecast(&[], ForecastHorizon(6), at(2024, 1, 1), &mut seeded_rng(42));
        assert_eq!(first, second);
    }
}

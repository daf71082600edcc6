//! Pattern detectors over the historical series.
//!
//! Each detector returns at most one finding; detectors that lack the data
//! they need stay silent instead of guessing.

use serde::{Deserialize, Serialize};

use super::history::{mean, std_dev, HistoricalData};
use super::tuning::InsightConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Positive,
    Warning,
    Opportunity,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightDetector {
    RevenueMomentum,
    StageBalance,
    RepVariance,
    DealSizeTrend,
    Seasonality,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    #[serde(rename = "type")]
    pub kind: InsightKind,
    pub detector: InsightDetector,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct InsightGenerator {
    config: InsightConfig,
}

impl InsightGenerator {
    pub fn new(config: InsightConfig) -> Self {
        Self { config }
    }

    pub fn generate(&self, history: &HistoricalData<'_>) -> Vec<Insight> {
        [
            self.revenue_momentum(history),
            self.stage_balance(history),
            self.rep_variance(history),
            self.deal_size_trend(history),
            self.seasonality(history),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Compares the last two trailing windows of revenue months.
    pub fn revenue_momentum(&self, history: &HistoricalData<'_>) -> Option<Insight> {
        let window = self.config.momentum_window_months;
        let series = &history.monthly_revenue;
        if series.len() < window * 2 {
            return None;
        }

        let tail = &series[series.len() - window * 2..];
        let prior: f64 = tail[..window].iter().map(|point| point.revenue).sum();
        let recent: f64 = tail[window..].iter().map(|point| point.revenue).sum();
        if prior <= 0.0 {
            return None;
        }

        let change = (recent - prior) / prior * 100.0;
        if change >= self.config.momentum_threshold_pct {
            Some(Insight {
                kind: InsightKind::Positive,
                detector: InsightDetector::RevenueMomentum,
                title: "Revenue momentum accelerating".to_string(),
                description: format!(
                    "Revenue over the last {window} months is up {change:.1}% on the {window} months before."
                ),
            })
        } else if change <= -self.config.momentum_threshold_pct {
            Some(Insight {
                kind: InsightKind::Warning,
                detector: InsightDetector::RevenueMomentum,
                title: "Revenue momentum slowing".to_string(),
                description: format!(
                    "Revenue over the last {window} months is down {:.1}% on the {window} months before.",
                    change.abs()
                ),
            })
        } else {
            None
        }
    }

    /// Share of open pipeline value sitting in Proposal or Negotiation.
    pub fn stage_balance(&self, history: &HistoricalData<'_>) -> Option<Insight> {
        let total: f64 = history.open.iter().map(|deal| deal.amount_f64()).sum();
        if total <= 0.0 {
            return None;
        }

        let late: f64 = history
            .open
            .iter()
            .filter(|deal| deal.stage.phase().is_late())
            .map(|deal| deal.amount_f64())
            .sum();
        let share = late / total;

        if share < self.config.late_stage_min_share {
            Some(Insight {
                kind: InsightKind::Warning,
                detector: InsightDetector::StageBalance,
                title: "Thin late-stage pipeline".to_string(),
                description: format!(
                    "Only {:.0}% of open pipeline value is in Proposal or Negotiation; near-term closes are at risk.",
                    share * 100.0
                ),
            })
        } else if share > self.config.late_stage_max_share {
            Some(Insight {
                kind: InsightKind::Opportunity,
                detector: InsightDetector::StageBalance,
                title: "Late-stage pipeline ready to close".to_string(),
                description: format!(
                    "{:.0}% of open pipeline value is in Proposal or Negotiation; focus on closing while refilling the top of the funnel.",
                    share * 100.0
                ),
            })
        } else {
            None
        }
    }

    /// Spread of win rates across reps with enough closed deals.
    pub fn rep_variance(&self, history: &HistoricalData<'_>) -> Option<Insight> {
        let reps: Vec<_> = history
            .rep_performance()
            .into_iter()
            .filter(|rep| rep.total >= self.config.rep_min_closed_deals)
            .collect();
        if reps.len() < 2 {
            return None;
        }

        let rates: Vec<f64> = reps.iter().map(|rep| rep.win_rate * 100.0).collect();
        let spread = std_dev(&rates);
        if spread <= self.config.rep_variance_threshold {
            return None;
        }

        let best = reps.iter().max_by(|left, right| left.win_rate.total_cmp(&right.win_rate))?;
        let worst = reps.iter().min_by(|left, right| left.win_rate.total_cmp(&right.win_rate))?;
        Some(Insight {
            kind: InsightKind::Warning,
            detector: InsightDetector::RepVariance,
            title: "Wide spread in rep performance".to_string(),
            description: format!(
                "Win rates vary by {spread:.1} points across reps; {} closes {:.0}% while {} closes {:.0}%.",
                best.rep,
                best.win_rate * 100.0,
                worst.rep,
                worst.win_rate * 100.0
            ),
        })
    }

    /// Average won deal size of the most recent share of wins against the rest.
    pub fn deal_size_trend(&self, history: &HistoricalData<'_>) -> Option<Insight> {
        let mut won: Vec<_> = history
            .won()
            .filter_map(|deal| deal.actual_close_date.map(|closed| (closed, deal.amount_f64())))
            .collect();
        if won.len() < self.config.deal_size_min_won.max(2) {
            return None;
        }
        won.sort_by_key(|(closed, _)| *closed);

        let split = ((won.len() as f64) * (1.0 - self.config.deal_size_recent_share)).round() as usize;
        let split = split.clamp(1, won.len() - 1);
        let earlier = mean(&won[..split].iter().map(|(_, amount)| *amount).collect::<Vec<_>>());
        let recent = mean(&won[split..].iter().map(|(_, amount)| *amount).collect::<Vec<_>>());
        if earlier <= 0.0 {
            return None;
        }

        let shift = (recent - earlier) / earlier * 100.0;
        if shift >= self.config.deal_size_shift_pct {
            Some(Insight {
                kind: InsightKind::Positive,
                detector: InsightDetector::DealSizeTrend,
                title: "Deal sizes growing".to_string(),
                description: format!(
                    "Recent wins average ${recent:.0}, {shift:.1}% above the earlier average of ${earlier:.0}."
                ),
            })
        } else if shift <= -self.config.deal_size_shift_pct {
            Some(Insight {
                kind: InsightKind::Warning,
                detector: InsightDetector::DealSizeTrend,
                title: "Deal sizes shrinking".to_string(),
                description: format!(
                    "Recent wins average ${recent:.0}, {:.1}% below the earlier average of ${earlier:.0}.",
                    shift.abs()
                ),
            })
        } else {
            None
        }
    }

    /// Coefficient of variation of quarterly revenue.
    pub fn seasonality(&self, history: &HistoricalData<'_>) -> Option<Insight> {
        let quarters = history.quarterly_revenue();
        if quarters.len() < self.config.seasonal_min_quarters {
            return None;
        }

        let revenues: Vec<f64> = quarters.iter().map(|quarter| quarter.revenue).collect();
        let average = mean(&revenues);
        if average <= 0.0 {
            return None;
        }

        let variation = std_dev(&revenues) / average;
        if variation <= self.config.seasonal_variation_threshold {
            return None;
        }

        let peak = quarters.iter().max_by(|left, right| left.revenue.total_cmp(&right.revenue))?;
        Some(Insight {
            kind: InsightKind::Info,
            detector: InsightDetector::Seasonality,
            title: "Seasonal revenue pattern".to_string(),
            description: format!(
                "Quarterly revenue varies by {:.0}% around its mean; the strongest quarter was {}.",
                variation * 100.0,
                peak.quarter
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::{InsightDetector, InsightGenerator, InsightKind};
    use crate::domain::opportunity::{Opportunity, OpportunityStatus, Stage};
    use crate::predictive::fixtures::{at, closed_deal, open_deal};
    use crate::predictive::history::HistoricalData;

    fn monthly_wins(revenues: &[f64]) -> Vec<Opportunity> {
        revenues
            .iter()
            .enumerate()
            .map(|(index, revenue)| {
                let month = index as u32 % 12 + 1;
                let year = 2023 + index as i32 / 12;
                closed_deal(&format!("m{index}"), OpportunityStatus::Won, Stage::Proposal, *revenue, at(2022, 6, 1), at(year, month, 10))
            })
            .collect()
    }

    #[test]
    fn empty_history_yields_no_insights() {
        let history = HistoricalData::partition(&[]);
        assert!(InsightGenerator::default().generate(&history).is_empty());
    }

    #[test]
    fn momentum_reports_acceleration_and_slowdown() {
        let generator = InsightGenerator::default();

        let rising = monthly_wins(&[100.0, 100.0, 100.0, 130.0, 130.0, 130.0]);
        let insight = generator.revenue_momentum(&HistoricalData::partition(&rising)).expect("30% rise");
        assert_eq!(insight.kind, InsightKind::Positive);

        let falling = monthly_wins(&[100.0, 100.0, 100.0, 80.0, 80.0, 80.0]);
        let insight = generator.revenue_momentum(&HistoricalData::partition(&falling)).expect("20% drop");
        assert_eq!(insight.kind, InsightKind::Warning);

        let flat = monthly_wins(&[100.0, 100.0, 100.0, 110.0, 110.0, 110.0]);
        assert!(generator.revenue_momentum(&HistoricalData::partition(&flat)).is_none());

        let short = monthly_wins(&[100.0, 500.0, 900.0]);
        assert!(generator.revenue_momentum(&HistoricalData::partition(&short)).is_none());
    }

    #[test]
    fn stage_balance_flags_thin_and_heavy_late_pipeline() {
        let now = at(2024, 6, 1);
        let generator = InsightGenerator::default();

        let thin = vec![
            open_deal("a", Stage::Lead, 90_000.0, now - Duration::days(5)),
            open_deal("b", Stage::Negotiation, 10_000.0, now - Duration::days(5)),
        ];
        let insight = generator.stage_balance(&HistoricalData::partition(&thin)).expect("10% late");
        assert_eq!(insight.kind, InsightKind::Warning);

        let heavy = vec![
            open_deal("a", Stage::Lead, 40_000.0, now - Duration::days(5)),
            open_deal("b", Stage::Proposal, 60_000.0, now - Duration::days(5)),
        ];
        let insight = generator.stage_balance(&HistoricalData::partition(&heavy)).expect("60% late");
        assert_eq!(insight.kind, InsightKind::Opportunity);

        let even = vec![
            open_deal("a", Stage::Discovery, 70_000.0, now - Duration::days(5)),
            open_deal("b", Stage::Proposal, 30_000.0, now - Duration::days(5)),
        ];
        assert!(generator.stage_balance(&HistoricalData::partition(&even)).is_none());
    }

    #[test]
    fn rep_variance_needs_two_qualified_reps() {
        let mut deals = Vec::new();
        for index in 0..6 {
            let mut ace = closed_deal(&format!("ace{index}"), OpportunityStatus::Won, Stage::Proposal, 1_000.0, at(2024, 1, 1), at(2024, 2, 1));
            ace.assigned_rep = "ace".to_string();
            let mut cold = closed_deal(&format!("cold{index}"), OpportunityStatus::Lost, Stage::Proposal, 1_000.0, at(2024, 1, 1), at(2024, 2, 1));
            cold.assigned_rep = "cold".to_string();
            deals.extend([ace, cold]);
        }

        let generator = InsightGenerator::default();
        let insight = generator.rep_variance(&HistoricalData::partition(&deals)).expect("100 vs 0 spread");
        assert_eq!(insight.detector, InsightDetector::RepVariance);
        assert!(insight.description.contains("ace"));

        let solo: Vec<Opportunity> = deals.into_iter().filter(|deal| deal.assigned_rep == "ace").collect();
        assert!(generator.rep_variance(&HistoricalData::partition(&solo)).is_none());
    }

    #[test]
    fn deal_size_trend_compares_recent_wins() {
        let generator = InsightGenerator::default();

        let growing = monthly_wins(&[100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 150.0, 150.0, 150.0]);
        let insight = generator.deal_size_trend(&HistoricalData::partition(&growing)).expect("50% growth");
        assert_eq!(insight.kind, InsightKind::Positive);

        let steady = monthly_wins(&[100.0; 10]);
        assert!(generator.deal_size_trend(&HistoricalData::partition(&steady)).is_none());

        let too_few = monthly_wins(&[100.0, 400.0]);
        assert!(generator.deal_size_trend(&HistoricalData::partition(&too_few)).is_none());
    }

    #[test]
    fn seasonality_flags_volatile_quarters() {
        let generator = InsightGenerator::default();

        // Q1 heavy, Q2-Q4 light, two years.
        let mut revenues = Vec::new();
        for _ in 0..2 {
            revenues.extend([1_000.0, 1_000.0, 1_000.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0]);
        }
        let volatile = monthly_wins(&revenues);
        let insight = generator.seasonality(&HistoricalData::partition(&volatile)).expect("Q1 spike");
        assert_eq!(insight.kind, InsightKind::Info);
        assert!(insight.description.contains("Q1"));

        let smooth = monthly_wins(&[100.0; 12]);
        assert!(generator.seasonality(&HistoricalData::partition(&smooth)).is_none());
    }
}

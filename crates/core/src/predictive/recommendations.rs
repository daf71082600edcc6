//! Rule-based recommendations. Priority, impact and effort are fixed per rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::history::HistoricalData;
use super::tuning::RecommendationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rating {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    StaleDeals,
    RepCoaching,
    PipelineGeneration,
    StageProgression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub action: String,
    pub reason: String,
    pub priority: Rating,
    pub impact: Rating,
    pub effort: Rating,
}

#[derive(Debug, Clone, Default)]
pub struct RecommendationEngine {
    config: RecommendationConfig,
}

impl RecommendationEngine {
    pub fn new(config: RecommendationConfig) -> Self {
        Self { config }
    }

    pub fn generate(&self, history: &HistoricalData<'_>, now: DateTime<Utc>) -> Vec<Recommendation> {
        [
            self.stale_deals(history, now),
            self.rep_coaching(history),
            self.pipeline_generation(history),
            self.stage_progression(history),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn stale_deals(&self, history: &HistoricalData<'_>, now: DateTime<Utc>) -> Option<Recommendation> {
        let stale: Vec<_> =
            history.open.iter().filter(|deal| deal.age_days(now) > self.config.stale_days).collect();
        if stale.is_empty() {
            return None;
        }

        let value: f64 = stale.iter().map(|deal| deal.amount_f64()).sum();
        Some(Recommendation {
            kind: RecommendationKind::StaleDeals,
            action: format!("Review {} stale deals", stale.len()),
            reason: format!(
                "{} open deals worth ${value:.0} have been open longer than {} days.",
                stale.len(),
                self.config.stale_days
            ),
            priority: Rating::High,
            impact: Rating::High,
            effort: Rating::Medium,
        })
    }

    fn rep_coaching(&self, history: &HistoricalData<'_>) -> Option<Recommendation> {
        let struggling: Vec<String> = history
            .rep_performance()
            .into_iter()
            .filter(|rep| {
                rep.total >= self.config.coaching_min_deals && rep.win_rate < self.config.coaching_win_rate
            })
            .map(|rep| rep.rep)
            .collect();
        if struggling.is_empty() {
            return None;
        }

        Some(Recommendation {
            kind: RecommendationKind::RepCoaching,
            action: format!("Schedule deal coaching for {}", struggling.join(", ")),
            reason: format!(
                "Win rate below {:.0}% across at least {} closed deals.",
                self.config.coaching_win_rate * 100.0,
                self.config.coaching_min_deals
            ),
            priority: Rating::Medium,
            impact: Rating::Medium,
            effort: Rating::Medium,
        })
    }

    fn pipeline_generation(&self, history: &HistoricalData<'_>) -> Option<Recommendation> {
        let quarterly = history.average_quarterly_revenue();
        if quarterly <= 0.0 {
            return None;
        }

        let pipeline: f64 = history.open.iter().map(|deal| deal.amount_f64()).sum();
        let target = self.config.pipeline_coverage_multiple * quarterly;
        if pipeline >= target {
            return None;
        }

        Some(Recommendation {
            kind: RecommendationKind::PipelineGeneration,
            action: "Increase pipeline generation".to_string(),
            reason: format!(
                "Open pipeline of ${pipeline:.0} covers {:.1}x average quarterly revenue; target is {:.1}x (${target:.0}).",
                pipeline / quarterly,
                self.config.pipeline_coverage_multiple
            ),
            priority: Rating::High,
            impact: Rating::High,
            effort: Rating::High,
        })
    }

    fn stage_progression(&self, history: &HistoricalData<'_>) -> Option<Recommendation> {
        let total = history.open.len();
        if total == 0 {
            return None;
        }

        let early = history.open.iter().filter(|deal| deal.stage.phase().is_early()).count();
        let share = early as f64 / total as f64;
        if share <= self.config.early_stage_share {
            return None;
        }

        Some(Recommendation {
            kind: RecommendationKind::StageProgression,
            action: "Advance early-stage deals".to_string(),
            reason: format!(
                "{:.0}% of open deals are still in Lead or Qualified.",
                share * 100.0
            ),
            priority: Rating::Medium,
            impact: Rating::Medium,
            effort: Rating::Low,
        })
    }
}

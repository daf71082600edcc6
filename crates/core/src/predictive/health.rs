//! Pipeline health scoring.
//!
//! Score = base + pipeline size + conversion + velocity + stage balance,
//! clamped to `[0, 100]`.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::history::{mean, HistoricalData};
use super::tuning::{HealthConfig, StatusBands};
use super::Confidence;
use crate::domain::opportunity::{FunnelPhase, OpportunityId, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Critical,
    #[serde(rename = "At Risk")]
    AtRisk,
    Good,
    Excellent,
}

impl HealthStatus {
    pub fn from_score(score: u8, bands: &StatusBands) -> Self {
        if score >= bands.excellent_from {
            Self::Excellent
        } else if score >= bands.good_from {
            Self::Good
        } else if score >= bands.at_risk_from {
            Self::AtRisk
        } else {
            Self::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "Critical",
            Self::AtRisk => "At Risk",
            Self::Good => "Good",
            Self::Excellent => "Excellent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageVelocity {
    pub stage: Stage,
    pub avg_days_to_close: f64,
    pub sample_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRate {
    pub stage: Stage,
    pub won: usize,
    pub total: usize,
    pub win_rate_pct: f64,
}

/// Inputs and per-term contributions behind a health score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthMetrics {
    pub open_deals: usize,
    pub pipeline_value: f64,
    pub avg_conversion_rate_pct: f64,
    pub avg_velocity_days: Option<f64>,
    /// Sum of absolute share differences against the ideal phase distribution, in `[0, 2]`.
    pub stage_balance_deviation: f64,
    pub pipeline_points: f64,
    pub conversion_points: f64,
    pub velocity_points: f64,
    pub balance_points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub health_score: u8,
    pub status: HealthStatus,
    pub at_risk_deals: usize,
    pub at_risk_deal_ids: Vec<OpportunityId>,
    pub stage_velocity: Vec<StageVelocity>,
    pub conversion_rates: Vec<ConversionRate>,
    pub health_metrics: HealthMetrics,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineHealthAnalyzer {
    config: HealthConfig,
}

impl PipelineHealthAnalyzer {
    pub fn new(config: HealthConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, history: &HistoricalData<'_>, now: DateTime<Utc>) -> HealthReport {
        let stage_velocity = stage_velocity(history);
        let conversion_rates: Vec<ConversionRate> = history
            .stage_statistics()
            .into_iter()
            .map(|stats| ConversionRate {
                stage: stats.stage,
                won: stats.won,
                total: stats.total,
                win_rate_pct: stats.win_rate * 100.0,
            })
            .collect();

        let open_deals = history.open.len();
        let pipeline_value: f64 = history.open.iter().map(|deal| deal.amount_f64()).sum();
        let avg_conversion_rate_pct =
            mean(&conversion_rates.iter().map(|rate| rate.win_rate_pct).collect::<Vec<_>>());
        let avg_velocity_days = (!stage_velocity.is_empty()).then(|| {
            mean(&stage_velocity.iter().map(|velocity| velocity.avg_days_to_close).collect::<Vec<_>>())
        });
        let stage_balance_deviation = self.balance_deviation(history);

        let pipeline_points = (open_deals as f64 / self.config.target_open_deals).min(1.0)
            * self.config.pipeline_weight;
        let conversion_points =
            (avg_conversion_rate_pct / 100.0).clamp(0.0, 1.0) * self.config.conversion_weight;
        let velocity_points = avg_velocity_days.map_or(0.0, |days| self.velocity_points(days));
        let balance_points = if open_deals == 0 {
            0.0
        } else {
            self.config.balance_weight - self.config.balance_penalty * stage_balance_deviation
        };

        let health_score = (self.config.base_score
            + pipeline_points
            + conversion_points
            + velocity_points
            + balance_points)
            .clamp(0.0, 100.0)
            .round() as u8;

        let velocity_by_stage: HashMap<Stage, f64> =
            stage_velocity.iter().map(|velocity| (velocity.stage, velocity.avg_days_to_close)).collect();
        let at_risk_deal_ids: Vec<OpportunityId> = history
            .open
            .iter()
            .filter(|deal| {
                let age = deal.age_days(now);
                let stalled = velocity_by_stage
                    .get(&deal.stage)
                    .is_some_and(|avg| *avg > 0.0 && age as f64 > self.config.stalled_multiplier * avg);
                let oversized = deal.amount_f64() > self.config.large_deal_amount
                    && age > self.config.large_deal_age_days;
                stalled || oversized
            })
            .map(|deal| deal.id.clone())
            .collect();

        let confidence = if stage_velocity.is_empty() {
            Confidence::fallback(history.closed.len())
        } else {
            Confidence::observed(history.closed.len())
        };

        tracing::debug!(
            event_name = "analytics.health.scored",
            health_score,
            open_deals,
            at_risk = at_risk_deal_ids.len(),
            "pipeline health computed"
        );

        HealthReport {
            health_score,
            status: HealthStatus::from_score(health_score, &self.config.status_bands),
            at_risk_deals: at_risk_deal_ids.len(),
            at_risk_deal_ids,
            stage_velocity,
            conversion_rates,
            health_metrics: HealthMetrics {
                open_deals,
                pipeline_value,
                avg_conversion_rate_pct,
                avg_velocity_days,
                stage_balance_deviation,
                pipeline_points,
                conversion_points,
                velocity_points,
                balance_points,
            },
            confidence,
        }
    }

    fn velocity_points(&self, days: f64) -> f64 {
        let config = &self.config;
        if days < config.fast_velocity_days {
            config.fast_velocity_points
        } else if days < config.steady_velocity_days {
            config.steady_velocity_points
        } else if days > config.stalled_velocity_days {
            config.stalled_velocity_points
        } else if days > config.slow_velocity_days {
            config.slow_velocity_points
        } else {
            0.0
        }
    }

    fn balance_deviation(&self, history: &HistoricalData<'_>) -> f64 {
        let total = history.open.len();
        if total == 0 {
            return 0.0;
        }

        let mut counts: HashMap<FunnelPhase, usize> = HashMap::new();
        for deal in &history.open {
            *counts.entry(deal.stage.phase()).or_default() += 1;
        }

        FunnelPhase::ALL
            .iter()
            .map(|phase| {
                let actual = counts.get(phase).copied().unwrap_or(0) as f64 / total as f64;
                (actual - self.config.ideal_distribution.get(*phase)).abs()
            })
            .sum()
    }
}

fn stage_velocity(history: &HistoricalData<'_>) -> Vec<StageVelocity> {
    let mut days_by_stage: BTreeMap<Stage, Vec<f64>> = BTreeMap::new();
    for deal in &history.closed {
        if let Some(days) = deal.days_to_close() {
            days_by_stage.entry(deal.stage).or_default().push(days as f64);
        }
    }

    days_by_stage
        .into_iter()
        .map(|(stage, days)| StageVelocity {
            stage,
            avg_days_to_close: mean(&days),
            sample_size: days.len(),
        })
        .collect()
}

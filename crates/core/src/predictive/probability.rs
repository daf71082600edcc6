//! Win-probability scoring for open opportunities.
//!
//! With enough closed history each open deal runs through an ordered
//! ensemble: stage base rate, rep performance, deal size, seasonality, age
//! decay and competitive overlap. Each step multiplies the running
//! probability; the result is clamped to the configured floor/ceiling and
//! rounded. Below `min_closed_deals` the scorer falls back to the static stage
//! table, optionally spread by `0.5 + U[0,1)` noise, and flags the report as a
//! fallback.
//!
//! Risk scores are a separate additive scale and do not feed the probability.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::history::{mean, rep_key, HistoricalData, RepPerformance, StageStatistic};
use super::tuning::ProbabilityConfig;
use super::Confidence;
use crate::domain::opportunity::{Opportunity, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

/// Multipliers applied to one opportunity, in application order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityFactors {
    /// Starting probability in percent.
    pub stage_base: f64,
    pub rep: f64,
    pub deal_size: f64,
    pub seasonal: f64,
    pub age_decay: f64,
    pub competitive: f64,
    /// Fallback spread; 1.0 on the ensemble path.
    pub noise: f64,
}

impl ProbabilityFactors {
    fn neutral(stage_base: f64) -> Self {
        Self {
            stage_base,
            rep: 1.0,
            deal_size: 1.0,
            seasonal: 1.0,
            age_decay: 1.0,
            competitive: 1.0,
            noise: 1.0,
        }
    }

    pub fn raw_probability(&self) -> f64 {
        self.stage_base
            * self.rep
            * self.deal_size
            * self.seasonal
            * self.age_decay
            * self.competitive
            * self.noise
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredOpportunity {
    #[serde(flatten)]
    pub opportunity: Opportunity,
    /// Win probability in percent, within the configured floor and ceiling.
    pub probability: u8,
    pub risk_level: RiskLevel,
    pub risk_score: u8,
    pub factors: ProbabilityFactors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMethod {
    StageTable,
    Ensemble,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealProbabilityReport {
    /// Open deals sorted by non-increasing probability.
    pub deals: Vec<ScoredOpportunity>,
    pub method: ScoringMethod,
    pub confidence: Confidence,
}

impl DealProbabilityReport {
    /// Sum of win probabilities, i.e. the number of deals expected to close won.
    pub fn expected_wins(&self) -> f64 {
        self.deals.iter().map(|deal| f64::from(deal.probability) / 100.0).sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DealProbabilityScorer {
    config: ProbabilityConfig,
}

impl DealProbabilityScorer {
    pub fn new(config: ProbabilityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProbabilityConfig {
        &self.config
    }

    pub fn score<R: Rng + ?Sized>(
        &self,
        opportunities: &[Opportunity],
        history: &HistoricalData<'_>,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> DealProbabilityReport {
        let context = ScoringContext::build(opportunities, history);
        let closed_count = history.closed.len();

        let (mut deals, method, confidence) = if closed_count < self.config.min_closed_deals {
            tracing::debug!(
                event_name = "analytics.probability.fallback",
                closed_deals = closed_count,
                required = self.config.min_closed_deals,
                "insufficient closed history; using stage table"
            );
            let deals = history
                .open
                .iter()
                .map(|opportunity| {
                    let mut factors =
                        ProbabilityFactors::neutral(self.config.base_probability.get(opportunity.stage));
                    if self.config.fallback_noise {
                        factors.noise = 0.5 + rng.gen::<f64>();
                    }
                    self.finish(opportunity, factors, &context, now)
                })
                .collect::<Vec<_>>();
            (deals, ScoringMethod::StageTable, Confidence::fallback(closed_count))
        } else {
            let deals = history
                .open
                .iter()
                .map(|opportunity| {
                    let factors = self.ensemble_factors(opportunity, &context, now);
                    self.finish(opportunity, factors, &context, now)
                })
                .collect::<Vec<_>>();
            (deals, ScoringMethod::Ensemble, Confidence::observed(closed_count))
        };

        deals.sort_by(|left, right| right.probability.cmp(&left.probability));

        DealProbabilityReport { deals, method, confidence }
    }

    fn ensemble_factors(
        &self,
        opportunity: &Opportunity,
        context: &ScoringContext,
        now: DateTime<Utc>,
    ) -> ProbabilityFactors {
        ProbabilityFactors {
            stage_base: self.stage_base(opportunity.stage, context),
            rep: self.rep_factor(opportunity, context),
            deal_size: self.deal_size_factor(opportunity.amount_f64(), context),
            seasonal: self.seasonal_factor(opportunity, context),
            age_decay: self.age_decay_factor(opportunity.age_days(now)),
            competitive: self.competitive_factor(opportunity, context),
            noise: 1.0,
        }
    }

    fn finish(
        &self,
        opportunity: &Opportunity,
        factors: ProbabilityFactors,
        context: &ScoringContext,
        now: DateTime<Utc>,
    ) -> ScoredOpportunity {
        let probability = factors
            .raw_probability()
            .clamp(self.config.probability_floor, self.config.probability_ceiling)
            .round() as u8;
        let risk_score = self.risk_score(opportunity, context, now);

        ScoredOpportunity {
            opportunity: opportunity.clone(),
            probability,
            risk_level: self.risk_level(risk_score),
            risk_score,
            factors,
        }
    }

    /// Observed stage win rate blended toward the static table by sample size.
    fn stage_base(&self, stage: Stage, context: &ScoringContext) -> f64 {
        let table = self.config.base_probability.get(stage);
        let Some(stats) = context.stages.get(&stage).filter(|stats| stats.total > 0) else {
            return table;
        };

        let confidence = (stats.total as f64 / self.config.full_confidence_samples).min(1.0);
        confidence * stats.win_rate * 100.0 + (1.0 - confidence) * table
    }

    fn rep_factor(&self, opportunity: &Opportunity, context: &ScoringContext) -> f64 {
        let Some(rep) = context.reps.get(&rep_key(&opportunity.assigned_rep)) else {
            return 1.0;
        };
        if rep.total < self.config.rep_min_closed_deals || context.overall_win_rate <= 0.0 {
            return 1.0;
        }

        (rep.win_rate / context.overall_win_rate)
            .clamp(self.config.rep_factor_min, self.config.rep_factor_max)
    }

    fn deal_size_factor(&self, amount: f64, context: &ScoringContext) -> f64 {
        let Some((q1, q3)) = context.quartiles else {
            return 1.0;
        };
        if q3 <= 0.0 {
            return 1.0;
        }

        let bands = &self.config.deal_size;
        if amount > bands.extreme_q3_multiple * q3 {
            bands.extreme_factor
        } else if amount > bands.large_q3_multiple * q3 {
            bands.large_factor
        } else if amount > q3 {
            bands.above_q3_factor
        } else if amount < bands.tiny_q1_fraction * q1 {
            bands.tiny_factor
        } else if amount < q1 {
            bands.below_q1_factor
        } else {
            1.0
        }
    }

    fn seasonal_factor(&self, opportunity: &Opportunity, context: &ScoringContext) -> f64 {
        let Some(projected) = opportunity.proj_close_date else {
            return 1.0;
        };
        if context.overall_win_rate <= 0.0 {
            return 1.0;
        }

        let (won, total) = context.monthly_outcomes[projected.month0() as usize];
        if total < self.config.seasonal_min_samples {
            return 1.0;
        }

        let month_rate = won as f64 / total as f64;
        (month_rate / context.overall_win_rate)
            .clamp(self.config.seasonal_factor_min, self.config.seasonal_factor_max)
    }

    fn age_decay_factor(&self, age_days: i64) -> f64 {
        if let Some(band) = self.config.age_decay.iter().find(|band| age_days > band.older_than_days) {
            return band.factor;
        }
        if age_days < self.config.fresh_days {
            self.config.fresh_factor
        } else {
            1.0
        }
    }

    fn competitive_factor(&self, opportunity: &Opportunity, context: &ScoringContext) -> f64 {
        let company = company_key(&opportunity.company_name);
        if company.is_empty() {
            return 1.0;
        }
        match context.open_companies.get(&company) {
            Some(count) if *count > 1 => self.config.competitive_overlap_factor,
            _ => 1.0,
        }
    }

    fn risk_score(&self, opportunity: &Opportunity, context: &ScoringContext, now: DateTime<Utc>) -> u8 {
        let risk = &self.config.risk;
        let mut score = risk.base;

        let age = opportunity.age_days(now);
        if age > risk.stale_days {
            score += risk.stale_points;
        } else if age > risk.aging_days {
            score += risk.aging_points;
        }

        if context.average_amount > 0.0 {
            let amount = opportunity.amount_f64();
            if amount > risk.huge_amount_multiple * context.average_amount {
                score += risk.huge_amount_points;
            } else if amount > risk.large_amount_multiple * context.average_amount {
                score += risk.large_amount_points;
            }
        }

        if let Some(rep) = context.reps.get(&rep_key(&opportunity.assigned_rep)) {
            if rep.total >= self.config.rep_min_closed_deals {
                if rep.win_rate > risk.strong_rep_win_rate {
                    score -= risk.rep_points;
                } else if rep.win_rate < risk.weak_rep_win_rate {
                    score += risk.rep_points;
                }
            }
        }

        score += risk.stage_points.get(opportunity.stage);
        score.clamp(0.0, 100.0).round() as u8
    }

    fn risk_level(&self, risk_score: u8) -> RiskLevel {
        let score = f64::from(risk_score);
        if score < self.config.risk.low_below {
            RiskLevel::Low
        } else if score > self.config.risk.high_above {
            RiskLevel::High
        } else {
            RiskLevel::Medium
        }
    }
}

/// Aggregates computed once per scoring pass.
struct ScoringContext {
    stages: HashMap<Stage, StageStatistic>,
    reps: HashMap<String, RepPerformance>,
    overall_win_rate: f64,
    quartiles: Option<(f64, f64)>,
    /// (won, total) closed deals per calendar month of close, January first.
    monthly_outcomes: [(usize, usize); 12],
    average_amount: f64,
    open_companies: HashMap<String, usize>,
}

impl ScoringContext {
    fn build(opportunities: &[Opportunity], history: &HistoricalData<'_>) -> Self {
        let stages = history.stage_statistics().into_iter().map(|stats| (stats.stage, stats)).collect();
        let reps = history.rep_performance().into_iter().map(|rep| (rep.rep.clone(), rep)).collect();

        let mut closed_amounts: Vec<f64> = history.closed.iter().map(|deal| deal.amount_f64()).collect();
        closed_amounts.sort_by(f64::total_cmp);
        let quartiles = (!closed_amounts.is_empty())
            .then(|| (quantile(&closed_amounts, 0.25), quantile(&closed_amounts, 0.75)));

        let mut monthly_outcomes = [(0usize, 0usize); 12];
        for deal in &history.closed {
            if let Some(closed_at) = deal.actual_close_date {
                let slot = &mut monthly_outcomes[closed_at.month0() as usize];
                slot.1 += 1;
                if deal.is_won() {
                    slot.0 += 1;
                }
            }
        }

        let amounts: Vec<f64> = opportunities.iter().map(Opportunity::amount_f64).collect();

        let mut open_companies: HashMap<String, usize> = HashMap::new();
        for deal in &history.open {
            let company = company_key(&deal.company_name);
            if !company.is_empty() {
                *open_companies.entry(company).or_default() += 1;
            }
        }

        Self {
            stages,
            reps,
            overall_win_rate: history.overall_win_rate(),
            quartiles,
            monthly_outcomes,
            average_amount: mean(&amounts),
            open_companies,
        }
    }
}

/// Lower-index quantile of an ascending slice.
fn quantile(sorted: &[f64], fraction: f64) -> f64 {
    let index = ((sorted.len() as f64 * fraction).floor() as usize).min(sorted.len().saturating_sub(1));
    sorted.get(index).copied().unwrap_or(0.0)
}

fn company_key(name: &str) -> String {
    name.trim().to_lowercase()
}

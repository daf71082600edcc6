//! Tunable tables and thresholds for the predictive engine.
//!
//! Every constant the analyzers consult lives here so it can be loaded from
//! `dealcast.toml`, overridden in tests, and validated in one place.

use serde::{Deserialize, Serialize};

use crate::domain::opportunity::{FunnelPhase, Stage};

/// A value per canonical stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageTable {
    pub lead: f64,
    pub qualified: f64,
    pub first_demo: f64,
    pub discovery: f64,
    pub technical_review: f64,
    pub proposal: f64,
    pub negotiation: f64,
}

impl StageTable {
    pub fn get(&self, stage: Stage) -> f64 {
        match stage {
            Stage::Lead => self.lead,
            Stage::Qualified => self.qualified,
            Stage::FirstDemo => self.first_demo,
            Stage::Discovery => self.discovery,
            Stage::TechnicalReview => self.technical_review,
            Stage::Proposal => self.proposal,
            Stage::Negotiation => self.negotiation,
        }
    }

    /// Baseline win probability (percent) per stage.
    pub fn base_probability() -> Self {
        Self {
            lead: 15.0,
            qualified: 25.0,
            first_demo: 35.0,
            discovery: 45.0,
            technical_review: 55.0,
            proposal: 70.0,
            negotiation: 85.0,
        }
    }

    /// Additive risk points per stage; early stages carry more risk.
    pub fn stage_risk() -> Self {
        Self {
            lead: 15.0,
            qualified: 10.0,
            first_demo: 5.0,
            discovery: 0.0,
            technical_review: -5.0,
            proposal: -10.0,
            negotiation: -15.0,
        }
    }
}

/// Target share of open deals per funnel phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseDistribution {
    pub prospecting: f64,
    pub qualification: f64,
    pub needs_analysis: f64,
    pub proposal: f64,
    pub negotiation: f64,
}

impl PhaseDistribution {
    pub fn get(&self, phase: FunnelPhase) -> f64 {
        match phase {
            FunnelPhase::Prospecting => self.prospecting,
            FunnelPhase::Qualification => self.qualification,
            FunnelPhase::NeedsAnalysis => self.needs_analysis,
            FunnelPhase::Proposal => self.proposal,
            FunnelPhase::Negotiation => self.negotiation,
        }
    }

    pub fn total(&self) -> f64 {
        FunnelPhase::ALL.iter().map(|phase| self.get(*phase)).sum()
    }
}

impl Default for PhaseDistribution {
    fn default() -> Self {
        Self {
            prospecting: 0.25,
            qualification: 0.20,
            needs_analysis: 0.20,
            proposal: 0.20,
            negotiation: 0.15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Level smoothing constant for Holt's method.
    pub alpha: f64,
    /// Trend smoothing constant for Holt's method.
    pub beta: f64,
    /// Below this many revenue months the forecaster falls back to a flat projection.
    pub min_history_months: usize,
    /// Flat projection base when there is no revenue history at all.
    pub default_base_revenue: f64,
    /// Half-width of the multiplicative jitter applied to fallback projections.
    pub fallback_jitter: f64,
    /// Half-width of the multiplicative jitter applied to smoothed projections.
    pub projection_jitter: f64,
    /// Presentation jitter switch. Off yields a fully deterministic forecast.
    pub jitter_enabled: bool,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            beta: 0.1,
            min_history_months: 3,
            default_base_revenue: 100_000.0,
            fallback_jitter: 0.10,
            projection_jitter: 0.05,
            jitter_enabled: true,
        }
    }
}

/// Multiplier applied once a deal is older than `older_than_days`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgeDecayBand {
    pub older_than_days: i64,
    pub factor: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DealSizeBands {
    pub extreme_q3_multiple: f64,
    pub extreme_factor: f64,
    pub large_q3_multiple: f64,
    pub large_factor: f64,
    pub above_q3_factor: f64,
    pub tiny_q1_fraction: f64,
    pub tiny_factor: f64,
    pub below_q1_factor: f64,
}

impl Default for DealSizeBands {
    fn default() -> Self {
        Self {
            extreme_q3_multiple: 3.0,
            extreme_factor: 0.4,
            large_q3_multiple: 2.0,
            large_factor: 0.6,
            above_q3_factor: 0.85,
            tiny_q1_fraction: 0.3,
            tiny_factor: 1.4,
            below_q1_factor: 1.15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub base: f64,
    pub stale_days: i64,
    pub stale_points: f64,
    pub aging_days: i64,
    pub aging_points: f64,
    pub huge_amount_multiple: f64,
    pub huge_amount_points: f64,
    pub large_amount_multiple: f64,
    pub large_amount_points: f64,
    pub strong_rep_win_rate: f64,
    pub weak_rep_win_rate: f64,
    pub rep_points: f64,
    pub stage_points: StageTable,
    pub low_below: f64,
    pub high_above: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            base: 50.0,
            stale_days: 180,
            stale_points: 25.0,
            aging_days: 90,
            aging_points: 10.0,
            huge_amount_multiple: 3.0,
            huge_amount_points: 20.0,
            large_amount_multiple: 2.0,
            large_amount_points: 10.0,
            strong_rep_win_rate: 0.6,
            weak_rep_win_rate: 0.3,
            rep_points: 15.0,
            stage_points: StageTable::stage_risk(),
            low_below: 30.0,
            high_above: 70.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbabilityConfig {
    /// Closed deals required before the ensemble replaces the stage table.
    pub min_closed_deals: usize,
    /// Closed samples at which a stage's observed win rate is fully trusted.
    pub full_confidence_samples: f64,
    pub base_probability: StageTable,
    /// Apply the `0.5 + U[0,1)` spread to stage-table fallback probabilities.
    pub fallback_noise: bool,
    pub rep_min_closed_deals: usize,
    pub rep_factor_min: f64,
    pub rep_factor_max: f64,
    pub deal_size: DealSizeBands,
    pub seasonal_min_samples: usize,
    pub seasonal_factor_min: f64,
    pub seasonal_factor_max: f64,
    /// Ordered oldest first; the first band a deal exceeds wins.
    pub age_decay: Vec<AgeDecayBand>,
    pub fresh_days: i64,
    pub fresh_factor: f64,
    pub competitive_overlap_factor: f64,
    pub probability_floor: f64,
    pub probability_ceiling: f64,
    pub risk: RiskConfig,
}

impl Default for ProbabilityConfig {
    fn default() -> Self {
        Self {
            min_closed_deals: 5,
            full_confidence_samples: 10.0,
            base_probability: StageTable::base_probability(),
            fallback_noise: true,
            rep_min_closed_deals: 3,
            rep_factor_min: 0.4,
            rep_factor_max: 1.6,
            deal_size: DealSizeBands::default(),
            seasonal_min_samples: 3,
            seasonal_factor_min: 0.85,
            seasonal_factor_max: 1.15,
            age_decay: vec![
                AgeDecayBand { older_than_days: 365, factor: 0.2 },
                AgeDecayBand { older_than_days: 180, factor: 0.4 },
                AgeDecayBand { older_than_days: 120, factor: 0.6 },
                AgeDecayBand { older_than_days: 90, factor: 0.75 },
                AgeDecayBand { older_than_days: 60, factor: 0.85 },
                AgeDecayBand { older_than_days: 30, factor: 0.95 },
            ],
            fresh_days: 7,
            fresh_factor: 1.2,
            competitive_overlap_factor: 0.9,
            probability_floor: 5.0,
            probability_ceiling: 95.0,
            risk: RiskConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub base_score: f64,
    pub target_open_deals: f64,
    pub pipeline_weight: f64,
    pub conversion_weight: f64,
    pub fast_velocity_days: f64,
    pub fast_velocity_points: f64,
    pub steady_velocity_days: f64,
    pub steady_velocity_points: f64,
    pub slow_velocity_days: f64,
    pub slow_velocity_points: f64,
    pub stalled_velocity_days: f64,
    pub stalled_velocity_points: f64,
    pub balance_weight: f64,
    pub balance_penalty: f64,
    pub ideal_distribution: PhaseDistribution,
    /// Open deals older than this multiple of their stage's average close time are at risk.
    pub stalled_multiplier: f64,
    pub large_deal_amount: f64,
    pub large_deal_age_days: i64,
    pub status_bands: StatusBands,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            base_score: 50.0,
            target_open_deals: 20.0,
            pipeline_weight: 20.0,
            conversion_weight: 20.0,
            fast_velocity_days: 30.0,
            fast_velocity_points: 10.0,
            steady_velocity_days: 60.0,
            steady_velocity_points: 5.0,
            slow_velocity_days: 90.0,
            slow_velocity_points: -5.0,
            stalled_velocity_days: 120.0,
            stalled_velocity_points: -10.0,
            balance_weight: 10.0,
            balance_penalty: 20.0,
            ideal_distribution: PhaseDistribution::default(),
            stalled_multiplier: 1.8,
            large_deal_amount: 500_000.0,
            large_deal_age_days: 120,
            status_bands: StatusBands::default(),
        }
    }
}

/// Lowest score of each health status above Critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusBands {
    pub at_risk_from: u8,
    pub good_from: u8,
    pub excellent_from: u8,
}

impl Default for StatusBands {
    fn default() -> Self {
        Self { at_risk_from: 40, good_from: 60, excellent_from: 80 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightConfig {
    pub momentum_window_months: usize,
    pub momentum_threshold_pct: f64,
    pub late_stage_min_share: f64,
    pub late_stage_max_share: f64,
    pub rep_min_closed_deals: usize,
    pub rep_variance_threshold: f64,
    pub deal_size_min_won: usize,
    pub deal_size_recent_share: f64,
    pub deal_size_shift_pct: f64,
    pub seasonal_min_quarters: usize,
    pub seasonal_variation_threshold: f64,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            momentum_window_months: 3,
            momentum_threshold_pct: 15.0,
            late_stage_min_share: 0.15,
            late_stage_max_share: 0.40,
            rep_min_closed_deals: 5,
            rep_variance_threshold: 25.0,
            deal_size_min_won: 5,
            deal_size_recent_share: 0.3,
            deal_size_shift_pct: 20.0,
            seasonal_min_quarters: 4,
            seasonal_variation_threshold: 0.4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    pub stale_days: i64,
    pub coaching_win_rate: f64,
    pub coaching_min_deals: usize,
    pub pipeline_coverage_multiple: f64,
    pub early_stage_share: f64,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            stale_days: 90,
            coaching_win_rate: 0.40,
            coaching_min_deals: 5,
            pipeline_coverage_multiple: 3.0,
            early_stage_share: 0.60,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictiveConfig {
    pub forecast: ForecastConfig,
    pub probability: ProbabilityConfig,
    pub health: HealthConfig,
    pub insights: InsightConfig,
    pub recommendations: RecommendationConfig,
}

impl PredictiveConfig {
    /// Check cross-field constraints; returns a message naming the offending key.
    pub fn validate(&self) -> Result<(), String> {
        let non_finite = self.tuning_values().into_iter().find(|(_, value)| !value.is_finite());
        if let Some((key, _)) = non_finite {
            return Err(format!("{key} must be a finite number"));
        }

        let forecast = &self.forecast;
        if !(forecast.alpha > 0.0 && forecast.alpha <= 1.0) {
            return Err("forecast.alpha must be in range (0, 1]".to_string());
        }
        if !(forecast.beta > 0.0 && forecast.beta <= 1.0) {
            return Err("forecast.beta must be in range (0, 1]".to_string());
        }
        for (key, value) in [
            ("forecast.fallback_jitter", forecast.fallback_jitter),
            ("forecast.projection_jitter", forecast.projection_jitter),
        ] {
            if !(0.0..1.0).contains(&value) {
                return Err(format!("{key} must be in range [0, 1)"));
            }
        }
        if forecast.default_base_revenue < 0.0 {
            return Err("forecast.default_base_revenue must not be negative".to_string());
        }

        let probability = &self.probability;
        if probability.full_confidence_samples <= 0.0 {
            return Err("probability.full_confidence_samples must be greater than zero".to_string());
        }
        if probability.probability_floor < 0.0
            || probability.probability_ceiling > 100.0
            || probability.probability_floor >= probability.probability_ceiling
        {
            return Err(
                "probability.probability_floor/ceiling must satisfy 0 <= floor < ceiling <= 100"
                    .to_string(),
            );
        }
        if probability.rep_factor_min > probability.rep_factor_max
            || probability.seasonal_factor_min > probability.seasonal_factor_max
        {
            return Err("probability factor bounds must satisfy min <= max".to_string());
        }
        if probability.age_decay.windows(2).any(|pair| pair[0].older_than_days <= pair[1].older_than_days)
        {
            return Err(
                "probability.age_decay bands must be ordered by strictly decreasing older_than_days"
                    .to_string(),
            );
        }
        if probability.risk.low_below > probability.risk.high_above {
            return Err("probability.risk.low_below must not exceed high_above".to_string());
        }

        let health = &self.health;
        if health.target_open_deals <= 0.0 {
            return Err("health.target_open_deals must be greater than zero".to_string());
        }
        if (health.ideal_distribution.total() - 1.0).abs() > 0.01 {
            return Err("health.ideal_distribution shares must sum to 1.0".to_string());
        }
        let bands = health.status_bands;
        if !(bands.at_risk_from < bands.good_from
            && bands.good_from < bands.excellent_from
            && bands.excellent_from <= 100)
        {
            return Err(
                "health.status_bands must satisfy at_risk_from < good_from < excellent_from <= 100"
                    .to_string(),
            );
        }

        let insights = &self.insights;
        if insights.momentum_window_months == 0 {
            return Err("insights.momentum_window_months must be greater than zero".to_string());
        }
        if !(insights.deal_size_recent_share > 0.0 && insights.deal_size_recent_share < 1.0) {
            return Err("insights.deal_size_recent_share must be in range (0, 1)".to_string());
        }

        Ok(())
    }

    /// Every float knob, keyed by its config path.
    fn tuning_values(&self) -> Vec<(String, f64)> {
        let forecast = &self.forecast;
        let probability = &self.probability;
        let sizes = &probability.deal_size;
        let risk = &probability.risk;
        let health = &self.health;
        let insights = &self.insights;
        let recommendations = &self.recommendations;

        let named = [
            ("forecast.alpha", forecast.alpha),
            ("forecast.beta", forecast.beta),
            ("forecast.default_base_revenue", forecast.default_base_revenue),
            ("forecast.fallback_jitter", forecast.fallback_jitter),
            ("forecast.projection_jitter", forecast.projection_jitter),
            ("probability.full_confidence_samples", probability.full_confidence_samples),
            ("probability.rep_factor_min", probability.rep_factor_min),
            ("probability.rep_factor_max", probability.rep_factor_max),
            ("probability.seasonal_factor_min", probability.seasonal_factor_min),
            ("probability.seasonal_factor_max", probability.seasonal_factor_max),
            ("probability.fresh_factor", probability.fresh_factor),
            ("probability.competitive_overlap_factor", probability.competitive_overlap_factor),
            ("probability.probability_floor", probability.probability_floor),
            ("probability.probability_ceiling", probability.probability_ceiling),
            ("probability.deal_size.extreme_q3_multiple", sizes.extreme_q3_multiple),
            ("probability.deal_size.extreme_factor", sizes.extreme_factor),
            ("probability.deal_size.large_q3_multiple", sizes.large_q3_multiple),
            ("probability.deal_size.large_factor", sizes.large_factor),
            ("probability.deal_size.above_q3_factor", sizes.above_q3_factor),
            ("probability.deal_size.tiny_q1_fraction", sizes.tiny_q1_fraction),
            ("probability.deal_size.tiny_factor", sizes.tiny_factor),
            ("probability.deal_size.below_q1_factor", sizes.below_q1_factor),
            ("probability.risk.base", risk.base),
            ("probability.risk.stale_points", risk.stale_points),
            ("probability.risk.aging_points", risk.aging_points),
            ("probability.risk.huge_amount_multiple", risk.huge_amount_multiple),
            ("probability.risk.huge_amount_points", risk.huge_amount_points),
            ("probability.risk.large_amount_multiple", risk.large_amount_multiple),
            ("probability.risk.large_amount_points", risk.large_amount_points),
            ("probability.risk.strong_rep_win_rate", risk.strong_rep_win_rate),
            ("probability.risk.weak_rep_win_rate", risk.weak_rep_win_rate),
            ("probability.risk.rep_points", risk.rep_points),
            ("probability.risk.low_below", risk.low_below),
            ("probability.risk.high_above", risk.high_above),
            ("health.base_score", health.base_score),
            ("health.target_open_deals", health.target_open_deals),
            ("health.pipeline_weight", health.pipeline_weight),
            ("health.conversion_weight", health.conversion_weight),
            ("health.fast_velocity_days", health.fast_velocity_days),
            ("health.fast_velocity_points", health.fast_velocity_points),
            ("health.steady_velocity_days", health.steady_velocity_days),
            ("health.steady_velocity_points", health.steady_velocity_points),
            ("health.slow_velocity_days", health.slow_velocity_days),
            ("health.slow_velocity_points", health.slow_velocity_points),
            ("health.stalled_velocity_days", health.stalled_velocity_days),
            ("health.stalled_velocity_points", health.stalled_velocity_points),
            ("health.balance_weight", health.balance_weight),
            ("health.balance_penalty", health.balance_penalty),
            ("health.stalled_multiplier", health.stalled_multiplier),
            ("health.large_deal_amount", health.large_deal_amount),
            ("insights.momentum_threshold_pct", insights.momentum_threshold_pct),
            ("insights.late_stage_min_share", insights.late_stage_min_share),
            ("insights.late_stage_max_share", insights.late_stage_max_share),
            ("insights.rep_variance_threshold", insights.rep_variance_threshold),
            ("insights.deal_size_recent_share", insights.deal_size_recent_share),
            ("insights.deal_size_shift_pct", insights.deal_size_shift_pct),
            ("insights.seasonal_variation_threshold", insights.seasonal_variation_threshold),
            ("recommendations.coaching_win_rate", recommendations.coaching_win_rate),
            ("recommendations.pipeline_coverage_multiple", recommendations.pipeline_coverage_multiple),
            ("recommendations.early_stage_share", recommendations.early_stage_share),
        ];

        let mut values: Vec<(String, f64)> =
            named.into_iter().map(|(key, value)| (key.to_string(), value)).collect();
        for stage in Stage::ALL {
            let label = stage.as_str();
            values.push((
                format!("probability.base_probability.{label}"),
                probability.base_probability.get(stage),
            ));
            values.push((format!("probability.risk.stage_points.{label}"), risk.stage_points.get(stage)));
        }
        for phase in FunnelPhase::ALL {
            values.push((
                format!("health.ideal_distribution.{phase:?}"),
                health.ideal_distribution.get(phase),
            ));
        }
        for band in &probability.age_decay {
            values.push((
                format!("probability.age_decay[{}].factor", band.older_than_days),
                band.factor,
            ));
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::{AgeDecayBand, PhaseDistribution, PredictiveConfig, StageTable, StatusBands};
    use crate::domain::opportunity::Stage;

    #[test]
    fn defaults_validate() {
        assert_eq!(PredictiveConfig::default().validate(), Ok(()));
    }

    #[test]
    fn base_probability_table_is_monotonic_through_the_funnel() {
        let table = StageTable::base_probability();
        let values: Vec<f64> = Stage::ALL.iter().map(|stage| table.get(*stage)).collect();
        assert!(values.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(table.get(Stage::Lead), 15.0);
        assert_eq!(table.get(Stage::Negotiation), 85.0);
    }

    #[test]
    fn ideal_distribution_must_sum_to_one() {
        let mut config = PredictiveConfig::default();
        config.health.ideal_distribution = PhaseDistribution { prospecting: 0.9, ..PhaseDistribution::default() };

        let error = config.validate().expect_err("skewed distribution should fail");
        assert!(error.contains("health.ideal_distribution"));
    }

    #[test]
    fn unordered_age_bands_are_rejected() {
        let mut config = PredictiveConfig::default();
        config.probability.age_decay = vec![
            AgeDecayBand { older_than_days: 30, factor: 0.95 },
            AgeDecayBand { older_than_days: 365, factor: 0.2 },
        ];

        assert!(config.validate().is_err());
    }

    #[test]
    fn nan_bounds_from_toml_are_rejected() {
        let config: PredictiveConfig =
            toml::from_str("[probability]\nprobability_floor = nan\n").expect("nan is valid toml");

        let error = config.validate().expect_err("nan floor must not validate");
        assert!(error.contains("probability.probability_floor"), "error was: {error}");
    }

    #[test]
    fn non_finite_factor_bounds_are_rejected() {
        let mut config = PredictiveConfig::default();
        config.probability.rep_factor_max = f64::INFINITY;
        assert!(config.validate().expect_err("infinite bound").contains("rep_factor_max"));

        let mut config = PredictiveConfig::default();
        config.probability.seasonal_factor_min = f64::NAN;
        assert!(config.validate().expect_err("nan bound").contains("seasonal_factor_min"));
    }

    #[test]
    fn status_bands_must_increase() {
        let mut config = PredictiveConfig::default();
        config.health.status_bands = StatusBands { at_risk_from: 60, good_from: 50, excellent_from: 80 };

        assert!(config.validate().expect_err("overlapping bands").contains("health.status_bands"));
    }

    #[test]
    fn partial_toml_sections_keep_defaults() {
        let config: PredictiveConfig = toml::from_str(
            r#"
[forecast]
alpha = 0.5

[probability]
min_closed_deals = 8
"#,
        )
        .expect("partial config parses");

        assert_eq!(config.forecast.alpha, 0.5);
        assert_eq!(config.forecast.beta, 0.1);
        assert_eq!(config.probability.min_closed_deals, 8);
        assert_eq!(config.probability.age_decay.len(), 6);
    }
}

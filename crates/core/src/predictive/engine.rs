use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::forecast::{predict_revenue_advanced, ForecastHorizon, RevenueForecast, RevenueForecaster};
use super::health::{HealthReport, PipelineHealthAnalyzer};
use super::history::HistoricalData;
use super::insights::{Insight, InsightGenerator};
use super::probability::{DealProbabilityReport, DealProbabilityScorer};
use super::recommendations::{Recommendation, RecommendationEngine};
use super::tuning::PredictiveConfig;
use super::Confidence;
use crate::domain::opportunity::Opportunity;

/// Dashboard summary combining forecast, scoring, insights and recommendations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictiveMetrics {
    pub predicted_revenue: f64,
    /// Percent change of the projected total against the same number of trailing revenue months.
    pub revenue_growth: f64,
    pub expected_deals: u32,
    pub insights: Vec<Insight>,
    pub recommendations: Vec<Recommendation>,
    pub forecast_confidence: Confidence,
    pub probability_confidence: Confidence,
}

#[derive(Debug, Clone, Default)]
pub struct PredictiveEngine {
    config: PredictiveConfig,
    forecaster: RevenueForecaster,
    scorer: DealProbabilityScorer,
    health: PipelineHealthAnalyzer,
    insights: InsightGenerator,
    recommendations: RecommendationEngine,
}

impl PredictiveEngine {
    pub fn new(config: PredictiveConfig) -> Self {
        Self {
            forecaster: RevenueForecaster::new(config.forecast),
            scorer: DealProbabilityScorer::new(config.probability.clone()),
            health: PipelineHealthAnalyzer::new(config.health),
            insights: InsightGenerator::new(config.insights),
            recommendations: RecommendationEngine::new(config.recommendations),
            config,
        }
    }

    pub fn config(&self) -> &PredictiveConfig {
        &self.config
    }

    pub fn calculate_predictive_metrics<R: Rng + ?Sized>(
        &self,
        opportunities: &[Opportunity],
        period: &str,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> PredictiveMetrics {
        let history = HistoricalData::partition(opportunities);
        let horizon = ForecastHorizon::parse(period);

        let forecast = self.forecaster.forecast(&history.monthly_revenue, horizon, now, rng);
        let predicted_revenue = predict_revenue_advanced(&forecast);
        let revenue_growth = revenue_growth(&history, horizon, predicted_revenue);

        let probabilities = self.scorer.score(opportunities, &history, now, rng);
        let expected_deals = probabilities.expected_wins().round() as u32;

        let metrics = PredictiveMetrics {
            predicted_revenue,
            revenue_growth,
            expected_deals,
            insights: self.insights.generate(&history),
            recommendations: self.recommendations.generate(&history, now),
            forecast_confidence: forecast.confidence,
            probability_confidence: probabilities.confidence,
        };

        tracing::info!(
            event_name = "analytics.metrics.computed",
            opportunities = opportunities.len(),
            horizon_months = horizon.months(),
            predicted_revenue = metrics.predicted_revenue,
            expected_deals = metrics.expected_deals,
            insights = metrics.insights.len(),
            recommendations = metrics.recommendations.len(),
            "predictive metrics computed"
        );

        metrics
    }

    pub fn generate_revenue_forecast<R: Rng + ?Sized>(
        &self,
        opportunities: &[Opportunity],
        period: &str,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> RevenueForecast {
        let history = HistoricalData::partition(opportunities);
        self.forecaster.forecast(&history.monthly_revenue, ForecastHorizon::parse(period), now, rng)
    }

    /// Open deals scored and sorted by non-increasing win probability.
    pub fn calculate_deal_probabilities<R: Rng + ?Sized>(
        &self,
        opportunities: &[Opportunity],
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> DealProbabilityReport {
        let history = HistoricalData::partition(opportunities);
        self.scorer.score(opportunities, &history, now, rng)
    }

    pub fn analyze_pipeline_health(&self, opportunities: &[Opportunity], now: DateTime<Utc>) -> HealthReport {
        let history = HistoricalData::partition(opportunities);
        self.health.analyze(&history, now)
    }

    pub fn generate_advanced_insights(&self, history: &HistoricalData<'_>) -> Vec<Insight> {
        self.insights.generate(history)
    }

    pub fn generate_smart_recommendations(
        &self,
        history: &HistoricalData<'_>,
        now: DateTime<Utc>,
    ) -> Vec<Recommendation> {
        self.recommendations.generate(history, now)
    }
}

fn revenue_growth(history: &HistoricalData<'_>, horizon: ForecastHorizon, predicted: f64) -> f64 {
    let months = horizon.months() as usize;
    if months == 0 {
        return 0.0;
    }

    let series = &history.monthly_revenue;
    let window = &series[series.len().saturating_sub(months)..];
    let trailing: f64 = window.iter().map(|point| point.revenue).sum();
    if trailing <= 0.0 {
        return 0.0;
    }

    (predicted - trailing) / trailing * 100.0
}

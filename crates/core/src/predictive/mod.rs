//! Pipeline analytics over a frozen opportunity snapshot.
//!
//! Every analyzer is a pure function of the snapshot, the evaluation instant
//! and (where presentation jitter applies) a caller-supplied RNG.

pub mod engine;
pub mod forecast;
pub mod health;
pub mod history;
pub mod insights;
pub mod probability;
pub mod recommendations;
pub mod tuning;

#[cfg(test)]
pub(crate) mod fixtures;

use serde::{Deserialize, Serialize};

pub use engine::{PredictiveEngine, PredictiveMetrics};
pub use forecast::{ForecastHorizon, ForecastMethod, ForecastPoint, RevenueForecast, RevenueForecaster};
pub use health::{HealthReport, HealthStatus, PipelineHealthAnalyzer};
pub use history::{HistoricalData, MonthlyRevenuePoint, RepPerformance, StageStatistic};
pub use insights::{Insight, InsightDetector, InsightGenerator, InsightKind};
pub use probability::{
    DealProbabilityReport, DealProbabilityScorer, ProbabilityFactors, RiskLevel, ScoredOpportunity,
    ScoringMethod,
};
pub use recommendations::{Rating, Recommendation, RecommendationEngine, RecommendationKind};
pub use tuning::PredictiveConfig;

/// Whether a result was computed from enough history or is a low-sample fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBasis {
    Observed,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confidence {
    pub basis: ConfidenceBasis,
    /// Records the result was derived from (revenue months, closed deals, ...).
    pub sample_size: usize,
}

impl Confidence {
    pub fn observed(sample_size: usize) -> Self {
        Self { basis: ConfidenceBasis::Observed, sample_size }
    }

    pub fn fallback(sample_size: usize) -> Self {
        Self { basis: ConfidenceBasis::Fallback, sample_size }
    }

    pub fn is_fallback(&self) -> bool {
        self.basis == ConfidenceBasis::Fallback
    }
}

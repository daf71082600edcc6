pub mod config;
pub mod domain;
pub mod errors;
pub mod predictive;

pub use domain::opportunity::{
    validate_snapshot, FunnelPhase, Opportunity, OpportunityId, OpportunityStatus, Stage,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use predictive::{
    Confidence, ConfidenceBasis, DealProbabilityReport, HealthReport, HealthStatus, HistoricalData,
    Insight, PredictiveConfig, PredictiveEngine, PredictiveMetrics, Recommendation, RevenueForecast,
    RiskLevel, ScoredOpportunity,
};

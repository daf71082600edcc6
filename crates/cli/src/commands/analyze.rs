use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Args;
use dealcast_core::config::{AppConfig, LoadOptions};
use dealcast_core::predictive::ForecastHorizon;
use dealcast_core::{ApplicationError, HistoricalData, Opportunity, PredictiveEngine};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::commands::{load_snapshot, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Analysis {
    Metrics,
    Forecast,
    Probabilities,
    Health,
    Insights,
    Recommend,
}

impl Analysis {
    pub fn command_name(self) -> &'static str {
        match self {
            Self::Metrics => "metrics",
            Self::Forecast => "forecast",
            Self::Probabilities => "probabilities",
            Self::Health => "health",
            Self::Insights => "insights",
            Self::Recommend => "recommend",
        }
    }
}

#[derive(Clone, Debug, Args)]
pub struct AnalysisArgs {
    #[arg(long, help = "Path to a JSON array of opportunities")]
    pub input: PathBuf,
    #[arg(long, help = "Forecast horizon such as `6-months` (defaults to runtime.default_period)")]
    pub period: Option<String>,
    #[arg(long, help = "Seed for presentation jitter so repeated runs match")]
    pub seed: Option<u64>,
    #[arg(long, help = "Evaluation instant as RFC 3339 (defaults to the current time)")]
    pub now: Option<String>,
    #[arg(long, help = "Disable forecast jitter and fallback probability noise")]
    pub no_jitter: bool,
}

impl AnalysisArgs {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self { input: input.into(), period: None, seed: None, now: None, no_jitter: false }
    }
}

pub fn run(analysis: Analysis, args: &AnalysisArgs, options: LoadOptions) -> CommandResult {
    let command = analysis.command_name();

    match execute(analysis, args, options) {
        Ok((message, data)) => CommandResult::report(command, message, Some(data)),
        Err(error) => {
            let correlation_id = Uuid::new_v4().simple().to_string();
            tracing::warn!(
                event_name = "cli.command.failed",
                command,
                correlation_id = %correlation_id,
                error_class = error.error_class(),
                error = %error,
                "analysis command failed"
            );
            CommandResult::from_error(command, error, &correlation_id)
        }
    }
}

fn execute(
    analysis: Analysis,
    args: &AnalysisArgs,
    mut options: LoadOptions,
) -> Result<(String, Value), ApplicationError> {
    if args.seed.is_some() {
        options.overrides.seed = args.seed;
    }
    if args.no_jitter {
        options.overrides.jitter_enabled = Some(false);
    }

    let config = AppConfig::load(options)
        .map_err(|error| ApplicationError::Configuration(error.to_string()))?;
    let now = parse_now(args.now.as_deref())?;
    let opportunities = load_snapshot(&args.input)?;
    let period = args.period.clone().unwrap_or_else(|| config.runtime.default_period.clone());
    validate_period(&period)?;

    let mut rng = match config.runtime.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let engine = PredictiveEngine::new(config.analytics);

    tracing::debug!(
        event_name = "cli.snapshot.loaded",
        command = analysis.command_name(),
        opportunities = opportunities.len(),
        period = %period,
        seeded = config.runtime.seed.is_some(),
        "snapshot loaded"
    );

    analyze(&engine, analysis, &opportunities, &period, now, &mut rng)
}

fn analyze(
    engine: &PredictiveEngine,
    analysis: Analysis,
    opportunities: &[Opportunity],
    period: &str,
    now: DateTime<Utc>,
    rng: &mut StdRng,
) -> Result<(String, Value), ApplicationError> {
    match analysis {
        Analysis::Metrics => {
            let metrics = engine.calculate_predictive_metrics(opportunities, period, now, rng);
            let message = format!(
                "predicted revenue {:.0} over {period} ({:+.1}% growth), {} expected deals",
                metrics.predicted_revenue, metrics.revenue_growth, metrics.expected_deals
            );
            Ok((message, to_value(&metrics)?))
        }
        Analysis::Forecast => {
            let forecast = engine.generate_revenue_forecast(opportunities, period, now, rng);
            let message = format!(
                "{} historical months and {} projected months",
                forecast.historical_points().count(),
                forecast.horizon_months
            );
            Ok((message, to_value(&forecast)?))
        }
        Analysis::Probabilities => {
            let report = engine.calculate_deal_probabilities(opportunities, now, rng);
            let message = format!(
                "{} open deals scored, {:.1} expected wins",
                report.deals.len(),
                report.expected_wins()
            );
            Ok((message, to_value(&report)?))
        }
        Analysis::Health => {
            let report = engine.analyze_pipeline_health(opportunities, now);
            let message = format!(
                "pipeline health {} ({}), {} deals at risk",
                report.health_score,
                report.status.as_str(),
                report.at_risk_deals
            );
            Ok((message, to_value(&report)?))
        }
        Analysis::Insights => {
            let history = HistoricalData::partition(opportunities);
            let insights = engine.generate_advanced_insights(&history);
            Ok((format!("{} insights", insights.len()), to_value(&insights)?))
        }
        Analysis::Recommend => {
            let history = HistoricalData::partition(opportunities);
            let recommendations = engine.generate_smart_recommendations(&history, now);
            Ok((format!("{} recommendations", recommendations.len()), to_value(&recommendations)?))
        }
    }
}

fn parse_now(value: Option<&str>) -> Result<DateTime<Utc>, ApplicationError> {
    let Some(value) = value else {
        return Ok(Utc::now());
    };

    DateTime::parse_from_rfc3339(value.trim())
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| ApplicationError::Input(format!("invalid --now `{value}`: {error}")))
}

fn validate_period(period: &str) -> Result<(), ApplicationError> {
    let months = ForecastHorizon::parse(period).months();
    if months == 0 || months > ForecastHorizon::MAX_MONTHS {
        return Err(ApplicationError::Input(format!(
            "invalid --period `{period}`: expected `<N>-months` with 1 <= N <= {}",
            ForecastHorizon::MAX_MONTHS
        )));
    }
    Ok(())
}

fn to_value<T: Serialize>(report: &T) -> Result<Value, ApplicationError> {
    serde_json::to_value(report)
        .map_err(|error| ApplicationError::Analysis(format!("could not serialize report: {error}")))
}

use std::path::Path;

use dealcast_core::config::{AppConfig, LoadOptions};
use dealcast_core::HistoricalData;
use serde::Serialize;

use crate::commands::{load_snapshot, CommandResult, EXIT_INPUT};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool, input: Option<&Path>, options: LoadOptions) -> CommandResult {
    let report = build_report(input, options);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { EXIT_INPUT };

    if json_output {
        let output = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return CommandResult { exit_code, output };
    }

    CommandResult { exit_code, output: render_human(&report) }
}

fn build_report(input: Option<&Path>, options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_snapshot(&config, input));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "snapshot_readiness",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_snapshot(config: &AppConfig, input: Option<&Path>) -> DoctorCheck {
    let Some(path) = input else {
        return DoctorCheck {
            name: "snapshot_readiness",
            status: CheckStatus::Skipped,
            details: "no --input snapshot given".to_string(),
        };
    };

    match load_snapshot(path) {
        Ok(opportunities) => {
            let history = HistoricalData::partition(&opportunities);
            let analytics = &config.analytics;
            let scoring = if history.closed.len() >= analytics.probability.min_closed_deals {
                "ensemble scoring"
            } else {
                "stage-table fallback scoring"
            };
            let forecasting = if history.monthly_revenue.len() >= analytics.forecast.min_history_months
            {
                "trend forecast"
            } else {
                "flat fallback forecast"
            };

            DoctorCheck {
                name: "snapshot_readiness",
                status: CheckStatus::Pass,
                details: format!(
                    "{} opportunities ({} closed, {} open) over {} revenue months; {scoring}, {forecasting}",
                    opportunities.len(),
                    history.closed.len(),
                    history.open.len(),
                    history.monthly_revenue.len()
                ),
            }
        }
        Err(error) => DoctorCheck {
            name: "snapshot_readiness",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

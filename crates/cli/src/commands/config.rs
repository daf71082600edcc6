use std::env;
use std::fs;
use std::path::Path;

use dealcast_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

use crate::commands::{CommandResult, EXIT_INPUT};

pub fn run(options: LoadOptions) -> CommandResult {
    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult {
                exit_code: EXIT_INPUT,
                output: format!("config validation failed: {error}"),
            }
        }
    };

    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let analytics = &config.analytics;

    let describe = |key: &str, value: String, env_keys: &[&str]| {
        let source =
            field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        render_line(key, &value, source)
    };

    let seed = config.runtime.seed.map_or_else(|| "<entropy>".to_string(), |seed| seed.to_string());
    let lines = [
        "effective config (source precedence: env > file > default):".to_string(),
        describe("runtime.seed", seed, &["DEALCAST_RUNTIME_SEED"]),
        describe(
            "runtime.default_period",
            config.runtime.default_period.clone(),
            &["DEALCAST_RUNTIME_DEFAULT_PERIOD"],
        ),
        describe("forecast.alpha", analytics.forecast.alpha.to_string(), &["DEALCAST_FORECAST_ALPHA"]),
        describe("forecast.beta", analytics.forecast.beta.to_string(), &["DEALCAST_FORECAST_BETA"]),
        describe(
            "forecast.jitter_enabled",
            analytics.forecast.jitter_enabled.to_string(),
            &["DEALCAST_FORECAST_JITTER_ENABLED"],
        ),
        describe(
            "probability.min_closed_deals",
            analytics.probability.min_closed_deals.to_string(),
            &["DEALCAST_PROBABILITY_MIN_CLOSED_DEALS"],
        ),
        describe(
            "probability.fallback_noise",
            analytics.probability.fallback_noise.to_string(),
            &["DEALCAST_PROBABILITY_FALLBACK_NOISE"],
        ),
        describe(
            "health.target_open_deals",
            analytics.health.target_open_deals.to_string(),
            &["DEALCAST_HEALTH_TARGET_OPEN_DEALS"],
        ),
        describe(
            "recommendations.stale_days",
            analytics.recommendations.stale_days.to_string(),
            &["DEALCAST_RECOMMENDATIONS_STALE_DAYS"],
        ),
        describe(
            "logging.level",
            config.logging.level.clone(),
            &["DEALCAST_LOGGING_LEVEL", "DEALCAST_LOG_LEVEL"],
        ),
        describe(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["DEALCAST_LOGGING_FORMAT", "DEALCAST_LOG_FORMAT"],
        ),
    ];

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

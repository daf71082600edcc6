use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::predictive::forecast::ForecastHorizon;
use crate::predictive::tuning::{
    ForecastConfig, HealthConfig, InsightConfig, PredictiveConfig, ProbabilityConfig,
    RecommendationConfig,
};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub analytics: PredictiveConfig,
    pub runtime: RuntimeConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Seed for presentation jitter; `None` draws from OS entropy.
    pub seed: Option<u64>,
    pub default_period: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub seed: Option<u64>,
    pub default_period: Option<String>,
    pub jitter_enabled: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            analytics: PredictiveConfig::default(),
            runtime: RuntimeConfig { seed: None, default_period: "6-months".to_string() },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

/// Config file names probed when no explicit path is given, in order.
pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["dealcast.toml", "config/dealcast.toml"];

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_CANDIDATES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(runtime) = patch.runtime {
            if let Some(seed) = runtime.seed {
                self.runtime.seed = Some(seed);
            }
            if let Some(default_period) = runtime.default_period {
                self.runtime.default_period = default_period;
            }
        }

        // Analytics sections replace the defaults wholesale; keys missing from
        // a present section fall back to their defaults.
        if let Some(forecast) = patch.forecast {
            self.analytics.forecast = forecast;
        }
        if let Some(probability) = patch.probability {
            self.analytics.probability = probability;
        }
        if let Some(health) = patch.health {
            self.analytics.health = health;
        }
        if let Some(insights) = patch.insights {
            self.analytics.insights = insights;
        }
        if let Some(recommendations) = patch.recommendations {
            self.analytics.recommendations = recommendations;
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("DEALCAST_RUNTIME_SEED") {
            self.runtime.seed = Some(parse_u64("DEALCAST_RUNTIME_SEED", &value)?);
        }
        if let Some(value) = read_env("DEALCAST_RUNTIME_DEFAULT_PERIOD") {
            self.runtime.default_period = value;
        }

        if let Some(value) = read_env("DEALCAST_FORECAST_ALPHA") {
            self.analytics.forecast.alpha = parse_f64("DEALCAST_FORECAST_ALPHA", &value)?;
        }
        if let Some(value) = read_env("DEALCAST_FORECAST_BETA") {
            self.analytics.forecast.beta = parse_f64("DEALCAST_FORECAST_BETA", &value)?;
        }
        if let Some(value) = read_env("DEALCAST_FORECAST_JITTER_ENABLED") {
            self.analytics.forecast.jitter_enabled =
                parse_bool("DEALCAST_FORECAST_JITTER_ENABLED", &value)?;
        }
        if let Some(value) = read_env("DEALCAST_PROBABILITY_MIN_CLOSED_DEALS") {
            self.analytics.probability.min_closed_deals =
                parse_usize("DEALCAST_PROBABILITY_MIN_CLOSED_DEALS", &value)?;
        }
        if let Some(value) = read_env("DEALCAST_PROBABILITY_FALLBACK_NOISE") {
            self.analytics.probability.fallback_noise =
                parse_bool("DEALCAST_PROBABILITY_FALLBACK_NOISE", &value)?;
        }
        if let Some(value) = read_env("DEALCAST_HEALTH_TARGET_OPEN_DEALS") {
            self.analytics.health.target_open_deals =
                parse_f64("DEALCAST_HEALTH_TARGET_OPEN_DEALS", &value)?;
        }
        if let Some(value) = read_env("DEALCAST_RECOMMENDATIONS_STALE_DAYS") {
            self.analytics.recommendations.stale_days =
                parse_i64("DEALCAST_RECOMMENDATIONS_STALE_DAYS", &value)?;
        }

        let log_level =
            read_env("DEALCAST_LOGGING_LEVEL").or_else(|| read_env("DEALCAST_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("DEALCAST_LOGGING_FORMAT").or_else(|| read_env("DEALCAST_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(seed) = overrides.seed {
            self.runtime.seed = Some(seed);
        }
        if let Some(default_period) = overrides.default_period {
            self.runtime.default_period = default_period;
        }
        if let Some(jitter_enabled) = overrides.jitter_enabled {
            self.analytics.forecast.jitter_enabled = jitter_enabled;
            self.analytics.probability.fallback_noise = jitter_enabled;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.analytics.validate().map_err(ConfigError::Validation)?;
        validate_runtime(&self.runtime)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// First existing config file: the explicit path if given, else the default candidates.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    CONFIG_FILE_CANDIDATES.iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_runtime(runtime: &RuntimeConfig) -> Result<(), ConfigError> {
    let months = ForecastHorizon::parse(&runtime.default_period).months();
    if months == 0 || months > ForecastHorizon::MAX_MONTHS {
        return Err(ConfigError::Validation(format!(
            "runtime.default_period must look like `<N>-months` with 1 <= N <= {}, got `{}`",
            ForecastHorizon::MAX_MONTHS,
            runtime.default_period
        )));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.trim().parse::<i64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|parsed| parsed.is_finite())
        .ok_or_else(|| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.trim().parse::<bool>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    runtime: Option<RuntimePatch>,
    forecast: Option<ForecastConfig>,
    probability: Option<ProbabilityConfig>,
    health: Option<HealthConfig>,
    insights: Option<InsightConfig>,
    recommendations: Option<RecommendationConfig>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct RuntimePatch {
    seed: Option<u64>,
    default_period: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_load_without_file_or_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.runtime.default_period == "6-months", "default period should be 6-months")?;
        ensure(config.runtime.seed.is_none(), "seed should default to entropy")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )?;
        ensure(config.analytics.forecast.alpha == 0.3, "default alpha should be 0.3")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_DEALCAST_SEED", "4242");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("dealcast.toml");
            fs::write(
                &path,
                r#"
[runtime]
seed = ${TEST_DEALCAST_SEED}
default_period = "12-months"

[forecast]
alpha = 0.5
jitter_enabled = false
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.runtime.seed == Some(4242), "seed should be interpolated from env")?;
            ensure(config.runtime.default_period == "12-months", "period should come from file")?;
            ensure(config.analytics.forecast.alpha == 0.5, "alpha should come from file")?;
            ensure(config.analytics.forecast.beta == 0.1, "beta should keep its default")?;
            ensure(!config.analytics.forecast.jitter_enabled, "jitter should be disabled by file")?;
            Ok(())
        })();

        clear_vars(&["TEST_DEALCAST_SEED"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DEALCAST_LOG_LEVEL", "warn");
        env::set_var("DEALCAST_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["DEALCAST_LOG_LEVEL", "DEALCAST_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DEALCAST_RUNTIME_SEED", "7");
        env::set_var("DEALCAST_FORECAST_BETA", "0.2");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("dealcast.toml");
            fs::write(
                &path,
                r#"
[runtime]
seed = 1

[forecast]
beta = 0.15

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    jitter_enabled: Some(false),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.runtime.seed == Some(7), "env seed should win over file")?;
            ensure(config.analytics.forecast.beta == 0.2, "env beta should win over file")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                !config.analytics.forecast.jitter_enabled && !config.analytics.probability.fallback_noise,
                "jitter override should disable both random paths",
            )?;
            Ok(())
        })();

        clear_vars(&["DEALCAST_RUNTIME_SEED", "DEALCAST_FORECAST_BETA"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DEALCAST_FORECAST_ALPHA", "1.5");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("forecast.alpha")
            );
            ensure(has_message, "validation failure should mention forecast.alpha")
        })();

        clear_vars(&["DEALCAST_FORECAST_ALPHA"]);
        result
    }

    #[test]
    fn oversized_default_period_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                default_period: Some("4000000000-months".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        ensure(
            matches!(
                error,
                Err(ConfigError::Validation(ref message)) if message.contains("runtime.default_period")
            ),
            "an oversized default period should fail validation",
        )
    }

    #[test]
    fn malformed_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DEALCAST_RUNTIME_SEED", "not-a-number");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) if key == "DEALCAST_RUNTIME_SEED" => {
                Ok(())
            }
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("expected invalid override error".to_string()),
        };

        clear_vars(&["DEALCAST_RUNTIME_SEED"]);
        result
    }

    #[test]
    fn missing_required_file_is_an_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let error = AppConfig::load(LoadOptions {
            config_path: Some(dir.path().join("absent.toml")),
            require_file: true,
            ..LoadOptions::default()
        });

        ensure(
            matches!(error, Err(ConfigError::MissingConfigFile(_))),
            "require_file should surface a missing file",
        )
    }
}

//! Configuration loading from environment variables.
//!
//! Uses the following environment variables:
//! - `CONDUIT_ENVIRONMENT`: Path to a JSON run environment (optional)
//! - `CONDUIT_EVALUATE_EXPECTATIONS`: Override `expectations.evaluate` in the run environment (optional)
//! - `CONDUIT_LOG`: Tracing filter directive (default: info)

use std::{env, fs, path::PathBuf};

use anyhow::{Context, Result};

use conduit_definitions::Environment;

/// Default tracing filter when `CONDUIT_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info";

/// CLI configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// JSON run environment to compile pipelines against
    pub environment_path: Option<PathBuf>,

    /// Forces expectation evaluation on or off regardless of the run environment
    pub evaluate_expectations: Option<bool>,

    /// Filter passed to the tracing subscriber
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment_path: None,
            evaluate_expectations: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Loads `.env` file if present, then reads from environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let environment_path = lookup("CONDUIT_ENVIRONMENT")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        let evaluate_expectations = lookup("CONDUIT_EVALUATE_EXPECTATIONS")
            .map(|value| parse_flag(&value))
            .transpose()
            .context("invalid CONDUIT_EVALUATE_EXPECTATIONS value")?;

        let log_filter = lookup("CONDUIT_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            environment_path,
            evaluate_expectations,
            log_filter,
        })
    }

    /// Read the configured run environment, falling back to `fallback` when
    /// no path is set, then apply the expectation override.
    pub fn load_environment(&self, fallback: Environment) -> Result<Environment> {
        let environment = match &self.environment_path {
            Some(path) => load_environment(path)?,
            None => fallback,
        };
        Ok(match self.evaluate_expectations {
            Some(evaluate) => environment.with_expectations(evaluate),
            None => environment,
        })
    }
}

/// Parse a JSON run environment from disk.
pub fn load_environment(path: &std::path::Path) -> Result<Environment> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("read run environment {}", path.display()))?;
    Environment::from_json(&source)
        .with_context(|| format!("parse run environment {}", path.display()))
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => anyhow::bail!("expected a boolean, got {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use conduit_definitions::SolidConfig;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_reads_all_variables() {
        let config = Config::from_lookup(lookup_from(&[
            ("CONDUIT_ENVIRONMENT", "env.json"),
            ("CONDUIT_EVALUATE_EXPECTATIONS", "0"),
            ("CONDUIT_LOG", "conduit_plan=debug"),
        ]))
        .unwrap();
        assert_eq!(config.environment_path, Some(PathBuf::from("env.json")));
        assert_eq!(config.evaluate_expectations, Some(false));
        assert_eq!(config.log_filter, "conduit_plan=debug");
    }

    #[test]
    fn test_rejects_bad_flag() {
        let err = Config::from_lookup(lookup_from(&[("CONDUIT_EVALUATE_EXPECTATIONS", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("CONDUIT_EVALUATE_EXPECTATIONS"));
    }

    #[test]
    fn test_load_environment_from_file_with_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.json");
        fs::write(
            &path,
            r#"{"solids": {"load_a": {"inputs": {"num": 7}}}, "expectations": {"evaluate": true}}"#,
        )
        .unwrap();

        let config = Config {
            environment_path: Some(path),
            evaluate_expectations: Some(false),
            ..Config::default()
        };
        let environment = config.load_environment(Environment::default()).unwrap();
        assert_eq!(environment.input_literal("load_a", "num"), Some(&json!(7)));
        assert!(!environment.expectations.evaluate);
    }

    #[test]
    fn test_load_environment_uses_fallback() {
        let fallback =
            Environment::default().with_solid("load_b", SolidConfig::with_config(json!(3)));
        let environment = Config::default().load_environment(fallback.clone()).unwrap();
        assert_eq!(environment, fallback);
    }

    #[test]
    fn test_missing_environment_file_reports_path() {
        let err = load_environment(std::path::Path::new("/nonexistent/conduit.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/conduit.json"));
    }
}

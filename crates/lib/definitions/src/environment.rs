//! Per-run environment: solid config, literal inputs, materializations.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Run environment handed to the compiler alongside a pipeline.
///
/// JSON example:
/// ```json
/// {
///   "solids": {
///     "load_a": {"config": 2},
///     "add": {"inputs": {"num": 5}, "outputs": {"result": [{"kind": "json", "config": {"path": "out.json"}}]}}
///   },
///   "expectations": {"evaluate": false}
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    pub solids: IndexMap<String, SolidConfig>,
    pub expectations: ExpectationsConfig,
    pub context: Option<Value>,
}

impl Environment {
    pub fn from_json(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(source)
    }

    pub fn solid(&self, name: &str) -> Option<&SolidConfig> {
        self.solids.get(name)
    }

    /// Literal configured for `input` on `solid`, if any.
    pub fn input_literal(&self, solid: &str, input: &str) -> Option<&Value> {
        self.solids
            .get(solid)
            .and_then(|config| config.inputs.get(input))
    }

    pub fn materializations(&self, solid: &str, output: &str) -> &[MaterializationTarget] {
        self.solids
            .get(solid)
            .and_then(|config| config.outputs.get(output))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn with_solid(mut self, name: impl Into<String>, config: SolidConfig) -> Self {
        self.solids.insert(name.into(), config);
        self
    }

    pub fn with_expectations(mut self, evaluate: bool) -> Self {
        self.expectations.evaluate = evaluate;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpectationsConfig {
    pub evaluate: bool,
}

impl Default for ExpectationsConfig {
    fn default() -> Self {
        Self { evaluate: true }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolidConfig {
    pub config: Option<Value>,
    pub inputs: IndexMap<String, Value>,
    pub outputs: IndexMap<String, Vec<MaterializationTarget>>,
}

impl SolidConfig {
    pub fn with_config(config: Value) -> Self {
        Self {
            config: Some(config),
            ..Self::default()
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, value: Value) -> Self {
        self.inputs.insert(name.into(), value);
        self
    }

    pub fn with_materialization(
        mut self,
        output: impl Into<String>,
        target: MaterializationTarget,
    ) -> Self {
        self.outputs.entry(output.into()).or_default().push(target);
        self
    }
}

/// Where and how to persist an output value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaterializationTarget {
    pub kind: String,
    #[serde(default)]
    pub config: Value,
}

impl MaterializationTarget {
    pub fn new(kind: impl Into<String>, config: Value) -> Self {
        Self {
            kind: kind.into(),
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parses_environment_json() {
        let env = Environment::from_json(
            r#"{
                "solids": {
                    "load_a": {"config": 2},
                    "add": {
                        "inputs": {"num": 5},
                        "outputs": {"result": [{"kind": "json", "config": {"path": "out.json"}}]}
                    }
                },
                "expectations": {"evaluate": false}
            }"#,
        )
        .expect("parse environment");

        assert!(!env.expectations.evaluate);
        assert_eq!(env.solid("load_a").and_then(|s| s.config.clone()), Some(json!(2)));
        assert_eq!(env.input_literal("add", "num"), Some(&json!(5)));
        assert_eq!(env.materializations("add", "result").len(), 1);
        assert_eq!(env.materializations("add", "other").len(), 0);
    }

    #[test]
    fn test_expectations_default_to_enabled() {
        let env = Environment::from_json("{}").expect("parse environment");
        assert!(env.expectations.evaluate);
        assert!(env.solids.is_empty());
    }
}

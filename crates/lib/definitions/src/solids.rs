//! Solid, input, output, and expectation definitions.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::types::RuntimeType;

/// Output name used when a definition does not name its output.
pub const DEFAULT_OUTPUT: &str = "result";

/// Raised by a solid's transform when it cannot produce its outputs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct TransformError(pub String);

/// Per-invocation context handed to a transform.
#[derive(Clone, Debug, PartialEq)]
pub struct TransformContext {
    pub solid: String,
    pub config: Option<Value>,
    /// Run-wide value from `Environment::context`, shared by every solid.
    pub run_context: Option<Value>,
}

pub type TransformFn = Arc<
    dyn Fn(&TransformContext, &HashMap<String, Value>) -> Result<HashMap<String, Value>, TransformError>
        + Send
        + Sync,
>;

#[derive(Clone, Debug, PartialEq)]
pub struct ExpectationContext {
    pub solid: String,
    pub expectation: String,
}

/// Outcome of evaluating a single expectation predicate.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpectationResult {
    pub success: bool,
    pub message: Option<String>,
}

impl ExpectationResult {
    pub fn passed() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

pub type ExpectationFn =
    Arc<dyn Fn(&ExpectationContext, &Value) -> ExpectationResult + Send + Sync>;

/// Named runtime predicate attached to an input or output.
#[derive(Clone)]
pub struct ExpectationDefinition {
    pub name: String,
    pub description: Option<String>,
    pub check: ExpectationFn,
}

impl ExpectationDefinition {
    pub fn new(
        name: impl Into<String>,
        check: impl Fn(&ExpectationContext, &Value) -> ExpectationResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            check: Arc::new(check),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Debug for ExpectationDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpectationDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub struct InputDefinition {
    pub name: String,
    pub runtime_type: RuntimeType,
    pub expectations: Vec<ExpectationDefinition>,
}

impl InputDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            runtime_type: RuntimeType::any(),
            expectations: Vec::new(),
        }
    }

    pub fn typed(name: impl Into<String>, runtime_type: RuntimeType) -> Self {
        Self {
            runtime_type,
            ..Self::new(name)
        }
    }

    pub fn with_expectation(mut self, expectation: ExpectationDefinition) -> Self {
        self.expectations.push(expectation);
        self
    }
}

#[derive(Clone, Debug)]
pub struct OutputDefinition {
    pub name: String,
    pub runtime_type: RuntimeType,
    pub expectations: Vec<ExpectationDefinition>,
}

impl Default for OutputDefinition {
    fn default() -> Self {
        Self {
            name: DEFAULT_OUTPUT.to_string(),
            runtime_type: RuntimeType::any(),
            expectations: Vec::new(),
        }
    }
}

impl OutputDefinition {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn typed(runtime_type: RuntimeType) -> Self {
        Self {
            runtime_type,
            ..Self::default()
        }
    }

    pub fn with_expectation(mut self, expectation: ExpectationDefinition) -> Self {
        self.expectations.push(expectation);
        self
    }
}

/// Reusable computation template instantiated by one or more solids.
#[derive(Clone)]
pub struct SolidDefinition {
    pub name: String,
    pub inputs: Vec<InputDefinition>,
    pub outputs: Vec<OutputDefinition>,
    pub transform: TransformFn,
    pub config_description: Option<String>,
}

impl SolidDefinition {
    pub fn new(
        name: impl Into<String>,
        inputs: Vec<InputDefinition>,
        outputs: Vec<OutputDefinition>,
        transform: impl Fn(&TransformContext, &HashMap<String, Value>) -> Result<HashMap<String, Value>, TransformError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            inputs,
            outputs,
            transform: Arc::new(transform),
            config_description: None,
        }
    }

    pub fn with_config_description(mut self, description: impl Into<String>) -> Self {
        self.config_description = Some(description.into());
        self
    }

    pub fn input_def(&self, name: &str) -> Option<&InputDefinition> {
        self.inputs.iter().find(|input| input.name == name)
    }

    pub fn output_def(&self, name: &str) -> Option<&OutputDefinition> {
        self.outputs.iter().find(|output| output.name == name)
    }

    pub fn has_input(&self, name: &str) -> bool {
        self.input_def(name).is_some()
    }

    pub fn has_output(&self, name: &str) -> bool {
        self.output_def(name).is_some()
    }
}

impl fmt::Debug for SolidDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolidDefinition")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("config_description", &self.config_description)
            .finish_non_exhaustive()
    }
}

/// Define a solid with a single `result` output computed from its inputs.
///
/// Example:
/// - `lambda_solid("first", vec![], |_| Ok(json!(["first"])))`
pub fn lambda_solid(
    name: impl Into<String>,
    inputs: Vec<InputDefinition>,
    body: impl Fn(&HashMap<String, Value>) -> Result<Value, TransformError> + Send + Sync + 'static,
) -> SolidDefinition {
    SolidDefinition::new(
        name,
        inputs,
        vec![OutputDefinition::default()],
        move |_context, inputs| {
            let value = body(inputs)?;
            Ok(HashMap::from([(DEFAULT_OUTPUT.to_string(), value)]))
        },
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_lambda_solid_maps_body_to_default_output() {
        let solid = lambda_solid("double", vec![InputDefinition::new("num")], |inputs| {
            let num = inputs.get("num").and_then(Value::as_i64).unwrap_or_default();
            Ok(json!(num * 2))
        });
        let context = TransformContext {
            solid: "double".to_string(),
            config: None,
            run_context: None,
        };
        let inputs = HashMap::from([("num".to_string(), json!(21))]);
        let outputs = (solid.transform)(&context, &inputs).expect("transform");
        assert_eq!(outputs.get(DEFAULT_OUTPUT), Some(&json!(42)));
        assert!(solid.has_output(DEFAULT_OUTPUT));
        assert!(solid.has_input("num"));
    }

    #[test]
    fn test_output_definition_defaults_to_result() {
        let output = OutputDefinition::typed(RuntimeType::int());
        assert_eq!(output.name, DEFAULT_OUTPUT);
        assert_eq!(output.runtime_type.name(), "Int");
    }
}

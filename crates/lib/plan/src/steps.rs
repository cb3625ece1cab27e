//! Execution step definitions.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use conduit_definitions::{MaterializationTarget, RuntimeType};

/// Output name carried by the subplan entry sentinel.
pub const SUBPLAN_ENTRY: &str = "SUBPLAN_ENTRY";
pub const INPUT_THUNK_OUTPUT: &str = "input_thunk_output";
pub const VALUE_THUNK_OUTPUT: &str = "value_thunk_output";
pub const EXPECTATION_INPUT: &str = "expectation_input";
pub const EXPECTATION_OUTPUT: &str = "expectation_value";
pub const MATERIALIZATION_INPUT: &str = "materialization_input";
pub const MATERIALIZATION_OUTPUT: &str = "materialization_value";

pub fn transform_step_key(solid: &str) -> String {
    format!("{solid}.transform")
}

pub fn input_thunk_step_key(solid: &str, input: &str) -> String {
    format!("{solid}.input.{input}.input_thunk")
}

pub fn input_expectation_step_key(solid: &str, input: &str, expectation: &str) -> String {
    format!("{solid}.input.{input}.expectation.{expectation}")
}

pub fn output_expectation_step_key(solid: &str, output: &str, expectation: &str) -> String {
    format!("{solid}.output.{output}.expectation.{expectation}")
}

pub fn materialization_step_key(solid: &str, output: &str, index: usize) -> String {
    format!("{solid}.output.{output}.materialization.{index}")
}

pub fn value_thunk_step_key(step: &str, input: &str) -> String {
    format!("{step}.input.{input}.value")
}

/// Kind of work a step performs; the executor switches on this.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepTag {
    Transform,
    InputThunk,
    ValueThunk,
    InputExpectation,
    OutputExpectation,
    Materialization,
}

impl StepTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepTag::Transform => "TRANSFORM",
            StepTag::InputThunk => "INPUT_THUNK",
            StepTag::ValueThunk => "VALUE_THUNK",
            StepTag::InputExpectation => "INPUT_EXPECTATION",
            StepTag::OutputExpectation => "OUTPUT_EXPECTATION",
            StepTag::Materialization => "MATERIALIZATION",
        }
    }
}

impl fmt::Display for StepTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a value produced by a step.
///
/// `SubplanEntry` marks a value supplied per-iteration by the enclosing
/// runtime rather than by a concrete upstream step (the fan-out boundary).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutputHandle {
    Step { step_key: String, output: String },
    SubplanEntry,
}

impl StepOutputHandle {
    pub fn new(step_key: impl Into<String>, output: impl Into<String>) -> Self {
        StepOutputHandle::Step {
            step_key: step_key.into(),
            output: output.into(),
        }
    }

    pub fn step_key(&self) -> Option<&str> {
        match self {
            StepOutputHandle::Step { step_key, .. } => Some(step_key),
            StepOutputHandle::SubplanEntry => None,
        }
    }

    pub fn output_name(&self) -> &str {
        match self {
            StepOutputHandle::Step { output, .. } => output,
            StepOutputHandle::SubplanEntry => SUBPLAN_ENTRY,
        }
    }

    pub fn is_subplan_entry(&self) -> bool {
        matches!(self, StepOutputHandle::SubplanEntry)
    }
}

impl fmt::Display for StepOutputHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutputHandle::Step { step_key, output } => write!(f, "{step_key}.{output}"),
            StepOutputHandle::SubplanEntry => f.write_str(SUBPLAN_ENTRY),
        }
    }
}

/// One resolved input to a step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepInput {
    pub name: String,
    pub runtime_type: RuntimeType,
    pub prev_output_handle: StepOutputHandle,
}

impl StepInput {
    pub fn new(
        name: impl Into<String>,
        runtime_type: RuntimeType,
        prev_output_handle: StepOutputHandle,
    ) -> Self {
        Self {
            name: name.into(),
            runtime_type,
            prev_output_handle,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepOutput {
    pub name: String,
    pub runtime_type: RuntimeType,
}

impl StepOutput {
    pub fn new(name: impl Into<String>, runtime_type: RuntimeType) -> Self {
        Self {
            name: name.into(),
            runtime_type,
        }
    }
}

/// Runs the solid's transform over its resolved inputs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformStep {
    pub key: String,
    pub solid: String,
    pub definition: String,
    pub inputs: Vec<StepInput>,
    pub outputs: Vec<StepOutput>,
    pub config: Option<Value>,
}

/// Introduces a configuration literal for one solid input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputThunkStep {
    pub key: String,
    pub solid: String,
    pub input_name: String,
    pub runtime_type: RuntimeType,
    pub value: Value,
}

/// Introduces a literal override while deriving a subplan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueThunkStep {
    pub key: String,
    pub solid: String,
    pub runtime_type: RuntimeType,
    pub value: Value,
}

/// Checks one expectation on a value flowing into a transform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputExpectationStep {
    pub key: String,
    pub solid: String,
    pub input_name: String,
    pub expectation: String,
    pub input: StepInput,
}

/// Checks one expectation on a value produced by a transform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputExpectationStep {
    pub key: String,
    pub solid: String,
    pub output_name: String,
    pub expectation: String,
    pub input: StepInput,
}

/// Persists an output value to the configured target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaterializationStep {
    pub key: String,
    pub solid: String,
    pub output_name: String,
    pub target: MaterializationTarget,
    pub input: StepInput,
}

/// Atomic unit of work in an execution plan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tag", content = "step", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStep {
    Transform(TransformStep),
    InputThunk(InputThunkStep),
    ValueThunk(ValueThunkStep),
    InputExpectation(InputExpectationStep),
    OutputExpectation(OutputExpectationStep),
    Materialization(MaterializationStep),
}

trait StepView {
    fn key(&self) -> &str;
    fn solid(&self) -> &str;
    fn step_inputs(&self) -> &[StepInput];
    fn step_outputs(&self) -> Vec<StepOutput>;
}

impl StepView for TransformStep {
    fn key(&self) -> &str {
        &self.key
    }

    fn solid(&self) -> &str {
        &self.solid
    }

    fn step_inputs(&self) -> &[StepInput] {
        &self.inputs
    }

    fn step_outputs(&self) -> Vec<StepOutput> {
        self.outputs.clone()
    }
}

macro_rules! impl_thunk_view {
    ($ty:ty, $output:expr) => {
        impl StepView for $ty {
            fn key(&self) -> &str {
                &self.key
            }

            fn solid(&self) -> &str {
                &self.solid
            }

            fn step_inputs(&self) -> &[StepInput] {
                &[]
            }

            fn step_outputs(&self) -> Vec<StepOutput> {
                vec![StepOutput::new($output, self.runtime_type.clone())]
            }
        }
    };
}

impl_thunk_view!(InputThunkStep, INPUT_THUNK_OUTPUT);
impl_thunk_view!(ValueThunkStep, VALUE_THUNK_OUTPUT);

macro_rules! impl_pass_through_view {
    ($ty:ty, $output:expr) => {
        impl StepView for $ty {
            fn key(&self) -> &str {
                &self.key
            }

            fn solid(&self) -> &str {
                &self.solid
            }

            fn step_inputs(&self) -> &[StepInput] {
                std::slice::from_ref(&self.input)
            }

            fn step_outputs(&self) -> Vec<StepOutput> {
                vec![StepOutput::new($output, self.input.runtime_type.clone())]
            }
        }
    };
}

impl_pass_through_view!(InputExpectationStep, EXPECTATION_OUTPUT);
impl_pass_through_view!(OutputExpectationStep, EXPECTATION_OUTPUT);
impl_pass_through_view!(MaterializationStep, MATERIALIZATION_OUTPUT);

macro_rules! for_each_step_variant {
    ($macro:ident) => {
        $macro!(Transform, as_transform, TransformStep);
        $macro!(InputThunk, as_input_thunk, InputThunkStep);
        $macro!(ValueThunk, as_value_thunk, ValueThunkStep);
        $macro!(InputExpectation, as_input_expectation, InputExpectationStep);
        $macro!(OutputExpectation, as_output_expectation, OutputExpectationStep);
        $macro!(Materialization, as_materialization, MaterializationStep);
    };
}

macro_rules! impl_step_as {
    ($variant:ident, $method:ident, $ty:ty) => {
        pub fn $method(&self) -> Option<&$ty> {
            if let ExecutionStep::$variant(step) = self {
                Some(step)
            } else {
                None
            }
        }
    };
}

impl ExecutionStep {
    fn view(&self) -> &dyn StepView {
        match self {
            ExecutionStep::Transform(step) => step,
            ExecutionStep::InputThunk(step) => step,
            ExecutionStep::ValueThunk(step) => step,
            ExecutionStep::InputExpectation(step) => step,
            ExecutionStep::OutputExpectation(step) => step,
            ExecutionStep::Materialization(step) => step,
        }
    }

    pub fn key(&self) -> &str {
        self.view().key()
    }

    pub fn solid(&self) -> &str {
        self.view().solid()
    }

    pub fn step_inputs(&self) -> &[StepInput] {
        self.view().step_inputs()
    }

    pub fn step_outputs(&self) -> Vec<StepOutput> {
        self.view().step_outputs()
    }

    pub fn step_input(&self, name: &str) -> Option<&StepInput> {
        self.step_inputs().iter().find(|input| input.name == name)
    }

    pub fn has_output(&self, name: &str) -> bool {
        self.step_outputs().iter().any(|output| output.name == name)
    }

    /// Handle for the step's sole (or first) output.
    pub fn output_handle(&self) -> Option<StepOutputHandle> {
        self.step_outputs()
            .first()
            .map(|output| StepOutputHandle::new(self.key(), &output.name))
    }

    pub fn tag(&self) -> StepTag {
        match self {
            ExecutionStep::Transform(_) => StepTag::Transform,
            ExecutionStep::InputThunk(_) => StepTag::InputThunk,
            ExecutionStep::ValueThunk(_) => StepTag::ValueThunk,
            ExecutionStep::InputExpectation(_) => StepTag::InputExpectation,
            ExecutionStep::OutputExpectation(_) => StepTag::OutputExpectation,
            ExecutionStep::Materialization(_) => StepTag::Materialization,
        }
    }

    /// Keys of the steps this one reads from; the subplan sentinel is skipped.
    pub fn upstream_keys(&self) -> impl Iterator<Item = &str> {
        self.step_inputs()
            .iter()
            .filter_map(|input| input.prev_output_handle.step_key())
    }

    /// Rebuild the step with `inputs` replacing same-named existing inputs.
    pub fn with_new_inputs(&self, inputs: Vec<StepInput>) -> ExecutionStep {
        let mut step = self.clone();
        match &mut step {
            ExecutionStep::Transform(transform) => transform.inputs = inputs,
            ExecutionStep::InputExpectation(InputExpectationStep { input, .. })
            | ExecutionStep::OutputExpectation(OutputExpectationStep { input, .. })
            | ExecutionStep::Materialization(MaterializationStep { input, .. }) => {
                replace_single_input(input, inputs)
            }
            ExecutionStep::InputThunk(_) | ExecutionStep::ValueThunk(_) => {}
        }
        step
    }

    for_each_step_variant!(impl_step_as);
}

fn replace_single_input(current: &mut StepInput, inputs: Vec<StepInput>) {
    if let Some(replacement) = inputs.into_iter().find(|input| input.name == current.name) {
        *current = replacement;
    }
}

macro_rules! impl_step_from {
    ($variant:ident, $method:ident, $ty:ty) => {
        impl From<$ty> for ExecutionStep {
            fn from(step: $ty) -> Self {
                ExecutionStep::$variant(step)
            }
        }
    };
}

for_each_step_variant!(impl_step_from);

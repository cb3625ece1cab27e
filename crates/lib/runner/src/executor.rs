//! Sequential in-process execution of compiled plans.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use conduit_definitions::{
    Dependency, Environment, ExpectationContext, ExpectationDefinition, PipelineDefinition,
    SolidDefinition, TransformContext, TransformError,
};
use conduit_plan::{
    EXPECTATION_OUTPUT, ExecutionPlan, ExecutionStep, INPUT_THUNK_OUTPUT, MATERIALIZATION_OUTPUT,
    PlanError, StepInput, StepOutputHandle, VALUE_THUNK_OUTPUT, create_execution_plan,
    steps::transform_step_key, validate_plan,
};

use super::materializers::{
    JsonFileMaterializer, MaterializationRecord, MaterializationRequest, Materializer,
    MaterializerError,
};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("Step {step} belongs to solid {solid}, which is not in pipeline {pipeline}")]
    UnknownSolid {
        step: String,
        solid: String,
        pipeline: String,
    },
    #[error("Step {step} reads {handle}, which has not been produced")]
    MissingValue { step: String, handle: String },
    #[error("Step {step} input {input} reads the subplan entry, but no entry value was supplied")]
    MissingSubplanEntry { step: String, input: String },
    #[error("Transform for solid {solid} failed: {source}")]
    TransformFailed {
        solid: String,
        #[source]
        source: TransformError,
    },
    #[error("Solid {solid} did not produce declared output {output}")]
    MissingOutput { solid: String, output: String },
    #[error("Step {step} names expectation {expectation}, which solid {solid} does not declare")]
    UnknownExpectation {
        step: String,
        solid: String,
        expectation: String,
    },
    #[error("Expectation {expectation} failed at step {step}: {message}")]
    ExpectationFailed {
        step: String,
        expectation: String,
        message: String,
    },
    #[error("Step {step} requests materializer kind {kind}, which is not registered")]
    UnknownMaterializer { step: String, kind: String },
    #[error("Materialization step {step} failed: {source}")]
    MaterializationFailed {
        step: String,
        #[source]
        source: MaterializerError,
    },
    #[error("Scope opened by solid {solid} expects a sequence from {upstream}")]
    FanOutNotSequence { solid: String, upstream: String },
}

/// Values produced by one plan execution.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RunResult {
    /// Step key -> output name -> value, in execution order.
    pub step_outputs: IndexMap<String, IndexMap<String, Value>>,
    pub materializations: Vec<MaterializationRecord>,
    /// One result per element for every fan-out scope, keyed by opening solid.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub scope_runs: IndexMap<String, Vec<RunResult>>,
}

impl RunResult {
    pub fn output(&self, step_key: &str, output: &str) -> Option<&Value> {
        self.step_outputs
            .get(step_key)
            .and_then(|outputs| outputs.get(output))
    }

    /// Raw value of `output` as returned by `solid`'s transform.
    pub fn transformed_value(&self, solid: &str, output: &str) -> Option<&Value> {
        self.output(&transform_step_key(solid), output)
    }

    pub fn executed_steps(&self) -> impl Iterator<Item = &str> {
        self.step_outputs.keys().map(String::as_str)
    }

    fn value_for(&self, handle: &StepOutputHandle) -> Option<&Value> {
        handle
            .step_key()
            .and_then(|step_key| self.output(step_key, handle.output_name()))
    }

    fn record(&mut self, step_key: &str, output: &str, value: Value) {
        self.step_outputs
            .entry(step_key.to_string())
            .or_default()
            .insert(output.to_string(), value);
    }
}

/// Walks a compiled plan step by step against the pipeline it came from.
pub struct PlanExecutor<'a> {
    pipeline: &'a PipelineDefinition,
    materializers: FxHashMap<String, Arc<dyn Materializer>>,
    run_context: Option<Value>,
}

impl<'a> PlanExecutor<'a> {
    /// Executor with the `json` file materializer registered.
    pub fn new(pipeline: &'a PipelineDefinition) -> Self {
        Self {
            pipeline,
            materializers: FxHashMap::default(),
            run_context: None,
        }
        .with_materializer(Arc::new(JsonFileMaterializer))
    }

    /// Register `materializer` under its kind, replacing any previous one.
    pub fn with_materializer(mut self, materializer: Arc<dyn Materializer>) -> Self {
        self.materializers
            .insert(materializer.kind().to_string(), materializer);
        self
    }

    /// Hand `context` to every transform as `TransformContext::run_context`.
    pub fn with_run_context(mut self, context: Option<Value>) -> Self {
        self.run_context = context;
        self
    }

    /// Run every step of `plan` in dependency order.
    ///
    /// Independent steps run in step-dictionary order. `entry` supplies
    /// inputs that read the subplan entry. Fan-out scopes run once per
    /// element of the sequence that feeds them, after the enclosing plan.
    pub fn execute(&self, plan: &ExecutionPlan, entry: Option<Value>) -> Result<RunResult, RunError> {
        validate_plan(plan)?;
        info!(
            pipeline = %self.pipeline.name,
            steps = plan.len(),
            scopes = plan.scopes.len(),
            "executing plan"
        );
        let result = self.execute_scope(plan, entry.as_ref())?;
        info!(
            pipeline = %self.pipeline.name,
            executed = result.step_outputs.len(),
            materializations = result.materializations.len(),
            "plan finished"
        );
        Ok(result)
    }

    fn execute_scope(
        &self,
        plan: &ExecutionPlan,
        entry: Option<&Value>,
    ) -> Result<RunResult, RunError> {
        let mut result = RunResult::default();
        for key in plan.topological_step_keys()? {
            let Some(step) = plan.get_step(&key) else {
                continue;
            };
            debug!(step = %key, tag = %step.tag(), "executing step");
            self.execute_step(step, entry, &mut result)?;
        }

        for (opened_by, scope) in &plan.scopes {
            let elements = self.fan_out_elements(opened_by, &result)?;
            let mut runs = Vec::with_capacity(elements.len());
            for element in &elements {
                runs.push(self.execute_scope(scope, Some(element))?);
            }
            debug!(scope = %opened_by, runs = runs.len(), "executed fan-out scope");
            result.scope_runs.insert(opened_by.clone(), runs);
        }
        Ok(result)
    }

    fn execute_step(
        &self,
        step: &ExecutionStep,
        entry: Option<&Value>,
        result: &mut RunResult,
    ) -> Result<(), RunError> {
        match step {
            ExecutionStep::InputThunk(thunk) => {
                result.record(&thunk.key, INPUT_THUNK_OUTPUT, thunk.value.clone());
            }
            ExecutionStep::ValueThunk(thunk) => {
                result.record(&thunk.key, VALUE_THUNK_OUTPUT, thunk.value.clone());
            }
            ExecutionStep::Transform(transform) => {
                let definition = self.definition_for(&transform.key, &transform.solid)?;
                let mut inputs = HashMap::with_capacity(transform.inputs.len());
                for input in &transform.inputs {
                    let value = resolve_input(&transform.key, input, entry, result)?;
                    inputs.insert(input.name.clone(), value);
                }
                let context = TransformContext {
                    solid: transform.solid.clone(),
                    config: transform.config.clone(),
                    run_context: self.run_context.clone(),
                };
                let mut outputs = (definition.transform)(&context, &inputs).map_err(|source| {
                    RunError::TransformFailed {
                        solid: transform.solid.clone(),
                        source,
                    }
                })?;
                for output in &transform.outputs {
                    let value = outputs.remove(&output.name).ok_or_else(|| RunError::MissingOutput {
                        solid: transform.solid.clone(),
                        output: output.name.clone(),
                    })?;
                    result.record(&transform.key, &output.name, value);
                }
            }
            ExecutionStep::InputExpectation(step) => {
                let definition = self.definition_for(&step.key, &step.solid)?;
                let expectation = definition
                    .input_def(&step.input_name)
                    .and_then(|input_def| find_expectation(&input_def.expectations, &step.expectation));
                let value = resolve_input(&step.key, &step.input, entry, result)?;
                check_expectation(&step.key, &step.solid, &step.expectation, expectation, &value)?;
                result.record(&step.key, EXPECTATION_OUTPUT, value);
            }
            ExecutionStep::OutputExpectation(step) => {
                let definition = self.definition_for(&step.key, &step.solid)?;
                let expectation = definition
                    .output_def(&step.output_name)
                    .and_then(|output_def| find_expectation(&output_def.expectations, &step.expectation));
                let value = resolve_input(&step.key, &step.input, entry, result)?;
                check_expectation(&step.key, &step.solid, &step.expectation, expectation, &value)?;
                result.record(&step.key, EXPECTATION_OUTPUT, value);
            }
            ExecutionStep::Materialization(step) => {
                let materializer = self.materializers.get(&step.target.kind).ok_or_else(|| {
                    RunError::UnknownMaterializer {
                        step: step.key.clone(),
                        kind: step.target.kind.clone(),
                    }
                })?;
                let value = resolve_input(&step.key, &step.input, entry, result)?;
                let request = MaterializationRequest {
                    step_key: &step.key,
                    solid: &step.solid,
                    output: &step.output_name,
                    config: &step.target.config,
                };
                let record = materializer.materialize(&request, &value).map_err(|source| {
                    RunError::MaterializationFailed {
                        step: step.key.clone(),
                        source,
                    }
                })?;
                info!(step = %step.key, kind = %record.kind, "materialized output");
                result.materializations.push(record);
                result.record(&step.key, MATERIALIZATION_OUTPUT, value);
            }
        }
        Ok(())
    }

    fn definition_for(&self, step: &str, solid: &str) -> Result<&SolidDefinition, RunError> {
        self.pipeline
            .solid_named(solid)
            .map(|solid| solid.definition.as_ref())
            .ok_or_else(|| RunError::UnknownSolid {
                step: step.to_string(),
                solid: solid.to_string(),
                pipeline: self.pipeline.name.clone(),
            })
    }

    /// Elements of the sequence feeding the scope opened by `opened_by`.
    fn fan_out_elements(&self, opened_by: &str, result: &RunResult) -> Result<Vec<Value>, RunError> {
        let upstream = self
            .pipeline
            .dependency_structure()
            .deps_of_solid(opened_by)
            .find_map(|(_, dependency)| match dependency {
                Dependency::FanOut(source) => Some(source.clone()),
                _ => None,
            })
            .ok_or_else(|| RunError::UnknownSolid {
                step: transform_step_key(opened_by),
                solid: opened_by.to_string(),
                pipeline: self.pipeline.name.clone(),
            })?;

        match result.transformed_value(&upstream.solid, &upstream.output) {
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(_) => Err(RunError::FanOutNotSequence {
                solid: opened_by.to_string(),
                upstream: upstream.to_string(),
            }),
            None => Err(RunError::MissingValue {
                step: transform_step_key(opened_by),
                handle: StepOutputHandle::new(transform_step_key(&upstream.solid), &upstream.output)
                    .to_string(),
            }),
        }
    }
}

fn check_expectation(
    step: &str,
    solid: &str,
    name: &str,
    expectation: Option<&ExpectationDefinition>,
    value: &Value,
) -> Result<(), RunError> {
    let expectation = expectation.ok_or_else(|| RunError::UnknownExpectation {
        step: step.to_string(),
        solid: solid.to_string(),
        expectation: name.to_string(),
    })?;
    let context = ExpectationContext {
        solid: solid.to_string(),
        expectation: name.to_string(),
    };
    let outcome = (expectation.check)(&context, value);
    if outcome.success {
        return Ok(());
    }
    Err(RunError::ExpectationFailed {
        step: step.to_string(),
        expectation: name.to_string(),
        message: outcome
            .message
            .unwrap_or_else(|| "expectation not met".to_string()),
    })
}

fn find_expectation<'d>(
    expectations: &'d [ExpectationDefinition],
    name: &str,
) -> Option<&'d ExpectationDefinition> {
    expectations.iter().find(|expectation| expectation.name == name)
}

fn resolve_input(
    step: &str,
    input: &StepInput,
    entry: Option<&Value>,
    result: &RunResult,
) -> Result<Value, RunError> {
    match &input.prev_output_handle {
        StepOutputHandle::SubplanEntry => {
            entry.cloned().ok_or_else(|| RunError::MissingSubplanEntry {
                step: step.to_string(),
                input: input.name.clone(),
            })
        }
        handle => result
            .value_for(handle)
            .cloned()
            .ok_or_else(|| RunError::MissingValue {
                step: step.to_string(),
                handle: handle.to_string(),
            }),
    }
}

/// Compile `pipeline` under `environment` and execute the plan.
pub fn execute_pipeline(
    pipeline: &PipelineDefinition,
    environment: &Environment,
) -> Result<RunResult, RunError> {
    let plan = create_execution_plan(pipeline, environment)?;
    PlanExecutor::new(pipeline)
        .with_run_context(environment.context.clone())
        .execute(&plan, None)
}

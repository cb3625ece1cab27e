//! Expectation and materialization decorators around step values.

use conduit_definitions::{InputDefinition, OutputDefinition, Solid};

use super::super::models::ExecutionValueSubPlan;
use super::super::steps::{
    EXPECTATION_INPUT, EXPECTATION_OUTPUT, InputExpectationStep, MATERIALIZATION_INPUT,
    MaterializationStep, OutputExpectationStep, StepInput, StepOutputHandle, TransformStep,
    input_expectation_step_key, materialization_step_key, output_expectation_step_key,
};
use super::compiler::PlanCompiler;

impl PlanCompiler<'_> {
    fn evaluate_expectations(&self) -> bool {
        self.environment.expectations.evaluate
    }

    /// Chain one expectation step per input expectation after `prev_handle`.
    pub(super) fn input_value_subplan(
        &self,
        solid: &Solid,
        prev_handle: StepOutputHandle,
        input_def: &InputDefinition,
    ) -> ExecutionValueSubPlan {
        if !self.evaluate_expectations() || input_def.expectations.is_empty() {
            return ExecutionValueSubPlan::empty(prev_handle);
        }

        let mut steps = Vec::with_capacity(input_def.expectations.len());
        let mut terminal = prev_handle;
        for expectation in &input_def.expectations {
            let key = input_expectation_step_key(&solid.name, &input_def.name, &expectation.name);
            let step = InputExpectationStep {
                key: key.clone(),
                solid: solid.name.clone(),
                input_name: input_def.name.clone(),
                expectation: expectation.name.clone(),
                input: StepInput::new(EXPECTATION_INPUT, input_def.runtime_type.clone(), terminal),
            };
            terminal = StepOutputHandle::new(key, EXPECTATION_OUTPUT);
            steps.push(step.into());
        }
        ExecutionValueSubPlan::new(steps, terminal)
    }

    /// Output expectations chained after the transform, then one
    /// materialization leaf per configured target.
    ///
    /// Materializations hang off the checked value; the terminal handle
    /// stays the last expectation's output (or the transform's).
    pub(super) fn output_value_subplan(
        &self,
        solid: &Solid,
        transform_step: &TransformStep,
        output_def: &OutputDefinition,
    ) -> ExecutionValueSubPlan {
        let subplan = self.decorate_with_expectations(solid, transform_step, output_def);
        self.decorate_with_materializations(solid, output_def, subplan)
    }

    fn decorate_with_expectations(
        &self,
        solid: &Solid,
        transform_step: &TransformStep,
        output_def: &OutputDefinition,
    ) -> ExecutionValueSubPlan {
        let transform_handle = StepOutputHandle::new(&transform_step.key, &output_def.name);
        if !self.evaluate_expectations() || output_def.expectations.is_empty() {
            return ExecutionValueSubPlan::empty(transform_handle);
        }

        let mut steps = Vec::with_capacity(output_def.expectations.len());
        let mut terminal = transform_handle;
        for expectation in &output_def.expectations {
            let key = output_expectation_step_key(&solid.name, &output_def.name, &expectation.name);
            let step = OutputExpectationStep {
                key: key.clone(),
                solid: solid.name.clone(),
                output_name: output_def.name.clone(),
                expectation: expectation.name.clone(),
                input: StepInput::new(EXPECTATION_INPUT, output_def.runtime_type.clone(), terminal),
            };
            terminal = StepOutputHandle::new(key, EXPECTATION_OUTPUT);
            steps.push(step.into());
        }
        ExecutionValueSubPlan::new(steps, terminal)
    }

    fn decorate_with_materializations(
        &self,
        solid: &Solid,
        output_def: &OutputDefinition,
        mut subplan: ExecutionValueSubPlan,
    ) -> ExecutionValueSubPlan {
        let targets = self.environment.materializations(&solid.name, &output_def.name);
        for (index, target) in targets.iter().enumerate() {
            let step = MaterializationStep {
                key: materialization_step_key(&solid.name, &output_def.name, index),
                solid: solid.name.clone(),
                output_name: output_def.name.clone(),
                target: target.clone(),
                input: StepInput::new(
                    MATERIALIZATION_INPUT,
                    output_def.runtime_type.clone(),
                    subplan.terminal_step_output_handle.clone(),
                ),
            };
            subplan.steps.push(step.into());
        }
        subplan
    }
}

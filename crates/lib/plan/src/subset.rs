//! Subplan derivation from a compiled execution plan.

use tracing::debug;

use super::models::{ExecutionPlan, ExecutionPlanSubsetInfo, PlanError};
use super::steps::{
    ExecutionStep, StepInput, StepOutputHandle, VALUE_THUNK_OUTPUT, ValueThunkStep,
    value_thunk_step_key,
};

/// Keep only the steps named in `subset_info`, replacing overridden inputs
/// with value thunks.
///
/// Steps are visited in the source plan's order. A retained step without
/// overrides is kept verbatim. Every overridden input gets a zero-input
/// `{step}.input.{input}.value` step placed just before its consumer. The
/// result is reassembled, so a retained step whose producer was dropped and
/// not overridden fails with a dangling-dependency error. Child scopes are
/// carried over unchanged.
pub fn create_subplan(
    plan: &ExecutionPlan,
    subset_info: &ExecutionPlanSubsetInfo,
) -> Result<ExecutionPlan, PlanError> {
    for key in subset_info.subset.iter().chain(subset_info.inputs.keys()) {
        if !plan.has_step(key) {
            return Err(PlanError::UnknownSubsetStep(key.clone()));
        }
    }

    let mut steps = Vec::with_capacity(subset_info.subset.len());
    for step in plan.steps() {
        if !subset_info.contains(step.key()) {
            continue;
        }
        match subset_info.overrides_for(step.key()) {
            None => steps.push(step.clone()),
            Some(_) => steps.extend(new_steps_for_inputs(step, subset_info)?),
        }
    }

    debug!(
        source_steps = plan.len(),
        retained_steps = steps.len(),
        "derived subplan"
    );
    Ok(ExecutionPlan::from_steps(steps)?.with_scopes(plan.scopes.clone()))
}

fn new_steps_for_inputs(
    step: &ExecutionStep,
    subset_info: &ExecutionPlanSubsetInfo,
) -> Result<Vec<ExecutionStep>, PlanError> {
    let overrides = subset_info.overrides_for(step.key()).cloned().unwrap_or_default();
    for input in overrides.keys() {
        if step.step_input(input).is_none() {
            return Err(PlanError::UnknownSubsetInput {
                step: step.key().to_string(),
                input: input.clone(),
            });
        }
    }

    let mut new_steps = Vec::with_capacity(overrides.len() + 1);
    let mut new_inputs = Vec::with_capacity(step.step_inputs().len());
    for step_input in step.step_inputs() {
        match overrides.get(&step_input.name) {
            Some(value) => {
                let thunk = ValueThunkStep {
                    key: value_thunk_step_key(step.key(), &step_input.name),
                    solid: step.solid().to_string(),
                    runtime_type: step_input.runtime_type.clone(),
                    value: value.clone(),
                };
                new_inputs.push(StepInput::new(
                    &step_input.name,
                    step_input.runtime_type.clone(),
                    StepOutputHandle::new(&thunk.key, VALUE_THUNK_OUTPUT),
                ));
                new_steps.push(thunk.into());
            }
            None => new_inputs.push(step_input.clone()),
        }
    }
    new_steps.push(step.with_new_inputs(new_inputs));
    Ok(new_steps)
}

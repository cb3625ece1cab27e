//! Step input resolution.

use conduit_definitions::{Dependency, InputDefinition, Solid};
use tracing::debug;

use super::super::models::PlanError;
use super::super::steps::{
    INPUT_THUNK_OUTPUT, InputThunkStep, StepInput, StepOutputHandle, input_thunk_step_key,
};
use super::compiler::PlanCompiler;
use super::stack::PlanBuilder;

impl PlanCompiler<'_> {
    /// Resolve every declared input of `solid`, appending any thunk and
    /// expectation steps to `builder`.
    pub(super) fn create_step_inputs(
        &self,
        builder: &mut PlanBuilder,
        solid: &Solid,
    ) -> Result<Vec<StepInput>, PlanError> {
        let mut step_inputs = Vec::with_capacity(solid.input_defs().len());
        for input_def in solid.input_defs() {
            let prev_handle = self.input_source_handle(builder, solid, input_def)?;
            let subplan = self.input_value_subplan(solid, prev_handle, input_def);
            builder.extend_steps(subplan.steps);
            step_inputs.push(StepInput::new(
                &input_def.name,
                input_def.runtime_type.clone(),
                subplan.terminal_step_output_handle,
            ));
        }
        Ok(step_inputs)
    }

    /// Producer of one input's raw value.
    ///
    /// Config literals win over dependencies. Fan-out inputs resolve to the
    /// subplan entry; direct inputs must already be compiled in this scope.
    pub(super) fn input_source_handle(
        &self,
        builder: &mut PlanBuilder,
        solid: &Solid,
        input_def: &InputDefinition,
    ) -> Result<StepOutputHandle, PlanError> {
        if let Some(value) = self.environment.input_literal(&solid.name, &input_def.name) {
            let step = InputThunkStep {
                key: input_thunk_step_key(&solid.name, &input_def.name),
                solid: solid.name.clone(),
                input_name: input_def.name.clone(),
                runtime_type: input_def.runtime_type.clone(),
                value: value.clone(),
            };
            let handle = StepOutputHandle::new(&step.key, INPUT_THUNK_OUTPUT);
            debug!(step = %step.key, "input satisfied by config literal");
            builder.push_step(step.into());
            return Ok(handle);
        }

        let input_handle = solid.input_handle(&input_def.name);
        let dependency = self
            .pipeline
            .dependency_structure()
            .get(&input_handle)
            .ok_or_else(|| PlanError::UnsatisfiedInput {
                pipeline: self.pipeline.name.clone(),
                solid: solid.name.clone(),
                input: input_def.name.clone(),
            })?;

        match dependency {
            Dependency::FanIn(_) => Err(PlanError::UnsupportedFanIn {
                pipeline: self.pipeline.name.clone(),
                solid: solid.name.clone(),
                input: input_def.name.clone(),
            }),
            Dependency::FanOut(_) => Ok(StepOutputHandle::SubplanEntry),
            Dependency::Direct(upstream) => builder.output_handle(upstream).cloned().ok_or_else(|| {
                PlanError::UnresolvedProducer {
                    pipeline: self.pipeline.name.clone(),
                    solid: solid.name.clone(),
                    input: input_def.name.clone(),
                    producer: upstream.to_string(),
                }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use conduit_definitions::{DependencyDefinition, Environment, PipelineDefinition, SolidConfig};
    use serde_json::json;

    use super::super::test_helpers::{
        chain_pipeline, compile, fan_out_fan_in_pipeline, join, load_environment,
        load_pipeline, pass_through, source,
    };
    use crate::{StepOutputHandle, StepTag, create_execution_plan, create_stack_tracker};

    use super::*;

    #[test]
    fn test_config_literal_becomes_input_thunk() {
        let plan = compile(&load_pipeline(), &load_environment());

        let thunk = plan
            .get_step("load_a.input.num.input_thunk")
            .and_then(|step| step.as_input_thunk())
            .expect("load_a thunk");
        assert_eq!(thunk.value, json!(2));

        let transform = plan.get_step("load_b.transform").expect("load_b transform");
        assert_eq!(
            transform.step_input("num").map(|input| &input.prev_output_handle),
            Some(&StepOutputHandle::new(
                "load_b.input.num.input_thunk",
                INPUT_THUNK_OUTPUT
            ))
        );
    }

    #[test]
    fn test_config_literal_overrides_dependency() {
        let pipeline = chain_pipeline(2);
        let environment = Environment::default()
            .with_solid("s1", SolidConfig::default().with_input("prev", json!(["pinned"])));
        let plan = compile(&pipeline, &environment);

        assert_eq!(
            plan.upstream_of("s1.transform").map(|ups| ups.iter().cloned().collect::<Vec<_>>()),
            Some(vec!["s1.input.prev.input_thunk".to_string()])
        );
        assert_eq!(plan.steps_with_tag(StepTag::InputThunk).count(), 1);
    }

    #[test]
    fn test_missing_input_source_is_unsatisfied() {
        let pipeline = PipelineDefinition::builder("dangling")
            .solid(pass_through("lonely"))
            .build()
            .expect("build pipeline");

        let err = create_execution_plan(&pipeline, &Environment::default())
            .expect_err("input without producer must fail");
        assert_eq!(
            err.to_string(),
            "In pipeline dangling solid lonely, input prev must get a value either (a) from a \
             dependency or (b) from the inputs section of its configuration."
        );
    }

    #[test]
    fn test_fan_out_input_reads_subplan_entry() {
        let pipeline = fan_out_fan_in_pipeline(1);
        let environment = Environment::default()
            .with_solid("tail", SolidConfig::default().with_input("prev", json!([])));
        let plan = compile(&pipeline, &environment);

        let scope = plan.scopes.get("mid_0").expect("fan-out scope");
        let transform = scope.get_step("mid_0.transform").expect("mid_0 transform");
        assert_eq!(
            transform.step_input("prev").map(|input| &input.prev_output_handle),
            Some(&StepOutputHandle::SubplanEntry)
        );
        assert!(scope.upstream_of("mid_0.transform").is_some_and(|ups| ups.is_empty()));
    }

    #[test]
    fn test_fan_in_input_is_rejected() {
        let err = create_execution_plan(&fan_out_fan_in_pipeline(1), &Environment::default())
            .expect_err("fan-in must be rejected");
        assert_eq!(
            err,
            PlanError::UnsupportedFanIn {
                pipeline: "fan_out_fan_in".to_string(),
                solid: "tail".to_string(),
                input: "prev".to_string(),
            }
        );
    }

    #[test]
    fn test_two_fan_in_inputs_fail_before_resolution() {
        let pipeline = PipelineDefinition::builder("double_fan_in")
            .solid(source("head"))
            .solid(pass_through("each"))
            .solid(join("gather", &["left", "right"]))
            .dependencies("each", [("prev", DependencyDefinition::fan_out("head"))])
            .dependencies(
                "gather",
                [
                    ("left", DependencyDefinition::fan_in([("each", "result")])),
                    ("right", DependencyDefinition::fan_in([("each", "result")])),
                ],
            )
            .build()
            .expect("build pipeline");

        let err = create_execution_plan(&pipeline, &Environment::default())
            .expect_err("two fan-in inputs must fail");
        assert_eq!(
            err,
            PlanError::MultipleFanInInputs {
                pipeline: "double_fan_in".to_string(),
                solid: "gather".to_string(),
            }
        );
        assert!(err.to_string().contains("more than one fan-in input"));
    }

    #[test]
    fn test_direct_input_without_compiled_producer_is_unresolved() {
        let pipeline = chain_pipeline(2);
        let environment = Environment::default();
        let solids = pipeline.topological_solids();
        let mut builder = create_stack_tracker(&pipeline, &solids)
            .expect("track stacks")
            .into_builders()
            .into_iter()
            .next()
            .expect("root builder");
        let consumer = pipeline.solid_named("s1").expect("s1");

        let err = PlanCompiler::new(&pipeline, &environment)
            .input_source_handle(&mut builder, consumer, &consumer.input_defs()[0])
            .expect_err("producer not compiled yet");
        assert_eq!(
            err,
            PlanError::UnresolvedProducer {
                pipeline: "chain".to_string(),
                solid: "s1".to_string(),
                input: "prev".to_string(),
                producer: "s0.result".to_string(),
            }
        );
        assert!(builder.is_empty());
    }
}

//! Pipeline -> execution plan compilation.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use tracing::debug;

use conduit_definitions::{Environment, PipelineDefinition, Solid};

use super::super::models::{ExecutionPlan, PlanError};
use super::super::steps::{StepOutput, TransformStep, transform_step_key};
use super::stack::{BuilderId, PlanBuilder, create_stack_tracker};

/// Compiles one pipeline under one environment.
///
/// Design overview:
/// - The stack tracker assigns every solid a stack of nested scopes.
/// - Each scope owns a [`PlanBuilder`]; solids are compiled into the builder
///   at the top of their stack, in topological order.
/// - Scopes compile innermost-first. A finished child scope is folded into an
///   [`ExecutionPlan`] and attached to its parent under the name of the solid
///   whose fan-out input opened it.
/// - The root scope's plan is the result.
///
/// Example:
/// - `a -> b =fan-out=> c -> d` yields a root plan with `a` and `b` steps and
///   one scope `c` holding the `c` and `d` steps.
pub struct PlanCompiler<'a> {
    pub(super) pipeline: &'a PipelineDefinition,
    pub(super) environment: &'a Environment,
}

impl<'a> PlanCompiler<'a> {
    pub fn new(pipeline: &'a PipelineDefinition, environment: &'a Environment) -> Self {
        Self {
            pipeline,
            environment,
        }
    }

    pub fn compile(&self) -> Result<ExecutionPlan, PlanError> {
        let topological_solids = self.pipeline.topological_solids();
        if topological_solids.is_empty() {
            return ExecutionPlan::from_steps(Vec::new());
        }

        let tracker = create_stack_tracker(self.pipeline, &topological_solids)?;

        let mut solids_by_builder: Vec<Vec<&Solid>> = vec![Vec::new(); tracker.builder_count()];
        for solid in &topological_solids {
            let builder_id = tracker.builder_for(&solid.name).ok_or_else(|| {
                PlanError::MissingStackEntry {
                    pipeline: self.pipeline.name.clone(),
                    solid: solid.name.clone(),
                    upstream: solid.name.clone(),
                }
            })?;
            solids_by_builder[builder_id.index()].push(solid);
        }

        let mut pending_scopes: FxHashMap<BuilderId, IndexMap<String, ExecutionPlan>> =
            FxHashMap::default();
        let mut root_plan = None;

        for mut builder in tracker.into_builders().into_iter().rev() {
            for solid in &solids_by_builder[builder.id.index()] {
                self.compile_solid(&mut builder, solid)?;
            }
            if let Some(children) = pending_scopes.remove(&builder.id) {
                for (opened_by, plan) in children.into_iter().rev() {
                    builder.attach_scope(opened_by, plan);
                }
            }

            let id = builder.id;
            let parent = builder.parent;
            let opened_by = builder.opened_by.clone();
            let plan = builder.finish()?;
            debug!(
                pipeline = %self.pipeline.name,
                scope = id.index(),
                opened_by = opened_by.as_deref().unwrap_or("<root>"),
                steps = plan.len(),
                "folded scope into execution plan"
            );

            match parent.zip(opened_by) {
                Some((parent, opened_by)) => {
                    pending_scopes
                        .entry(parent)
                        .or_default()
                        .insert(opened_by, plan);
                }
                None => root_plan = Some(plan),
            }
        }

        root_plan.map_or_else(|| ExecutionPlan::from_steps(Vec::new()), Ok)
    }

    /// Append `solid`'s input steps, transform, and output decorations.
    fn compile_solid(&self, builder: &mut PlanBuilder, solid: &Solid) -> Result<(), PlanError> {
        let step_inputs = self.create_step_inputs(builder, solid)?;

        let transform_step = TransformStep {
            key: transform_step_key(&solid.name),
            solid: solid.name.clone(),
            definition: solid.definition.name.clone(),
            inputs: step_inputs,
            outputs: solid
                .output_defs()
                .iter()
                .map(|output_def| StepOutput::new(&output_def.name, output_def.runtime_type.clone()))
                .collect(),
            config: self
                .environment
                .solid(&solid.name)
                .and_then(|config| config.config.clone()),
        };
        let subplans: Vec<_> = solid
            .output_defs()
            .iter()
            .map(|output_def| {
                (
                    solid.output_handle(&output_def.name),
                    self.output_value_subplan(solid, &transform_step, output_def),
                )
            })
            .collect();

        builder.push_step(transform_step.into());
        for (output_handle, subplan) in subplans {
            builder.extend_steps(subplan.steps);
            builder.record_output(output_handle, subplan.terminal_step_output_handle);
        }

        debug!(
            pipeline = %self.pipeline.name,
            solid = %solid.name,
            scope = builder.id.index(),
            "compiled solid"
        );
        Ok(())
    }
}

/// Compile `pipeline` under `environment` into an execution plan.
pub fn create_execution_plan(
    pipeline: &PipelineDefinition,
    environment: &Environment,
) -> Result<ExecutionPlan, PlanError> {
    PlanCompiler::new(pipeline, environment).compile()
}

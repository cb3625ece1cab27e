//! Scope assignment for solids and the per-scope plan builders.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use conduit_definitions::{Dependency, PipelineDefinition, Solid, SolidOutputHandle};

use super::super::models::{ExecutionPlan, PlanError};
use super::super::steps::{ExecutionStep, StepOutputHandle};

/// Arena index of a [`PlanBuilder`]; two stacks share a scope only if they
/// hold the same id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuilderId(usize);

impl BuilderId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// In-progress step list for one nesting scope.
#[derive(Debug)]
pub struct PlanBuilder {
    pub id: BuilderId,
    pub parent: Option<BuilderId>,
    /// Solid whose fan-out input opened this scope; `None` for the root.
    pub opened_by: Option<String>,
    steps: Vec<ExecutionStep>,
    step_output_map: FxHashMap<SolidOutputHandle, StepOutputHandle>,
    scopes: IndexMap<String, ExecutionPlan>,
}

impl PlanBuilder {
    fn new(id: BuilderId, parent: Option<BuilderId>, opened_by: Option<String>) -> Self {
        Self {
            id,
            parent,
            opened_by,
            steps: Vec::new(),
            step_output_map: FxHashMap::default(),
            scopes: IndexMap::new(),
        }
    }

    pub fn push_step(&mut self, step: ExecutionStep) {
        self.steps.push(step);
    }

    pub fn extend_steps(&mut self, steps: impl IntoIterator<Item = ExecutionStep>) {
        self.steps.extend(steps);
    }

    pub fn record_output(&mut self, output: SolidOutputHandle, handle: StepOutputHandle) {
        self.step_output_map.insert(output, handle);
    }

    pub fn output_handle(&self, output: &SolidOutputHandle) -> Option<&StepOutputHandle> {
        self.step_output_map.get(output)
    }

    pub fn attach_scope(&mut self, opened_by: String, plan: ExecutionPlan) {
        self.scopes.insert(opened_by, plan);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Freeze the accumulated steps and attached child scopes into a plan.
    pub fn finish(self) -> Result<ExecutionPlan, PlanError> {
        Ok(ExecutionPlan::from_steps(self.steps)?.with_scopes(self.scopes))
    }
}

/// Builder stack assigned to every solid, plus the arena of scopes.
///
/// Builders are allocated in discovery order: the root first, then one per
/// fan-out edge in topological order.
#[derive(Debug)]
pub struct StackTracker {
    builders: Vec<PlanBuilder>,
    stack_entries: FxHashMap<String, Vec<BuilderId>>,
}

impl StackTracker {
    fn new() -> Self {
        Self {
            builders: vec![PlanBuilder::new(BuilderId(0), None, None)],
            stack_entries: FxHashMap::default(),
        }
    }

    pub fn root(&self) -> BuilderId {
        BuilderId(0)
    }

    pub fn stack_of(&self, solid: &str) -> Option<&[BuilderId]> {
        self.stack_entries.get(solid).map(Vec::as_slice)
    }

    /// Innermost scope the solid is compiled into.
    pub fn builder_for(&self, solid: &str) -> Option<BuilderId> {
        self.stack_of(solid).and_then(|stack| stack.last().copied())
    }

    pub fn builder_count(&self) -> usize {
        self.builders.len()
    }

    pub fn into_builders(self) -> Vec<PlanBuilder> {
        self.builders
    }

    fn push_builder(&mut self, parent: BuilderId, opened_by: &str) -> BuilderId {
        let id = BuilderId(self.builders.len());
        self.builders
            .push(PlanBuilder::new(id, Some(parent), Some(opened_by.to_string())));
        id
    }

    fn set_stack_entry(
        &mut self,
        pipeline: &PipelineDefinition,
        solid: &Solid,
        stack: Vec<BuilderId>,
    ) -> Result<(), PlanError> {
        match self.stack_entries.get(&solid.name) {
            None => {
                self.stack_entries.insert(solid.name.clone(), stack);
                Ok(())
            }
            Some(existing) if *existing == stack => Ok(()),
            Some(_) => Err(PlanError::AmbiguousNesting {
                pipeline: pipeline.name.clone(),
                solid: solid.name.clone(),
            }),
        }
    }

    fn upstream_stack(
        &self,
        pipeline: &PipelineDefinition,
        solid: &Solid,
        upstream: &SolidOutputHandle,
    ) -> Result<Vec<BuilderId>, PlanError> {
        self.stack_entries
            .get(&upstream.solid)
            .cloned()
            .ok_or_else(|| PlanError::MissingStackEntry {
                pipeline: pipeline.name.clone(),
                solid: solid.name.clone(),
                upstream: upstream.solid.clone(),
            })
    }
}

/// Assign every solid a builder stack by walking `topological_solids`.
///
/// Fan-out inputs push a fresh scope onto the producer's stack, fan-in
/// inputs pop one, and direct inputs inherit it. Inputs without a declared
/// dependency do not constrain the stack; a solid with none at all lives in
/// the root scope.
pub fn create_stack_tracker(
    pipeline: &PipelineDefinition,
    topological_solids: &[&Solid],
) -> Result<StackTracker, PlanError> {
    let mut tracker = StackTracker::new();
    let root_stack = vec![tracker.root()];
    let dep_structure = pipeline.dependency_structure();

    for solid in topological_solids {
        let fan_in_inputs = solid
            .input_defs()
            .iter()
            .filter(|input_def| dep_structure.is_fanin_dep(&solid.input_handle(&input_def.name)))
            .count();
        if fan_in_inputs > 1 {
            return Err(PlanError::MultipleFanInInputs {
                pipeline: pipeline.name.clone(),
                solid: solid.name.clone(),
            });
        }

        let mut constrained = false;
        for input_def in solid.input_defs() {
            let input_handle = solid.input_handle(&input_def.name);
            let Some(dependency) = dep_structure.get(&input_handle) else {
                continue;
            };
            let Some(upstream) = dependency.sources().first() else {
                continue;
            };
            constrained = true;

            let upstream_stack = tracker.upstream_stack(pipeline, solid, upstream)?;
            let stack = match dependency {
                Dependency::FanOut(_) => {
                    let parent = upstream_stack.last().copied().unwrap_or(tracker.root());
                    let scope = tracker.push_builder(parent, &solid.name);
                    let mut stack = upstream_stack;
                    stack.push(scope);
                    stack
                }
                Dependency::FanIn(_) => {
                    if upstream_stack.len() <= 1 {
                        return Err(PlanError::UnbalancedFanIn {
                            pipeline: pipeline.name.clone(),
                            solid: solid.name.clone(),
                            input: input_def.name.clone(),
                        });
                    }
                    let mut stack = upstream_stack;
                    stack.pop();
                    stack
                }
                Dependency::Direct(_) => upstream_stack,
            };
            tracker.set_stack_entry(pipeline, solid, stack)?;
        }

        if !constrained {
            tracker.set_stack_entry(pipeline, solid, root_stack.clone())?;
        }
    }

    Ok(tracker)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use conduit_definitions::{DependencyDefinition, PipelineDefinition};

    use super::*;
    use crate::builder::test_helpers::{
        chain_pipeline, fan_out_fan_in_pipeline, join, layered_edges, layered_pipeline,
        pass_through, source,
    };

    fn tracker_for(pipeline: &PipelineDefinition) -> Result<StackTracker, PlanError> {
        let solids = pipeline.topological_solids();
        create_stack_tracker(pipeline, &solids)
    }

    #[test]
    fn test_sources_share_root_scope() {
        let pipeline = PipelineDefinition::builder("sources")
            .solid(source("a"))
            .solid(source("b"))
            .build()
            .expect("build pipeline");
        let tracker = tracker_for(&pipeline).expect("track stacks");

        assert_eq!(tracker.stack_of("a"), Some(&[tracker.root()][..]));
        assert_eq!(tracker.stack_of("b"), tracker.stack_of("a"));
        assert_eq!(tracker.builder_count(), 1);
    }

    #[test]
    fn test_fan_out_opens_scope_and_fan_in_closes_it() {
        let pipeline = fan_out_fan_in_pipeline(2);
        let tracker = tracker_for(&pipeline).expect("track stacks");

        let root = tracker.root();
        assert_eq!(tracker.stack_of("head"), Some(&[root][..]));
        let inner = tracker.stack_of("mid_0").expect("mid_0 stack").to_vec();
        assert_eq!(inner.len(), 2);
        assert_eq!(inner[0], root);
        assert_eq!(tracker.stack_of("mid_1"), Some(inner.as_slice()));
        assert_eq!(tracker.stack_of("tail"), Some(&[root][..]));

        let builders = tracker.into_builders();
        assert_eq!(builders[inner[1].index()].opened_by.as_deref(), Some("mid_0"));
        assert_eq!(builders[inner[1].index()].parent, Some(root));
    }

    #[test]
    fn test_fan_in_without_scope_is_unbalanced() {
        let pipeline = PipelineDefinition::builder("unbalanced")
            .solid(source("head"))
            .solid(pass_through("gather"))
            .dependencies(
                "gather",
                [("prev", DependencyDefinition::fan_in([("head", "result")]))],
            )
            .build()
            .expect("build pipeline");

        let err = tracker_for(&pipeline).expect_err("fan-in at root must fail");
        assert!(matches!(err, PlanError::UnbalancedFanIn { solid, .. } if solid == "gather"));
    }

    #[test]
    fn test_diverging_fan_out_paths_are_ambiguous() {
        let pipeline = PipelineDefinition::builder("ambiguous")
            .solid(source("head"))
            .solid(join("both", &["left", "right"]))
            .dependencies(
                "both",
                [
                    ("left", DependencyDefinition::fan_out("head")),
                    ("right", DependencyDefinition::new("head")),
                ],
            )
            .build()
            .expect("build pipeline");

        let err = tracker_for(&pipeline).expect_err("mixed scopes must fail");
        assert_eq!(
            err,
            PlanError::AmbiguousNesting {
                pipeline: "ambiguous".to_string(),
                solid: "both".to_string(),
            }
        );
    }

    #[test]
    fn test_consumer_before_producer_has_no_stack_entry() {
        let pipeline = chain_pipeline(2);
        let producer = pipeline.solid_named("s0").expect("s0");
        let consumer = pipeline.solid_named("s1").expect("s1");

        let err = create_stack_tracker(&pipeline, &[consumer, producer])
            .expect_err("out-of-order solids must fail");
        assert_eq!(
            err,
            PlanError::MissingStackEntry {
                pipeline: "chain".to_string(),
                solid: "s1".to_string(),
                upstream: "s0".to_string(),
            }
        );
    }

    proptest! {
        #[test]
        fn prop_direct_graphs_stay_in_root_scope(edges in layered_edges()) {
            let pipeline = layered_pipeline(&edges);
            let tracker = tracker_for(&pipeline).expect("track stacks");
            let root = tracker.root();
            for solid in pipeline.solids() {
                prop_assert_eq!(tracker.stack_of(&solid.name), Some(&[root][..]));
            }
            prop_assert_eq!(tracker.builder_count(), 1);
        }

        #[test]
        fn prop_fan_out_chain_nests_one_level(len in 1usize..8) {
            let pipeline = fan_out_fan_in_pipeline(len);
            let tracker = tracker_for(&pipeline).expect("track stacks");
            for idx in 0..len {
                let name = format!("mid_{idx}");
                prop_assert_eq!(tracker.stack_of(&name).map(<[BuilderId]>::len), Some(2));
            }
            prop_assert_eq!(tracker.stack_of("head").map(<[BuilderId]>::len), Some(1));
            prop_assert_eq!(tracker.stack_of("tail").map(<[BuilderId]>::len), Some(1));
        }

        #[test]
        fn prop_linear_chain_uses_one_builder(len in 1usize..12) {
            let pipeline = chain_pipeline(len);
            let tracker = tracker_for(&pipeline).expect("track stacks");
            prop_assert_eq!(tracker.builder_count(), 1);
        }
    }
}

//! Execution plan compiler: steps, scopes, subplans.

pub mod builder;
pub mod models;
pub mod steps;
pub mod subset;
pub mod validate;

pub use builder::{
    BuilderId, PlanBuilder, PlanCompiler, StackTracker, create_execution_plan,
    create_stack_tracker,
};
pub use models::{ExecutionPlan, ExecutionPlanSubsetInfo, ExecutionValueSubPlan, PlanError};
pub use steps::{
    EXPECTATION_INPUT, EXPECTATION_OUTPUT, ExecutionStep, INPUT_THUNK_OUTPUT, InputExpectationStep,
    InputThunkStep, MATERIALIZATION_INPUT, MATERIALIZATION_OUTPUT, MaterializationStep,
    OutputExpectationStep, SUBPLAN_ENTRY, StepInput, StepOutput, StepOutputHandle, StepTag,
    TransformStep, VALUE_THUNK_OUTPUT, ValueThunkStep,
};
pub use subset::create_subplan;
pub use validate::{
    validate_adjacency_references_existing_steps, validate_inputs_match_adjacency, validate_plan,
    validate_plan_is_acyclic,
};

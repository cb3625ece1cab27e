//! Conduit compiles pipelines of solids into ordered execution plans and
//! runs them in-process.

pub mod config;
pub mod observability;
pub mod pipeline_examples;

pub use conduit_definitions::{
    DependencyDefinition, Environment, ExpectationDefinition, ExpectationResult,
    InputDefinition, MaterializationTarget, OutputDefinition, PipelineDefinition, RuntimeType,
    SolidConfig, SolidDefinition, SolidInstance, TransformError, lambda_solid,
};
pub use conduit_plan::{
    ExecutionPlan, ExecutionPlanSubsetInfo, ExecutionStep, PlanError, StepTag,
    create_execution_plan, create_subplan, validate_plan,
};
pub use conduit_runner::{
    JsonFileMaterializer, Materializer, MemoryMaterializer, PlanExecutor, RunError, RunResult,
    execute_pipeline,
};

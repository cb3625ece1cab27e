//! Solid and pipeline definitions consumed by the plan compiler.

pub mod dependency;
pub mod environment;
pub mod pipeline;
pub mod solids;
pub mod types;

pub use dependency::{
    Dependency, DependencyDefinition, DependencyKind, DependencyStructure, SolidInputHandle,
    SolidInstance, SolidOutputHandle,
};
pub use environment::{
    Environment, ExpectationsConfig, MaterializationTarget, SolidConfig,
};
pub use pipeline::{DefinitionError, PipelineDefinition, Solid, solids_in_topological_order};
pub use solids::{
    DEFAULT_OUTPUT, ExpectationContext, ExpectationDefinition, ExpectationFn, ExpectationResult,
    InputDefinition, OutputDefinition, SolidDefinition, TransformContext, TransformError,
    TransformFn, lambda_solid,
};
pub use types::RuntimeType;

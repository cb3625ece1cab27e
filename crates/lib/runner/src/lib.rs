//! Local execution of compiled execution plans.

pub mod executor;
pub mod materializers;

pub use executor::{PlanExecutor, RunError, RunResult, execute_pipeline};
pub use materializers::{
    JsonFileMaterializer, MaterializationRecord, MaterializationRequest, Materializer,
    MaterializerError, MemoryMaterializer,
};

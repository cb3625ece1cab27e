//! Pipeline -> execution plan compilation entrypoints.

mod compiler;
mod inputs;
mod stack;
mod values;

pub use compiler::{PlanCompiler, create_execution_plan};
pub use stack::{BuilderId, PlanBuilder, StackTracker, create_stack_tracker};

#[cfg(test)]
pub(crate) mod test_helpers;

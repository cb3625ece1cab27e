//! Execution plan validation utilities.

use super::models::{ExecutionPlan, PlanError};

pub fn validate_plan(plan: &ExecutionPlan) -> Result<(), PlanError> {
    validate_adjacency_references_existing_steps(plan)?;
    validate_inputs_match_adjacency(plan)?;
    validate_plan_is_acyclic(plan)?;
    for scope in plan.scopes.values() {
        validate_plan(scope)?;
    }
    Ok(())
}

/// Fail if any adjacency entry names a step missing from the step dictionary.
pub fn validate_adjacency_references_existing_steps(plan: &ExecutionPlan) -> Result<(), PlanError> {
    for (key, upstream) in &plan.deps {
        for prev_key in upstream {
            if !plan.has_step(prev_key) {
                return Err(PlanError::DanglingDependency {
                    step: key.clone(),
                    upstream: prev_key.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Fail if a step reads from a producer that its adjacency entry omits.
///
/// The executor schedules from the adjacency map alone.
pub fn validate_inputs_match_adjacency(plan: &ExecutionPlan) -> Result<(), PlanError> {
    for step in plan.steps() {
        let upstream = plan.upstream_of(step.key());
        for prev_key in step.upstream_keys() {
            if !upstream.is_some_and(|ups| ups.contains(prev_key)) || !plan.has_step(prev_key) {
                return Err(PlanError::DanglingDependency {
                    step: step.key().to_string(),
                    upstream: prev_key.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Fail if the adjacency map contains a cycle.
pub fn validate_plan_is_acyclic(plan: &ExecutionPlan) -> Result<(), PlanError> {
    plan.topological_step_keys().map(|_| ())
}

//! Execution plan models and the plan assembler.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::steps::{ExecutionStep, StepOutputHandle, StepTag};

/// Raised when a pipeline cannot be compiled or a subplan cannot be derived.
///
/// Every variant reflects a structural defect in the declared pipeline,
/// its environment, or a subset request; none are transient.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error(
        "In pipeline {pipeline} solid {solid} is reachable through dependency paths that place it in different scopes (stack mismatch)"
    )]
    AmbiguousNesting { pipeline: String, solid: String },
    #[error(
        "In pipeline {pipeline} solid {solid}, input {input} must get a value either (a) from a dependency or (b) from the inputs section of its configuration."
    )]
    UnsatisfiedInput {
        pipeline: String,
        solid: String,
        input: String,
    },
    #[error("In pipeline {pipeline} solid {solid}: cannot have more than one fan-in input per solid")]
    MultipleFanInInputs { pipeline: String, solid: String },
    #[error(
        "In pipeline {pipeline} solid {solid}, input {input}: fan-in dependencies are not supported"
    )]
    UnsupportedFanIn {
        pipeline: String,
        solid: String,
        input: String,
    },
    #[error(
        "In pipeline {pipeline} solid {solid}, input {input}: fan-in has no enclosing fan-out scope to close"
    )]
    UnbalancedFanIn {
        pipeline: String,
        solid: String,
        input: String,
    },
    #[error(
        "In pipeline {pipeline} solid {solid}, input {input}: producer {producer} has not been compiled in this scope"
    )]
    UnresolvedProducer {
        pipeline: String,
        solid: String,
        input: String,
        producer: String,
    },
    #[error(
        "In pipeline {pipeline} solid {solid}: upstream solid {upstream} has no scope assignment; solids are not in topological order"
    )]
    MissingStackEntry {
        pipeline: String,
        solid: String,
        upstream: String,
    },
    #[error("Duplicated key {key}. Full list: {keys:?}.")]
    DuplicateStepKey { key: String, keys: Vec<String> },
    #[error("Step {step} depends on {upstream}, which is not in the execution plan")]
    DanglingDependency { step: String, upstream: String },
    #[error("Cycle detected in execution plan involving steps {steps:?}")]
    CycleDetected { steps: Vec<String> },
    #[error("Subset references step {0}, which is not in the execution plan")]
    UnknownSubsetStep(String),
    #[error("Subset overrides input {input} on step {step}, which has no such input")]
    UnknownSubsetInput { step: String, input: String },
}

/// Compiled DAG of execution steps.
///
/// `step_dict` preserves compilation order, which the executor uses to break
/// ties between independent steps. `deps` maps each step key to the keys it
/// reads from. `scopes` holds the folded plans of nested fan-out regions,
/// keyed by the solid that opened each region; the parent only references
/// them as opaque units.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub step_dict: IndexMap<String, ExecutionStep>,
    pub deps: IndexMap<String, BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub scopes: IndexMap<String, ExecutionPlan>,
}

impl ExecutionPlan {
    /// Fold an ordered step list into a plan.
    ///
    /// Fails on duplicate keys and on inputs whose producer step is absent.
    /// Acyclicity is not checked: compiled steps only reference producers
    /// that were appended before them.
    pub fn from_steps(steps: Vec<ExecutionStep>) -> Result<Self, PlanError> {
        let mut step_dict: IndexMap<String, ExecutionStep> = IndexMap::with_capacity(steps.len());
        let keys: Vec<String> = steps.iter().map(|step| step.key().to_string()).collect();
        for step in steps {
            let key = step.key().to_string();
            if step_dict.contains_key(&key) {
                return Err(PlanError::DuplicateStepKey { key, keys });
            }
            step_dict.insert(key, step);
        }

        let mut deps: IndexMap<String, BTreeSet<String>> = IndexMap::with_capacity(step_dict.len());
        for (key, step) in &step_dict {
            let mut upstream = BTreeSet::new();
            for prev_key in step.upstream_keys() {
                if !step_dict.contains_key(prev_key) {
                    return Err(PlanError::DanglingDependency {
                        step: key.clone(),
                        upstream: prev_key.to_string(),
                    });
                }
                upstream.insert(prev_key.to_string());
            }
            deps.insert(key.clone(), upstream);
        }

        Ok(Self {
            step_dict,
            deps,
            scopes: IndexMap::new(),
        })
    }

    pub fn with_scopes(mut self, scopes: IndexMap<String, ExecutionPlan>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn steps(&self) -> impl Iterator<Item = &ExecutionStep> {
        self.step_dict.values()
    }

    pub fn get_step(&self, key: &str) -> Option<&ExecutionStep> {
        self.step_dict.get(key)
    }

    pub fn has_step(&self, key: &str) -> bool {
        self.step_dict.contains_key(key)
    }

    pub fn step_keys(&self) -> impl Iterator<Item = &str> {
        self.step_dict.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.step_dict.len()
    }

    pub fn is_empty(&self) -> bool {
        self.step_dict.is_empty()
    }

    pub fn upstream_of(&self, key: &str) -> Option<&BTreeSet<String>> {
        self.deps.get(key)
    }

    pub fn steps_with_tag(&self, tag: StepTag) -> impl Iterator<Item = &ExecutionStep> {
        self.steps().filter(move |step| step.tag() == tag)
    }

    /// Solid names of transform steps in plan order.
    pub fn transform_order(&self) -> Vec<&str> {
        self.steps_with_tag(StepTag::Transform)
            .map(ExecutionStep::solid)
            .collect()
    }

    /// Step keys ordered so every step follows its upstream steps.
    ///
    /// Ready steps are emitted in step-dictionary order, so the result is
    /// deterministic for a given plan.
    pub fn topological_step_keys(&self) -> Result<Vec<String>, PlanError> {
        let keys: Vec<&str> = self.step_dict.keys().map(String::as_str).collect();
        let index: FxHashMap<&str, usize> =
            keys.iter().enumerate().map(|(idx, key)| (*key, idx)).collect();

        let mut in_degree = vec![0usize; keys.len()];
        let mut downstream: Vec<Vec<usize>> = vec![Vec::new(); keys.len()];
        for (key, upstream) in &self.deps {
            let Some(&idx) = index.get(key.as_str()) else {
                continue;
            };
            for up in upstream {
                in_degree[idx] += 1;
                if let Some(&up_idx) = index.get(up.as_str()) {
                    downstream[up_idx].push(idx);
                }
            }
        }

        let mut ready: BTreeSet<usize> = (0..keys.len())
            .filter(|idx| in_degree[*idx] == 0)
            .collect();
        let mut order = Vec::with_capacity(keys.len());
        while let Some(idx) = ready.pop_first() {
            order.push(keys[idx].to_string());
            for &down in &downstream[idx] {
                in_degree[down] -= 1;
                if in_degree[down] == 0 {
                    ready.insert(down);
                }
            }
        }

        if order.len() < keys.len() {
            return Err(PlanError::CycleDetected {
                steps: keys
                    .iter()
                    .zip(&in_degree)
                    .filter(|(_, degree)| **degree > 0)
                    .map(|(key, _)| key.to_string())
                    .collect(),
            });
        }
        Ok(order)
    }
}

/// Steps produced by decorating one value, plus the handle of the final value.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionValueSubPlan {
    pub steps: Vec<ExecutionStep>,
    pub terminal_step_output_handle: StepOutputHandle,
}

impl ExecutionValueSubPlan {
    pub fn new(steps: Vec<ExecutionStep>, terminal_step_output_handle: StepOutputHandle) -> Self {
        Self {
            steps,
            terminal_step_output_handle,
        }
    }

    /// No extra steps: the value is ready as soon as `handle` is produced.
    pub fn empty(handle: StepOutputHandle) -> Self {
        Self::new(Vec::new(), handle)
    }
}

/// Which steps to keep when deriving a subplan, plus literal input overrides.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlanSubsetInfo {
    pub subset: BTreeSet<String>,
    #[serde(default)]
    pub inputs: IndexMap<String, IndexMap<String, Value>>,
}

impl ExecutionPlanSubsetInfo {
    pub fn new<K: Into<String>>(subset: impl IntoIterator<Item = K>) -> Self {
        Self {
            subset: subset.into_iter().map(Into::into).collect(),
            inputs: IndexMap::new(),
        }
    }

    /// Keep every step of `plan` with no overrides.
    pub fn all(plan: &ExecutionPlan) -> Self {
        Self::new(plan.step_keys())
    }

    pub fn with_input(
        mut self,
        step: impl Into<String>,
        input: impl Into<String>,
        value: Value,
    ) -> Self {
        self.inputs
            .entry(step.into())
            .or_default()
            .insert(input.into(), value);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.subset.contains(key)
    }

    pub fn overrides_for(&self, key: &str) -> Option<&IndexMap<String, Value>> {
        self.inputs.get(key).filter(|inputs| !inputs.is_empty())
    }
}

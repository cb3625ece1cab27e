use proptest::prelude::*;
use serde_json::{Value, json};

use conduit_definitions::{
    DependencyDefinition, Environment, ExpectationDefinition, ExpectationResult, InputDefinition,
    MaterializationTarget, OutputDefinition, PipelineDefinition, RuntimeType, SolidConfig,
    SolidDefinition, SolidInstance, TransformError, lambda_solid,
};

use crate::{ExecutionPlan, create_execution_plan};

/// Solid with no inputs whose result is a one-element list of its name.
pub(crate) fn source(name: &str) -> SolidDefinition {
    let label = name.to_string();
    lambda_solid(name, vec![], move |_| Ok(json!([label.clone()])))
}

/// Solid that appends its definition name to the list arriving on `prev`.
pub(crate) fn pass_through(name: &str) -> SolidDefinition {
    let label = name.to_string();
    lambda_solid(name, vec![InputDefinition::new("prev")], move |inputs| {
        let mut items = inputs
            .get("prev")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| TransformError("prev must be a list".to_string()))?;
        items.push(json!(label.clone()));
        Ok(Value::Array(items))
    })
}

/// Solid with one untyped input per entry in `inputs`.
pub(crate) fn join(name: &str, inputs: &[&str]) -> SolidDefinition {
    let input_defs = inputs.iter().map(|input| InputDefinition::new(*input)).collect();
    lambda_solid(name, input_defs, |_| Ok(Value::Null))
}

/// `s0 -> s1 -> ... -> s{len-1}` over direct edges.
pub(crate) fn chain_pipeline(len: usize) -> PipelineDefinition {
    let mut builder = PipelineDefinition::builder("chain").solid(source("s0"));
    for idx in 1..len {
        let name = format!("s{idx}");
        builder = builder.solid(pass_through(&name)).dependencies(
            name.as_str(),
            [("prev", DependencyDefinition::new(format!("s{}", idx - 1)))],
        );
    }
    builder.build().expect("build chain pipeline")
}

/// `head =fan-out=> mid_0 -> ... -> mid_{len-1} =fan-in=> tail`.
pub(crate) fn fan_out_fan_in_pipeline(len: usize) -> PipelineDefinition {
    let mut builder = PipelineDefinition::builder("fan_out_fan_in")
        .solid(source("head"))
        .solid(pass_through("mid_0"))
        .dependencies("mid_0", [("prev", DependencyDefinition::fan_out("head"))]);
    for idx in 1..len {
        let name = format!("mid_{idx}");
        builder = builder.solid(pass_through(&name)).dependencies(
            name.as_str(),
            [("prev", DependencyDefinition::new(format!("mid_{}", idx - 1)))],
        );
    }
    let last = format!("mid_{}", len.saturating_sub(1));
    builder
        .solid(pass_through("tail"))
        .dependencies(
            "tail",
            [("prev", DependencyDefinition::fan_in([(last, "result")]))],
        )
        .build()
        .expect("build fan-out pipeline")
}

/// `head =fan-out=> each`, with nothing closing the scope.
pub(crate) fn open_fan_out_pipeline() -> PipelineDefinition {
    PipelineDefinition::builder("open_fan_out")
        .solid(source("head"))
        .solid(pass_through("each"))
        .solid(pass_through("after"))
        .dependencies("each", [("prev", DependencyDefinition::fan_out("head"))])
        .dependencies("after", [("prev", DependencyDefinition::new("each"))])
        .build()
        .expect("build open fan-out pipeline")
}

/// Solid `n{i}` reads from every `n{j}` listed in `edges[i]` over direct edges.
pub(crate) fn layered_pipeline(edges: &[Vec<usize>]) -> PipelineDefinition {
    let mut builder = PipelineDefinition::builder("layered");
    for (idx, upstream) in edges.iter().enumerate() {
        let name = format!("n{idx}");
        let inputs: Vec<String> = upstream.iter().map(|up| format!("in_{up}")).collect();
        let input_refs: Vec<&str> = inputs.iter().map(String::as_str).collect();
        builder = builder.solid(join(&name, &input_refs));
        if !upstream.is_empty() {
            let deps: Vec<(String, DependencyDefinition)> = upstream
                .iter()
                .map(|up| (format!("in_{up}"), DependencyDefinition::new(format!("n{up}"))))
                .collect();
            builder = builder.dependencies(name.as_str(), deps);
        }
    }
    builder.build().expect("build layered pipeline")
}

fn present() -> ExpectationDefinition {
    ExpectationDefinition::new("present", |_, value| {
        if value.is_null() {
            ExpectationResult::failed("value is null")
        } else {
            ExpectationResult::passed()
        }
    })
}

/// [`layered_pipeline`] with a `present` expectation on every input and output.
pub(crate) fn checked_layered_pipeline(edges: &[Vec<usize>]) -> PipelineDefinition {
    let mut builder = PipelineDefinition::builder("checked_layered");
    for (idx, upstream) in edges.iter().enumerate() {
        let name = format!("n{idx}");
        let input_defs = upstream
            .iter()
            .map(|up| InputDefinition::new(format!("in_{up}")).with_expectation(present()))
            .collect();
        let solid = SolidDefinition::new(
            name.as_str(),
            input_defs,
            vec![OutputDefinition::default().with_expectation(present())],
            |_, _| Ok(Default::default()),
        );
        builder = builder.solid(solid);
        if !upstream.is_empty() {
            let deps: Vec<(String, DependencyDefinition)> = upstream
                .iter()
                .map(|up| (format!("in_{up}"), DependencyDefinition::new(format!("n{up}"))))
                .collect();
            builder = builder.dependencies(name.as_str(), deps);
        }
    }
    builder.build().expect("build checked layered pipeline")
}

/// Per solid: whether its first input gets a config literal, and whether
/// its output is materialized.
pub(crate) type Decorations = Vec<(bool, bool)>;

pub(crate) fn decorated_layered_edges() -> impl Strategy<Value = (Vec<Vec<usize>>, Decorations)> {
    layered_edges().prop_flat_map(|edges| {
        let count = edges.len();
        (
            Just(edges),
            proptest::collection::vec((any::<bool>(), any::<bool>()), count),
        )
    })
}

pub(crate) fn decorated_environment(edges: &[Vec<usize>], decorations: &Decorations) -> Environment {
    let mut environment = Environment::default();
    for (idx, (literal, materialize)) in decorations.iter().enumerate() {
        let mut config = SolidConfig::default();
        if let Some(first) = edges[idx].first().filter(|_| *literal) {
            config = config.with_input(format!("in_{first}"), json!(idx));
        }
        if *materialize {
            config = config.with_materialization(
                "result",
                MaterializationTarget::new("memory", Value::Null),
            );
        }
        environment = environment.with_solid(format!("n{idx}"), config);
    }
    environment
}

/// `head =fan-out=> mid_0 -> ... -> mid_{len-1}`, left open.
pub(crate) fn open_fan_out_chain(len: usize) -> PipelineDefinition {
    let mut builder = PipelineDefinition::builder("open_fan_out_chain")
        .solid(source("head"))
        .solid(pass_through("mid_0"))
        .dependencies("mid_0", [("prev", DependencyDefinition::fan_out("head"))]);
    for idx in 1..len {
        let name = format!("mid_{idx}");
        builder = builder.solid(pass_through(&name)).dependencies(
            name.as_str(),
            [("prev", DependencyDefinition::new(format!("mid_{}", idx - 1)))],
        );
    }
    builder.build().expect("build open fan-out chain")
}

/// For each solid after the first, the earlier solids it reads from.
pub(crate) fn layered_edges() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1usize..10).prop_flat_map(|count| {
        (0..count)
            .map(|idx| {
                if idx == 0 {
                    Just(Vec::new()).boxed()
                } else {
                    proptest::collection::btree_set(0..idx, 0..=idx.min(3))
                        .prop_map(|set| set.into_iter().collect::<Vec<_>>())
                        .boxed()
                }
            })
            .collect::<Vec<_>>()
    })
}

pub(crate) fn first_solid() -> SolidDefinition {
    source("first")
}

pub(crate) fn not_first_solid() -> SolidDefinition {
    pass_through("not_first")
}

/// `first -> not_first -> second -> third`, the last two aliasing `not_first`.
pub(crate) fn aliased_chain_pipeline() -> PipelineDefinition {
    PipelineDefinition::builder("aliased")
        .solids([first_solid(), not_first_solid()])
        .dependencies(
            "not_first",
            [("prev", DependencyDefinition::new("first"))],
        )
        .dependencies(
            SolidInstance::aliased("not_first", "second"),
            [("prev", DependencyDefinition::new("not_first"))],
        )
        .dependencies(
            SolidInstance::aliased("not_first", "third"),
            [("prev", DependencyDefinition::new("second"))],
        )
        .build()
        .expect("build aliased pipeline")
}

/// `load_number` instantiated as `load_a` and `load_b`, each fed by config.
pub(crate) fn load_pipeline() -> PipelineDefinition {
    let load_number = SolidDefinition::new(
        "load_number",
        vec![InputDefinition::typed("num", RuntimeType::int())],
        vec![OutputDefinition::typed(RuntimeType::int())],
        |_, inputs| Ok(inputs.clone().into_iter().map(|(_, v)| ("result".to_string(), v)).collect()),
    );
    PipelineDefinition::builder("load")
        .solid(load_number)
        .instance(SolidInstance::aliased("load_number", "load_a"))
        .instance(SolidInstance::aliased("load_number", "load_b"))
        .build()
        .expect("build load pipeline")
}

pub(crate) fn load_environment() -> Environment {
    Environment::default()
        .with_solid("load_a", SolidConfig::default().with_input("num", json!(2)))
        .with_solid("load_b", SolidConfig::default().with_input("num", json!(3)))
}

pub(crate) fn compile(pipeline: &PipelineDefinition, environment: &Environment) -> ExecutionPlan {
    create_execution_plan(pipeline, environment).expect("compile execution plan")
}

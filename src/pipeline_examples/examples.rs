//! Collection of small pipelines covering aliasing, config literals,
//! expectations and fan-out scopes.

use std::collections::HashMap;

use serde_json::{Value, json};

use conduit_definitions::{
    DEFAULT_OUTPUT, DefinitionError, DependencyDefinition, Environment, ExpectationDefinition,
    ExpectationResult, InputDefinition, OutputDefinition, PipelineDefinition, RuntimeType,
    SolidConfig, SolidDefinition, SolidInstance, TransformError, lambda_solid,
};

/// A pipeline together with the run environment it is meant to run under.
#[derive(Clone, Debug)]
pub struct PipelineExample {
    pub name: &'static str,
    pub description: &'static str,
    pub pipeline: PipelineDefinition,
    pub environment: Environment,
}

fn append_name(name: &'static str) -> SolidDefinition {
    lambda_solid(name, vec![InputDefinition::new("prev")], move |inputs| {
        let mut items = inputs
            .get("prev")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| TransformError("prev must be a list".to_string()))?;
        items.push(json!(name));
        Ok(Value::Array(items))
    })
}

fn int_input(inputs: &HashMap<String, Value>, name: &str) -> Result<i64, TransformError> {
    inputs
        .get(name)
        .and_then(Value::as_i64)
        .ok_or_else(|| TransformError(format!("{name} must be an integer")))
}

fn non_negative() -> ExpectationDefinition {
    ExpectationDefinition::new("non_negative", |_, value| match value.as_i64() {
        Some(num) if num >= 0 => ExpectationResult::passed(),
        _ => ExpectationResult::failed(format!("expected a non-negative integer, got {value}")),
    })
    .with_description("value is an integer >= 0")
}

/// `first -> not_first -> second -> third`, the last two aliasing `not_first`.
pub fn build_aliased_chain() -> Result<PipelineExample, DefinitionError> {
    let first = lambda_solid("first", vec![], |_| Ok(json!(["first"])));
    let pipeline = PipelineDefinition::builder("aliased_chain")
        .solids([first, append_name("not_first")])
        .dependencies("not_first", [("prev", DependencyDefinition::new("first"))])
        .dependencies(
            SolidInstance::aliased("not_first", "second"),
            [("prev", DependencyDefinition::new("not_first"))],
        )
        .dependencies(
            SolidInstance::aliased("not_first", "third"),
            [("prev", DependencyDefinition::new("second"))],
        )
        .build()?;
    Ok(PipelineExample {
        name: "aliased_chain",
        description: "one definition instantiated three times under aliases",
        pipeline,
        environment: Environment::default(),
    })
}

/// Two aliased loaders fed from config literals, summed by `add`.
pub fn build_load_numbers() -> Result<PipelineExample, DefinitionError> {
    let load_number = SolidDefinition::new(
        "load_number",
        vec![InputDefinition::typed("num", RuntimeType::int()).with_expectation(non_negative())],
        vec![OutputDefinition::typed(RuntimeType::int())],
        |_, inputs| {
            let num = int_input(inputs, "num")?;
            Ok(HashMap::from([(DEFAULT_OUTPUT.to_string(), json!(num))]))
        },
    );
    let add = SolidDefinition::new(
        "add",
        vec![
            InputDefinition::typed("left", RuntimeType::int()),
            InputDefinition::typed("right", RuntimeType::int()),
        ],
        vec![OutputDefinition::typed(RuntimeType::int()).with_expectation(non_negative())],
        |_, inputs| {
            let total = int_input(inputs, "left")? + int_input(inputs, "right")?;
            Ok(HashMap::from([(DEFAULT_OUTPUT.to_string(), json!(total))]))
        },
    );

    let pipeline = PipelineDefinition::builder("load_numbers")
        .solids([load_number, add])
        .instance(SolidInstance::aliased("load_number", "load_a"))
        .instance(SolidInstance::aliased("load_number", "load_b"))
        .dependencies(
            "add",
            [
                ("left", DependencyDefinition::new("load_a")),
                ("right", DependencyDefinition::new("load_b")),
            ],
        )
        .build()?;
    let environment = Environment::default()
        .with_solid("load_a", SolidConfig::default().with_input("num", json!(2)))
        .with_solid("load_b", SolidConfig::default().with_input("num", json!(3)));
    Ok(PipelineExample {
        name: "load_numbers",
        description: "config-fed loaders with expectations, summed",
        pipeline,
        environment,
    })
}

/// `split_words` fans out over its words; `measure -> describe` runs per word.
pub fn build_word_lengths() -> Result<PipelineExample, DefinitionError> {
    let split_words = SolidDefinition::new(
        "split_words",
        vec![],
        vec![OutputDefinition::typed(RuntimeType::sequence())],
        |context, _| {
            let text = context
                .config
                .as_ref()
                .and_then(Value::as_str)
                .ok_or_else(|| TransformError("config must be a string".to_string()))?;
            let words: Vec<Value> = text.split_whitespace().map(|word| json!(word)).collect();
            Ok(HashMap::from([(DEFAULT_OUTPUT.to_string(), Value::Array(words))]))
        },
    )
    .with_config_description("text to split on whitespace");
    let measure = lambda_solid(
        "measure",
        vec![InputDefinition::typed("word", RuntimeType::string())],
        |inputs| {
            let word = inputs
                .get("word")
                .and_then(Value::as_str)
                .ok_or_else(|| TransformError("word must be a string".to_string()))?;
            Ok(json!({"word": word, "length": word.chars().count()}))
        },
    );
    let describe = lambda_solid("describe", vec![InputDefinition::new("measured")], |inputs| {
        let measured = inputs.get("measured").cloned().unwrap_or(Value::Null);
        let word = measured.get("word").and_then(Value::as_str).unwrap_or_default();
        let length = measured.get("length").and_then(Value::as_u64).unwrap_or_default();
        Ok(json!(format!("{word} has {length} characters")))
    });

    let pipeline = PipelineDefinition::builder("word_lengths")
        .solids([split_words, measure, describe])
        .dependencies(
            "measure",
            [("word", DependencyDefinition::fan_out("split_words"))],
        )
        .dependencies(
            "describe",
            [("measured", DependencyDefinition::new("measure"))],
        )
        .build()?;
    let environment = Environment::default().with_solid(
        "split_words",
        SolidConfig::with_config(json!("plans compile into steps")),
    );
    Ok(PipelineExample {
        name: "word_lengths",
        description: "fan-out scope executed once per word",
        pipeline,
        environment,
    })
}

pub fn list_examples() -> Vec<&'static str> {
    let mut names = vec!["aliased_chain", "load_numbers", "word_lengths"];
    names.sort();
    names
}

pub fn get_example(name: &str) -> Result<PipelineExample, String> {
    let built = match name {
        "aliased_chain" => build_aliased_chain(),
        "load_numbers" => build_load_numbers(),
        "word_lengths" => build_word_lengths(),
        _ => return Err(format!("unknown example: {name}")),
    };
    built.map_err(|err| err.to_string())
}

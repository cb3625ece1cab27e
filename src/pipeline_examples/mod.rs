//! Bundled example pipelines for exercising the compiler and runner.

mod examples;

pub use examples::{
    PipelineExample, build_aliased_chain, build_load_numbers, build_word_lengths, get_example,
    list_examples,
};

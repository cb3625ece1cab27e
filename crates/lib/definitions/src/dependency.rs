//! Dependency wiring between solid instances.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::solids::DEFAULT_OUTPUT;

/// Identity of one input slot on one solid instance.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SolidInputHandle {
    pub solid: String,
    pub input: String,
}

impl SolidInputHandle {
    pub fn new(solid: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            solid: solid.into(),
            input: input.into(),
        }
    }
}

impl fmt::Display for SolidInputHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.solid, self.input)
    }
}

/// Identity of one output slot on one solid instance.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SolidOutputHandle {
    pub solid: String,
    pub output: String,
}

impl SolidOutputHandle {
    pub fn new(solid: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            solid: solid.into(),
            output: output.into(),
        }
    }
}

impl fmt::Display for SolidOutputHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.solid, self.output)
    }
}

/// Key of the dependency dictionary: a definition name plus optional alias.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SolidInstance {
    pub definition: String,
    pub alias: Option<String>,
}

impl SolidInstance {
    pub fn new(definition: impl Into<String>) -> Self {
        Self {
            definition: definition.into(),
            alias: None,
        }
    }

    pub fn aliased(definition: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            definition: definition.into(),
            alias: Some(alias.into()),
        }
    }

    /// Instance name: the alias when present, otherwise the definition name.
    pub fn name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.definition)
    }
}

impl From<&str> for SolidInstance {
    fn from(definition: &str) -> Self {
        Self::new(definition)
    }
}

/// Shape of a dependency edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// One upstream value feeds one downstream input.
    Direct,
    /// One upstream collection is consumed element-by-element in a nested scope.
    FanOut,
    /// A nested scope's per-element values are merged back into one value.
    FanIn,
}

/// Declared source of an input in the dependency dictionary.
///
/// Direct and fan-out dependencies name exactly one upstream output; fan-in
/// dependencies may name several.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DependencyDefinition {
    pub sources: Vec<(String, String)>,
    pub kind: DependencyKind,
}

impl DependencyDefinition {
    pub fn new(solid: impl Into<String>) -> Self {
        Self::with_output(solid, DEFAULT_OUTPUT)
    }

    pub fn with_output(solid: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            sources: vec![(solid.into(), output.into())],
            kind: DependencyKind::Direct,
        }
    }

    /// Sequence dependency: the consumer runs once per upstream element.
    pub fn fan_out(solid: impl Into<String>) -> Self {
        Self {
            kind: DependencyKind::FanOut,
            ..Self::new(solid)
        }
    }

    pub fn fan_in<S, O>(sources: impl IntoIterator<Item = (S, O)>) -> Self
    where
        S: Into<String>,
        O: Into<String>,
    {
        Self {
            sources: sources
                .into_iter()
                .map(|(solid, output)| (solid.into(), output.into()))
                .collect(),
            kind: DependencyKind::FanIn,
        }
    }
}

/// Resolved producer of one input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "source", rename_all = "snake_case")]
pub enum Dependency {
    Direct(SolidOutputHandle),
    FanOut(SolidOutputHandle),
    FanIn(Vec<SolidOutputHandle>),
}

impl Dependency {
    pub fn kind(&self) -> DependencyKind {
        match self {
            Dependency::Direct(_) => DependencyKind::Direct,
            Dependency::FanOut(_) => DependencyKind::FanOut,
            Dependency::FanIn(_) => DependencyKind::FanIn,
        }
    }

    /// Every upstream output this dependency reads from.
    pub fn sources(&self) -> &[SolidOutputHandle] {
        match self {
            Dependency::Direct(handle) | Dependency::FanOut(handle) => std::slice::from_ref(handle),
            Dependency::FanIn(handles) => handles,
        }
    }
}

/// Queryable graph over input handles.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DependencyStructure {
    deps: IndexMap<SolidInputHandle, Dependency>,
}

impl DependencyStructure {
    pub fn insert(&mut self, handle: SolidInputHandle, dependency: Dependency) {
        self.deps.insert(handle, dependency);
    }

    pub fn has_dep(&self, handle: &SolidInputHandle) -> bool {
        self.deps.contains_key(handle)
    }

    pub fn get(&self, handle: &SolidInputHandle) -> Option<&Dependency> {
        self.deps.get(handle)
    }

    /// First upstream output feeding `handle`.
    pub fn get_dep(&self, handle: &SolidInputHandle) -> Option<&SolidOutputHandle> {
        self.deps
            .get(handle)
            .and_then(|dep| dep.sources().first())
    }

    pub fn get_deps(&self, handle: &SolidInputHandle) -> &[SolidOutputHandle] {
        self.deps.get(handle).map(Dependency::sources).unwrap_or(&[])
    }

    pub fn is_fanout_dep(&self, handle: &SolidInputHandle) -> bool {
        matches!(self.deps.get(handle), Some(Dependency::FanOut(_)))
    }

    pub fn is_fanin_dep(&self, handle: &SolidInputHandle) -> bool {
        matches!(self.deps.get(handle), Some(Dependency::FanIn(_)))
    }

    pub fn deps_of_solid<'a>(
        &'a self,
        solid: &'a str,
    ) -> impl Iterator<Item = (&'a SolidInputHandle, &'a Dependency)> + 'a {
        self.deps.iter().filter(move |(handle, _)| handle.solid == solid)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SolidInputHandle, &Dependency)> {
        self.deps.iter()
    }

    pub fn len(&self) -> usize {
        self.deps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }
}

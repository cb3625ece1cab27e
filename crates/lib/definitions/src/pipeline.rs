//! Pipeline definition, validation, and topological ordering.

use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};

use super::dependency::{
    Dependency, DependencyDefinition, DependencyKind, DependencyStructure, SolidInputHandle,
    SolidInstance, SolidOutputHandle,
};
use super::solids::{InputDefinition, OutputDefinition, SolidDefinition};

/// Raised when a pipeline declaration is structurally invalid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    #[error("Solid definition names must be unique: {0} is declared more than once")]
    DuplicateDefinition(String),
    #[error("Solid instance names must be unique: {0} is declared more than once")]
    DuplicateSolidInstance(String),
    #[error("Solid {0} in dependency dictionary not found in solid list")]
    UnknownDependencyKey(String),
    #[error("Solid \"{solid}\" does not have input \"{input}\"")]
    UnknownInput { solid: String, input: String },
    #[error("Solid {0} in DependencyDefinition not found in solid list")]
    UnknownDependencySolid(String),
    #[error("Solid {solid} does not have output {output}")]
    UnknownOutput { solid: String, output: String },
    #[error("Dependency for input \"{input}\" on solid \"{solid}\" must name exactly one upstream output, found {count}")]
    MalformedDependency {
        solid: String,
        input: String,
        count: usize,
    },
    #[error("Circular reference detected in solid {0}")]
    CircularReference(String),
}

/// A definition instantiated under an instance name within one pipeline.
#[derive(Clone, Debug)]
pub struct Solid {
    pub name: String,
    pub definition: Arc<SolidDefinition>,
}

impl Solid {
    pub fn new(name: impl Into<String>, definition: Arc<SolidDefinition>) -> Self {
        Self {
            name: name.into(),
            definition,
        }
    }

    pub fn input_handle(&self, input: &str) -> SolidInputHandle {
        SolidInputHandle::new(&self.name, input)
    }

    pub fn output_handle(&self, output: &str) -> SolidOutputHandle {
        SolidOutputHandle::new(&self.name, output)
    }

    pub fn input_defs(&self) -> &[InputDefinition] {
        &self.definition.inputs
    }

    pub fn output_defs(&self) -> &[OutputDefinition] {
        &self.definition.outputs
    }
}

type DependencyDictionary = Vec<(SolidInstance, Vec<(String, DependencyDefinition)>)>;

/// Validated graph of solids plus their dependency wiring.
///
/// Instances are derived from the dependency dictionary: a definition that
/// no dictionary key references yields one solid under its own name, while
/// a referenced definition yields one solid per key (by name or alias).
#[derive(Clone, Debug)]
pub struct PipelineDefinition {
    pub name: String,
    solid_defs: Vec<Arc<SolidDefinition>>,
    solids: IndexMap<String, Solid>,
    dependency_structure: DependencyStructure,
    topological_order: Vec<String>,
}

impl PipelineDefinition {
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder {
            name: name.into(),
            solid_defs: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn new(
        name: impl Into<String>,
        solid_defs: Vec<SolidDefinition>,
        dependencies: DependencyDictionary,
    ) -> Result<Self, DefinitionError> {
        let name = name.into();
        let solid_defs: Vec<Arc<SolidDefinition>> = solid_defs.into_iter().map(Arc::new).collect();

        let mut defs_by_name: FxHashMap<&str, &Arc<SolidDefinition>> = FxHashMap::default();
        for def in &solid_defs {
            if defs_by_name.insert(def.name.as_str(), def).is_some() {
                return Err(DefinitionError::DuplicateDefinition(def.name.clone()));
            }
        }

        for (instance, _) in &dependencies {
            if !defs_by_name.contains_key(instance.definition.as_str()) {
                return Err(DefinitionError::UnknownDependencyKey(
                    instance.definition.clone(),
                ));
            }
        }

        let mut solids: IndexMap<String, Solid> = IndexMap::new();
        for def in &solid_defs {
            let keyed: Vec<&SolidInstance> = dependencies
                .iter()
                .map(|(instance, _)| instance)
                .filter(|instance| instance.definition == def.name)
                .collect();
            let names: Vec<String> = if keyed.is_empty() {
                vec![def.name.clone()]
            } else {
                keyed.iter().map(|instance| instance.name().to_string()).collect()
            };
            for instance_name in names {
                if solids.contains_key(&instance_name) {
                    return Err(DefinitionError::DuplicateSolidInstance(instance_name));
                }
                solids.insert(
                    instance_name.clone(),
                    Solid::new(instance_name, Arc::clone(def)),
                );
            }
        }

        let mut dependency_structure = DependencyStructure::default();
        for (instance, inputs) in &dependencies {
            let solid = &solids[instance.name()];
            for (input, dep_def) in inputs {
                if !solid.definition.has_input(input) {
                    return Err(DefinitionError::UnknownInput {
                        solid: instance.name().to_string(),
                        input: input.clone(),
                    });
                }
                let dependency = resolve_dependency(&solids, solid, input, dep_def)?;
                dependency_structure.insert(solid.input_handle(input), dependency);
            }
        }

        let topological_order = topological_order(&solids, &dependency_structure)?;

        Ok(Self {
            name,
            solid_defs,
            solids,
            dependency_structure,
            topological_order,
        })
    }

    pub fn solid_defs(&self) -> &[Arc<SolidDefinition>] {
        &self.solid_defs
    }

    pub fn solids(&self) -> impl Iterator<Item = &Solid> {
        self.solids.values()
    }

    pub fn solid_named(&self, name: &str) -> Option<&Solid> {
        self.solids.get(name)
    }

    pub fn has_solid(&self, name: &str) -> bool {
        self.solids.contains_key(name)
    }

    pub fn dependency_structure(&self) -> &DependencyStructure {
        &self.dependency_structure
    }

    pub fn topological_solids(&self) -> Vec<&Solid> {
        self.topological_order
            .iter()
            .filter_map(|name| self.solids.get(name))
            .collect()
    }
}

/// Solids ordered so every producer precedes its consumers.
pub fn solids_in_topological_order(pipeline: &PipelineDefinition) -> Vec<&Solid> {
    pipeline.topological_solids()
}

fn resolve_dependency(
    solids: &IndexMap<String, Solid>,
    solid: &Solid,
    input: &str,
    dep_def: &DependencyDefinition,
) -> Result<Dependency, DefinitionError> {
    let mut sources = Vec::with_capacity(dep_def.sources.len());
    for (upstream, output) in &dep_def.sources {
        let upstream_solid = solids
            .get(upstream)
            .ok_or_else(|| DefinitionError::UnknownDependencySolid(upstream.clone()))?;
        if *upstream == solid.name {
            return Err(DefinitionError::CircularReference(solid.name.clone()));
        }
        if !upstream_solid.definition.has_output(output) {
            return Err(DefinitionError::UnknownOutput {
                solid: upstream.clone(),
                output: output.clone(),
            });
        }
        sources.push(SolidOutputHandle::new(upstream, output));
    }

    match dep_def.kind {
        DependencyKind::FanIn => Ok(Dependency::FanIn(sources)),
        kind if sources.len() == 1 => {
            let source = sources.remove(0);
            Ok(match kind {
                DependencyKind::FanOut => Dependency::FanOut(source),
                _ => Dependency::Direct(source),
            })
        }
        _ => Err(DefinitionError::MalformedDependency {
            solid: solid.name.clone(),
            input: input.to_string(),
            count: sources.len(),
        }),
    }
}

/// Stable Kahn ordering; ties resolve in declaration order.
fn topological_order(
    solids: &IndexMap<String, Solid>,
    deps: &DependencyStructure,
) -> Result<Vec<String>, DefinitionError> {
    let mut upstream: FxHashMap<&str, FxHashSet<&str>> = FxHashMap::default();
    for (handle, dependency) in deps.iter() {
        let entry = upstream.entry(handle.solid.as_str()).or_default();
        for source in dependency.sources() {
            entry.insert(source.solid.as_str());
        }
    }

    let mut emitted: FxHashSet<&str> = FxHashSet::default();
    let mut order: Vec<String> = Vec::with_capacity(solids.len());
    while order.len() < solids.len() {
        let next = solids.keys().find(|name| {
            !emitted.contains(name.as_str())
                && upstream
                    .get(name.as_str())
                    .is_none_or(|ups| ups.iter().all(|up| emitted.contains(up)))
        });
        match next {
            Some(name) => {
                emitted.insert(name.as_str());
                order.push(name.clone());
            }
            None => {
                let stuck = solids
                    .keys()
                    .find(|name| !emitted.contains(name.as_str()))
                    .cloned()
                    .unwrap_or_default();
                return Err(DefinitionError::CircularReference(stuck));
            }
        }
    }
    Ok(order)
}

/// Incremental construction of a [`PipelineDefinition`].
pub struct PipelineBuilder {
    name: String,
    solid_defs: Vec<SolidDefinition>,
    dependencies: DependencyDictionary,
}

impl PipelineBuilder {
    pub fn solid(mut self, definition: SolidDefinition) -> Self {
        self.solid_defs.push(definition);
        self
    }

    pub fn solids(mut self, definitions: impl IntoIterator<Item = SolidDefinition>) -> Self {
        self.solid_defs.extend(definitions);
        self
    }

    pub fn dependencies<I, S>(mut self, instance: impl Into<SolidInstance>, inputs: I) -> Self
    where
        I: IntoIterator<Item = (S, DependencyDefinition)>,
        S: Into<String>,
    {
        let inputs = inputs
            .into_iter()
            .map(|(input, dep)| (input.into(), dep))
            .collect();
        self.dependencies.push((instance.into(), inputs));
        self
    }

    /// Declare an instance with no wired inputs.
    pub fn instance(self, instance: impl Into<SolidInstance>) -> Self {
        self.dependencies(instance, Vec::<(String, DependencyDefinition)>::new())
    }

    pub fn build(self) -> Result<PipelineDefinition, DefinitionError> {
        PipelineDefinition::new(self.name, self.solid_defs, self.dependencies)
    }
}

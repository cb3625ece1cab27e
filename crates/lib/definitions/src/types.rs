//! Runtime type tokens.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque runtime type attached to inputs and outputs.
///
/// The compiler never inspects these beyond carrying them onto step inputs
/// and outputs; validation and coercion belong to the runtime.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuntimeType(String);

impl RuntimeType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn any() -> Self {
        Self::new("Any")
    }

    pub fn int() -> Self {
        Self::new("Int")
    }

    pub fn string() -> Self {
        Self::new("String")
    }

    pub fn sequence() -> Self {
        Self::new("Sequence")
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Default for RuntimeType {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

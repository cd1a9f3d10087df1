//! Correlation identifiers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque token linking a published request to its eventual reply.
///
/// Generated fresh for every brokered attempt and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a new id, prefixed with the dependency name for readable logs.
    pub fn generate(dependency: &str) -> Self {
        Self(format!("{}-request-{}", dependency, Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CorrelationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for CorrelationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

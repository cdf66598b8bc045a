use thiserror::Error;

/// Hard failures surfaced by the memory graph.
///
/// Out-of-range metric values are not an error here: they are clamped on
/// read and only logged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("node not found: {0}")]
    NotFound(String),

    #[error("duplicate id: {0}")]
    DuplicateId(String),

    #[error("canonical node is immutable: {0}")]
    ImmutableViolation(String),

    #[error("invalid graph document: {0}")]
    Serialization(String),
}

pub type GraphResult<T> = Result<T, GraphError>;

impl From<serde_json::Error> for GraphError {
    fn from(e: serde_json::Error) -> Self {
        GraphError::Serialization(e.to_string())
    }
}

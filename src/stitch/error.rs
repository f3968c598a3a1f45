use crate::LoadError;

/// Failure raised while building or executing a stitched schema.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutionError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("invalid schema: {0}")]
    Schema(String),
    #[error("cannot query field \"{field}\" on type \"{type_name}\"")]
    UnknownField { type_name: String, field: String },
    #[error("{type_name}.{field} requires parent field \"{required}\"")]
    MissingDependency { type_name: String, field: String, required: String },
    #[error("cannot return null for non-nullable field {0}")]
    NullViolation(String),
    #[error("delegation to schema \"{schema}\" failed: {message}")]
    Delegation { schema: String, message: String },
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Load(#[from] LoadError),
}

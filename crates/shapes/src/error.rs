use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShapeError>;

/// Malformed schema conditions. All of them are fatal for the service being modelled.
#[derive(Error, Debug)]
pub enum ShapeError {
    #[error("Unknown shape type '{type_name}' for {namespace}:{shape}")]
    UnknownShapeType {
        namespace: String,
        shape: String,
        type_name: String,
    },

    #[error("Shape {namespace}:{shape} is referenced by '{referenced_by}' but not declared")]
    MissingShape {
        namespace: String,
        shape: String,
        referenced_by: String,
    },

    #[error("Operation '{operation}' references undeclared shape '{shape}'")]
    MissingOperationShape { operation: String, shape: String },

    #[error("Shape '{shape}' is missing its '{field}' reference")]
    MissingReference { shape: String, field: &'static str },

    #[error("Invalid transform: {0}")]
    InvalidTransform(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ShapeError {
    pub fn missing_reference(shape: impl Into<String>, field: &'static str) -> Self {
        Self::MissingReference {
            shape: shape.into(),
            field,
        }
    }
}

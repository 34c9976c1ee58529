use grump_domain::DomainError;
use grump_shapes::ShapeError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DiscoveryError>;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// An invocation failed with a kind outside the non-fatal allow-list
    #[error("Fatal failure calling {namespace}:{operation}: {kind}: {message}")]
    Fatal {
        namespace: String,
        operation: String,
        kind: String,
        message: String,
    },

    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Crawl task for region {region} failed: {message}")]
    Task { region: String, message: String },
}

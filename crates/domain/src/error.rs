use thiserror::Error;

pub type Result<T> = std::result::Result<T, DomainError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Keys within one lineage must be unique
    #[error("Duplicate lineage key: {0}")]
    DuplicateLineageKey(String),
}

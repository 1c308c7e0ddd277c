
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FactlogError {
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),
    #[error("Type mismatch for attribute {attribute}: expected {expected}, got {value}")]
    TypeMismatch { attribute: String, expected: String, value: String },
    #[error("Cardinality conflict: entity {entity} asserts both {first} and {second} for cardinality-one attribute {attribute}")]
    CardinalityConflict { entity: i64, attribute: String, first: String, second: String },
    #[error("Identifier resolution failed: {0}")]
    IdentifierResolution(String),
    #[error("Durability error: {0}")]
    Durability(String),
    #[error("Bad schema assertion: {0}")]
    Schema(String),
    #[error("Settings error: {0}")]
    Settings(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, FactlogError>;

// Helper conversions
impl From<rusqlite::Error> for FactlogError {
    fn from(e: rusqlite::Error) -> Self { Self::Durability(e.to_string()) }
}
impl From<config::ConfigError> for FactlogError {
    fn from(e: config::ConfigError) -> Self { Self::Settings(e.to_string()) }
}

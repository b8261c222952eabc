use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabarnError {
    #[error("Type mismatch for '{label}': expected {expected}, got {found}")]
    TypeMismatch { label: String, expected: String, found: String },
    #[error("Field '{0}' is required and cannot be null")]
    RequiredViolation(String),
    #[error("Field '{0}' cannot be assigned again (frozen or auto)")]
    FrozenViolation(String),
    #[error("Key field '{0}' cannot change while the record belongs to a barn")]
    KeyImmutable(String),
    #[error("Key field '{0}' is null")]
    MissingKey(String),
    #[error("Key {0} is already in use")]
    DuplicateKey(String),
    #[error("Value {value} of unique field '{label}' is already in use")]
    UniqueViolation { label: String, value: String },
    #[error("Unknown field '{label}' for shape {shape}")]
    UnknownField { label: String, shape: String },
    #[error("Shape {0} is static: fields cannot be added or removed")]
    StaticSchemaViolation(String),
    #[error("Record already belongs to another barn")]
    AlreadyOwned,
    #[error("Schema mismatch: barn holds {expected}, got {found}")]
    SchemaMismatch { expected: String, found: String },
    #[error("Comparison not supported: {0} has no comparable fields")]
    ComparisonUnsupported(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Expected {expected} key part(s), got {found}")]
    KeyArity { expected: usize, found: usize },
    #[error("Invalid shape: {0}")]
    InvalidShape(String),
    #[error("Invalid label: {0}")]
    InvalidLabel(String),
    #[error("Expected a mapping, got {0}")]
    NotAMapping(String),
    #[error("Barn is busy: it cannot be modified while it is being iterated")]
    Busy,
    #[error("Text error: {0}")]
    Text(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, DatabarnError>;

//! Error types for the Pagemind domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Pagemind operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Value model errors ---
    #[error("Value error: {0}")]
    Value(#[from] ValueError),

    // --- Tiered store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Context directory errors ---
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    // --- Directive parsing errors ---
    #[error("Directive error: {0}")]
    Directive(#[from] DirectiveError),

    // --- Model endpoint errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Persistence errors ---
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The directory and the store disagree about what exists. Fatal.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the canonical JSON value model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("Parse error at byte {position}: {reason}")]
    Parse { position: usize, reason: String },

    #[error("Number is NaN or infinite and cannot be serialized")]
    InvalidNumber,

    #[error("Trailing garbage at byte {position}")]
    TrailingGarbage { position: usize },

    #[error("Key not found: {0}")]
    KeyNotFound(String),
}

/// Failures of the tiered byte store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("Store capacity exceeded for key '{key}': {size} bytes (max {max})")]
    OutOfCapacity { key: String, size: u64, max: u64 },

    #[error("Frame for key '{key}' is missing its end marker")]
    FrameCorrupt { key: String },

    #[error("Invalid store key '{key}': must be 1-63 bytes of [A-Za-z0-9_]")]
    InvalidKey { key: String },
}

/// Failures of the context directory.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DirectoryError {
    #[error("Directory entry already exists: {0}")]
    AlreadyExists(String),

    #[error("Directory is full ({max} entries)")]
    Full { max: usize },

    #[error("Directory entry not found: {0}")]
    NotFound(String),
}

/// Failures while extracting directives from a model response.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DirectiveError {
    #[error("Response is missing the </think> delimiter")]
    MissingThinkDelimiter,

    #[error("Directive payload is not valid JSON at byte {position}: {reason}")]
    InvalidDirectiveJson { position: usize, reason: String },

    #[error("Unknown action type: {0}")]
    UnknownActionType(String),

    #[error("Tag list produced an empty key")]
    EmptyKey,

    #[error("Invalid phase name: {0}")]
    InvalidPhase(String),
}

/// Failures talking to the model endpoint.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Endpoint returned status {status_code}: {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// Failures of the on-disk memory files.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Memory files are locked by another agent instance: {path}")]
    AlreadyLocked { path: String },

    #[error("File {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },
}

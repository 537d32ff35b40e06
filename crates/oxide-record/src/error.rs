//! Error types for the record layer.
//!
//! Only configuration problems and local conversion failures are returned as
//! `Err`. Anything the data store rejects travels in the response envelope
//! attached to the returned record or collection.

use thiserror::Error;

/// Record-layer errors.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Schema loading was requested but no introspection procedure is set.
    #[error("no describe function configured for model {0}")]
    MissingDescribeFunction(String),

    /// A connection was configured with an empty URL or key.
    #[error("invalid connection: {0}")]
    InvalidConnection(String),

    /// Neither the model nor the process has a connection.
    #[error("model {0} has no connection; call Manager::connect or registry::set_default_connection")]
    NotConnected(String),

    /// A scalar key was given for a composite identifier, or the reverse.
    #[error("identifier arity mismatch on {model}: {message}")]
    IdentifierArity {
        /// Model name.
        model: String,
        /// What went wrong.
        message: String,
    },

    /// An identifier column of a persisted record was modified.
    #[error("identifier column {0} cannot be changed on a persisted record")]
    ImmutableIdentifier(String),

    /// No relationship with this name is declared on the model.
    #[error("relation {relation} is not declared on {model}")]
    UnknownRelation {
        /// Model name.
        model: String,
        /// Requested relation.
        relation: String,
    },

    /// The record has no value for a column the operation keys on.
    #[error("record has no value for identifier column {0}")]
    MissingIdentifier(String),

    /// Attributes could not be converted to or from the typed model.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The REST client could not be built.
    #[error("client error: {0}")]
    Client(#[from] oxide_rest::ClientError),
}

/// Result type alias for record operations.
pub type Result<T> = std::result::Result<T, RecordError>;

//! Errors surfaced by the public API.
//!
//! Every failure is one of a closed set of kinds so callers can match
//! exhaustively; messages carry the offending attribute or document
//! node IDs where one exists. The compiler and the ingester stop at the
//! first error.

use thiserror::Error;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Every error the schema layer pipeline can produce.
#[derive(Debug, Error)]
pub enum Error {
    /// A loader could not supply a layer for the given IRI.
    #[error("not found: {0}")]
    NotFound(String),

    /// A loader or blob reader failed below the schema level.
    #[error("io error: {0}")]
    Io(String),

    /// A structural violation detected during compose or compile:
    /// duplicate attribute names, kind conflicts, missing roots.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// Two attributes with the same IRI in one layer.
    #[error("duplicate attribute: {0}")]
    DuplicateAttribute(String),

    /// A term composition rule rejected the merge of two values.
    #[error("incompatible composition of {id}: {msg}")]
    IncompatibleComposition { id: String, msg: String },

    /// A composite referenced an attribute kind that cannot be folded
    /// into an object.
    #[error("invalid composition")]
    InvalidComposition,

    /// A JSON-Schema import cycle that is not broken by an entity
    /// boundary. The path lists the schema locations forming the loop.
    #[error("cyclic schema: {}", path.join(" -> "))]
    CyclicSchema { path: Vec<String> },

    /// Link-spec preconditions failed (inconsistent or excess foreign
    /// keys).
    #[error("invalid foreign keys for {spec}: {msg}")]
    InvalidForeignKeys { spec: String, msg: String },

    /// No enclosing entity root was found while resolving a link.
    #[error("cannot resolve link: {0}")]
    CannotResolveLink(String),

    /// The schema under-specifies an edge ingestion: neither an edge
    /// label override nor an attribute name is present.
    #[error("cannot determine edge label for {0}")]
    CannotDetermineEdgeLabel(String),

    /// The schema under-specifies a property ingestion: neither a
    /// property name override nor an attribute name is present.
    #[error("cannot determine property name for {0}")]
    CannotDeterminePropertyName(String),

    /// `asPropertyOf` names an ancestor that is not on the current
    /// ingestion path.
    #[error("cannot find ancestor {0}")]
    CannotFindAncestor(String),

    /// No polymorphic option matched the input at the given attribute.
    #[error("no options match for {0}")]
    NoOptionsMatch(String),

    /// A deferred property was still unresolved when the document root
    /// closed.
    #[error("no parent node for deferred property {0}")]
    NoParentNode(String),

    /// A validator rejected a value.
    #[error("validation failed [{validator}]: {msg}")]
    Validation {
        validator: &'static str,
        msg: String,
        value: Option<String>,
    },

    /// Wraps an inner error with the document key being ingested, for
    /// diagnostics.
    #[error("while ingesting {key}: {source}")]
    DataIngestion {
        key: String,
        #[source]
        source: Box<Error>,
    },

    /// The operation observed a cancelled context and stopped early.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Wraps this error with the failing document key, unless it is
    /// already a [`Error::DataIngestion`] wrapper.
    #[must_use]
    pub fn with_key(self, key: &str) -> Error {
        match self {
            Error::DataIngestion { .. } | Error::Cancelled => self,
            other => Error::DataIngestion {
                key: key.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Builds a validation error.
    pub fn validation(validator: &'static str, msg: impl Into<String>) -> Error {
        Error::Validation {
            validator,
            msg: msg.into(),
            value: None,
        }
    }
}

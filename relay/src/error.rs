use std::error;
use std::fmt;

/// Type alias for results produced by relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

/// Classification of failures surfaced by the replication core.
///
/// Kinds map onto the handling contract of the stage loop and dispatch queue:
/// extraction and application failures are policy-gated, cancellation is not
/// an error, and invariant violations are always fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Upstream decoding or extraction failure; gated by the extractor policy.
    ExtractionFailed,
    /// Downstream apply failure; gated by the applier policy.
    ApplyFailed,
    /// A filter returned an error; escalated as an application-class failure.
    FilterFailed,
    /// Cooperative shutdown interrupted the operation.
    Cancelled,
    /// The event stream producer is gone and no further events will arrive.
    EventStreamClosed,
    /// An impossible state was observed; never retried.
    InvariantViolation,
    /// A bounded queue stayed exhausted beyond its wait budget.
    CapacityExhausted,
    /// Configuration is structurally valid but semantically unusable.
    ConfigError,
    /// No partitioner factory is registered under the requested name.
    UnknownPartitioner,
    /// A chunk-definitions document failed to parse.
    ChunkDefinitionInvalid,
    /// A read-only store probe failed.
    StoreQueryFailed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ExtractionFailed => "extraction_failed",
            ErrorKind::ApplyFailed => "apply_failed",
            ErrorKind::FilterFailed => "filter_failed",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::EventStreamClosed => "event_stream_closed",
            ErrorKind::InvariantViolation => "invariant_violation",
            ErrorKind::CapacityExhausted => "capacity_exhausted",
            ErrorKind::ConfigError => "config_error",
            ErrorKind::UnknownPartitioner => "unknown_partitioner",
            ErrorKind::ChunkDefinitionInvalid => "chunk_definition_invalid",
            ErrorKind::StoreQueryFailed => "store_query_failed",
        };
        write!(f, "{name}")
    }
}

/// Internal representation separating static descriptions from dynamic detail.
enum ErrorRepr {
    WithDescription(ErrorKind, &'static str),
    WithDescriptionAndDetail(ErrorKind, &'static str, String),
}

/// The error type used across the relay core.
///
/// Carries a stable [`ErrorKind`] for dispatch, a static description, and an
/// optional dynamic detail string. Construct through [`crate::relay_error!`]
/// or return early with [`crate::bail!`].
pub struct RelayError {
    repr: ErrorRepr,
}

impl RelayError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match &self.repr {
            ErrorRepr::WithDescription(kind, _) => *kind,
            ErrorRepr::WithDescriptionAndDetail(kind, _, _) => *kind,
        }
    }

    /// Returns the static description of this error.
    pub fn description(&self) -> &'static str {
        match &self.repr {
            ErrorRepr::WithDescription(_, description) => description,
            ErrorRepr::WithDescriptionAndDetail(_, description, _) => description,
        }
    }

    /// Returns the dynamic detail of this error, if any.
    pub fn detail(&self) -> Option<&str> {
        match &self.repr {
            ErrorRepr::WithDescription(_, _) => None,
            ErrorRepr::WithDescriptionAndDetail(_, _, detail) => Some(detail),
        }
    }

    /// Returns `true` when the error represents cooperative shutdown rather
    /// than a real failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self.kind(), ErrorKind::Cancelled)
    }
}

impl From<(ErrorKind, &'static str)> for RelayError {
    fn from((kind, description): (ErrorKind, &'static str)) -> Self {
        RelayError {
            repr: ErrorRepr::WithDescription(kind, description),
        }
    }
}

impl From<(ErrorKind, &'static str, String)> for RelayError {
    fn from((kind, description, detail): (ErrorKind, &'static str, String)) -> Self {
        RelayError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, description, detail),
        }
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::WithDescription(kind, description) => {
                write!(f, "{kind}: {description}")
            }
            ErrorRepr::WithDescriptionAndDetail(kind, description, detail) => {
                write!(f, "{kind}: {description} ({detail})")
            }
        }
    }
}

impl fmt::Debug for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayError")
            .field("kind", &self.kind())
            .field("description", &self.description())
            .field("detail", &self.detail())
            .finish()
    }
}

impl error::Error for RelayError {}

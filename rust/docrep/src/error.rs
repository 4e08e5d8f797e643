//! Types for errors that can occur while reading docrep streams.

/// An error that can occur while decoding a docrep stream.
///
/// Every variant is terminal for the frame being decoded: after any error the
/// reader's position within the stream is unspecified and the reader should
/// be discarded.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error from the underlying stream.
    #[error("I/O error: {source:?} while {context}")]
    Io {
        /// The original error.
        #[source]
        source: std::io::Error,
        /// The part of the frame being read when the error occurred.
        context: String,
    },
    /// Malformed packing: a wrong value kind, an unexpected map key, a tuple
    /// of the wrong arity, an unsupported wire version, or a frame truncated
    /// mid-value.
    #[error("wire format error: {0}")]
    Wire(String),
    /// A structural disagreement between the stream's embedded schema and the
    /// caller's static declarations.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    /// A store id, klass id, field id, or byte count on the wire was out of
    /// range.
    #[error("bounds error: {0}")]
    Bounds(String),
    /// The frame's classes block declared no `__meta__` document class.
    #[error("stream declared no `__meta__` document class")]
    MissingMeta,
    /// A downcast or instantiation failure while materializing an object.
    /// Indicates a schema registered against the wrong types.
    #[error("internal error: {0}")]
    Internal(String),
}

/// An alias for a `Result` with [`enum@Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new I/O [`enum@Error`] with the given `context`.
    pub fn io(error: std::io::Error, context: impl ToString) -> Self {
        Self::Io {
            source: error,
            context: context.to_string(),
        }
    }

    /// Creates a new wire-format [`enum@Error`].
    pub fn wire(msg: impl ToString) -> Self {
        Self::Wire(msg.to_string())
    }

    /// Creates a new schema-mismatch [`enum@Error`].
    pub fn schema_mismatch(msg: impl ToString) -> Self {
        Self::SchemaMismatch(msg.to_string())
    }

    /// Creates a new bounds [`enum@Error`].
    pub fn bounds(msg: impl ToString) -> Self {
        Self::Bounds(msg.to_string())
    }

    /// Creates a new internal [`enum@Error`].
    pub fn internal(msg: impl ToString) -> Self {
        Self::Internal(msg.to_string())
    }
}

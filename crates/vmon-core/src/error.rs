//! The request-parsing error kind.

/// A malformed or unrecognized request (§7 BadRequest).
///
/// There is exactly one kind here — the original collapses every parse
/// failure into a single `BadRequest` outcome: the line is logged and
/// dropped, and the reader moves on to the next one.
#[derive(Debug, Clone, thiserror::Error)]
#[error("bad request: {0}")]
pub struct RequestError(pub(crate) String);

impl RequestError {
    pub(crate) fn new(msg: impl Into<String>) -> Self {
        RequestError(msg.into())
    }
}

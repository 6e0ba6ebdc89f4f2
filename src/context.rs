//! Per-request context carried through every data-access call.
//!
//! [`TraceId`] is a newtype wrapper around [`uuid::Uuid`] (v4) so the
//! correlation identifier cannot be confused with row identifiers.
//! [`RequestContext`] carries it from the HTTP handler down to the SQL
//! logger by reference.

use std::fmt;

/// Correlation identifier attached to every SQL trace line of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceId(uuid::Uuid);

impl TraceId {
    /// Creates a new random `TraceId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Context for one inbound request.
///
/// Owned by the handler that accepted the request. Work that is not tied to
/// a request, such as the schema bootstrap at startup, uses
/// [`RequestContext::background`], whose log lines carry a placeholder
/// instead of an identifier.
///
/// Cancellation is not carried here: when a client disconnects, the server
/// drops the handler future, and with it every pending statement.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    trace_id: Option<TraceId>,
}

impl RequestContext {
    /// Creates a context with a freshly generated trace id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            trace_id: Some(TraceId::new()),
        }
    }

    /// Context without a correlation identifier.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Returns the correlation identifier, if any.
    #[must_use]
    pub const fn trace_id(&self) -> Option<TraceId> {
        self.trace_id
    }
}

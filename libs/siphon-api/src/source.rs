use std::sync::Arc;

use crate::error::ReplicaError;
use crate::schema::{StreamSchema, TypeTag};

/// One undecoded record as delivered by the source client.
///
/// The header fields are decoded by the client; `body` is the field-by-field
/// wire payload consumed through [`crate::wire::WireCursor`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Nanoseconds since the Unix epoch.
    pub timestamp: i64,
    /// Instrument / entity key.
    pub instrument: String,
    /// Concrete runtime type of this record.
    pub type_tag: TypeTag,
    pub body: Vec<u8>,
}

/// Data-availability signal installed on a live cursor.
///
/// Fired from the source client's own thread; it must only wake the
/// replication worker and never touch data.
pub type AvailabilityCallback = Arc<dyn Fn() + Send + Sync>;

/// Non-blocking cursor over one stream.
pub trait SourceCursor: Send {
    /// Next ready record, or `None` when nothing is buffered right now.
    /// `None` with [`SourceCursor::is_exhausted`] means the cursor is done
    /// (bounded replication); otherwise the caller waits for availability.
    fn poll_next(&mut self) -> Result<Option<RawRecord>, ReplicaError>;

    fn is_exhausted(&self) -> bool;
}

/// Source store client.
///
/// The engine doesn't know concrete source systems; for the engine, a
/// source is just this trait.
pub trait SourceClient: Send + Sync {
    /// Top-level and all reachable record-type descriptors of a stream.
    fn describe(&self, stream: &str) -> Result<StreamSchema, ReplicaError>;

    /// Open a resumable cursor strictly after `from_exclusive` (from the
    /// beginning when `None`). A live cursor keeps the stream open and
    /// fires `on_available` when new data arrives; a non-live cursor
    /// reports exhaustion at the end of existing data.
    fn open_cursor(
        &self,
        stream: &str,
        from_exclusive: Option<i64>,
        live: bool,
        on_available: AvailabilityCallback,
    ) -> Result<Box<dyn SourceCursor>, ReplicaError>;
}

//! Backing document store abstraction.
//!
//! The fan-out service treats the store purely as a stream source: it
//! attaches a live query described by a [`CollectionSpec`], receives full
//! result-set snapshots through a [`SnapshotSink`], and detaches when the
//! last caller lets go. Consistency and replication are the store's
//! business.
//!
//! [`MemorySource`] is an in-process implementation used by the test
//! suite and by embedders that feed the service themselves.

mod memory;
mod types;

pub use memory::MemorySource;
pub use types::{
    CollectionSpec, Document, FieldFilter, LiveSource, OrderBy, RawSnapshot, SnapshotSink,
    SourceEvent, SourceHandle,
};

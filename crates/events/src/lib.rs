//! Event pipeline mechanics: the log store boundary, processors, stop signals.
//!
//! Nothing here knows about a concrete backend; infrastructure implementations
//! (Redis Streams) live in `eventline-infra`.

pub mod in_memory_store;
pub mod processor;
pub mod stop;
pub mod store;

pub use in_memory_store::InMemoryLogStore;
pub use processor::{
    DemoEventProcessor, EventProcessor, NoopProcessor, ProcessResult, ProcessingError, invoke,
};
pub use stop::StopSignal;
pub use store::{GroupInfo, GroupStart, LogStore, PendingEntry, StoreError, StoreResult};

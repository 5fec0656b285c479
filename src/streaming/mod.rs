//! # Range Streaming
//!
//! Moves the rows of one token range from the leaving node to a target node.
//! Transfers are staged on the target and committed as a unit, share a single
//! outbound throttle, and fail with [`StreamingError::Timeout`] when a chunk or
//! commit stalls past the inactivity window.

pub mod engine;
pub mod errors;
pub mod store;
pub mod throttle;
pub mod transport;

pub use engine::{StreamTransferEngine, TransferSummary};
pub use errors::{StreamingError, StreamingResult};
pub use store::{InMemoryNodeStore, RangeDataSource, Row};
pub use throttle::StreamThrottle;
pub use transport::{FaultInjector, InMemoryTransport, StreamChunk, StreamSession, StreamTransport};

//! The IPC data plane shared by the proxy and the cache daemon: the
//! segment pool, the request channel, and the chunked ping-pong transfer
//! protocol that rides on top of a leased segment.

pub mod request;
pub mod segment;
pub mod sem;
pub mod shm;
pub mod transfer;

pub use request::RequestMessage;
pub use segment::{SegmentDescriptor, SegmentPool};
pub use sem::NamedSemaphore;
pub use shm::MappedSegment;
pub use transfer::{ProxyOutcome, Verdict};

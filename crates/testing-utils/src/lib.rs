//! Testing utilities shared across the workspace.
//!
//! Provides in-memory implementations of the repository, mesh and
//! dispatch traits, plus fluent builders for test data. Everything in
//! here is test-only plumbing; none of it talks to a real database or
//! mesh service.

pub mod builders;
pub mod mocks;

pub use builders::{EventBuilder, GroupBuilder, JobBuilder, NodeBuilder};
pub use mocks::{
    MemoryAdvisoryLock, MockGroupRepository, MockJobRepository, MockLinkRepository,
    MockMeshTransport, MockNodeRepository, MockWorkUnitControl, RecordingDispatchQueue,
};

pub mod event;
pub mod group;
pub mod job;
pub mod link;
pub mod node;

pub use event::{JobEvent, EOF_EVENT, KEEPALIVE_EVENT, MINIMAL_EVENTS, STATS_EVENT};
pub use group::CapacityGroup;
pub use job::{Job, JobKind, JobStatus, ACTIVE_STATUSES, ERROR_STATUSES};
pub use link::{Link, LinkState};
pub use node::{Node, NodeState, NodeType};

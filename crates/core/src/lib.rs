pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use errors::{ClusterError, ClusterResult};
pub use models::{
    CapacityGroup, Job, JobEvent, JobKind, JobStatus, Link, LinkState, Node, NodeState, NodeType,
};

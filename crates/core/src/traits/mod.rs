pub mod dispatch;
pub mod lock;
pub mod mesh;
pub mod repository;

pub use dispatch::EventDispatchQueue;
pub use lock::{AdvisoryLock, HeldLock};
pub use mesh::{Advertisement, MeshStatus, MeshTransport, WorkUnit, WorkUnitControl, WorkerInfoData};
pub use repository::{
    GroupRepository, JobRepository, LinkRepository, MembershipChange, NodeRepository,
};

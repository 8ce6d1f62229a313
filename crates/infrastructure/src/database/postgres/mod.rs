//! PostgreSQL 仓储实现
//!
//! 心跳与回收路径上的条件更新（带状态过滤的 UPDATE）在影响行数为 0
//! 时统一返回 `ClusterError::UpdateConflict`，调用方据此识别并发竞争。

mod group_repository;
mod job_repository;
mod link_repository;
mod node_repository;

pub use group_repository::PostgresGroupRepository;
pub use job_repository::PostgresJobRepository;
pub use link_repository::PostgresLinkRepository;
pub use node_repository::PostgresNodeRepository;

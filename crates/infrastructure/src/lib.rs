//! 基础设施层：核心trait的落地实现
//!
//! - PostgreSQL 仓储与咨询锁
//! - RabbitMQ / 内存 事件分发队列
//! - 网格状态服务的 HTTP 客户端

pub mod advisory_lock;
pub mod database;
pub mod dispatch_factory;
pub mod dispatch_queue;
pub mod in_memory_dispatch;
pub mod mesh_client;

pub use advisory_lock::PgAdvisoryLock;
pub use database::create_pool;
pub use database::postgres::{
    PostgresGroupRepository, PostgresJobRepository, PostgresLinkRepository,
    PostgresNodeRepository,
};
pub use dispatch_factory::DispatchQueueFactory;
pub use dispatch_queue::RabbitMQDispatchQueue;
pub use in_memory_dispatch::InMemoryDispatchQueue;
pub use mesh_client::HttpMeshClient;

//! # 集群控制面
//!
//! 多个控制节点针对同一份共享存储并发运行本模块的周期任务：
//! 心跳协调器维护节点存活视图，成员策略引擎在锁保护下重算容量组
//! 归属，回收器清理失联节点遗留的任务与执行资源。
//!
//! 所有跨节点互斥都通过非阻塞咨询锁完成，抢不到锁就跳过本轮，
//! 单行写入的竞争按乐观冲突处理。

pub mod health;
pub mod heartbeat;
pub mod lifecycle;
pub mod policy;
pub mod reaper;
pub mod workunit;

pub use health::ExecutionNodeHealthCheck;
pub use heartbeat::HeartbeatCoordinator;
pub use lifecycle::ClusterLifecycle;
pub use policy::MembershipPolicyEngine;
pub use reaper::Reaper;
pub use workunit::WorkUnitReaper;

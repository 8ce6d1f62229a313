//! 集群级互斥锁接口
//!
//! 心跳、策略重算等周期任务在多控制节点部署下会同时触发，
//! 通过数据库咨询锁保证同一轮只有一个节点执行。锁是非阻塞的：
//! 抢锁失败的节点直接跳过本轮，等下一个周期再试。

use crate::ClusterResult;
use async_trait::async_trait;

/// 已持有的锁句柄
///
/// 实现通过 Drop 释放锁，调用方持有句柄期间锁保持有效。
pub trait HeldLock: Send {}

/// 咨询锁接口
#[async_trait]
pub trait AdvisoryLock: Send + Sync {
    /// 尝试获取命名锁，不阻塞
    ///
    /// 成功时返回锁句柄，锁已被其他会话持有时返回 `None`。
    async fn try_acquire(&self, name: &str) -> ClusterResult<Option<Box<dyn HeldLock>>>;
}

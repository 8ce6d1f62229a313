//! PostgreSQL 咨询锁实现
//!
//! 锁是会话级的，必须在独立连接上持有：连接池里的连接归还后会被
//! 复用，锁会泄漏到下一个借用方。因此每次抢锁单独建连，句柄Drop时
//! 关闭连接由数据库释放锁。

use async_trait::async_trait;
use automesh_core::config::DatabaseConfig;
use automesh_core::traits::{AdvisoryLock, HeldLock};
use automesh_core::ClusterResult;
use sqlx::{Connection, PgConnection};
use std::future::Future;
use tracing::{debug, warn};

pub struct PgAdvisoryLock {
    url: String,
}

impl PgAdvisoryLock {
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
        }
    }
}

/// 锁名到64位键的稳定映射（FNV-1a）
fn lock_key(name: &str) -> i64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in name.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash as i64
}

struct PgLockGuard {
    name: String,
    conn: Option<PgConnection>,
}

impl HeldLock for PgLockGuard {}

/// 有运行时可用时异步收尾，否则直接丢弃任务。
///
/// 句柄可能在无tokio运行时的线程上被丢弃，此时连接随任务一起丢弃，
/// 服务端在TCP会话终止时释放锁。
fn finish_in_background<F>(task: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(task);
        }
        Err(_) => drop(task),
    }
}

impl Drop for PgLockGuard {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let name = self.name.clone();
            finish_in_background(async move {
                if let Err(e) = conn.close().await {
                    warn!("关闭锁连接失败（锁 {} 将随会话超时释放）: {}", name, e);
                }
            });
        }
    }
}

#[async_trait]
impl AdvisoryLock for PgAdvisoryLock {
    async fn try_acquire(
        &self,
        name: &str,
    ) -> ClusterResult<Option<Box<dyn HeldLock>>> {
        let mut conn = PgConnection::connect(&self.url).await?;

        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(lock_key(name))
            .fetch_one(&mut conn)
            .await?;

        if !acquired {
            debug!("锁 {} 已被其他会话持有，跳过", name);
            let _ = conn.close().await;
            return Ok(None);
        }

        debug!("已获取咨询锁: {}", name);
        Ok(Some(Box::new(PgLockGuard {
            name: name.to_string(),
            conn: Some(conn),
        })))
    }
}

use automesh_core::config::DispatchQueueConfig;
use automesh_core::traits::EventDispatchQueue;
use automesh_core::{ClusterError, ClusterResult};
use std::sync::Arc;
use tracing::info;

use crate::{InMemoryDispatchQueue, RabbitMQDispatchQueue};

/// 按配置创建事件分发队列
pub struct DispatchQueueFactory;

impl DispatchQueueFactory {
    pub async fn create(
        config: &DispatchQueueConfig,
    ) -> ClusterResult<Arc<dyn EventDispatchQueue>> {
        match config.queue_type.as_str() {
            "rabbitmq" => {
                info!("初始化RabbitMQ事件分发队列");
                let queue = RabbitMQDispatchQueue::new(config).await?;
                Ok(Arc::new(queue))
            }
            "memory" => {
                info!("初始化内存事件分发队列");
                Ok(Arc::new(InMemoryDispatchQueue::new()))
            }
            other => Err(ClusterError::config_error(format!(
                "不支持的队列类型: {other}，可选值: rabbitmq, memory"
            ))),
        }
    }
}

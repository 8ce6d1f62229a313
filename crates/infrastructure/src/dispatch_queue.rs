use async_trait::async_trait;
use automesh_core::config::DispatchQueueConfig;
use automesh_core::traits::EventDispatchQueue;
use automesh_core::{ClusterError, ClusterResult};
use lapin::{
    options::{BasicPublishOptions, QueueDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// RabbitMQ 事件分发队列实现
///
/// 每个分组对应一个持久化队列，首次推送时按需声明。
pub struct RabbitMQDispatchQueue {
    connection: Connection,
    channel: Arc<Mutex<Channel>>,
    declared: Mutex<HashSet<String>>,
}

impl RabbitMQDispatchQueue {
    pub async fn new(config: &DispatchQueueConfig) -> ClusterResult<Self> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(|e| ClusterError::DispatchQueue(format!("连接RabbitMQ失败: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| ClusterError::DispatchQueue(format!("创建通道失败: {e}")))?;

        info!("成功连接到RabbitMQ: {}", config.url);

        let queue = Self {
            connection,
            channel: Arc::new(Mutex::new(channel)),
            declared: Mutex::new(HashSet::new()),
        };

        // 事件主队列提前声明，推送路径上不再有首条延迟
        queue.ensure_queue(&config.event_queue).await?;
        Ok(queue)
    }

    async fn ensure_queue(&self, name: &str) -> ClusterResult<()> {
        let mut declared = self.declared.lock().await;
        if declared.contains(name) {
            return Ok(());
        }

        let channel = self.channel.lock().await;
        channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| ClusterError::DispatchQueue(format!("声明队列 {name} 失败: {e}")))?;

        debug!("队列 {} 声明成功", name);
        declared.insert(name.to_string());
        Ok(())
    }

    async fn publish_payload(&self, queue: &str, payload: &Value) -> ClusterResult<()> {
        self.ensure_queue(queue).await?;

        let body = serde_json::to_vec(payload)
            .map_err(|e| ClusterError::Serialization(format!("序列化消息失败: {e}")))?;

        let channel = self.channel.lock().await;
        let confirm = channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default().with_delivery_mode(2), // 2 = persistent
            )
            .await
            .map_err(|e| ClusterError::DispatchQueue(format!("发布消息到队列 {queue} 失败: {e}")))?;

        confirm
            .await
            .map_err(|e| ClusterError::DispatchQueue(format!("消息发布确认失败: {e}")))?;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    pub async fn close(&self) -> ClusterResult<()> {
        self.connection
            .close(200, "正常关闭")
            .await
            .map_err(|e| ClusterError::DispatchQueue(format!("关闭连接失败: {e}")))?;
        info!("RabbitMQ连接已关闭");
        Ok(())
    }
}

#[async_trait]
impl EventDispatchQueue for RabbitMQDispatchQueue {
    async fn publish(&self, group: &str, event: &Value, skip_payload: bool) -> ClusterResult<()> {
        let envelope = json!({
            "type": "event",
            "skip_payload": skip_payload,
            "body": event,
        });
        self.publish_payload(group, &envelope).await
    }

    async fn publish_status(&self, group: &str, payload: &Value) -> ClusterResult<()> {
        let envelope = json!({
            "type": "status",
            "body": payload,
        });
        self.publish_payload(group, &envelope).await
    }
}

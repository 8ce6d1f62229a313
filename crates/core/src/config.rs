//! 配置模型定义
//!
//! 所有组件的配置都通过显式注入传递，不读取全局状态。
//! 配置从TOML文件加载并在启动时统一校验。

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{ClusterError, ClusterResult};

/// 配置校验接口
pub trait ConfigValidator {
    fn validate(&self) -> ClusterResult<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub node: NodeConfig,
    pub database: DatabaseConfig,
    pub cluster: ClusterConfig,
    pub callback: CallbackConfig,
    pub dispatch_queue: DispatchQueueConfig,
    pub mesh: MeshConfig,
}

impl AppConfig {
    /// 从TOML文件加载并校验配置
    pub fn load(path: &Path) -> ClusterResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClusterError::config_error(format!("读取配置文件 {path:?} 失败: {e}")))?;
        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| ClusterError::config_error(format!("解析配置文件失败: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> ClusterResult<()> {
        self.node.validate()?;
        self.database.validate()?;
        self.cluster.validate()?;
        self.callback.validate()?;
        self.dispatch_queue.validate()?;
        self.mesh.validate()?;
        Ok(())
    }
}

/// 本节点标识配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// 本节点在集群中的主机名标识
    pub hostname: String,
    /// 本节点软件版本号
    pub version: String,
    /// 调试模式（关闭版本偏差保护）
    pub debug: bool,
}

impl ConfigValidator for NodeConfig {
    fn validate(&self) -> ClusterResult<()> {
        if self.hostname.is_empty() {
            return Err(ClusterError::config_error("node.hostname 不能为空"));
        }
        if self.version.is_empty() {
            return Err(ClusterError::config_error("node.version 不能为空"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/automesh".to_string(),
            max_connections: 10,
            connection_timeout_seconds: 30,
        }
    }
}

impl ConfigValidator for DatabaseConfig {
    fn validate(&self) -> ClusterResult<()> {
        if self.url.is_empty() {
            return Err(ClusterError::config_error("database.url 不能为空"));
        }
        if self.max_connections == 0 {
            return Err(ClusterError::config_error(
                "database.max_connections 必须大于0",
            ));
        }
        Ok(())
    }
}

/// 集群心跳与成员策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// 心跳周期（秒）
    pub heartbeat_period_seconds: u64,
    /// 心跳偏差告警的宽限（秒）
    pub heartbeat_grace_seconds: i64,
    /// 节点存活阈值（秒），last_seen超过该值视为失联
    pub node_liveness_timeout_seconds: i64,
    /// 零容量节点健康复查的最小间隔（秒）
    pub remediation_interval_seconds: i64,
    /// 失联的控制节点是否自动下线删除
    pub auto_deprovision: bool,
    /// 控制平面容量组名称（执行节点不得加入）
    pub control_plane_group: String,
    /// 排队任务的回收宽限期（秒）
    pub waiting_grace_period_seconds: i64,
    /// 是否保留出错任务的工作单元（便于排障）
    pub keep_work_units_on_error: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            heartbeat_period_seconds: 60,        // 每分钟一次心跳
            heartbeat_grace_seconds: 2,          // 超过周期2秒告警偏差
            node_liveness_timeout_seconds: 120,  // 两个心跳周期未见即失联
            remediation_interval_seconds: 60,    // 零容量节点复查最多每分钟一次
            auto_deprovision: false,
            control_plane_group: "controlplane".to_string(),
            waiting_grace_period_seconds: 60,
            keep_work_units_on_error: false,
        }
    }
}

impl ConfigValidator for ClusterConfig {
    fn validate(&self) -> ClusterResult<()> {
        if self.heartbeat_period_seconds == 0 {
            return Err(ClusterError::config_error(
                "cluster.heartbeat_period_seconds 必须大于0",
            ));
        }
        if self.node_liveness_timeout_seconds <= self.heartbeat_period_seconds as i64 {
            return Err(ClusterError::config_error(
                "cluster.node_liveness_timeout_seconds 必须大于心跳周期",
            ));
        }
        if self.control_plane_group.is_empty() {
            return Err(ClusterError::config_error(
                "cluster.control_plane_group 不能为空",
            ));
        }
        Ok(())
    }
}

/// 事件回调管道配置
///
/// 本节不直接驱动控制节点的循环，而是作为每次运行构造回调管道
/// 参数（`PipelineOptions`）时的进程级默认值。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackConfig {
    /// 实时通道限流窗口大小（即每秒最大事件数）
    pub websocket_event_rate: usize,
    /// 是否启用间接主机计数（旁路文件解析）
    pub indirect_counting_enabled: bool,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            websocket_event_rate: 30,
            indirect_counting_enabled: false,
        }
    }
}

impl ConfigValidator for CallbackConfig {
    fn validate(&self) -> ClusterResult<()> {
        if self.websocket_event_rate == 0 {
            return Err(ClusterError::config_error(
                "callback.websocket_event_rate 必须大于0",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchQueueConfig {
    /// 队列类型: rabbitmq 或 memory
    pub queue_type: String,
    pub url: String,
    /// 回调事件队列名
    pub event_queue: String,
}

impl Default for DispatchQueueConfig {
    fn default() -> Self {
        Self {
            queue_type: "memory".to_string(),
            url: "amqp://localhost:5672".to_string(),
            event_queue: "callback_events".to_string(),
        }
    }
}

impl ConfigValidator for DispatchQueueConfig {
    fn validate(&self) -> ClusterResult<()> {
        let valid_types = ["rabbitmq", "memory"];
        if !valid_types.contains(&self.queue_type.as_str()) {
            return Err(ClusterError::config_error(format!(
                "无效的队列类型: {}，可选值: {:?}",
                self.queue_type, valid_types
            )));
        }
        if self.event_queue.is_empty() {
            return Err(ClusterError::config_error(
                "dispatch_queue.event_queue 不能为空",
            ));
        }
        Ok(())
    }
}

/// 网格传输状态服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    /// 网格状态服务地址
    pub status_url: String,
    pub request_timeout_seconds: u64,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            status_url: "http://127.0.0.1:7472".to_string(),
            request_timeout_seconds: 10,
        }
    }
}

impl ConfigValidator for MeshConfig {
    fn validate(&self) -> ClusterResult<()> {
        if self.status_url.is_empty() {
            return Err(ClusterError::config_error("mesh.status_url 不能为空"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_config_default_valid() {
        let config = ClusterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.heartbeat_period_seconds, 60);
        assert_eq!(config.node_liveness_timeout_seconds, 120);
    }

    #[test]
    fn test_liveness_must_exceed_heartbeat_period() {
        let config = ClusterConfig {
            heartbeat_period_seconds: 120,
            node_liveness_timeout_seconds: 60,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_callback_config_rejects_zero_rate() {
        let config = CallbackConfig {
            websocket_event_rate: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dispatch_queue_type_validation() {
        let mut config = DispatchQueueConfig::default();
        assert!(config.validate().is_ok());
        config.queue_type = "kafka".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("automesh.toml");
        std::fs::write(
            &path,
            r#"
[node]
hostname = "node-1"
version = "1.0.0"
debug = false

[database]
url = "postgres://localhost/automesh"
max_connections = 5
connection_timeout_seconds = 30

[cluster]
heartbeat_period_seconds = 60
heartbeat_grace_seconds = 2
node_liveness_timeout_seconds = 120
remediation_interval_seconds = 60
auto_deprovision = false
control_plane_group = "controlplane"
waiting_grace_period_seconds = 60
keep_work_units_on_error = false

[callback]
websocket_event_rate = 30
indirect_counting_enabled = true

[dispatch_queue]
queue_type = "memory"
url = "amqp://localhost:5672"
event_queue = "callback_events"

[mesh]
status_url = "http://127.0.0.1:7472"
request_timeout_seconds = 10
"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.node.hostname, "node-1");
        assert!(config.callback.indirect_counting_enabled);
    }
}

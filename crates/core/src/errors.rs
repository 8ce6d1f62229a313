use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),
    #[error("更新未影响任何行（乐观并发冲突）")]
    UpdateConflict,
    #[error("节点未找到: {hostname}")]
    NodeNotFound { hostname: String },
    #[error("任务未找到: {id}")]
    JobNotFound { id: i64 },
    #[error("集群版本不一致: 节点 {hostname} 版本 {remote}，本节点版本 {local}")]
    VersionSkew {
        hostname: String,
        remote: String,
        local: String,
    },
    #[error("网格传输错误: {0}")]
    MeshTransport(String),
    #[error("事件分发队列错误: {0}")]
    DispatchQueue(String),
    #[error("工作单元控制错误: {0}")]
    WorkUnit(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type ClusterResult<T> = Result<T, ClusterError>;

impl ClusterError {
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }
    pub fn node_not_found<S: Into<String>>(hostname: S) -> Self {
        Self::NodeNotFound {
            hostname: hostname.into(),
        }
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn mesh_error<S: Into<String>>(msg: S) -> Self {
        Self::MeshTransport(msg.into())
    }
    pub fn version_skew<S: Into<String>>(hostname: S, remote: S, local: S) -> Self {
        Self::VersionSkew {
            hostname: hostname.into(),
            remote: remote.into(),
            local: local.into(),
        }
    }

    /// 是否为致命错误（本进程应当停止接收新工作）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClusterError::VersionSkew { .. } | ClusterError::Configuration(_)
        )
    }

    /// 是否为良性并发竞争（另一节点已完成同一操作）
    pub fn is_benign_conflict(&self) -> bool {
        matches!(self, ClusterError::UpdateConflict)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClusterError::DatabaseOperation(_)
                | ClusterError::DispatchQueue(_)
                | ClusterError::MeshTransport(_)
        )
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(err: serde_json::Error) -> Self {
        ClusterError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for ClusterError {
    fn from(err: anyhow::Error) -> Self {
        ClusterError::Internal(err.to_string())
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 集群节点信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub hostname: String,
    pub uuid: Uuid,
    pub node_type: NodeType,
    pub node_state: NodeState,
    /// 可调度容量，0表示不可调度
    pub capacity: i32,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_health_check: Option<DateTime<Utc>>,
    pub version: String,
    pub enabled: bool,
    /// 是否参与策略自动分组
    pub managed_by_policy: bool,
    /// 最近一次健康检查记录的错误信息
    pub errors: String,
}

/// 节点类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeType {
    #[serde(rename = "control")]
    Control,
    #[serde(rename = "execution")]
    Execution,
    #[serde(rename = "hybrid")]
    Hybrid,
    #[serde(rename = "hop")]
    Hop,
}

/// 节点状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeState {
    #[serde(rename = "installed")]
    Installed,
    #[serde(rename = "ready")]
    Ready,
    #[serde(rename = "unavailable")]
    Unavailable,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Control => "control",
            NodeType::Execution => "execution",
            NodeType::Hybrid => "hybrid",
            NodeType::Hop => "hop",
        }
    }

    /// 控制平面节点（承载控制服务，参与版本偏差检查）
    pub fn is_control_plane(&self) -> bool {
        matches!(self, NodeType::Control | NodeType::Hybrid)
    }
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Installed => "installed",
            NodeState::Ready => "ready",
            NodeState::Unavailable => "unavailable",
        }
    }
}

impl Node {
    /// 判断节点是否失联：last_seen早于存活阈值
    pub fn is_lost(&self, ref_time: DateTime<Utc>, liveness_timeout_seconds: i64) -> bool {
        match self.last_seen {
            Some(last_seen) => {
                (ref_time - last_seen).num_seconds() > liveness_timeout_seconds
            }
            None => false,
        }
    }
}

impl sqlx::Type<sqlx::Postgres> for NodeType {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for NodeType {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        match s {
            "control" => Ok(NodeType::Control),
            "execution" => Ok(NodeType::Execution),
            "hybrid" => Ok(NodeType::Hybrid),
            "hop" => Ok(NodeType::Hop),
            _ => Err(format!("Invalid node type: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for NodeType {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

impl sqlx::Type<sqlx::Postgres> for NodeState {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for NodeState {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        match s {
            "installed" => Ok(NodeState::Installed),
            "ready" => Ok(NodeState::Ready),
            "unavailable" => Ok(NodeState::Unavailable),
            _ => Err(format!("Invalid node state: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for NodeState {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

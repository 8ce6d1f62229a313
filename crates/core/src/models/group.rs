use serde::{Deserialize, Serialize};

/// 容量组：一组可承接某类工作的节点池
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityGroup {
    pub id: i64,
    pub name: String,
    /// 手工指定的成员主机名列表（策略显式名单）
    pub policy_instance_list: Vec<String>,
    /// 成员数量下限
    pub policy_instance_minimum: i64,
    /// 候选池占比目标（0-100）
    pub policy_instance_percentage: i64,
    /// 容器组由外部编排管理，策略引擎不触碰其成员
    pub is_container_group: bool,
    /// 当前成员节点id集合
    pub members: Vec<i64>,
}

impl CapacityGroup {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            policy_instance_list: Vec::new(),
            policy_instance_minimum: 0,
            policy_instance_percentage: 0,
            is_container_group: false,
            members: Vec::new(),
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 自动化任务
///
/// 核心只关心与存活/回收逻辑相关的字段，任务模板内容由上层负责。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub kind: JobKind,
    pub status: JobStatus,
    /// 负责调度该任务的控制节点主机名
    pub controller_node: String,
    /// 实际执行该任务的节点主机名
    pub execution_node: String,
    /// 远端执行资源句柄
    pub work_unit_id: Option<String>,
    /// 分发标识，用于在本地回收时排除仍在运行的任务
    pub dispatch_guid: Option<String>,
    pub emitted_events: i64,
    pub event_queries_processed: bool,
    pub created: DateTime<Utc>,
    pub started: Option<DateTime<Utc>>,
    pub finished: Option<DateTime<Utc>>,
    pub job_explanation: String,
    pub result_traceback: String,
}

/// 任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "waiting")]
    Waiting,
    #[serde(rename = "running")]
    Running,
    #[serde(rename = "successful")]
    Successful,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "canceled")]
    Canceled,
    #[serde(rename = "error")]
    Error,
}

/// 活跃状态集合：处于这些状态的任务占有执行资源
pub const ACTIVE_STATUSES: [JobStatus; 3] =
    [JobStatus::Pending, JobStatus::Waiting, JobStatus::Running];

/// 出错状态集合
pub const ERROR_STATUSES: [JobStatus; 2] = [JobStatus::Failed, JobStatus::Error];

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Waiting => "waiting",
            JobStatus::Running => "running",
            JobStatus::Successful => "successful",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
            JobStatus::Error => "error",
        }
    }

    pub fn is_active(&self) -> bool {
        ACTIVE_STATUSES.contains(self)
    }

    pub fn is_error(&self) -> bool {
        ERROR_STATUSES.contains(self)
    }
}

/// 任务种类，决定回调管道的变体行为
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobKind {
    #[serde(rename = "job")]
    Job,
    #[serde(rename = "project_update")]
    ProjectUpdate,
    #[serde(rename = "inventory_update")]
    InventoryUpdate,
    #[serde(rename = "ad_hoc_command")]
    AdHocCommand,
    #[serde(rename = "system_job")]
    SystemJob,
}

impl JobKind {
    /// 事件流收尾标记的事件类型
    pub fn wrapup_event(&self) -> &'static str {
        match self {
            JobKind::Job | JobKind::ProjectUpdate => "playbook_on_stats",
            JobKind::InventoryUpdate | JobKind::AdHocCommand | JobKind::SystemJob => "EOF",
        }
    }

    /// 事件记录中指向任务的引用字段名
    pub fn reference_key(&self) -> &'static str {
        match self {
            JobKind::Job => "job_id",
            JobKind::ProjectUpdate => "project_update_id",
            JobKind::InventoryUpdate => "inventory_update_id",
            JobKind::AdHocCommand => "ad_hoc_command_id",
            JobKind::SystemJob => "system_job_id",
        }
    }
}

impl sqlx::Type<sqlx::Postgres> for JobStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for JobStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        match s {
            "pending" => Ok(JobStatus::Pending),
            "waiting" => Ok(JobStatus::Waiting),
            "running" => Ok(JobStatus::Running),
            "successful" => Ok(JobStatus::Successful),
            "failed" => Ok(JobStatus::Failed),
            "canceled" => Ok(JobStatus::Canceled),
            "error" => Ok(JobStatus::Error),
            _ => Err(format!("Invalid job status: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for JobStatus {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

impl sqlx::Type<sqlx::Postgres> for JobKind {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for JobKind {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        match s {
            "job" => Ok(JobKind::Job),
            "project_update" => Ok(JobKind::ProjectUpdate),
            "inventory_update" => Ok(JobKind::InventoryUpdate),
            "ad_hoc_command" => Ok(JobKind::AdHocCommand),
            "system_job" => Ok(JobKind::SystemJob),
            _ => Err(format!("Invalid job kind: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for JobKind {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        let s = match self {
            JobKind::Job => "job",
            JobKind::ProjectUpdate => "project_update",
            JobKind::InventoryUpdate => "inventory_update",
            JobKind::AdHocCommand => "ad_hoc_command",
            JobKind::SystemJob => "system_job",
        };
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(s, buf)
    }
}

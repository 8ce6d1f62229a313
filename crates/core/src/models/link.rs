use serde::{Deserialize, Serialize};

/// 节点间网格连接边
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: i64,
    /// 源节点主机名
    pub source: String,
    /// 目标节点主机名
    pub target: String,
    pub link_state: LinkState,
}

/// 连接状态
///
/// 仅当网格传输确认存在连接开销条目时才从 Adding 翻转到 Established；
/// Removing 状态不会自动转出。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LinkState {
    #[serde(rename = "adding")]
    Adding,
    #[serde(rename = "established")]
    Established,
    #[serde(rename = "removing")]
    Removing,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Adding => "adding",
            LinkState::Established => "established",
            LinkState::Removing => "removing",
        }
    }
}

impl sqlx::Type<sqlx::Postgres> for LinkState {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for LinkState {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        match s {
            "adding" => Ok(LinkState::Adding),
            "established" => Ok(LinkState::Established),
            "removing" => Ok(LinkState::Removing),
            _ => Err(format!("Invalid link state: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for LinkState {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

use async_trait::async_trait;
use automesh_core::config::MeshConfig;
use automesh_core::traits::{
    Advertisement, MeshStatus, MeshTransport, WorkUnit, WorkUnitControl, WorkerInfoData,
};
use automesh_core::{ClusterError, ClusterResult};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// 网格状态服务的HTTP客户端
///
/// 同时实现状态快照读取（MeshTransport）与远端工作单元
/// 控制（WorkUnitControl），两者走同一个本机服务。
pub struct HttpMeshClient {
    client: reqwest::Client,
    base_url: String,
}

/// /status 响应
#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    advertisements: Vec<AdvertisementWire>,
    /// 源主机名 -> (对端主机名 -> 连接开销)
    #[serde(default)]
    known_connection_costs: HashMap<String, HashMap<String, i64>>,
}

#[derive(Debug, Deserialize)]
struct AdvertisementWire {
    hostname: String,
    uuid: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    version: Option<String>,
    node_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkUnitWire {
    unit_id: String,
    state: String,
}

#[derive(Debug, Deserialize)]
struct WorkerInfoWire {
    runner_version: Option<String>,
    #[serde(default)]
    cpu_count: i32,
    #[serde(default)]
    mem_in_bytes: i64,
    uuid: Option<String>,
    #[serde(default)]
    errors: Vec<String>,
}

impl HttpMeshClient {
    pub fn new(config: &MeshConfig) -> ClusterResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| ClusterError::mesh_error(format!("构建HTTP客户端失败: {e}")))?;

        Ok(Self {
            client,
            base_url: config.status_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> ClusterResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ClusterError::mesh_error(format!("请求 {url} 失败: {e}")))?
            .error_for_status()
            .map_err(|e| ClusterError::mesh_error(format!("请求 {url} 返回错误状态: {e}")))?;

        response
            .json()
            .await
            .map_err(|e| ClusterError::mesh_error(format!("解析 {url} 响应失败: {e}")))
    }

    async fn post(&self, path: &str, idempotent: bool) -> ClusterResult<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| ClusterError::WorkUnit(format!("请求 {url} 失败: {e}")))?;

        // 幂等操作下目标不存在视为已完成
        if idempotent && response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!("目标不存在，按幂等语义返回成功: {}", url);
            return Ok(());
        }

        response
            .error_for_status()
            .map_err(|e| ClusterError::WorkUnit(format!("请求 {url} 返回错误状态: {e}")))?;
        Ok(())
    }

    fn into_status(raw: StatusResponse) -> MeshStatus {
        let advertisements = raw
            .advertisements
            .into_iter()
            .map(|ad| {
                (
                    ad.hostname.clone(),
                    Advertisement {
                        hostname: ad.hostname,
                        uuid: ad.uuid,
                        timestamp: ad.timestamp,
                        version: ad.version,
                        node_type: ad.node_type,
                    },
                )
            })
            .collect();

        let known_connection_costs = raw
            .known_connection_costs
            .into_iter()
            .map(|(source, targets)| (source, targets.into_keys().collect()))
            .collect();

        MeshStatus {
            advertisements,
            known_connection_costs,
        }
    }
}

#[async_trait]
impl MeshTransport for HttpMeshClient {
    async fn status(&self) -> ClusterResult<MeshStatus> {
        let raw: StatusResponse = self.get_json("/status").await?;
        Ok(Self::into_status(raw))
    }
}

#[async_trait]
impl WorkUnitControl for HttpMeshClient {
    async fn list_units(&self) -> ClusterResult<Vec<WorkUnit>> {
        let units: Vec<WorkUnitWire> = self.get_json("/work/units").await?;
        Ok(units
            .into_iter()
            .map(|u| WorkUnit {
                unit_id: u.unit_id,
                state: u.state,
            })
            .collect())
    }

    async fn cancel_unit(&self, unit_id: &str) -> ClusterResult<()> {
        self.post(&format!("/work/cancel/{unit_id}"), true).await
    }

    async fn release_unit(&self, unit_id: &str) -> ClusterResult<()> {
        self.post(&format!("/work/release/{unit_id}"), true).await
    }

    async fn worker_info(&self, hostname: &str) -> ClusterResult<WorkerInfoData> {
        let info: WorkerInfoWire = self
            .get_json(&format!("/nodes/{hostname}/worker-info"))
            .await?;
        Ok(WorkerInfoData {
            runner_version: info.runner_version,
            cpu_count: info.cpu_count,
            mem_in_bytes: info.mem_in_bytes,
            uuid: info.uuid,
            errors: info.errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_response_mapping() {
        let raw: StatusResponse = serde_json::from_str(
            r#"{
                "advertisements": [
                    {
                        "hostname": "exec-1",
                        "uuid": "3f1c",
                        "timestamp": "2026-08-30T12:00:00Z",
                        "version": "automesh-1.2.0",
                        "node_type": "execution"
                    }
                ],
                "known_connection_costs": {
                    "node-1": {"exec-1": 1, "hop-1": 1}
                }
            }"#,
        )
        .unwrap();

        let status = HttpMeshClient::into_status(raw);
        assert!(status.advertisements.contains_key("exec-1"));
        assert!(status.has_connection_cost("node-1", "exec-1"));
        assert!(status.has_connection_cost("node-1", "hop-1"));
        assert!(!status.has_connection_cost("exec-1", "node-1"));
    }

    #[test]
    fn test_status_response_defaults() {
        let raw: StatusResponse = serde_json::from_str("{}").unwrap();
        let status = HttpMeshClient::into_status(raw);
        assert!(status.advertisements.is_empty());
        assert!(status.known_connection_costs.is_empty());
    }
}

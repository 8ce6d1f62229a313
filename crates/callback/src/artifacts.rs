//! 产物目录副通道文件
//!
//! 任务结束后执行器会在产物目录留下一个清单文件，记录已安装的
//! 内容集合、各集合的主机统计查询表达式和远端引擎版本。解析失败
//! 一律降级为日志，不影响任务收尾。

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::{error, info};

/// 副通道清单文件名
pub const COLLECTION_FILENAME: &str = "automation_data.json";

/// 单个集合的主机统计查询
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionQuery {
    pub version: String,
    pub host_query: Value,
}

/// 读取产物目录中的清单文件
///
/// 功能开关关闭、文件缺失、读取或解析失败都返回 `None` 并记日志。
pub fn try_load_query_file(artifact_dir: &Path, flag_enabled: bool) -> Option<Map<String, Value>> {
    if !flag_enabled {
        return None;
    }

    let queries_path = artifact_dir.join(COLLECTION_FILENAME);
    if !queries_path.is_file() {
        info!("未找到查询清单文件: {}", queries_path.display());
        return None;
    }

    let contents = match std::fs::read_to_string(&queries_path) {
        Ok(contents) => contents,
        Err(e) => {
            error!("读取查询清单文件 {} 失败: {}", queries_path.display(), e);
            return None;
        }
    };

    match serde_json::from_str::<Value>(&contents) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => {
            error!("查询清单文件 {} 不是JSON对象", queries_path.display());
            None
        }
        Err(e) => {
            error!("解析查询清单文件 {} 失败: {}", queries_path.display(), e);
            None
        }
    }
}

/// 从清单内容中提取各集合的主机统计查询
///
/// 只保留同时带有 host_query 和 version 的条目。
pub fn collect_queries(contents: &Map<String, Value>) -> HashMap<String, CollectionQuery> {
    let mut result = HashMap::new();

    let Some(installed) = contents
        .get("installed_collections")
        .and_then(Value::as_object)
    else {
        error!("清单内容中缺少 installed_collections");
        return result;
    };

    for (fqcn, value) in installed {
        let Some(entry) = value.as_object() else {
            continue;
        };
        let (Some(version), Some(host_query)) = (
            entry.get("version").and_then(Value::as_str),
            entry.get("host_query"),
        ) else {
            continue;
        };
        result.insert(
            fqcn.clone(),
            CollectionQuery {
                version: version.to_string(),
                host_query: host_query.clone(),
            },
        );
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn write_manifest(dir: &Path, contents: &str) {
        let mut f = std::fs::File::create(dir.join(COLLECTION_FILENAME)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn test_disabled_flag_skips_load() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "{}");
        assert!(try_load_query_file(dir.path(), false).is_none());
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(try_load_query_file(dir.path(), true).is_none());
    }

    #[test]
    fn test_malformed_json_is_none() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "{not json");
        assert!(try_load_query_file(dir.path(), true).is_none());
    }

    #[test]
    fn test_loads_valid_manifest() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"{"ansible_version": "2.16.3", "installed_collections": {}}"#,
        );
        let contents = try_load_query_file(dir.path(), true).unwrap();
        assert_eq!(contents.get("ansible_version"), Some(&json!("2.16.3")));
    }

    #[test]
    fn test_collect_queries_filters_incomplete_entries() {
        let manifest = json!({
            "installed_collections": {
                "demo.full": {"version": "1.2.0", "host_query": "SELECT host FROM events"},
                "demo.no_query": {"version": "0.1.0"},
                "demo.no_version": {"host_query": "SELECT 1"},
            }
        });
        let Value::Object(map) = manifest else {
            unreachable!()
        };
        let queries = collect_queries(&map);
        assert_eq!(queries.len(), 1);
        assert_eq!(queries["demo.full"].version, "1.2.0");
    }

    #[test]
    fn test_collect_queries_without_collections_key() {
        let queries = collect_queries(&Map::new());
        assert!(queries.is_empty());
    }
}

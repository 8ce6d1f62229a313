//! 延迟字段累积
//!
//! 事件流中产生的模型字段变更不逐条落库，而是先累积在内存里，
//! 随任务终态一次性写入，约束写放大。

use serde_json::{Map, Value};

/// 追加合并而不是覆盖的字段
const APPEND_FIELDS: [&str; 2] = ["result_traceback", "job_explanation"];

/// 陈旧执行器的特征错误片段
const STALE_RUNNER_SIGNATURE: &str = "got an unexpected keyword argument";

/// 检测到陈旧执行器时的替换提示
pub const RUNNER_NEEDS_UPDATE_MESSAGE: &str =
    "The installed version of the runner on the execution node is out of date \
     and cannot support this job. Please update the execution environment.";

/// 延迟更新字段集
#[derive(Debug, Default)]
pub struct DeferredFields {
    fields: Map<String, Value>,
}

impl DeferredFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// 暂存一个字段
    ///
    /// `skip_if_set` 为真且字段已有值时丢弃新值。解释与回溯类字段
    /// 采用追加合并：重复消息去重，新消息换行拼接。
    pub fn stage(&mut self, key: &str, value: Value, skip_if_set: bool) {
        if self.fields.contains_key(key) {
            if skip_if_set {
                return;
            }
            if APPEND_FIELDS.contains(&key) {
                let existing = self
                    .fields
                    .get(key)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let incoming = value_text(&value);
                if existing.contains(&incoming) {
                    return;
                }
                self.fields.insert(
                    key.to_string(),
                    Value::String(format!("{existing}\n{incoming}")),
                );
                return;
            }
        }
        self.fields.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 产出最终落库字段集
    ///
    /// 写入最终事件计数；回溯文本命中陈旧执行器特征时替换为升级提示。
    pub fn finalize(mut self, emitted_events: i64) -> Map<String, Value> {
        self.fields
            .insert("emitted_events".to_string(), Value::from(emitted_events));
        let stale = self
            .fields
            .get("result_traceback")
            .and_then(Value::as_str)
            .map(|t| t.contains(STALE_RUNNER_SIGNATURE))
            .unwrap_or(false);
        if stale {
            self.stage(
                "result_traceback",
                Value::String(RUNNER_NEEDS_UPDATE_MESSAGE.to_string()),
                false,
            );
        }
        self.fields
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

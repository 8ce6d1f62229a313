use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 执行器保活事件类型，到达管道后立即丢弃
pub const KEEPALIVE_EVENT: &str = "keepalive";

/// 事件流结束标记
pub const EOF_EVENT: &str = "EOF";

/// playbook 汇总统计事件
pub const STATS_EVENT: &str = "playbook_on_stats";

/// 即使被限流也必须推送到实时通道的事件类型
pub const MINIMAL_EVENTS: [&str; 4] = [
    "playbook_on_play_start",
    "playbook_on_task_start",
    STATS_EVENT,
    EOF_EVENT,
];

/// 任务运行期间产生的单条事件
///
/// 事件本体是一个半结构化字典，不同事件类型携带的字段差异很大，
/// 这里保留原始 JSON 映射并提供常用字段的类型化访问。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobEvent {
    data: Map<String, Value>,
}

impl JobEvent {
    pub fn new(data: Map<String, Value>) -> Self {
        Self { data }
    }

    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(data) => Some(Self { data }),
            _ => None,
        }
    }

    pub fn event_type(&self) -> Option<&str> {
        self.data.get("event").and_then(Value::as_str)
    }

    pub fn uuid(&self) -> Option<&str> {
        self.data.get("uuid").and_then(Value::as_str)
    }

    pub fn counter(&self) -> Option<i64> {
        self.data.get("counter").and_then(Value::as_i64)
    }

    pub fn stdout(&self) -> Option<&str> {
        self.data.get("stdout").and_then(Value::as_str)
    }

    pub fn start_line(&self) -> Option<i64> {
        self.data.get("start_line").and_then(Value::as_i64)
    }

    pub fn end_line(&self) -> Option<i64> {
        self.data.get("end_line").and_then(Value::as_i64)
    }

    pub fn event_data(&self) -> Option<&Map<String, Value>> {
        self.data.get("event_data").and_then(Value::as_object)
    }

    pub fn event_data_mut(&mut self) -> &mut Map<String, Value> {
        let entry = self
            .data
            .entry("event_data".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        entry.as_object_mut().unwrap_or_else(|| unreachable!())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// 是否属于限流豁免集合
    pub fn is_minimal(&self) -> bool {
        self.event_type()
            .map(|e| MINIMAL_EVENTS.contains(&e))
            .unwrap_or(false)
    }

    /// 标准输出为空的事件不推送到实时通道
    pub fn has_output(&self) -> bool {
        self.stdout().map(|s| !s.is_empty()).unwrap_or(false)
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.data
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: Value) -> JobEvent {
        JobEvent::from_value(value).unwrap()
    }

    #[test]
    fn test_typed_getters() {
        let ev = event(json!({
            "event": "runner_on_ok",
            "counter": 7,
            "stdout": "ok: [host1]",
            "start_line": 10,
            "end_line": 11,
        }));
        assert_eq!(ev.event_type(), Some("runner_on_ok"));
        assert_eq!(ev.counter(), Some(7));
        assert_eq!(ev.start_line(), Some(10));
        assert!(ev.has_output());
    }

    #[test]
    fn test_minimal_events() {
        assert!(event(json!({"event": "playbook_on_stats"})).is_minimal());
        assert!(event(json!({"event": "EOF"})).is_minimal());
        assert!(!event(json!({"event": "runner_on_ok"})).is_minimal());
        assert!(!event(json!({})).is_minimal());
    }

    #[test]
    fn test_empty_stdout_has_no_output() {
        assert!(!event(json!({"event": "verbose", "stdout": ""})).has_output());
        assert!(!event(json!({"event": "verbose"})).has_output());
    }

    #[test]
    fn test_event_data_mut_creates_object() {
        let mut ev = event(json!({"event": "runner_on_ok"}));
        ev.event_data_mut()
            .insert("host".to_string(), json!("host1"));
        assert_eq!(ev.event_data().unwrap().get("host"), Some(&json!("host1")));
    }
}

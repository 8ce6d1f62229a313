//! Fluent builders for test entities.

use automesh_core::models::{
    CapacityGroup, Job, JobEvent, JobKind, JobStatus, Node, NodeState, NodeType,
};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Builder for cluster nodes.
pub struct NodeBuilder {
    node: Node,
}

impl NodeBuilder {
    pub fn new(hostname: &str) -> Self {
        Self {
            node: Node {
                id: 0,
                hostname: hostname.to_string(),
                uuid: Uuid::new_v4(),
                node_type: NodeType::Hybrid,
                node_state: NodeState::Ready,
                capacity: 0,
                last_seen: None,
                last_health_check: None,
                version: "1.0.0".to_string(),
                enabled: true,
                managed_by_policy: false,
                errors: String::new(),
            },
        }
    }

    pub fn id(mut self, id: i64) -> Self {
        self.node.id = id;
        self
    }

    pub fn node_type(mut self, node_type: NodeType) -> Self {
        self.node.node_type = node_type;
        self
    }

    pub fn state(mut self, state: NodeState) -> Self {
        self.node.node_state = state;
        self
    }

    pub fn capacity(mut self, capacity: i32) -> Self {
        self.node.capacity = capacity;
        self
    }

    pub fn last_seen(mut self, last_seen: DateTime<Utc>) -> Self {
        self.node.last_seen = Some(last_seen);
        self
    }

    pub fn last_health_check(mut self, checked: DateTime<Utc>) -> Self {
        self.node.last_health_check = Some(checked);
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.node.version = version.to_string();
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.node.enabled = enabled;
        self
    }

    pub fn managed_by_policy(mut self, managed: bool) -> Self {
        self.node.managed_by_policy = managed;
        self
    }

    pub fn build(self) -> Node {
        self.node
    }
}

/// Builder for capacity groups.
pub struct GroupBuilder {
    group: CapacityGroup,
}

impl GroupBuilder {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            group: CapacityGroup::new(id, name),
        }
    }

    pub fn policy_list(mut self, hostnames: &[&str]) -> Self {
        self.group.policy_instance_list = hostnames.iter().map(|h| h.to_string()).collect();
        self
    }

    pub fn minimum(mut self, minimum: i64) -> Self {
        self.group.policy_instance_minimum = minimum;
        self
    }

    pub fn percentage(mut self, percentage: i64) -> Self {
        self.group.policy_instance_percentage = percentage;
        self
    }

    pub fn container(mut self, is_container_group: bool) -> Self {
        self.group.is_container_group = is_container_group;
        self
    }

    pub fn members(mut self, member_ids: &[i64]) -> Self {
        self.group.members = member_ids.to_vec();
        self
    }

    pub fn build(self) -> CapacityGroup {
        self.group
    }
}

/// Builder for jobs.
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new(id: i64) -> Self {
        Self {
            job: Job {
                id,
                kind: JobKind::Job,
                status: JobStatus::Pending,
                controller_node: String::new(),
                execution_node: String::new(),
                work_unit_id: None,
                dispatch_guid: None,
                emitted_events: 0,
                event_queries_processed: false,
                created: Utc::now(),
                started: None,
                finished: None,
                job_explanation: String::new(),
                result_traceback: String::new(),
            },
        }
    }

    pub fn kind(mut self, kind: JobKind) -> Self {
        self.job.kind = kind;
        self
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.job.status = status;
        self
    }

    pub fn controller_node(mut self, hostname: &str) -> Self {
        self.job.controller_node = hostname.to_string();
        self
    }

    pub fn execution_node(mut self, hostname: &str) -> Self {
        self.job.execution_node = hostname.to_string();
        self
    }

    pub fn work_unit_id(mut self, unit_id: &str) -> Self {
        self.job.work_unit_id = Some(unit_id.to_string());
        self
    }

    pub fn dispatch_guid(mut self, guid: &str) -> Self {
        self.job.dispatch_guid = Some(guid.to_string());
        self
    }

    pub fn created(mut self, created: DateTime<Utc>) -> Self {
        self.job.created = created;
        self
    }

    pub fn started(mut self, started: DateTime<Utc>) -> Self {
        self.job.started = Some(started);
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

/// Builder for raw runner events.
pub struct EventBuilder {
    data: Map<String, Value>,
}

impl EventBuilder {
    pub fn new(event_type: &str) -> Self {
        let mut data = Map::new();
        data.insert("event".to_string(), Value::String(event_type.to_string()));
        Self { data }
    }

    pub fn counter(mut self, counter: i64) -> Self {
        self.data.insert("counter".to_string(), counter.into());
        self
    }

    pub fn stdout(mut self, stdout: &str) -> Self {
        self.data
            .insert("stdout".to_string(), Value::String(stdout.to_string()));
        self
    }

    pub fn lines(mut self, start_line: i64, end_line: i64) -> Self {
        self.data.insert("start_line".to_string(), start_line.into());
        self.data.insert("end_line".to_string(), end_line.into());
        self
    }

    pub fn event_data(mut self, data: Value) -> Self {
        self.data.insert("event_data".to_string(), data);
        self
    }

    pub fn build(self) -> JobEvent {
        JobEvent::new(self.data)
    }

    /// The raw JSON form, as handed to a pipeline.
    pub fn build_value(self) -> Value {
        Value::Object(self.data)
    }
}

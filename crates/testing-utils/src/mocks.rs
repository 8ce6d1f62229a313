//! In-memory mock implementations of the core traits.
//!
//! The repository mocks emulate the conditional-update contract of the
//! real Postgres implementations: writes that race with a concurrent
//! change report `ClusterError::UpdateConflict` instead of silently
//! overwriting.

use async_trait::async_trait;
use automesh_core::models::{CapacityGroup, Job, JobStatus, Link, LinkState, Node, NodeState};
use automesh_core::traits::{
    AdvisoryLock, EventDispatchQueue, GroupRepository, HeldLock, JobRepository, LinkRepository,
    MeshStatus, MeshTransport, NodeRepository, WorkUnit, WorkUnitControl, WorkerInfoData,
};
use automesh_core::{ClusterError, ClusterResult};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// In-memory node repository.
#[derive(Clone, Default)]
pub struct MockNodeRepository {
    state: Arc<Mutex<NodeState_>>,
}

#[derive(Default)]
struct NodeState_ {
    nodes: HashMap<String, Node>,
    next_id: i64,
    force_offline_conflict: bool,
}

impl MockNodeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, node: Node) {
        let mut state = self.state.lock().unwrap();
        state.next_id = state.next_id.max(node.id);
        state.nodes.insert(node.hostname.clone(), node);
    }

    pub fn get(&self, hostname: &str) -> Option<Node> {
        self.state.lock().unwrap().nodes.get(hostname).cloned()
    }

    /// Make the next mark_offline calls fail with UpdateConflict, as if
    /// another node already performed the write.
    pub fn force_mark_offline_conflict(&self, force: bool) {
        self.state.lock().unwrap().force_offline_conflict = force;
    }
}

#[async_trait]
impl NodeRepository for MockNodeRepository {
    async fn list(&self) -> ClusterResult<Vec<Node>> {
        let mut nodes: Vec<Node> = self.state.lock().unwrap().nodes.values().cloned().collect();
        nodes.sort_by_key(|n| n.id);
        Ok(nodes)
    }

    async fn get_by_hostname(&self, hostname: &str) -> ClusterResult<Option<Node>> {
        Ok(self.get(hostname))
    }

    async fn register(&self, node: &Node) -> ClusterResult<(Node, bool)> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.nodes.get(&node.hostname) {
            return Ok((existing.clone(), false));
        }
        let mut node = node.clone();
        state.next_id += 1;
        node.id = state.next_id;
        state.nodes.insert(node.hostname.clone(), node.clone());
        Ok((node, true))
    }

    async fn save_health_data(
        &self,
        hostname: &str,
        version: &str,
        last_seen: DateTime<Utc>,
        advance_state: bool,
        errors: &str,
    ) -> ClusterResult<()> {
        let mut state = self.state.lock().unwrap();
        let node = state
            .nodes
            .get_mut(hostname)
            .ok_or_else(|| ClusterError::node_not_found(hostname))?;
        node.version = version.to_string();
        node.last_seen = Some(last_seen);
        node.errors = errors.to_string();
        if advance_state && node.node_state == NodeState::Installed {
            node.node_state = NodeState::Ready;
        }
        Ok(())
    }

    async fn mark_offline(
        &self,
        hostname: &str,
        observed_last_seen: Option<DateTime<Utc>>,
        errors: &str,
    ) -> ClusterResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.force_offline_conflict {
            return Err(ClusterError::UpdateConflict);
        }
        let node = state
            .nodes
            .get_mut(hostname)
            .ok_or(ClusterError::UpdateConflict)?;
        if node.last_seen != observed_last_seen {
            return Err(ClusterError::UpdateConflict);
        }
        node.node_state = NodeState::Unavailable;
        node.capacity = 0;
        node.errors = errors.to_string();
        Ok(())
    }

    async fn set_last_seen(&self, hostname: &str, last_seen: DateTime<Utc>) -> ClusterResult<()> {
        let mut state = self.state.lock().unwrap();
        let node = state
            .nodes
            .get_mut(hostname)
            .ok_or_else(|| ClusterError::node_not_found(hostname))?;
        node.last_seen = Some(last_seen);
        Ok(())
    }

    async fn set_state(&self, hostname: &str, node_state: NodeState) -> ClusterResult<()> {
        let mut state = self.state.lock().unwrap();
        let node = state
            .nodes
            .get_mut(hostname)
            .ok_or_else(|| ClusterError::node_not_found(hostname))?;
        node.node_state = node_state;
        Ok(())
    }

    async fn save_health_check(
        &self,
        hostname: &str,
        checked_at: DateTime<Utc>,
        capacity: i32,
        version: &str,
        errors: &str,
    ) -> ClusterResult<()> {
        let mut state = self.state.lock().unwrap();
        let node = state
            .nodes
            .get_mut(hostname)
            .ok_or_else(|| ClusterError::node_not_found(hostname))?;
        node.last_health_check = Some(checked_at);
        node.capacity = capacity;
        node.version = version.to_string();
        node.errors = errors.to_string();
        Ok(())
    }

    async fn deprovision(&self, hostname: &str) -> ClusterResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.nodes.remove(hostname).is_none() {
            return Err(ClusterError::UpdateConflict);
        }
        Ok(())
    }
}

/// In-memory capacity group repository.
#[derive(Clone, Default)]
pub struct MockGroupRepository {
    state: Arc<Mutex<GroupState>>,
}

#[derive(Default)]
struct GroupState {
    groups: HashMap<i64, CapacityGroup>,
    applied: Vec<(i64, Vec<i64>)>,
}

impl MockGroupRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, group: CapacityGroup) {
        self.state.lock().unwrap().groups.insert(group.id, group);
    }

    /// Membership batches passed to apply_membership, in call order.
    pub fn applied_changes(&self) -> Vec<(i64, Vec<i64>)> {
        self.state.lock().unwrap().applied.clone()
    }
}

#[async_trait]
impl GroupRepository for MockGroupRepository {
    async fn list(&self) -> ClusterResult<Vec<CapacityGroup>> {
        let mut groups: Vec<CapacityGroup> =
            self.state.lock().unwrap().groups.values().cloned().collect();
        groups.sort_by_key(|g| g.id);
        Ok(groups)
    }

    async fn apply_membership(&self, changes: &[(i64, Vec<i64>)]) -> ClusterResult<()> {
        let mut state = self.state.lock().unwrap();
        for (group_id, members) in changes {
            if let Some(group) = state.groups.get_mut(group_id) {
                group.members = members.clone();
            }
            state.applied.push((*group_id, members.clone()));
        }
        Ok(())
    }
}

/// In-memory link repository.
#[derive(Clone, Default)]
pub struct MockLinkRepository {
    links: Arc<Mutex<HashMap<i64, Link>>>,
}

impl MockLinkRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, link: Link) {
        self.links.lock().unwrap().insert(link.id, link);
    }

    pub fn get(&self, id: i64) -> Option<Link> {
        self.links.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl LinkRepository for MockLinkRepository {
    async fn list_in_state(&self, state: LinkState) -> ClusterResult<Vec<Link>> {
        let mut links: Vec<Link> = self
            .links
            .lock()
            .unwrap()
            .values()
            .filter(|l| l.link_state == state)
            .cloned()
            .collect();
        links.sort_by_key(|l| l.id);
        Ok(links)
    }

    async fn set_state(&self, link_id: i64, state: LinkState) -> ClusterResult<()> {
        let mut links = self.links.lock().unwrap();
        let link = links.get_mut(&link_id).ok_or(ClusterError::UpdateConflict)?;
        link.link_state = state;
        Ok(())
    }
}

/// In-memory job repository with conditional terminal writes.
#[derive(Clone, Default)]
pub struct MockJobRepository {
    state: Arc<Mutex<JobState>>,
}

#[derive(Default)]
struct JobState {
    jobs: HashMap<i64, Job>,
    run_fields: HashMap<i64, Map<String, Value>>,
}

impl MockJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, job: Job) {
        self.state.lock().unwrap().jobs.insert(job.id, job);
    }

    pub fn get(&self, id: i64) -> Option<Job> {
        self.state.lock().unwrap().jobs.get(&id).cloned()
    }

    /// Fields persisted through save_run_fields for the given job.
    pub fn saved_run_fields(&self, job_id: i64) -> Map<String, Value> {
        self.state
            .lock()
            .unwrap()
            .run_fields
            .get(&job_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl JobRepository for MockJobRepository {
    async fn list_by_controller(
        &self,
        controller_node: &str,
        statuses: &[JobStatus],
    ) -> ClusterResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .state
            .lock()
            .unwrap()
            .jobs
            .values()
            .filter(|j| j.controller_node == controller_node && statuses.contains(&j.status))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.id);
        Ok(jobs)
    }

    async fn list_by_execution_node(
        &self,
        execution_node: &str,
        statuses: &[JobStatus],
    ) -> ClusterResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .state
            .lock()
            .unwrap()
            .jobs
            .values()
            .filter(|j| j.execution_node == execution_node && statuses.contains(&j.status))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.id);
        Ok(jobs)
    }

    async fn list_holding_work_units(&self, unit_ids: &[String]) -> ClusterResult<Vec<Job>> {
        let ids: HashSet<&str> = unit_ids.iter().map(String::as_str).collect();
        let mut jobs: Vec<Job> = self
            .state
            .lock()
            .unwrap()
            .jobs
            .values()
            .filter(|j| {
                j.work_unit_id
                    .as_deref()
                    .map(|u| ids.contains(u))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.id);
        Ok(jobs)
    }

    async fn mark_terminal(
        &self,
        job_id: i64,
        expected_statuses: &[JobStatus],
        status: JobStatus,
        job_explanation: &str,
        result_traceback: &str,
        finished: DateTime<Utc>,
    ) -> ClusterResult<()> {
        let mut state = self.state.lock().unwrap();
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or(ClusterError::JobNotFound { id: job_id })?;
        if !expected_statuses.contains(&job.status) {
            return Err(ClusterError::UpdateConflict);
        }
        job.status = status;
        job.finished = Some(finished);
        append_unique(&mut job.job_explanation, job_explanation);
        append_unique(&mut job.result_traceback, result_traceback);
        Ok(())
    }

    async fn save_run_fields(
        &self,
        job_id: i64,
        fields: &Map<String, Value>,
    ) -> ClusterResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .run_fields
            .entry(job_id)
            .or_default()
            .extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}

fn append_unique(target: &mut String, incoming: &str) {
    if incoming.is_empty() || target.contains(incoming) {
        return;
    }
    if target.is_empty() {
        *target = incoming.to_string();
    } else {
        *target = format!("{target}\n{incoming}");
    }
}

/// Work unit control mock recording cancel/release calls.
#[derive(Clone, Default)]
pub struct MockWorkUnitControl {
    state: Arc<Mutex<UnitState>>,
}

#[derive(Default)]
struct UnitState {
    units: Vec<WorkUnit>,
    worker_info: HashMap<String, WorkerInfoData>,
    canceled: Vec<String>,
    released: Vec<String>,
    info_requests: Vec<String>,
}

impl MockWorkUnitControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_unit(&self, unit_id: &str, unit_state: &str) {
        self.state.lock().unwrap().units.push(WorkUnit {
            unit_id: unit_id.to_string(),
            state: unit_state.to_string(),
        });
    }

    pub fn set_worker_info(&self, hostname: &str, data: WorkerInfoData) {
        self.state
            .lock()
            .unwrap()
            .worker_info
            .insert(hostname.to_string(), data);
    }

    pub fn canceled(&self) -> Vec<String> {
        self.state.lock().unwrap().canceled.clone()
    }

    pub fn released(&self) -> Vec<String> {
        self.state.lock().unwrap().released.clone()
    }

    pub fn worker_info_requests(&self) -> Vec<String> {
        self.state.lock().unwrap().info_requests.clone()
    }
}

#[async_trait]
impl WorkUnitControl for MockWorkUnitControl {
    async fn list_units(&self) -> ClusterResult<Vec<WorkUnit>> {
        Ok(self.state.lock().unwrap().units.clone())
    }

    async fn cancel_unit(&self, unit_id: &str) -> ClusterResult<()> {
        self.state.lock().unwrap().canceled.push(unit_id.to_string());
        Ok(())
    }

    async fn release_unit(&self, unit_id: &str) -> ClusterResult<()> {
        self.state.lock().unwrap().released.push(unit_id.to_string());
        Ok(())
    }

    async fn worker_info(&self, hostname: &str) -> ClusterResult<WorkerInfoData> {
        let mut state = self.state.lock().unwrap();
        state.info_requests.push(hostname.to_string());
        Ok(state.worker_info.get(hostname).cloned().unwrap_or_else(|| {
            WorkerInfoData {
                errors: vec![format!("no worker info configured for {hostname}")],
                ..Default::default()
            }
        }))
    }
}

/// Mesh transport returning a canned status snapshot.
#[derive(Clone, Default)]
pub struct MockMeshTransport {
    status: Arc<Mutex<MeshStatus>>,
}

impl MockMeshTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, status: MeshStatus) {
        *self.status.lock().unwrap() = status;
    }
}

#[async_trait]
impl MeshTransport for MockMeshTransport {
    async fn status(&self) -> ClusterResult<MeshStatus> {
        Ok(self.status.lock().unwrap().clone())
    }
}

/// Dispatch queue that records everything published to it.
#[derive(Clone, Default)]
pub struct RecordingDispatchQueue {
    state: Arc<Mutex<QueueState>>,
}

#[derive(Default)]
struct QueueState {
    published: Vec<(String, Value, bool)>,
    status_messages: Vec<(String, Value)>,
}

impl RecordingDispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// All published events as (group, event, skip_payload) tuples.
    pub fn published(&self) -> Vec<(String, Value, bool)> {
        self.state.lock().unwrap().published.clone()
    }

    pub fn status_messages(&self) -> Vec<(String, Value)> {
        self.state.lock().unwrap().status_messages.clone()
    }
}

#[async_trait]
impl EventDispatchQueue for RecordingDispatchQueue {
    async fn publish(&self, group: &str, event: &Value, skip_payload: bool) -> ClusterResult<()> {
        self.state
            .lock()
            .unwrap()
            .published
            .push((group.to_string(), event.clone(), skip_payload));
        Ok(())
    }

    async fn publish_status(&self, group: &str, payload: &Value) -> ClusterResult<()> {
        self.state
            .lock()
            .unwrap()
            .status_messages
            .push((group.to_string(), payload.clone()));
        Ok(())
    }
}

/// Process-local advisory lock with the same non-blocking contract as
/// the Postgres implementation.
#[derive(Clone, Default)]
pub struct MemoryAdvisoryLock {
    held: Arc<Mutex<HashSet<String>>>,
}

impl MemoryAdvisoryLock {
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemoryLockGuard {
    name: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl HeldLock for MemoryLockGuard {}

impl Drop for MemoryLockGuard {
    fn drop(&mut self) {
        self.held.lock().unwrap().remove(&self.name);
    }
}

#[async_trait]
impl AdvisoryLock for MemoryAdvisoryLock {
    async fn try_acquire(&self, name: &str) -> ClusterResult<Option<Box<dyn HeldLock>>> {
        let mut held = self.held.lock().unwrap();
        if held.contains(name) {
            return Ok(None);
        }
        held.insert(name.to_string());
        Ok(Some(Box::new(MemoryLockGuard {
            name: name.to_string(),
            held: self.held.clone(),
        })))
    }
}

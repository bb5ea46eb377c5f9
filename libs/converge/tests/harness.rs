//! Test harness: in-memory node transport for orchestration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

use herd_converge::api::{
    ApplyRequest, ApplyResponse, Connector, EventStream, Extension, NodeApi, NodeEvent,
    ResetRequest, UpgradeRequest,
};
use herd_converge::prompt::Prompter;
use herd_converge::render::ConfigRenderer;
use herd_converge::{
    ApiError, ClusterParams, Error, MachineStage, MachineStatus, NodeSpec, Readiness, Role,
    RunContext,
};

pub const INSTALLER: &str = "registry/example.com/imagename:v1.9.2";

/// Per-call counters of a [`FakeNode`].
#[derive(Default)]
pub struct Calls {
    pub dry_runs: AtomicU32,
    pub commits: AtomicU32,
    pub bootstraps: AtomicU32,
    pub resets: AtomicU32,
    pub upgrades: AtomicU32,
    pub subscriptions: AtomicU32,
    pub status_reads: AtomicU32,
    pub service_reads: AtomicU32,
}

/// Ordered record of calls, shared between nodes to observe cross-node order.
pub type Journal = Arc<Mutex<Vec<(String, &'static str)>>>;

impl Calls {
    pub fn get(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

/// Scripted node. Events for each subscription are queued with
/// [`FakeNode::script_events`]; an unscripted subscription never yields.
pub struct FakeNode {
    pub status: Mutex<MachineStatus>,
    pub schematic: Option<String>,
    pub version: String,

    applied: Mutex<Option<Vec<u8>>>,
    pub fail_commit: AtomicBool,
    /// Stage and readiness reported once a commit succeeds.
    pub status_after_commit: Mutex<Option<MachineStatus>>,
    pub fail_status: AtomicBool,

    pub etcd_state: Mutex<Option<String>>,
    pub etcd_members: AtomicUsize,
    /// Number of Bootstrap calls that fail before one is accepted.
    pub bootstrap_failures: AtomicU32,

    pub fail_reset: AtomicBool,
    pub fail_upgrade: AtomicBool,
    pub last_reset: Mutex<Option<ResetRequest>>,
    pub last_upgrade: Mutex<Option<UpgradeRequest>>,

    event_scripts: Mutex<VecDeque<Vec<(Duration, NodeEvent)>>>,
    pub calls: Calls,
    name: String,
    journal: Journal,
}

impl FakeNode {
    pub fn new(stage: MachineStage) -> Self {
        Self {
            status: Mutex::new(MachineStatus::new(stage, Readiness::ready())),
            schematic: None,
            version: "1.9.2".to_string(),
            applied: Mutex::new(None),
            fail_commit: AtomicBool::new(false),
            status_after_commit: Mutex::new(None),
            fail_status: AtomicBool::new(false),
            etcd_state: Mutex::new(None),
            etcd_members: AtomicUsize::new(0),
            bootstrap_failures: AtomicU32::new(0),
            fail_reset: AtomicBool::new(false),
            fail_upgrade: AtomicBool::new(false),
            last_reset: Mutex::new(None),
            last_upgrade: Mutex::new(None),
            event_scripts: Mutex::new(VecDeque::new()),
            calls: Calls::default(),
            name: String::new(),
            journal: Journal::default(),
        }
    }

    pub fn running() -> Self {
        Self::new(MachineStage::Running)
    }

    pub fn maintenance() -> Self {
        Self::new(MachineStage::Maintenance)
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn with_schematic(mut self, schematic: &str) -> Self {
        self.schematic = Some(schematic.to_string());
        self
    }

    pub fn with_etcd(self, state: &str, members: usize) -> Self {
        *self.etcd_state.lock().unwrap() = Some(state.to_string());
        self.etcd_members.store(members, Ordering::SeqCst);
        self
    }

    /// Report running and ready after the first successful commit.
    pub fn running_after_commit(self) -> Self {
        *self.status_after_commit.lock().unwrap() =
            Some(MachineStatus::new(MachineStage::Running, Readiness::ready()));
        self
    }

    /// Pretend `config` is already applied.
    pub fn with_applied(self, config: &[u8]) -> Self {
        *self.applied.lock().unwrap() = Some(config.to_vec());
        self
    }

    /// Queue the events delivered to the next subscription, each after its delay.
    pub fn script_events(&self, events: Vec<(Duration, NodeEvent)>) {
        self.event_scripts.lock().unwrap().push_back(events);
    }

    pub fn applied(&self) -> Option<Vec<u8>> {
        self.applied.lock().unwrap().clone()
    }

    /// Record calls into `journal` under `name`.
    pub fn journaled(mut self, name: &str, journal: &Journal) -> Self {
        self.name = name.to_string();
        self.journal = Arc::clone(journal);
        self
    }

    /// This node's calls, in order.
    pub fn log(&self) -> Vec<&'static str> {
        self.journal
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| *name == self.name)
            .map(|(_, call)| *call)
            .collect()
    }

    fn record(&self, call: &'static str) {
        self.journal.lock().unwrap().push((self.name.clone(), call));
    }
}

/// Journal entries rendered as `name:call`.
pub fn entries(journal: &Journal) -> Vec<String> {
    journal
        .lock()
        .unwrap()
        .iter()
        .map(|(name, call)| format!("{name}:{call}"))
        .collect()
}

#[async_trait]
impl NodeApi for FakeNode {
    async fn machine_status(&self) -> Result<MachineStatus, ApiError> {
        self.calls.status_reads.fetch_add(1, Ordering::SeqCst);
        self.record("status");
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(ApiError::Unavailable("status read failed".to_string()));
        }
        Ok(self.status.lock().unwrap().clone())
    }

    async fn extensions(&self) -> Result<Vec<Extension>, ApiError> {
        Ok(self
            .schematic
            .iter()
            .map(|schematic| Extension {
                name: "schematic".to_string(),
                version: schematic.clone(),
            })
            .collect())
    }

    async fn os_version(&self) -> Result<String, ApiError> {
        Ok(self.version.clone())
    }

    async fn apply_configuration(&self, request: ApplyRequest) -> Result<ApplyResponse, ApiError> {
        if request.dry_run {
            self.calls.dry_runs.fetch_add(1, Ordering::SeqCst);
            self.record("dry-run");
            let unchanged = self.applied.lock().unwrap().as_deref() == Some(request.data.as_slice());
            let mode_details = if unchanged {
                "Applied configuration without a reboot\nNo changes.".to_string()
            } else {
                "Config diff:\n\n+ machine: {}".to_string()
            };
            return Ok(ApplyResponse {
                mode: "auto".to_string(),
                mode_details,
                warnings: Vec::new(),
            });
        }

        self.calls.commits.fetch_add(1, Ordering::SeqCst);
        self.record("commit");
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(ApiError::Unavailable("commit rejected".to_string()));
        }
        *self.applied.lock().unwrap() = Some(request.data);
        if let Some(status) = self.status_after_commit.lock().unwrap().take() {
            *self.status.lock().unwrap() = status;
        }
        Ok(ApplyResponse {
            mode: "auto".to_string(),
            mode_details: "Applied configuration without a reboot".to_string(),
            warnings: Vec::new(),
        })
    }

    async fn bootstrap(&self) -> Result<(), ApiError> {
        self.calls.bootstraps.fetch_add(1, Ordering::SeqCst);
        let remaining = self.bootstrap_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.bootstrap_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ApiError::Unavailable("etcd is not ready".to_string()));
        }
        Ok(())
    }

    async fn reset(&self, request: ResetRequest) -> Result<(), ApiError> {
        self.calls.resets.fetch_add(1, Ordering::SeqCst);
        *self.last_reset.lock().unwrap() = Some(request);
        if self.fail_reset.load(Ordering::SeqCst) {
            return Err(ApiError::Unavailable("reset rejected".to_string()));
        }
        Ok(())
    }

    async fn upgrade(&self, request: UpgradeRequest) -> Result<(), ApiError> {
        self.calls.upgrades.fetch_add(1, Ordering::SeqCst);
        *self.last_upgrade.lock().unwrap() = Some(request);
        if self.fail_upgrade.load(Ordering::SeqCst) {
            return Err(ApiError::Unavailable("upgrade rejected".to_string()));
        }
        Ok(())
    }

    async fn etcd_member_count(&self) -> Result<usize, ApiError> {
        Ok(self.etcd_members.load(Ordering::SeqCst))
    }

    async fn service_state(&self, service: &str) -> Result<Option<String>, ApiError> {
        self.calls.service_reads.fetch_add(1, Ordering::SeqCst);
        if service != "etcd" {
            return Ok(None);
        }
        Ok(self.etcd_state.lock().unwrap().clone())
    }

    async fn watch_events(&self) -> Result<EventStream, ApiError> {
        self.calls.subscriptions.fetch_add(1, Ordering::SeqCst);
        self.record("subscribe");
        let script = self.event_scripts.lock().unwrap().pop_front().unwrap_or_default();

        let scripted = stream::iter(script).then(|(delay, event)| async move {
            tokio::time::sleep(delay).await;
            Ok(event)
        });
        Ok(Box::pin(scripted.chain(stream::pending())))
    }
}

/// Connector over a fixed set of fake nodes; unknown hosts are unreachable.
#[derive(Default)]
pub struct FakeConnector {
    nodes: HashMap<String, Arc<FakeNode>>,
    pub connects: AtomicU32,
}

impl FakeConnector {
    pub fn with(mut self, host: &str, node: Arc<FakeNode>) -> Self {
        self.nodes.insert(host.to_string(), node);
        self
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, node: &NodeSpec) -> Result<Arc<dyn NodeApi>, Error> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match self.nodes.get(&node.host) {
            Some(fake) => Ok(Arc::clone(fake) as Arc<dyn NodeApi>),
            None => Err(Error::Connect {
                endpoint: node.endpoint(),
                reason: "connection refused".to_string(),
            }),
        }
    }
}

/// Renders the same install section for every node, tagged with its host.
pub struct StaticRenderer {
    pub image: String,
}

impl Default for StaticRenderer {
    fn default() -> Self {
        Self {
            image: INSTALLER.to_string(),
        }
    }
}

impl StaticRenderer {
    pub fn config_for(&self, host: &str) -> Vec<u8> {
        format!(
            "machine:\n  network:\n    hostname: {host}\n  install:\n    image: {}\n",
            self.image
        )
        .into_bytes()
    }
}

#[async_trait]
impl ConfigRenderer for StaticRenderer {
    async fn render(&self, _cluster: &ClusterParams, node: &NodeSpec) -> Result<Vec<u8>, Error> {
        Ok(self.config_for(&node.host))
    }
}

/// Answers confirmations from a queue (default yes) and records the questions.
#[derive(Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<bool>>,
    pub questions: Mutex<Vec<String>>,
    pub shown: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn answering(answers: &[bool]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    fn show(&self, details: &str) {
        self.shown.lock().unwrap().push(details.to_string());
    }

    async fn confirm(&self, question: &str) -> Result<bool, Error> {
        self.questions.lock().unwrap().push(question.to_string());
        Ok(self.answers.lock().unwrap().pop_front().unwrap_or(true))
    }
}

pub fn cluster() -> ClusterParams {
    ClusterParams {
        name: "demo".to_string(),
        endpoint: "https://cp.example.com:6443".to_string(),
        ..ClusterParams::default()
    }
}

pub fn control_plane(host: &str) -> NodeSpec {
    NodeSpec::new(host, Role::ControlPlane)
}

pub fn worker(host: &str) -> NodeSpec {
    NodeSpec::new(host, Role::Worker)
}

/// Context over `connector` with the static renderer and `prompter`.
pub fn context(
    nodes: Vec<NodeSpec>,
    connector: Arc<FakeConnector>,
    prompter: Arc<ScriptedPrompter>,
) -> RunContext {
    RunContext::new(cluster(), nodes, connector, Arc::new(StaticRenderer::default()))
        .with_prompter(prompter)
}

pub fn healthy() -> NodeEvent {
    NodeEvent::MachineStatus(MachineStatus::new(MachineStage::Running, Readiness::ready()))
}

pub fn not_ready() -> NodeEvent {
    NodeEvent::MachineStatus(MachineStatus::new(
        MachineStage::Running,
        Readiness::not_ready(vec![herd_converge::UnmetCondition::new(
            "nodeReady",
            "kubelet restarting",
        )]),
    ))
}

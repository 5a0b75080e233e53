//! In-memory gateways and a loopback bot for tests
//!
//! The fakes record every call into one shared event log so tests can
//! assert cross-gateway ordering (subscribe strictly before job creation,
//! close exactly once) without touching a real cluster or bus.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use triage_bot_client::BotClient;
use triage_core::domain::{Recipe, RecipeSpec};
use triage_core::dto::JobPhase;

use crate::config::Config;
use crate::gateway::{
    job_labels, object_labels, AccessRule, BusError, BusGateway, BusMessage, JobSnapshot,
    OrchestratorError, OrchestratorGateway, Selector, Subscription,
};
use crate::runtime::Runtime;

/// Recorded gateway calls, in order of occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Subscribed(String),
    Closed(String),
    CreatedConfigMap(String),
    CreatedJob { recipe: String, uuid: String },
    DeletedJobs(String),
    DeletedConfigMaps(String),
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub name: String,
    pub namespace: String,
    pub recipe: String,
    pub uuid: String,
    pub config_map: String,
    pub labels: BTreeMap<String, String>,
    pub description: String,
    pub phase: JobPhase,
}

#[derive(Debug, Clone)]
pub struct ConfigMapRecord {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub data: Value,
}

#[derive(Default)]
pub struct FakeOrchestrator {
    pub events: EventLog,
    pub jobs: Mutex<Vec<JobRecord>>,
    pub config_maps: Mutex<Vec<ConfigMapRecord>>,
    catalog: Mutex<BTreeMap<String, String>>,
    reject_creates: AtomicBool,
    counter: AtomicUsize,
}

impl FakeOrchestrator {
    pub fn with_events(events: EventLog) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    /// Every subsequent create call fails with a backend rejection.
    pub fn fail_creates(&self) {
        self.reject_creates.store(true, Ordering::SeqCst);
    }

    pub fn set_catalog(&self, debugging: &str, actions: &str) {
        self.set_catalog_section("debugging", debugging);
        self.set_catalog_section("actions", actions);
    }

    pub fn set_catalog_section(&self, section: &str, body: &str) {
        self.catalog
            .lock()
            .unwrap()
            .insert(section.to_string(), body.to_string());
    }

    /// Pre-seed a job as if a previous incident had created it.
    pub fn seed_job(&self, name: &str, uuid: &str, recipe: &str, phase: JobPhase) {
        self.jobs.lock().unwrap().push(JobRecord {
            name: name.to_string(),
            namespace: "recipes".to_string(),
            recipe: recipe.to_string(),
            uuid: uuid.to_string(),
            config_map: String::new(),
            labels: job_labels(uuid, recipe),
            description: String::new(),
            phase,
        });
    }

    fn next_name(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.counter.fetch_add(1, Ordering::SeqCst))
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl OrchestratorGateway for FakeOrchestrator {
    async fn create_config_map(
        &self,
        namespace: &str,
        uuid: &str,
        data: &Value,
    ) -> Result<String, OrchestratorError> {
        if self.reject_creates.load(Ordering::SeqCst) {
            return Err(OrchestratorError::Rejected(
                "creates disabled by the test".to_string(),
            ));
        }

        let name = self.next_name("triage-data");
        self.config_maps.lock().unwrap().push(ConfigMapRecord {
            name: name.clone(),
            namespace: namespace.to_string(),
            labels: object_labels(uuid),
            data: data.clone(),
        });
        self.record(Event::CreatedConfigMap(name.clone()));
        Ok(name)
    }

    async fn create_job(
        &self,
        namespace: &str,
        recipe_name: &str,
        spec: &RecipeSpec,
        uuid: &str,
        config_map: &str,
        _config: &Config,
    ) -> Result<String, OrchestratorError> {
        if self.reject_creates.load(Ordering::SeqCst) {
            return Err(OrchestratorError::Rejected(
                "creates disabled by the test".to_string(),
            ));
        }

        let name = self.next_name(recipe_name);
        self.jobs.lock().unwrap().push(JobRecord {
            name: name.clone(),
            namespace: namespace.to_string(),
            recipe: recipe_name.to_string(),
            uuid: uuid.to_string(),
            config_map: config_map.to_string(),
            labels: job_labels(uuid, recipe_name),
            description: spec.description.clone(),
            phase: JobPhase::Active,
        });
        self.record(Event::CreatedJob {
            recipe: recipe_name.to_string(),
            uuid: uuid.to_string(),
        });
        Ok(name)
    }

    async fn read_config_map(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<BTreeMap<String, String>, OrchestratorError> {
        let catalog = self.catalog.lock().unwrap();
        if catalog.is_empty() {
            return Err(OrchestratorError::NotFound(name.to_string()));
        }
        Ok(catalog.clone())
    }

    async fn list_jobs(
        &self,
        _namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<JobSnapshot>, OrchestratorError> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .iter()
            .filter(|job| selector.matches(&job.labels))
            .map(|job| JobSnapshot {
                name: job.name.clone(),
                created_at: Some(Utc.with_ymd_and_hms(2026, 8, 2, 10, 0, 0).unwrap()),
                labels: job.labels.clone(),
                description: job.description.clone(),
                phase: job.phase,
            })
            .collect())
    }

    async fn delete_jobs(
        &self,
        _namespace: &str,
        selector: &Selector,
    ) -> Result<(), OrchestratorError> {
        self.jobs
            .lock()
            .unwrap()
            .retain(|job| !selector.matches(&job.labels));
        self.record(Event::DeletedJobs(selector.to_string()));
        Ok(())
    }

    async fn delete_config_maps(
        &self,
        _namespace: &str,
        selector: &Selector,
    ) -> Result<(), OrchestratorError> {
        self.config_maps
            .lock()
            .unwrap()
            .retain(|config_map| !selector.matches(&config_map.labels));
        self.record(Event::DeletedConfigMaps(selector.to_string()));
        Ok(())
    }

    async fn check_access(
        &self,
        _namespace: &str,
        _rules: &[AccessRule],
    ) -> Result<(), OrchestratorError> {
        Ok(())
    }
}

/// Broadcast-backed bus with real at-most-once semantics: publishes before
/// the first subscription on a channel are lost, exactly like the real
/// transport.
pub struct MemoryBus {
    pub events: EventLog,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl MemoryBus {
    pub fn with_events(events: EventLog) -> Self {
        Self {
            events,
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn send(&self, channel: &str, payload: &str) {
        let _ = self.sender(channel).send(payload.to_string());
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .lock()
            .unwrap()
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }
}

#[async_trait]
impl BusGateway for MemoryBus {
    async fn subscribe(&self, channel: &str) -> Result<Box<dyn Subscription>, BusError> {
        let receiver = self.sender(channel).subscribe();
        self.events
            .lock()
            .unwrap()
            .push(Event::Subscribed(channel.to_string()));
        Ok(Box::new(MemorySubscription {
            channel: channel.to_string(),
            receiver: Some(receiver),
            events: Arc::clone(&self.events),
        }))
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError> {
        self.send(channel, payload);
        Ok(())
    }
}

struct MemorySubscription {
    channel: String,
    receiver: Option<broadcast::Receiver<String>>,
    events: EventLog,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next_message(&mut self) -> Option<BusMessage> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(payload) => {
                    return Some(BusMessage {
                        channel: self.channel.clone(),
                        payload,
                    })
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    async fn close(&mut self) {
        if self.receiver.take().is_some() {
            self.events
                .lock()
                .unwrap()
                .push(Event::Closed(self.channel.clone()));
        }
    }
}

/// Everything a test needs to drive a full incident in-process.
pub struct TestWorld {
    pub runtime: Arc<Runtime>,
    pub orchestrator: Arc<FakeOrchestrator>,
    pub bus: Arc<MemoryBus>,
    pub events: EventLog,
    pub bot_received: Arc<Mutex<Vec<Value>>>,
}

/// A world whose bot is a live loopback capture server.
pub async fn test_world(timeout: Duration) -> TestWorld {
    let (bot_address, bot_received) = capture_bot().await;
    let bot = BotClient::new(&bot_address).unwrap();
    build_world(timeout, &bot_address, bot, bot_received)
}

/// A world whose bot address points nowhere; the report step fails fast.
/// Suitable for paused-clock tests where no server can run in real time.
pub fn test_world_with_dead_bot(timeout: Duration) -> TestWorld {
    let bot = BotClient::builder("127.0.0.1:9")
        .timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    build_world(timeout, "127.0.0.1:9", bot, Arc::new(Mutex::new(Vec::new())))
}

fn build_world(
    timeout: Duration,
    bot_address: &str,
    bot: BotClient,
    bot_received: Arc<Mutex<Vec<Value>>>,
) -> TestWorld {
    let events: EventLog = Arc::new(Mutex::new(Vec::new()));
    let orchestrator = Arc::new(FakeOrchestrator::with_events(Arc::clone(&events)));
    let bus = Arc::new(MemoryBus::with_events(Arc::clone(&events)));

    let runtime = Arc::new(Runtime {
        config: test_config(timeout, bot_address),
        orchestrator: Arc::clone(&orchestrator) as Arc<dyn OrchestratorGateway>,
        bus: Arc::clone(&bus) as Arc<dyn BusGateway>,
        bot,
    });

    TestWorld {
        runtime,
        orchestrator,
        bus,
        events,
        bot_received,
    }
}

pub fn test_config(timeout: Duration, bot_address: &str) -> Config {
    Config {
        aggregator_address: "localhost:8080".to_string(),
        bus_address: "localhost:6379".to_string(),
        bot_address: bot_address.to_string(),
        recipe_timeout: timeout,
        recipe_namespace: "recipes".to_string(),
        controller_namespace: "triage-system".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        insecure_bot_tls: false,
    }
}

/// Recipe table with placeholder specs for the given names.
pub fn recipe_map(names: &[&str]) -> HashMap<String, Recipe> {
    names
        .iter()
        .map(|name| {
            (
                name.to_string(),
                Recipe::new(RecipeSpec {
                    enabled: true,
                    image: format!("example.com/{name}:1"),
                    entrypoint: format!("run-{name}"),
                    description: String::new(),
                    params: vec![],
                }),
            )
        })
        .collect()
}

/// Publish a well-formed recipe result on `channel`.
pub async fn publish_result(
    bus: &MemoryBus,
    channel: &str,
    name: &str,
    incident: &str,
    status: &str,
    analysis: &str,
    actions: &[&str],
) {
    let payload = json!({
        "name": name,
        "incident": incident,
        "status": status,
        "results": {"analysis": analysis, "json": "", "links": [], "actions": actions}
    });
    bus.send(channel, &payload.to_string());
}

/// Capture-only bot endpoint on an ephemeral port.
pub async fn capture_bot() -> (String, Arc<Mutex<Vec<Value>>>) {
    use axum::extract::State;
    use axum::routing::post;
    use axum::{Json, Router};

    let received: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route(
            "/api/analysis",
            post(
                |State(state): State<Arc<Mutex<Vec<Value>>>>, Json(body): Json<Value>| async move {
                    state.lock().unwrap().push(body);
                    Json(json!({"message": "ok"}))
                },
            ),
        )
        .with_state(Arc::clone(&received));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (address, received)
}

/// Poll `predicate` for up to two seconds of real time.
pub async fn wait_for(what: &str, predicate: impl Fn() -> bool) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

//! End-to-end tests of an agent network running on the dispatcher

use agentflow_agents::{
    AgentFactory, AnyAgent, AttributeDifferenceAgent, AttributeDifferenceOptions, FeedSource,
};
use agentflow_common::{AgentId, Memory, Message, Payload, Result};
use agentflow_runtime::{
    AgentflowConfig, BusConfig, DirectoryFeed, InMemoryStore, JsonFileStore, MemoryStore,
    MessageBus, Registration, Runtime, Scheduler,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Default)]
struct StaticFeed {
    items: Mutex<Vec<Value>>,
}

#[async_trait]
impl FeedSource for StaticFeed {
    async fn fetch(
        &self,
        _source: &str,
        _cursor_path: &str,
        _since: Option<&str>,
    ) -> Result<Vec<Value>> {
        Ok(self.items.lock().clone())
    }
}

fn difference(path: &str, output: &str) -> AnyAgent {
    AnyAgent::AttributeDifference(AttributeDifferenceAgent::new(AttributeDifferenceOptions {
        path: path.into(),
        output: output.into(),
        method: "integer_difference".into(),
        decimal_precision: None,
        expected_update_period_in_days: Some("1".into()),
    }))
}

fn reading(rain: i64) -> Message {
    let mut payload = Payload::new();
    payload.insert("rain".into(), json!(rain));
    Message::new(AgentId::from("gauge"), payload)
}

fn difference_runtime(store: Arc<dyn MemoryStore>) -> Runtime {
    let (bus, _deliveries) = MessageBus::new(BusConfig::default());
    let runtime = Runtime::new(store, Arc::new(bus));
    runtime
        .register(Registration::new("change", difference("rain", "rain_change")))
        .unwrap();
    runtime
}

/// Poll until `done` holds for the agent's memory
async fn wait_for_memory(runtime: &Runtime, agent_id: &AgentId, done: impl Fn(&Memory) -> bool) -> Memory {
    for _ in 0..200 {
        let memory = runtime.memory(agent_id).await.unwrap();
        if done(&memory) {
            return memory;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("memory of {agent_id} never reached the expected state");
}

#[tokio::test]
async fn test_feed_to_difference_to_peaks() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("agentflow.toml");
    std::fs::write(
        &config_path,
        r#"
[[agents]]
id = "weather"
schedule = "every_1h"
[agents.options]
type = "feed_poller"
source = "weather"
expected_update_period_in_days = 1

[[agents]]
id = "rain_change"
sources = ["weather"]
[agents.options]
type = "attribute_difference"
path = "rain"
output = "rain_change"
method = "integer_difference"
expected_update_period_in_days = 1

[[agents]]
id = "rain_peaks"
sources = ["rain_change"]
[agents.options]
type = "peak_detector"
value_path = "rain_change"
message = "Rain jumped by {{rain_change}}"
detection = "running_max"
min_peak_spacing_in_days = 0.0001
expected_receive_period_in_days = 1
"#,
    )
    .unwrap();
    let config = AgentflowConfig::load_from(&config_path.to_string_lossy()).unwrap();

    let feed = Arc::new(StaticFeed::default());
    let factory = AgentFactory::new().with_feeds(feed.clone());
    let (bus, deliveries) = MessageBus::new(config.bus.clone());
    let runtime = Arc::new(Runtime::new(Arc::new(InMemoryStore::new()), Arc::new(bus)));
    for spec in config.agents {
        runtime.register_spec(spec, &factory).unwrap();
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher = tokio::spawn(runtime.clone().dispatch(deliveries, shutdown_rx));
    let scheduler = Scheduler::new(runtime.clone());

    *feed.items.lock() = vec![json!({"rain": 1, "created_at": "2024-05-01T00:00:00Z"})];
    assert!(scheduler.check_all(Utc::now()).await.is_empty());
    assert_eq!(runtime.status(&AgentId::from("weather")).unwrap().last_message_at, None);

    *feed.items.lock() = vec![
        json!({"rain": 9, "created_at": "2024-05-01T02:00:00Z"}),
        json!({"rain": 4, "created_at": "2024-05-01T01:00:00Z"}),
    ];
    assert!(scheduler.check_all(Utc::now()).await.is_empty());

    let change = wait_for_memory(&runtime, &AgentId::from("rain_change"), |m| {
        m.get("last_value") == Some(&json!(4.0))
    })
    .await;
    assert_eq!(change.get("last_value"), Some(&json!(4.0)));

    let peaks = wait_for_memory(&runtime, &AgentId::from("rain_peaks"), |m| {
        m.get("data")
            .and_then(|d| d["no_group"].as_array())
            .is_some_and(|samples| samples.len() == 2)
    })
    .await;
    assert!(peaks.get("peaks").is_some());

    let mut emitted = Vec::new();
    for _ in 0..200 {
        emitted = runtime.bus().recent(&AgentId::from("rain_peaks"), 10);
        if !emitted.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(emitted.len(), 1);
    assert!(emitted[0].payload()["message"]
        .as_str()
        .unwrap()
        .starts_with("Rain jumped by"));

    let metrics = runtime.metrics();
    assert_eq!(metrics.failures, 0);
    assert_eq!(metrics.messages_emitted, 5);

    shutdown_tx.send(true).unwrap();
    dispatcher.await.unwrap();
}

#[tokio::test]
async fn test_redelivery_is_processed_once() {
    let (bus, deliveries) = MessageBus::new(BusConfig::default());
    let runtime = Arc::new(Runtime::new(Arc::new(InMemoryStore::new()), Arc::new(bus)));
    runtime
        .register(Registration::new("change", difference("rain", "rain_change")))
        .unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher = tokio::spawn(runtime.clone().dispatch(deliveries, shutdown_rx));

    let id = AgentId::from("change");
    let first = reading(3);
    runtime.bus().deliver(id.clone(), vec![first.clone()]).await.unwrap();
    runtime.bus().deliver(id.clone(), vec![first]).await.unwrap();
    runtime.bus().deliver(id.clone(), vec![reading(5)]).await.unwrap();

    wait_for_memory(&runtime, &id, |m| m.get("last_value") == Some(&json!(5.0))).await;

    let metrics = runtime.metrics();
    assert_eq!(metrics.deliveries_deduplicated, 1);
    assert_eq!(metrics.invocations, 2);

    shutdown_tx.send(true).unwrap();
    dispatcher.await.unwrap();
}

#[tokio::test]
async fn test_file_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let id = AgentId::from("change");

    let first = difference_runtime(Arc::new(JsonFileStore::open(dir.path()).await.unwrap()));
    first.receive(&id, &[reading(10)], Utc::now()).await.unwrap();
    drop(first);

    let second = difference_runtime(Arc::new(JsonFileStore::open(dir.path()).await.unwrap()));
    second.receive(&id, &[reading(13)], Utc::now()).await.unwrap();

    assert_eq!(second.memory(&id).await.unwrap().get("last_value"), Some(&json!(13.0)));
    assert!(dir.path().join("change.json").exists());
}

#[tokio::test]
async fn test_directory_feed_drives_poller() {
    let dir = tempfile::tempdir().unwrap();
    let items = dir.path().join("news");
    std::fs::create_dir_all(&items).unwrap();
    std::fs::write(
        items.join("1.json"),
        json!({"title": "first", "created_at": "2024-01-01T00:00:00Z"}).to_string(),
    )
    .unwrap();

    let factory = AgentFactory::new().with_feeds(Arc::new(DirectoryFeed::new(dir.path())));
    let config: AgentflowConfig = serde_json::from_value(json!({
        "agents": [{
            "id": "news",
            "options": {"type": "feed_poller", "source": "news", "expected_update_period_in_days": 1}
        }]
    }))
    .unwrap();

    let (bus, _deliveries) = MessageBus::new(config.bus.clone());
    let runtime = Runtime::new(Arc::new(InMemoryStore::new()), Arc::new(bus));
    for spec in config.agents {
        runtime.register_spec(spec, &factory).unwrap();
    }
    let id = AgentId::from("news");

    assert_eq!(runtime.check(&id, Utc::now()).await.unwrap(), 0);
    assert_eq!(runtime.check(&id, Utc::now()).await.unwrap(), 0);

    std::fs::write(
        items.join("2.json"),
        json!({"title": "second", "created_at": "2024-01-02T00:00:00Z"}).to_string(),
    )
    .unwrap();
    assert_eq!(runtime.check(&id, Utc::now()).await.unwrap(), 1);

    let published = runtime.bus().recent(&id, 10);
    assert_eq!(published[0].payload()["title"], json!("second"));
    assert_eq!(
        runtime.memory(&id).await.unwrap().get("last_cursor"),
        Some(&json!("2024-01-02T00:00:00Z"))
    );
}

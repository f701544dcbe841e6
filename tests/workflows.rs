//! End-to-end workflows through the Switchyard facade

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use switchyard::prelude::*;

/// Returns `{"v": version}` and counts calls
struct VersionHandler {
    version: Arc<AtomicU32>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl QueryHandler for VersionHandler {
    async fn handle(&self, _query: &Query) -> Result<Value, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"v": self.version.load(Ordering::SeqCst)}))
    }
}

fn version_yard() -> (Switchyard, Arc<AtomicU32>, Arc<AtomicUsize>) {
    let version = Arc::new(AtomicU32::new(1));
    let calls = Arc::new(AtomicUsize::new(0));
    let yard = Switchyard::builder().build();
    yard.query_bus().register(
        "GetVersion",
        VersionHandler {
            version: version.clone(),
            calls: calls.clone(),
        },
    );
    (yard, version, calls)
}

#[tokio::test(start_paused = true)]
async fn test_stale_read_then_refreshed_read() {
    let (yard, version, calls) = version_yard();
    let query = Query::new("GetVersion", json!({}));

    let first = yard
        .swr_query(
            query_key!["version"],
            query.clone(),
            QueryOptions::new().cache_time(Duration::from_secs(1)).retry(0),
        )
        .await;
    assert!(first.is_success);
    assert_eq!(first.data, Some(json!({"v": 1})));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    version.store(2, Ordering::SeqCst);

    let swr = || {
        QueryOptions::new()
            .stale_time(Duration::ZERO)
            .background_refresh(true)
            .retry(0)
    };

    let stale = yard
        .swr_query(query_key!["version"], query.clone(), swr())
        .await;
    assert!(stale.is_from_cache);
    assert_eq!(stale.data, Some(json!({"v": 1})));

    tokio::time::sleep(Duration::from_millis(10)).await;

    let refreshed = yard.swr_query(query_key!["version"], query, swr()).await;
    assert_eq!(refreshed.data, Some(json!({"v": 2})));
    assert!(calls.load(Ordering::SeqCst) >= 2);

    yard.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_swr_queries_share_one_execution() {
    let (yard, _version, calls) = version_yard();

    let a = yard.clone();
    let b = yard.clone();
    let (left, right) = tokio::join!(
        a.swr_query(query_key!["version"], Query::new("GetVersion", json!({})), QueryOptions::new()),
        b.swr_query(query_key!["version"], Query::new("GetVersion", json!({})), QueryOptions::new()),
    );

    assert_eq!(left.data, right.data);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_swr_query_without_handler_fails() {
    let yard = Switchyard::builder().build();

    let result = yard
        .swr_query(
            query_key!["missing"],
            Query::new("Missing", json!({})),
            QueryOptions::new().retry(0),
        )
        .await;

    assert!(result.is_error);
    assert_eq!(
        result.error_message().as_deref(),
        Some("No handler registered for query: Missing")
    );
    assert!(yard.swr().get_query_data(query_key!["missing"]).is_none());
}

struct Fulfil;

#[async_trait]
impl CommandHandler for Fulfil {
    async fn handle(&self, command: &Command) -> Result<Value, HandlerError> {
        let order = command.payload()["order"].as_u64().unwrap_or_default();
        if order == 0 {
            return Err(HandlerError::failed("X"));
        }
        Ok(json!({"fulfilled": order}))
    }
}

struct Counter(Arc<AtomicUsize>);

#[async_trait]
impl EventHandler for Counter {
    async fn handle(&self, _event: &Event) -> Result<(), EventHandlerError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_command_then_event_fan_out() {
    let yard = Switchyard::builder().build();
    yard.command_bus().register("Fulfil", Fulfil);

    let seen = Arc::new(AtomicUsize::new(0));
    yard.event_bus().register("order_fulfilled", Counter(seen.clone()));
    yard.event_bus().register("order_fulfilled", Counter(seen.clone()));

    let result = yard
        .command_bus()
        .execute(Command::new("Fulfil", json!({"order": 7})))
        .await;
    assert!(result.success);

    let report = yard
        .event_bus()
        .publish(Event::new("order_fulfilled", "order-7", result.data.unwrap()))
        .settled()
        .await;
    assert_eq!(report.dispatched, 2);
    assert_eq!(report.succeeded, 2);
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_async_command_failure_is_recorded() {
    let yard = Switchyard::builder().build();
    yard.command_bus().register("Fulfil", Fulfil);

    let id = yard
        .command_bus()
        .execute_async(Command::new("Fulfil", json!({"order": 0})));
    assert!(!id.is_nil());

    let mut status = None;
    for _ in 0..100 {
        match yard.command_bus().get_execution_status(id) {
            Some(s) if s.status.is_terminal() => {
                status = Some(s);
                break;
            }
            _ => tokio::time::sleep(Duration::from_millis(5)).await,
        }
    }

    let status = status.expect("command never settled");
    assert_eq!(status.status, CommandStatus::Failed);
    assert!(status.error.unwrap().contains('X'));
}

#[tokio::test]
async fn test_unregistered_command_is_a_failed_result() {
    let yard = Switchyard::builder().build();

    let result = yard
        .command_bus()
        .execute(Command::new("Nope", json!({})))
        .await;

    assert!(!result.success);
    assert_eq!(
        result.error_message(),
        Some("No handler registered for command: Nope")
    );
}

#[tokio::test]
async fn test_query_cache_adapter_from_builder() {
    let calls = Arc::new(AtomicUsize::new(0));
    let yard = Switchyard::builder()
        .query_cache(Arc::new(InMemoryQueryCache::new()))
        .default_cache_time(Duration::from_secs(60))
        .build();
    yard.query_bus().register(
        "GetVersion",
        VersionHandler {
            version: Arc::new(AtomicU32::new(1)),
            calls: calls.clone(),
        },
    );

    let query = Query::new("GetVersion", json!({}));
    let first = yard.query_bus().execute_with_cache(query.clone(), None, None).await;
    let second = yard.query_bus().execute_with_cache(query.clone(), None, None).await;

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    yard.query_bus().invalidate_cache("GetVersion", None).await;
    let third = yard.query_bus().execute_with_cache(query, None, None).await;
    assert!(!third.from_cache);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_settings_drive_the_facade() {
    let config = ConfigManager::new();
    config.set("swr.retry", "0").unwrap();
    config.set("events.async_handling", "false").unwrap();
    config.set("command.status_sweep_interval_secs", 60).unwrap();

    let settings = SwitchyardSettings::load(&config).unwrap();
    let yard = Switchyard::from_settings(&settings);

    assert_eq!(yard.swr().config().retry, 0);
    assert!(!yard.event_bus().config().async_handling);

    yard.shutdown();
}

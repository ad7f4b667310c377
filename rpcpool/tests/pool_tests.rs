use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde_json::{json, Value};

use rpcpool::{EndpointConfig, RpcError, RpcPool, RpcTransport};

/// Scripted transport: named urls can be told to refuse connections or to
/// answer with a JSON-RPC error envelope; everything else succeeds.
#[derive(Default)]
struct MockTransport {
    refusing: Mutex<HashSet<String>>,
    erroring: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl MockTransport {
    fn refuse(&self, url: &str) {
        self.refusing.lock().insert(url.to_string());
    }

    fn heal(&self, url: &str) {
        self.refusing.lock().remove(url);
        self.erroring.lock().remove(url);
    }

    fn error_envelope(&self, url: &str) {
        self.erroring.lock().insert(url.to_string());
    }

    fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl RpcTransport for MockTransport {
    async fn post(&self, url: &str, body: Value) -> Result<Value, RpcError> {
        self.calls.lock().push(url.to_string());

        if self.refusing.lock().contains(url) {
            return Err(RpcError::Unreachable("connection refused".into()));
        }
        if self.erroring.lock().contains(url) {
            return Ok(json!({
                "jsonrpc": "2.0",
                "id": body["id"],
                "error": { "code": -32000, "message": "server busy" },
            }));
        }

        Ok(json!({ "jsonrpc": "2.0", "id": body["id"], "result": 123 }))
    }
}

fn day(n: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, n).unwrap()
}

fn endpoint(name: &str, limit: u64) -> EndpointConfig {
    let mut config = EndpointConfig::new(name, format!("http://{name}"));
    config.daily_limit = limit;
    config
}

#[tokio::test]
async fn failover_disables_endpoint_after_three_failures() {
    let transport = Arc::new(MockTransport::default());
    // a carries the larger quota so deterministic selection tries it first.
    let pool = RpcPool::new(
        vec![endpoint("a", 60_000), endpoint("b", 50_000)],
        transport.clone(),
    );
    transport.refuse("http://a");

    for _ in 0..3 {
        let result = pool.call_at("getblockcount", json!([]), 1, day(1)).await;
        assert_eq!(result, Some(json!(123)), "b must serve the call");
    }

    let a = &pool.endpoints()[0];
    assert!(!a.enabled);
    assert_eq!(a.fail_count, 3);
    assert_eq!(transport.calls_to("http://a"), 3);

    // Once disabled, a is no longer attempted at all.
    pool.call_at("getblockcount", json!([]), 1, day(1)).await;
    assert_eq!(transport.calls_to("http://a"), 3);
    assert_eq!(transport.calls_to("http://b"), 4);
}

#[tokio::test]
async fn day_rollover_rehabilitates_disabled_endpoint() {
    let transport = Arc::new(MockTransport::default());
    let pool = RpcPool::new(
        vec![endpoint("a", 60_000), endpoint("b", 50_000)],
        transport.clone(),
    );
    transport.refuse("http://a");

    for _ in 0..3 {
        pool.call_at("getblockcount", json!([]), 1, day(1)).await;
    }
    assert!(!pool.endpoints()[0].enabled);

    transport.heal("http://a");

    let result = pool.call_at("getblockcount", json!([]), 7, day(2)).await;
    assert_eq!(result, Some(json!(123)));

    let a = &pool.endpoints()[0];
    assert!(a.enabled);
    assert_eq!(a.fail_count, 0);
    assert_eq!(a.used_today, 7, "usage restarts from zero after rollover");
}

#[tokio::test]
async fn selection_prefers_most_remaining_capacity() {
    let transport = Arc::new(MockTransport::default());
    let pool = RpcPool::new(
        vec![endpoint("a", 100), endpoint("b", 50)],
        transport.clone(),
    );

    // a: 100 left, b: 50 left -> a
    pool.call_at("m", json!([]), 30, day(1)).await;
    // a: 70 left -> a again
    pool.call_at("m", json!([]), 30, day(1)).await;
    // a: 40 left, b: 50 left -> b
    pool.call_at("m", json!([]), 30, day(1)).await;

    assert_eq!(
        *transport.calls.lock(),
        vec!["http://a", "http://a", "http://b"]
    );
}

#[tokio::test]
async fn exhausted_pool_returns_none() {
    let transport = Arc::new(MockTransport::default());
    let pool = RpcPool::new(vec![endpoint("a", 10)], transport.clone());

    // 10 units burned out of 10; the 90% soft cap now excludes a.
    assert!(pool.call_at("m", json!([]), 10, day(1)).await.is_some());
    assert_eq!(pool.call_at("m", json!([]), 1, day(1)).await, None);
    assert_eq!(transport.calls_to("http://a"), 1);

    let cap = pool.capacity_at(day(1));
    assert_eq!(cap.total_remaining, 0);
    assert_eq!(cap.enabled_count, 1);
}

#[tokio::test]
async fn upstream_error_envelope_counts_as_failure() {
    let transport = Arc::new(MockTransport::default());
    let pool = RpcPool::new(
        vec![endpoint("a", 60_000), endpoint("b", 50_000)],
        transport.clone(),
    );
    transport.error_envelope("http://a");

    let result = pool.call_at("getblockcount", json!([]), 1, day(1)).await;
    assert_eq!(result, Some(json!(123)));

    let a = &pool.endpoints()[0];
    assert_eq!(a.fail_count, 1);
    assert_eq!(a.used_today, 0, "failed calls are not charged");
}

#[tokio::test]
async fn empty_pool_has_no_capacity() {
    let transport = Arc::new(MockTransport::default());
    let pool = RpcPool::new(vec![], transport);

    assert_eq!(pool.call_at("m", json!([]), 1, day(1)).await, None);

    let cap = pool.capacity_at(day(1));
    assert_eq!(cap.total_remaining, 0);
    assert_eq!(cap.enabled_count, 0);
    assert!((cap.usage() - 1.0).abs() < f64::EPSILON);
}

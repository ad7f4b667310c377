//! Fair, capacity-aware routing across rate-limited upstreams.
//!
//! Selection is deterministic: the usable endpoint with the most remaining
//! daily quota wins, which spreads load without coordination. The endpoint
//! table is the pool's private state; observers only read the aggregate
//! capacity.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::endpoint::{Endpoint, EndpointConfig};
use crate::transport::RpcTransport;

/// Aggregate view over the enabled endpoints, for adaptive scheduling.
#[derive(Debug, Clone, Copy)]
pub struct Capacity {
    pub total_remaining: u64,
    pub total_daily: u64,
    pub enabled_count: usize,
}

impl Capacity {
    /// Fraction of today's budget already burned, in `[0, 1]`.
    pub fn usage(&self) -> f64 {
        if self.total_daily == 0 {
            return 1.0;
        }
        1.0 - self.total_remaining as f64 / self.total_daily as f64
    }
}

pub struct RpcPool {
    endpoints: Mutex<Vec<Endpoint>>,
    transport: Arc<dyn RpcTransport>,
    request_id: AtomicU64,
}

impl RpcPool {
    pub fn new(configs: Vec<EndpointConfig>, transport: Arc<dyn RpcTransport>) -> Self {
        let today = Utc::now().date_naive();
        let endpoints = configs
            .into_iter()
            .map(|c| Endpoint::new(c, today))
            .collect();

        Self {
            endpoints: Mutex::new(endpoints),
            transport,
            request_id: AtomicU64::new(1),
        }
    }

    /// Route one JSON-RPC call, charging `cost` units against whichever
    /// endpoint serves it. `None` means no usable capacity or every
    /// candidate failed.
    pub async fn call(&self, method: &str, params: Value, cost: u64) -> Option<Value> {
        self.call_at(method, params, cost, Utc::now().date_naive())
            .await
    }

    /// `call` with the current day injected; tests drive quota rollover
    /// through here.
    pub async fn call_at(
        &self,
        method: &str,
        params: Value,
        cost: u64,
        today: NaiveDate,
    ) -> Option<Value> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let attempts = {
            let mut eps = self.endpoints.lock();
            for ep in eps.iter_mut() {
                ep.roll_over(today);
            }
            eps.len()
        };

        let mut tried: HashSet<usize> = HashSet::new();

        for _ in 0..attempts {
            let picked = {
                let eps = self.endpoints.lock();
                eps.iter()
                    .enumerate()
                    .filter(|(i, ep)| !tried.contains(i) && ep.usable())
                    .max_by_key(|(_, ep)| ep.remaining())
                    .map(|(i, ep)| (i, ep.name.clone(), ep.url.clone()))
            };

            let Some((idx, name, url)) = picked else {
                warn!(method, "no usable rpc capacity");
                return None;
            };
            tried.insert(idx);

            match self.transport.post(&url, body.clone()).await {
                Ok(envelope) => {
                    if let Some(err) = envelope.get("error").filter(|e| !e.is_null()) {
                        warn!(endpoint = %name, method, error = %err, "rpc upstream error");
                        self.endpoints.lock()[idx].record_failure();
                        continue;
                    }

                    let Some(result) = envelope.get("result") else {
                        warn!(endpoint = %name, method, "rpc envelope missing result");
                        self.endpoints.lock()[idx].record_failure();
                        continue;
                    };

                    let result = result.clone();
                    {
                        let mut eps = self.endpoints.lock();
                        eps[idx].record_success(cost);
                        debug!(
                            endpoint = %name,
                            method,
                            cost,
                            used_today = eps[idx].used_today,
                            "rpc call served"
                        );
                    }
                    return Some(result);
                }
                Err(e) => {
                    warn!(endpoint = %name, method, error = %e, "rpc transport failure");
                    self.endpoints.lock()[idx].record_failure();
                }
            }
        }

        None
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity_at(Utc::now().date_naive())
    }

    pub fn capacity_at(&self, today: NaiveDate) -> Capacity {
        let mut eps = self.endpoints.lock();

        let mut cap = Capacity {
            total_remaining: 0,
            total_daily: 0,
            enabled_count: 0,
        };

        for ep in eps.iter_mut() {
            ep.roll_over(today);
            if ep.enabled {
                cap.total_remaining += ep.remaining();
                cap.total_daily += ep.daily_limit;
                cap.enabled_count += 1;
            }
        }

        cap
    }

    /// Snapshot of the endpoint table, for diagnostics and tests.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.endpoints.lock().clone()
    }
}

//! Smoke test: cache and gateway paths emit the documented metric keys.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use metrics_util::debugging::DebuggingRecorder;
use serde_json::{Value, json};
use vetrina::cache::{CachedQuery, EdgeCache, MemorySessionArea, SessionStore};
use vetrina::client::{ContentClient, FetchFailure, QueryParams};
use vetrina::gateway::{QueryOptions, query};

struct StaticClient {
    payload: Value,
    fail: bool,
}

#[async_trait]
impl ContentClient for StaticClient {
    async fn fetch(&self, _query: &str, _params: &QueryParams) -> Result<Value, FetchFailure> {
        if self.fail {
            Err(FetchFailure::Status {
                status: 500,
                body: "boom".to_string(),
            })
        } else {
            Ok(self.payload.clone())
        }
    }
}

#[derive(Default)]
struct MemoryEdge {
    entries: Mutex<HashMap<String, CachedQuery>>,
}

impl EdgeCache for MemoryEdge {
    fn lookup(&self, key: &str) -> Option<CachedQuery> {
        self.entries.lock().expect("edge lock").get(key).cloned()
    }

    fn store(&self, key: &str, value: CachedQuery) {
        self.entries
            .lock()
            .expect("edge lock")
            .insert(key.to_string(), value);
    }
}

#[tokio::test]
async fn gateway_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    vetrina::telemetry::describe_metrics();

    // Session store: miss, hit, and a write dropped after quota recovery.
    let roomy = SessionStore::new(Arc::new(MemorySessionArea::new(4096)));
    assert!(!roomy.get("absent").is_hit());
    roomy.set("present", &json!({"n": 1}), None);
    assert!(roomy.get("present").is_hit());

    let cramped = SessionStore::new(Arc::new(MemorySessionArea::new(8)));
    cramped.set("too-big", &json!({"padding": "xxxxxxxxxxxxxxxx"}), None);

    // Gateway edge tier: miss, populate, hit; then a failing fetch.
    let client = StaticClient {
        payload: json!({"title": "Hat"}),
        fail: false,
    };
    let edge = Arc::new(MemoryEdge::default());
    let options = QueryOptions::standard("metrics-probe").with_edge(edge);
    let params = QueryParams::new();

    let _: Value = query(&client, "*[_type == 'product'][0]", &params, &options)
        .await
        .expect("first query succeeds");
    let _: Value = query(&client, "*[_type == 'product'][0]", &params, &options)
        .await
        .expect("second query succeeds");

    let failing = StaticClient {
        payload: Value::Null,
        fail: true,
    };
    let plain = QueryOptions::standard("metrics-probe");
    let _ = query::<Value>(&failing, "*[_type == 'page'][0]", &params, &plain).await;

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(key, _, _, _)| key.key().name().to_string())
        .collect();

    for expected in [
        "vetrina_session_cache_hit_total",
        "vetrina_session_cache_miss_total",
        "vetrina_session_cache_drop_total",
        "vetrina_edge_cache_hit_total",
        "vetrina_edge_cache_miss_total",
        "vetrina_query_fetch_total",
        "vetrina_query_failure_total",
    ] {
        assert!(names.contains(expected), "missing metric key {expected}");
    }
}

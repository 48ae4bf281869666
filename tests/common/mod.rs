#![allow(dead_code)]

use evmap::config::DatasetsConfig;
use evmap::hooks::{CachePolicy, DatasetCache, Datasets};
use evmap::source::{DataSource, Deployment, Payload, Transport};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const STATES: &str = include_str!("../fixtures/us_states.geojson");
pub const STATIONS: &str = include_str!("../fixtures/stations.geo.json");
pub const COVERAGE: &str = include_str!("../fixtures/coverage_scores.json");
pub const TOTALS: &str = include_str!("../fixtures/infra_totals.json");

/// Serves documents from memory by URL and counts requests per URL.
#[derive(Default)]
pub struct MemoryTransport {
    documents: Mutex<HashMap<String, String>>,
    calls: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
}

impl MemoryTransport {
    pub fn with_fixtures(origin: &str) -> Arc<Self> {
        let transport = Self::default();
        for (path, body) in [
            ("/data/us_states.geojson", STATES),
            ("/data/stations.geo.json", STATIONS),
            ("/data/coverage_scores.json", COVERAGE),
            ("/data/infra_totals.json", TOTALS),
        ] {
            transport.insert(&format!("{origin}{path}"), body);
        }
        Arc::new(transport)
    }

    pub fn insert(&self, url: &str, body: &str) {
        self.documents
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_string());
    }

    pub fn remove(&self, url: &str) {
        self.documents.lock().unwrap().remove(url);
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

impl Transport for MemoryTransport {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Payload, String>> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
        let body = self.documents.lock().unwrap().get(url).cloned();
        Box::pin(async move {
            tokio::task::yield_now().await;
            Ok(match body {
                Some(body) => Payload::ok(body),
                None => Payload {
                    status: 404,
                    body: b"Not Found".to_vec(),
                },
            })
        })
    }
}

pub const ORIGIN: &str = "http://assets.test";

pub fn datasets(transport: Arc<MemoryTransport>) -> Datasets {
    let source = DataSource::new(ORIGIN, Deployment::Development, transport);
    let cache = Arc::new(DatasetCache::new(CachePolicy::default()));
    Datasets::new(source, cache, &DatasetsConfig::default())
}

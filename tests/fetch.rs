mod common;

use axum::Router;
use evmap::compose::{compose, LayerId};
use evmap::config::DatasetsConfig;
use evmap::data::Stations;
use evmap::error::DataError;
use evmap::hooks::{CachePolicy, DatasetCache, DatasetHook, Datasets};
use evmap::source::{DataSource, Deployment, ReqwestTransport};
use evmap::style::Style;
use evmap::types::ViewState;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower_http::services::ServeDir;

/// Serves `dir` on an ephemeral port and returns the origin URL.
async fn serve(dir: &Path) -> String {
    let app = Router::new().fallback_service(ServeDir::new(dir));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn write_fixtures(root: &Path) {
    let data = root.join("data");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("us_states.geojson"), common::STATES).unwrap();
    fs::write(data.join("stations.geo.json"), common::STATIONS).unwrap();
    fs::write(data.join("coverage_scores.json"), common::COVERAGE).unwrap();
    fs::write(data.join("infra_totals.json"), common::TOTALS).unwrap();
}

fn source(origin: &str, deployment: Deployment) -> DataSource {
    DataSource::new(origin, deployment, Arc::new(ReqwestTransport::new(None).unwrap()))
}

#[tokio::test]
async fn missing_document_is_reported_then_refetched() {
    let dir = TempDir::new().unwrap();
    let origin = serve(dir.path()).await;

    let cache = Arc::new(DatasetCache::new(CachePolicy::default()));
    let hook: DatasetHook<Stations> = DatasetHook::new(
        "data/stations.geo.json",
        source(&origin, Deployment::Development),
        cache.clone(),
    );

    let expected = DataError::Network {
        identifier: "data/stations.geo.json".to_string(),
        status: 404,
    };
    let err = hook.read().await.unwrap_err();
    assert_eq!(err, expected);
    assert_eq!(hook.state().error(), Some(&expected));
    assert_eq!(cache.stats().fetches, 1);

    // Once the document exists, the next read fetches it.
    write_fixtures(dir.path());
    let stations = hook.read().await.unwrap();
    assert_eq!(stations.len(), 2);
    assert_eq!(cache.stats().fetches, 2);
}

#[tokio::test]
async fn published_build_fetches_under_base_path() {
    let dir = TempDir::new().unwrap();
    write_fixtures(&dir.path().join("ev-infra-viz"));
    let origin = serve(dir.path()).await;

    let deployment = Deployment::Published {
        base_path: "/ev-infra-viz/".to_string(),
    };
    let datasets = Datasets::new(
        source(&origin, deployment),
        Arc::new(DatasetCache::default()),
        &DatasetsConfig::default(),
    );

    let data = datasets.map_data().await.unwrap();
    let layers = compose(&data, &ViewState::default());

    let ids: Vec<LayerId> = layers.iter().map(|l| l.id).collect();
    assert_eq!(ids, vec![LayerId::Boundaries, LayerId::Coverage, LayerId::Stations]);

    let style = Style::default();
    assert_eq!(
        layers[1].styles[0].fill,
        Style::with_alpha(style.ramp.sample(62.5), style.fill_alpha)
    );

    let totals = datasets.totals.read().await.unwrap();
    assert!(totals.dc_fast_stations <= totals.total_stations);
}

#[tokio::test]
async fn development_build_ignores_base_path() {
    let dir = TempDir::new().unwrap();
    write_fixtures(dir.path());
    let origin = serve(dir.path()).await;

    let datasets = Datasets::new(
        source(&origin, Deployment::Development),
        Arc::new(DatasetCache::default()),
        &DatasetsConfig::default(),
    );
    assert!(datasets.preload().await.is_empty());
    assert!(datasets.stations.state().data().is_some());
}

#[tokio::test]
async fn unreachable_origin_is_transport_error() {
    // Bind then drop to get a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let source = source(&format!("http://{addr}"), Deployment::Development);
    let err = source.fetch_bytes("data/infra_totals.json").await.unwrap_err();
    assert!(matches!(err, DataError::Transport { .. }));
    assert!(err.is_transient());
}

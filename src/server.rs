use crate::compose::{compose, LayerDescriptor, LayerId, MapData};
use crate::config::{AppConfig, ViewConfig};
use crate::error::DataError;
use crate::hooks::Datasets;
use crate::router::{DomainRef, Interaction, InteractionRouter, PickEvent, PickKind};
use crate::types::{Camera, FeatureRef, TotalsRecord, ViewState};
use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub struct AppState {
    pub datasets: Datasets,
    pub view: ViewConfig,
    // Records behind the layers last sent to the canvas. Picks index into these.
    displayed: Mutex<Option<(MapData, ViewState)>>,
}

impl AppState {
    pub fn new(datasets: Datasets, view: ViewConfig) -> Self {
        Self {
            datasets,
            view,
            displayed: Mutex::new(None),
        }
    }

    fn remember(&self, data: MapData, view: ViewState) {
        let mut displayed = self.displayed.lock().unwrap_or_else(|p| p.into_inner());
        *displayed = Some((data, view));
    }

    /// Data and view to resolve picks against, with `year` overriding the
    /// displayed year when given.
    async fn pick_context(&self, year: Option<i32>) -> Result<(MapData, ViewState), ApiError> {
        let displayed = self
            .displayed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        let (data, mut view) = match displayed {
            Some(displayed) => displayed,
            None => {
                let view = ViewState {
                    year: self.view.year,
                    ..ViewState::default()
                };
                (self.datasets.map_data().await?, view)
            }
        };
        if year.is_some() {
            view.year = year;
        }
        Ok((data, view))
    }
}

/// Errors returned by the HTTP API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Data(_) => StatusCode::BAD_GATEWAY,
            Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
        };
        let upstream = match &self {
            Self::Data(DataError::Network { status, .. }) => Some(*status),
            _ => None,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
            "upstream_status": upstream,
        });
        (status, Json(body)).into_response()
    }
}

/// View parameters as sent by the canvas. Missing fields fall back to the
/// configured initial view.
#[derive(Debug, Default, Deserialize)]
pub struct ViewQuery {
    longitude: Option<f64>,
    latitude: Option<f64>,
    zoom: Option<f64>,
    pitch: Option<f64>,
    bearing: Option<f64>,
    year: Option<i32>,
    select: Option<String>,
}

impl ViewQuery {
    fn view_state(&self, defaults: &ViewConfig) -> Result<ViewState, ApiError> {
        let base = defaults.camera;
        let camera = Camera {
            longitude: self.longitude.unwrap_or(base.longitude),
            latitude: self.latitude.unwrap_or(base.latitude),
            zoom: self.zoom.unwrap_or(base.zoom),
            pitch: self.pitch.unwrap_or(base.pitch),
            bearing: self.bearing.unwrap_or(base.bearing),
        };
        let selection = self
            .select
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::parse::<FeatureRef>)
            .transpose()
            .map_err(ApiError::InvalidQuery)?;

        Ok(ViewState {
            camera,
            year: self.year.or(defaults.year),
            selection,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct PickQuery {
    layer: LayerId,
    index: Option<usize>,
    #[serde(default)]
    kind: PickKind,
    year: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct CoordinateQuery {
    lat: f64,
    lon: f64,
    year: Option<i32>,
}

pub fn build_router(state: Arc<AppState>, static_dir: Option<&Path>) -> Router {
    let mut router = Router::new()
        .route("/api/layers", get(layers_handler))
        .route("/api/pick", get(pick_handler))
        .route("/api/query", get(query_handler))
        .route("/api/totals", get(totals_handler))
        .route("/api/reload", post(reload_handler));

    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, datasets: Datasets) -> Result<()> {
    let state = Arc::new(AppState::new(datasets.clone(), config.view.clone()));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    let app = build_router(state, Some(&config.server.data_dir));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, data_dir = ?config.server.data_dir, "Serving map API");

    // Warm the cache once the listener is up, since the datasets may be
    // served by this very process.
    tokio::spawn(async move {
        for err in datasets.preload().await {
            warn!(identifier = err.identifier(), error = %err, "Dataset preload failed");
        }
    });

    axum::serve(listener, app).await?;
    Ok(())
}

async fn layers_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ViewQuery>,
) -> Result<Json<Vec<LayerDescriptor>>, ApiError> {
    let view = query.view_state(&state.view)?;
    let data = state.datasets.map_data().await?;
    let layers = compose(&data, &view);
    state.remember(data, view);
    Ok(Json(layers))
}

async fn pick_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PickQuery>,
) -> Result<Json<Interaction>, ApiError> {
    let (data, view) = state.pick_context(query.year).await?;
    let router = InteractionRouter::new(data, &view);

    let pick = PickEvent {
        layer: query.layer,
        index: query.index,
        kind: query.kind,
    };
    Ok(Json(router.dispatch(&pick)))
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CoordinateQuery>,
) -> Result<Json<Option<DomainRef>>, ApiError> {
    let (data, view) = state.pick_context(query.year).await?;
    let router = InteractionRouter::new(data, &view);
    Ok(Json(router.resolve_coordinate(query.lon, query.lat)))
}

async fn totals_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TotalsRecord>, ApiError> {
    let totals = state.datasets.totals.read().await?;
    Ok(Json(*totals))
}

/// Drops every cached dataset so the next request refetches. Picks keep
/// resolving against the displayed layers until new ones are fetched.
async fn reload_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    state.datasets.reload();
    StatusCode::NO_CONTENT
}

use anyhow::Result;
use axum::{
    Router,
    body::Body,
    extract::{Query, State},
    http::{Request, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::contour::render_contours;
use crate::grid::HeightGrid;
use crate::render::render_normalized;
use crate::search::{GlideQuery, GridIndex, SearchState, search_from_point};
use crate::tiles::TileStore;

/// Shared state for the web handlers: the process-wide tile store.
#[derive(Clone)]
pub struct AppState {
    pub tiles: TileStore,
}

fn default_cell_size() -> f64 {
    200.0
}

fn default_glide_number() -> f64 {
    8.0
}

fn default_additional_height() -> f64 {
    10.0
}

fn default_trim_speed() -> f64 {
    10.0
}

/// Query parameters shared by all cone endpoints. Wind direction arrives
/// in meteorological degrees and speeds in m/s; the glide number is the
/// usual "8:1" figure, of which the core consumes the reciprocal.
#[derive(Debug, Clone, Deserialize)]
pub struct ConeParams {
    pub lat: f64,
    pub lon: f64,
    #[serde(default = "default_cell_size")]
    pub cell_size: f64,
    #[serde(default = "default_glide_number")]
    pub glide_number: f64,
    #[serde(default = "default_additional_height")]
    pub additional_height: f64,
    #[serde(default = "default_trim_speed")]
    pub trim_speed: f64,
    #[serde(default)]
    pub wind_speed: f64,
    /// Degrees, direction the wind comes from.
    #[serde(default)]
    pub wind_direction: f64,
}

impl ConeParams {
    pub fn query(&self) -> GlideQuery {
        GlideQuery {
            glide_ratio: 1.0 / self.glide_number,
            trim_speed: self.trim_speed,
            wind_direction: self.wind_direction.to_radians(),
            wind_speed: self.wind_speed,
            additional_height: self.additional_height,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConeNode {
    pub index: GridIndex,
    /// Arrival altitude MSL.
    pub height: f64,
    /// Path length from the start in meters.
    pub distance: f64,
    pub lat: f64,
    pub lon: f64,
    pub reference: Option<GridIndex>,
    /// Cell edge length in meters.
    pub size: f64,
    /// Arrival altitude above ground.
    pub agl: f64,
    /// Ground elevation.
    pub gl: f64,
}

#[derive(Debug, Serialize)]
pub struct ConeResponse {
    pub nodes: Vec<ConeNode>,
    pub cell_size: f64,
    pub angular_resolution: (f64, f64),
    pub lat: (f64, f64),
    pub lon: (f64, f64),
}

/// Build the JSON body for a finished search: one entry per reachable
/// cell, plus the grid metadata a client needs to place them.
pub fn cone_response(state: &SearchState, grid: &HeightGrid) -> ConeResponse {
    let (lats, lons) = grid.coordinates_for_indices();
    let mut nodes = Vec::new();

    for (ix, node) in &state.explored {
        if !node.reachable {
            continue;
        }
        let ground = grid.height_at(*ix);
        nodes.push(ConeNode {
            index: *ix,
            height: node.height,
            distance: node.distance,
            lat: lats[ix.0],
            lon: lons[ix.1],
            reference: node.reference,
            size: grid.cell_size,
            agl: node.height - ground,
            gl: ground,
        });
    }

    ConeResponse {
        nodes,
        cell_size: grid.cell_size,
        angular_resolution: grid.angular_resolution(),
        lat: grid.latitudes,
        lon: grid.longitudes,
    }
}

/// Run the search on a blocking worker; grid assembly reads tiles from
/// disk and the expansion itself is pure CPU.
async fn run_search(
    state: &AppState,
    params: &ConeParams,
) -> Result<(SearchState, HeightGrid), Response> {
    let tiles = state.tiles.clone();
    let params = params.clone();

    let result = tokio::task::spawn_blocking(move || {
        search_from_point(
            &tiles,
            params.lat,
            params.lon,
            params.cell_size,
            &params.query(),
        )
    })
    .await;

    match result {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(err)) => {
            error!("search failed: {:#}", err);
            Err(
                (StatusCode::INTERNAL_SERVER_ERROR, format!("search failed: {}", err))
                    .into_response(),
            )
        }
        Err(err) => {
            error!("search task panicked: {}", err);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "search task failed".to_string())
                .into_response())
        }
    }
}

async fn flight_cone(State(state): State<AppState>, Query(params): Query<ConeParams>) -> Response {
    match run_search(&state, &params).await {
        Ok((search_state, grid)) => axum::Json(cone_response(&search_state, &grid)).into_response(),
        Err(response) => response,
    }
}

fn png_response(bytes: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, "image/png")], bytes).into_response()
}

/// Arrival altitudes of the reachable set, normalized over their range.
async fn height_image(State(state): State<AppState>, Query(params): Query<ConeParams>) -> Response {
    let (search_state, grid) = match run_search(&state, &params).await {
        Ok(outcome) => outcome,
        Err(response) => return response,
    };
    if grid.rows == 0 {
        return (StatusCode::NOT_FOUND, "no reachable cells").into_response();
    }

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for node in search_state.explored.values().filter(|n| n.reachable) {
        min = min.min(node.height);
        max = max.max(node.height);
    }
    let span = if max > min { max - min } else { 1.0 };

    let mut values = vec![f64::NAN; grid.rows * grid.cols];
    for node in search_state.explored.values().filter(|n| n.reachable) {
        values[node.ix.0 * grid.cols + node.ix.1] = (node.height - min) / span;
    }

    match render_normalized(&values, grid.rows, grid.cols) {
        Ok(bytes) => png_response(bytes),
        Err(err) => {
            error!("failed to render height image: {:#}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "render failed").into_response()
        }
    }
}

/// Arrival altitude above ground, normalized against a fixed 1200 m span.
async fn agl_image(State(state): State<AppState>, Query(params): Query<ConeParams>) -> Response {
    let (search_state, grid) = match run_search(&state, &params).await {
        Ok(outcome) => outcome,
        Err(response) => return response,
    };
    if grid.rows == 0 {
        return (StatusCode::NOT_FOUND, "no reachable cells").into_response();
    }

    let mut values = vec![f64::NAN; grid.rows * grid.cols];
    for node in search_state.explored.values().filter(|n| n.reachable) {
        let agl = node.height - grid.height_at(node.ix);
        values[node.ix.0 * grid.cols + node.ix.1] = agl / 1200.0;
    }

    match render_normalized(&values, grid.rows, grid.cols) {
        Ok(bytes) => png_response(bytes),
        Err(err) => {
            error!("failed to render AGL image: {:#}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "render failed").into_response()
        }
    }
}

/// Number of isolines drawn by the contour endpoint.
const CONTOUR_LEVELS: usize = 30;

/// Isolines of arrival altitude above ground over the reachable set.
async fn contour_image(State(state): State<AppState>, Query(params): Query<ConeParams>) -> Response {
    let (search_state, grid) = match run_search(&state, &params).await {
        Ok(outcome) => outcome,
        Err(response) => return response,
    };
    if grid.rows == 0 {
        return (StatusCode::NOT_FOUND, "no reachable cells").into_response();
    }

    let mut values = vec![f64::NAN; grid.rows * grid.cols];
    for node in search_state.explored.values().filter(|n| n.reachable) {
        values[node.ix.0 * grid.cols + node.ix.1] = node.height - grid.height_at(node.ix);
    }

    match render_contours(&values, grid.rows, grid.cols, CONTOUR_LEVELS) {
        Ok(bytes) => png_response(bytes),
        Err(err) => {
            error!("failed to render contour image: {:#}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "render failed").into_response()
        }
    }
}

async fn index() -> &'static str {
    "Glide reachability service"
}

async fn request_logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or("").to_string();
    let start_time = Instant::now();

    let response = next.run(request).await;
    let duration = start_time.elapsed();

    info!(
        "{} {}{}{} {} in {:.2}ms",
        method,
        path,
        if query.is_empty() { "" } else { "?" },
        query,
        response.status().as_u16(),
        duration.as_secs_f64() * 1000.0
    );
    response
}

/// Start the web server and block until it shuts down.
pub async fn start_web_server(interface: String, port: u16, state: AppState) -> Result<()> {
    let app = Router::new()
        .route("/", get(index))
        .route("/flight_cone", get(flight_cone))
        .route("/height_image", get(height_image))
        .route("/contour_image", get(contour_image))
        .route("/agl_image", get(agl_image))
        .with_state(state)
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", interface, port)).await?;
    info!("Web server listening on http://{}:{}", interface, port);

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_convert_to_query() {
        let params = ConeParams {
            lat: 47.0,
            lon: 11.0,
            cell_size: 200.0,
            glide_number: 8.0,
            additional_height: 10.0,
            trim_speed: 10.0,
            wind_speed: 4.0,
            wind_direction: 90.0,
        };
        let query = params.query();
        assert!((query.glide_ratio - 0.125).abs() < 1e-12);
        assert!((query.wind_direction - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert_eq!(query.wind_speed, 4.0);
    }

    #[test]
    fn test_cone_response_lists_reachable_cells() {
        use crate::search::{SearchConfig, search};

        let grid = HeightGrid::new(vec![0.0; 25], 5, 5, 100.0, (47.0, 48.0), (11.0, 12.0));
        let config = SearchConfig {
            grid,
            glide_ratio: 0.125,
            trim_speed: 10.0,
            wind_direction: 0.0,
            wind_speed: 0.0,
        };
        let state = search((2, 2), 40.0, &config);
        let response = cone_response(&state, &config.grid);

        assert!(!response.nodes.is_empty());
        for node in &response.nodes {
            assert!(node.agl > 0.0);
            assert!((node.gl - 0.0).abs() < 1e-12);
            assert!(node.lat >= 47.0 && node.lat <= 48.0);
        }
    }
}

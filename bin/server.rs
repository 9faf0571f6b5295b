// Loan Insight - Web Server
// REST API over the imported dataset, with Axum

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::Datelike;
use loan_insight::{
    aggregate, dashboard, get_all_records, load_statuses, merge, setup_database, AddressResolver,
    AppConfig, BoundaryIndex, Dashboard, DistrictMetric, EnrichedRecord, FilterParams, LoanRecord,
    RecordStore,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

const ADDR_ENV: &str = "LOAN_INSIGHT_ADDR";

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    config: Arc<AppConfig>,
    /// None when the boundary file could not be loaded at startup
    boundaries: Option<Arc<BoundaryIndex>>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(Self {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }
}

fn failure(status: StatusCode, message: String) -> Response {
    tracing::error!(status = status.as_u16(), %message, "request failed");
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(message),
        }),
    )
        .into_response()
}

/// District map payload
#[derive(Serialize)]
struct DistrictsResponse {
    districts: Vec<DistrictMetric>,
    unmatched: usize,
    missing_coordinate: usize,
}

#[derive(Deserialize)]
struct SummaryQuery {
    reference_year: Option<i32>,
}

/// Filtered records from the shared connection
fn load_store(state: &AppState, params: &FilterParams) -> Result<RecordStore, Response> {
    let filter = params
        .to_filter()
        .map_err(|e| failure(StatusCode::BAD_REQUEST, format!("{:#}", e)))?;

    let conn = state
        .db
        .lock()
        .map_err(|_| failure(StatusCode::INTERNAL_SERVER_ERROR, "database lock poisoned".to_string()))?;
    let store = get_all_records(&conn, &state.config.columns)
        .map_err(|e| failure(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)))?;

    Ok(filter.apply(&store))
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    ApiResponse::ok("OK")
}

/// GET /api/summary - Dashboard aggregates
async fn get_summary(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
    Query(query): Query<SummaryQuery>,
) -> Response {
    let store = match load_store(&state, &params) {
        Ok(store) => store,
        Err(response) => return response,
    };

    let reference_year = query
        .reference_year
        .unwrap_or_else(|| chrono::Local::now().year());
    let report: Dashboard = dashboard(store.records(), reference_year, state.config.cohort.century_pivot);

    ApiResponse::ok(report)
}

/// GET /api/districts - Loan totals per district for the map
async fn get_districts(State(state): State<AppState>, Query(params): Query<FilterParams>) -> Response {
    let Some(index) = state.boundaries.clone() else {
        return failure(
            StatusCode::SERVICE_UNAVAILABLE,
            "district boundaries are not loaded".to_string(),
        );
    };

    let store = match load_store(&state, &params) {
        Ok(store) => store,
        Err(response) => return response,
    };

    let resolver = AddressResolver::new(state.config.geo.region.clone());
    let result = aggregate(store.records(), &resolver, &index);

    ApiResponse::ok(DistrictsResponse {
        districts: result.metrics,
        unmatched: result.unmatched,
        missing_coordinate: result.missing_coordinate,
    })
}

/// GET /api/enriched - Records with their stored registry status
async fn get_enriched(State(state): State<AppState>, Query(params): Query<FilterParams>) -> Response {
    let store = match load_store(&state, &params) {
        Ok(store) => store,
        Err(response) => return response,
    };

    let statuses = {
        let conn = match state.db.lock() {
            Ok(conn) => conn,
            Err(_) => {
                return failure(StatusCode::INTERNAL_SERVER_ERROR, "database lock poisoned".to_string())
            }
        };
        match load_statuses(&conn) {
            Ok(statuses) => statuses,
            Err(e) => return failure(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)),
        }
    };

    let enriched: Vec<EnrichedRecord> = merge(store.records(), &statuses);
    ApiResponse::ok(enriched)
}

/// GET /api/banks/:bank/records - Records of one bank
async fn get_bank_records(
    State(state): State<AppState>,
    Path(bank): Path<String>,
    Query(mut params): Query<FilterParams>,
) -> Response {
    // Decode URL-encoded bank name
    let decoded_bank = urlencoding::decode(&bank)
        .unwrap_or_else(|_| bank.clone().into())
        .into_owned();
    params.bank = Some(decoded_bank);

    match load_store(&state, &params) {
        Ok(store) => {
            let records: Vec<LoanRecord> = store.records;
            ApiResponse::ok(records)
        }
        Err(response) => response,
    }
}

fn app(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/summary", get(get_summary))
        .route("/districts", get(get_districts))
        .route("/enriched", get(get_enriched))
        .route("/banks/:bank/records", get(get_bank_records))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("loan_insight=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("🌐 Loan Insight v{} - Web Server", loan_insight::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = AppConfig::load(None)?;

    // Open database
    let db_path = config.database_path.clone();
    if !db_path.exists() {
        eprintln!("❌ Database not found at {:?}", db_path);
        eprintln!("   Run: loan-insight import <CSV>");
        eprintln!("   to import records first.");
        std::process::exit(1);
    }

    let conn = Connection::open(&db_path)?;
    setup_database(&conn)?;
    println!("✓ Database opened: {:?}", db_path);

    let boundaries = match BoundaryIndex::load(&config.geo) {
        Ok(index) => {
            println!("✓ {} district coordinates loaded", index.len());
            Some(Arc::new(index))
        }
        Err(e) => {
            eprintln!("⚠️  District map disabled: {}", e);
            None
        }
    };

    // Create shared state
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        config: Arc::new(config),
        boundaries,
    };

    // Start server
    let addr = std::env::var(ADDR_ENV).unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/summary", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app(state)).await?;
    Ok(())
}

use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Extension, Json, Router,
};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use userpool_core::auth::{ApiKeyGateway, AuthGateway, Caller};
use userpool_core::client::LeasePool;
use userpool_core::config::PoolConfig;
use userpool_core::error::{LeaseError, StoreError};
use userpool_core::reclaimer::SweepReport;
use userpool_core::types::{Criteria, HolderToken, IdentityId};

use crate::handlers::*;

/// Self-reported caller name, recorded on leases for audit
pub const CALLER_HEADER: &str = "x-caller";

#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<LeasePool>,
    pub gateway: Arc<dyn AuthGateway>,
}

type Reply<T> = (StatusCode, Json<ApiResponse<T>>);

pub fn router(state: AppState) -> Router {
    Router::new()
        // Health is always open (no auth)
        .route("/health", get(health))
        .route("/acquire", post(acquire))
        .route("/release", post(release))
        .route("/identities", get(list_identities).post(provision_identity))
        .route("/reclaim", post(reclaim))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(host: &str, port: u16, pool: LeasePool, gateway: ApiKeyGateway) {
    if gateway.is_open() {
        warn!("⚠️  No USERPOOL_API_KEY set — server is open (dev mode)");
    } else {
        info!("🔐 API key authentication enabled");
    }

    let pool = Arc::new(pool);
    let reclaimer = pool.start_reclaimer();
    info!(
        lease_timeout_secs = pool.config().lease_timeout.as_secs(),
        reclaim_interval_secs = pool.config().reclaim_interval.as_secs(),
        "♻️  Reclaimer started"
    );

    let app = router(AppState {
        pool,
        gateway: Arc::new(gateway),
    });

    let addr = format!("{}:{}", host, port);
    info!("🔒 userpool server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    reclaimer.shutdown();
    info!("Server stopped");
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}

// ─── Auth Middleware ────────────────────────────────────────────────────────

async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let headers = request.headers();
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(""));
    let claimed = headers.get(CALLER_HEADER).and_then(|v| v.to_str().ok());

    match state.gateway.verify(bearer, claimed) {
        Ok(caller) => {
            request.extensions_mut().insert(caller);
            Ok(next.run(request).await)
        }
        Err(e) => {
            warn!(path = %request.uri().path(), error = %e, "🚫 Unauthorized request");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

// ─── Error Mapping ──────────────────────────────────────────────────────────

fn status_for(e: &LeaseError) -> StatusCode {
    match e {
        LeaseError::NoAvailableIdentity
        | LeaseError::NotHeldByCaller { .. }
        | LeaseError::Store(StoreError::Duplicate(_)) => StatusCode::CONFLICT,
        LeaseError::NotFound { .. } => StatusCode::NOT_FOUND,
        LeaseError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure<T: serde::Serialize>(e: LeaseError) -> Reply<T> {
    let status = status_for(&e);
    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %e, "Storage failure while serving request");
        "Internal storage error".to_string()
    } else {
        e.to_string()
    };
    (status, Json(ApiResponse::err(e.reason(), message)))
}

fn invalid<T: serde::Serialize>(msg: String) -> Reply<T> {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::err("INVALID_REQUEST", msg)))
}

/// Runs a pool operation off the async executor; stores block on I/O and row locks.
async fn blocking<T, F>(state: &AppState, f: F) -> Result<T, LeaseError>
where
    T: Send + 'static,
    F: FnOnce(&LeasePool) -> Result<T, LeaseError> + Send + 'static,
{
    let pool = state.pool.clone();
    tokio::task::spawn_blocking(move || f(&pool))
        .await
        .map_err(|e| LeaseError::Store(StoreError::Backend(format!("worker task failed: {}", e))))?
}

// ─── Handlers ───────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> Reply<HealthResponse> {
    let lease_timeout_secs = state.pool.config().lease_timeout.as_secs();
    match blocking(&state, |pool| pool.list(&Criteria::any())).await {
        Ok(identities) => {
            let free = identities.iter().filter(|i| i.is_free()).count();
            (
                StatusCode::OK,
                Json(ApiResponse::ok(HealthResponse {
                    status: "ok".to_string(),
                    free,
                    locked: identities.len() - free,
                    lease_timeout_secs,
                    version: env!("CARGO_PKG_VERSION").to_string(),
                })),
            )
        }
        Err(e) => {
            error!(error = %e, "Health check could not read the pool");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::err(e.reason(), "Storage unavailable")),
            )
        }
    }
}

async fn acquire(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<AcquireRequest>,
) -> Reply<GrantResponse> {
    let criteria = match req.criteria() {
        Ok(criteria) => criteria,
        Err(e) => return invalid(e),
    };

    let timeout_ms = state.pool.config().lease_timeout_ms();
    match blocking(&state, move |pool| pool.acquire(&criteria, &caller)).await {
        Ok(grant) => (
            StatusCode::CREATED,
            Json(ApiResponse::ok(GrantResponse::new(&grant, timeout_ms))),
        ),
        Err(e) => failure(e),
    }
}

async fn release(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<ReleaseRequest>,
) -> Reply<IdentityInfo> {
    if let Err(e) = req.validate() {
        return invalid(e);
    }

    let id = IdentityId::from(req.identity_id);
    let token = HolderToken::from(req.holder_token);
    let timeout_ms = state.pool.config().lease_timeout_ms();
    match blocking(&state, move |pool| pool.release(&id, &token, &caller)).await {
        Ok(identity) => (
            StatusCode::OK,
            Json(ApiResponse::ok(IdentityInfo::new(&identity, timeout_ms))),
        ),
        Err(e) => failure(e),
    }
}

async fn list_identities(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Reply<Vec<IdentityInfo>> {
    let criteria = match query.criteria() {
        Ok(criteria) => criteria,
        Err(e) => return invalid(e),
    };

    let timeout_ms = state.pool.config().lease_timeout_ms();
    match blocking(&state, move |pool| pool.list(&criteria)).await {
        Ok(identities) => (
            StatusCode::OK,
            Json(ApiResponse::ok(
                identities.iter().map(|i| IdentityInfo::new(i, timeout_ms)).collect(),
            )),
        ),
        Err(e) => failure(e),
    }
}

async fn provision_identity(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<ProvisionRequest>,
) -> Reply<IdentityInfo> {
    let new = match req.into_new_identity() {
        Ok(new) => new,
        Err(e) => return invalid(e),
    };

    let timeout_ms = state.pool.config().lease_timeout_ms();
    match blocking(&state, move |pool| pool.provision(new)).await {
        Ok(identity) => {
            info!(identity_id = %identity.id, caller = %caller, "Identity added over HTTP");
            (
                StatusCode::CREATED,
                Json(ApiResponse::ok(IdentityInfo::new(&identity, timeout_ms))),
            )
        }
        Err(e) => failure(e),
    }
}

async fn reclaim(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Reply<SweepReport> {
    match blocking(&state, |pool| Ok(pool.reclaim_expired())).await {
        Ok(report) => {
            info!(caller = %caller, reclaimed = report.reclaimed, "Manual reclaim sweep");
            (StatusCode::OK, Json(ApiResponse::ok(report)))
        }
        Err(e) => failure(e),
    }
}

// ─── Storage Backend Selection ──────────────────────────────────────────────

/// Opens the pool named by `storage`: `memory` or `sqlite:<path>`.
pub fn open_pool(storage: &str, config: PoolConfig) -> Result<LeasePool, StoreError> {
    if storage == "memory" {
        info!("💾 Storage backend: in-memory (identities and leases will not persist)");
        return Ok(LeasePool::in_memory(config));
    }

    if let Some(path) = storage.strip_prefix("sqlite:") {
        #[cfg(feature = "sqlite")]
        {
            info!("💾 Storage backend: SQLite ({})", path);
            return LeasePool::with_sqlite(path, config);
        }
        #[cfg(not(feature = "sqlite"))]
        {
            let _ = path;
            return Err(StoreError::Backend(
                "SQLite storage requested but the `sqlite` feature is not enabled".to_string(),
            ));
        }
    }

    Err(StoreError::Backend(format!(
        "Unknown storage backend '{}'. Use 'memory' or 'sqlite:<path>'",
        storage
    )))
}

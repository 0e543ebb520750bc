//! API Handlers
//!
//! HTTP request handlers for each points and leaderboard endpoint.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use crate::cache::{CacheBackend, CacheStore, FileCacheBackend, MemoryCacheBackend};
use crate::clock::{Clock, SystemClock};
use crate::config::{CacheBackendKind, Config};
use crate::context::RequestContext;
use crate::error::{AppError, CacheError, Result};
use crate::leaderboard::{LeaderboardService, LogNotifier, Notifier};
use crate::ledger::{Ledger, LedgerStore, PointTransaction, PointsStats, UserId};
use crate::models::{
    AssignPointsRequest, AssignResponse, CacheStatsResponse, ClearCacheResponse, ContextQuery, HealthResponse,
    HistoryQuery, LeaderboardQuery, PeriodQuery, ResyncResponse, UserRankResponse,
};
use crate::points::PointsService;
use crate::ranking::{LeaderboardEntry, LeaderboardStats, PeriodEntry, UserContext};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub points: Arc<PointsService>,
    pub ledger: Arc<Ledger>,
    pub leaderboard: Arc<LeaderboardService>,
    pub cache: Arc<CacheStore>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Wires the services over the given storage.
    pub fn new(
        store: Arc<dyn LedgerStore>,
        backend: Arc<dyn CacheBackend>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        config: &Config,
    ) -> Self {
        let ledger = Arc::new(Ledger::new(store, clock.clone(), config.active_event_policy));
        let cache = Arc::new(CacheStore::new(backend, clock.clone()));
        let leaderboard = Arc::new(LeaderboardService::new(
            ledger.clone(),
            cache.clone(),
            config.leaderboard.clone(),
        ));
        let points = Arc::new(PointsService::new(ledger.clone(), leaderboard.clone(), notifier));

        Self {
            points,
            ledger,
            leaderboard,
            cache,
            clock,
        }
    }

    /// Creates a new AppState from configuration, on the system clock.
    ///
    /// Fails only if the file cache directory cannot be created.
    pub fn from_config(config: &Config, store: Arc<dyn LedgerStore>) -> std::result::Result<Self, CacheError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let backend: Arc<dyn CacheBackend> = match config.cache_backend {
            CacheBackendKind::Memory => Arc::new(MemoryCacheBackend::new(clock.clone())),
            CacheBackendKind::File => {
                Arc::new(FileCacheBackend::new(config.cache_dir.clone(), clock.clone())?)
            }
        };
        Ok(Self::new(store, backend, clock, Arc::new(LogNotifier), config))
    }
}

/// Runs synchronous service work on the blocking thread pool.
///
/// Anything that reaches the cache goes through here, since the file backend
/// does plain file system I/O.
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| AppError::Internal(format!("Blocking task failed: {}", err)))?
}

/// Handler for POST /points
///
/// A body that is not a JSON object is reported as a single validation
/// message. Fields of the wrong type are reported alongside the ledger checks.
pub async fn assign_points_handler(
    State(state): State<AppState>,
    body: std::result::Result<Json<AssignPointsRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AssignResponse>)> {
    let Json(req) = body.map_err(|rejection| {
        AppError::Validation(vec![format!("Invalid request body: {}", rejection.body_text())])
    })?;
    let (assignment, malformed) = req.into_assignment();
    let ctx = match malformed.assigned_by {
        None => RequestContext::new().with_actor(assignment.assigned_by),
        Some(_) => RequestContext::new(),
    };

    let outcome = run_blocking(move || {
        state
            .points
            .assign_with(&ctx, assignment, malformed)
            .map_err(AppError::from)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(AssignResponse::new(outcome.transaction.id, outcome.rank_changes)),
    ))
}

/// Handler for GET /leaderboard
pub async fn leaderboard_handler(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>> {
    if let Some(error_msg) = query.validate() {
        return Err(AppError::InvalidRequest(error_msg));
    }

    let entries = run_blocking(move || {
        state
            .leaderboard
            .get_leaderboard(query.limit(), query.refresh)
            .map_err(AppError::from)
    })
    .await?;
    Ok(Json(entries))
}

/// Handler for GET /leaderboard/period
pub async fn period_leaderboard_handler(
    State(state): State<AppState>,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<Vec<PeriodEntry>>> {
    if let Some(error_msg) = query.validate() {
        return Err(AppError::InvalidRequest(error_msg));
    }

    let entries = state
        .leaderboard
        .get_leaderboard_for_period(query.start, query.end, query.limit())?;
    Ok(Json(entries))
}

/// Handler for GET /leaderboard/stats
pub async fn leaderboard_stats_handler(
    State(state): State<AppState>,
) -> Result<Json<LeaderboardStats>> {
    let stats = run_blocking(move || {
        state
            .leaderboard
            .get_leaderboard_stats()
            .map_err(AppError::from)
    })
    .await?;
    Ok(Json(stats))
}

/// Handler for GET /users/:id/rank
pub async fn user_rank_handler(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<UserRankResponse>> {
    let rank = run_blocking(move || state.leaderboard.get_user_rank(user_id).map_err(AppError::from))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} has no rank", user_id)))?;

    Ok(Json(UserRankResponse { user_id, rank }))
}

/// Handler for GET /users/:id/context
pub async fn user_context_handler(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Query(query): Query<ContextQuery>,
) -> Result<Json<UserContext>> {
    if let Some(error_msg) = query.validate() {
        return Err(AppError::InvalidRequest(error_msg));
    }

    run_blocking(move || {
        state
            .leaderboard
            .get_user_context(user_id, query.size())
            .map_err(AppError::from)
    })
    .await?
    .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("User {} has no rank", user_id)))
}

/// Handler for GET /users/:id/points
pub async fn user_points_handler(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<PointsStats>> {
    Ok(Json(state.ledger.get_user_points_stats(user_id)?))
}

/// Handler for GET /users/:id/history
pub async fn user_history_handler(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<PointTransaction>>> {
    if let Some(error_msg) = query.validate() {
        return Err(AppError::InvalidRequest(error_msg));
    }

    Ok(Json(state.ledger.user_history(user_id, query.limit())?))
}

/// Handler for POST /users/:id/resync
pub async fn resync_handler(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<ResyncResponse>> {
    let correction = run_blocking(move || {
        state
            .points
            .resync(&RequestContext::new(), user_id)
            .map_err(AppError::from)
    })
    .await?;
    Ok(Json(correction.into()))
}

/// Handler for POST /resync
pub async fn resync_all_handler(State(state): State<AppState>) -> Result<Json<Vec<ResyncResponse>>> {
    let drifted = run_blocking(move || {
        state
            .points
            .resync_all(&RequestContext::new())
            .map_err(AppError::from)
    })
    .await?;
    Ok(Json(drifted.into_iter().map(ResyncResponse::from).collect()))
}

/// Handler for DELETE /cache
pub async fn clear_cache_handler(State(state): State<AppState>) -> Result<Json<ClearCacheResponse>> {
    let removed = run_blocking(move || Ok(state.leaderboard.clear_cache())).await?;
    info!(removed, "Cache cleared via API");
    Ok(Json(ClearCacheResponse::new(removed)))
}

/// Handler for GET /cache/stats
pub async fn cache_stats_handler(State(state): State<AppState>) -> Result<Json<CacheStatsResponse>> {
    let stats = run_blocking(move || Ok(state.cache.stats())).await?;
    Ok(Json(stats.into()))
}

/// Handler for GET /health
///
/// Reports healthy even when the ledger cannot be reached; `active_event`
/// is then false.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let active_event = state.ledger.has_active_event().unwrap_or(false);
    Json(HealthResponse::healthy(active_event, state.clock.now()))
}

//! API Routes
//!
//! Configures the Axum router with all points and leaderboard endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    assign_points_handler, cache_stats_handler, clear_cache_handler, health_handler,
    leaderboard_handler, leaderboard_stats_handler, period_leaderboard_handler, resync_all_handler,
    resync_handler,
    user_context_handler, user_history_handler, user_points_handler, user_rank_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `POST /points` - Assign points to a user
/// - `GET /leaderboard` - Top users, `?limit=&refresh=`
/// - `GET /leaderboard/period` - Ranking inside `?start=&end=`
/// - `GET /leaderboard/stats` - Dashboard aggregates
/// - `GET /users/:id/rank` - One user's rank
/// - `GET /users/:id/context` - Neighbours around a user, `?size=`
/// - `GET /users/:id/points` - Points breakdown
/// - `GET /users/:id/history` - Recent transactions, `?limit=`
/// - `POST /users/:id/resync` - Reconcile a stored balance
/// - `POST /resync` - Reconcile every balance, listing corrections
/// - `DELETE /cache` - Clear leaderboard caches
/// - `GET /cache/stats` - Cache counters
/// - `GET /health` - Health check endpoint
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/points", post(assign_points_handler))
        .route("/leaderboard", get(leaderboard_handler))
        .route("/leaderboard/period", get(period_leaderboard_handler))
        .route("/leaderboard/stats", get(leaderboard_stats_handler))
        .route("/users/:id/rank", get(user_rank_handler))
        .route("/users/:id/context", get(user_context_handler))
        .route("/users/:id/points", get(user_points_handler))
        .route("/users/:id/history", get(user_history_handler))
        .route("/users/:id/resync", post(resync_handler))
        .route("/resync", post(resync_all_handler))
        .route("/cache", delete(clear_cache_handler))
        .route("/cache/stats", get(cache_stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheBackend;
    use crate::clock::SystemClock;
    use crate::config::Config;
    use crate::leaderboard::LogNotifier;
    use crate::ledger::{MemoryLedgerStore, Role, User, UserId};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::util::ServiceExt;

    fn create_test_app() -> Router {
        let store = Arc::new(MemoryLedgerStore::new());
        store.insert_user(User {
            id: UserId(1),
            nickname: "ana".to_string(),
            role: Role::Player,
            total_points: 0,
        });
        let clock = Arc::new(SystemClock);
        let state = AppState::new(
            store,
            Arc::new(MemoryCacheBackend::new(clock.clone())),
            clock,
            Arc::new(LogNotifier),
            &Config::default(),
        );
        create_router(state)
    }

    async fn status_of(app: Router, method: &str, uri: &str) -> StatusCode {
        app.oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
        .status()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        assert_eq!(status_of(create_test_app(), "GET", "/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_leaderboard_endpoint() {
        assert_eq!(
            status_of(create_test_app(), "GET", "/leaderboard?limit=5").await,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_leaderboard_bad_limit() {
        assert_eq!(
            status_of(create_test_app(), "GET", "/leaderboard?limit=0").await,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_rank_not_found() {
        assert_eq!(
            status_of(create_test_app(), "GET", "/users/1/rank").await,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_unknown_user_points() {
        assert_eq!(
            status_of(create_test_app(), "GET", "/users/404/points").await,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_clear_cache_endpoint() {
        assert_eq!(status_of(create_test_app(), "DELETE", "/cache").await, StatusCode::OK);
    }
}

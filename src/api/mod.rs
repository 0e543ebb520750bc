//! API Module
//!
//! HTTP handlers and routing for the points and leaderboard REST API.
//!
//! # Endpoints
//! - `POST /points` - Assign points
//! - `GET /leaderboard`, `/leaderboard/period`, `/leaderboard/stats` - Rankings
//! - `GET /users/:id/{rank,context,points,history}` - Per-user views
//! - `POST /users/:id/resync`, `POST /resync` - Balance reconciliation
//! - `DELETE /cache`, `GET /cache/stats` - Cache administration
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;

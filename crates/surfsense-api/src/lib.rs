//! SurfSense HTTP API Server
//!
//! The HTTP surface run inside the supervisor process:
//! - Service metadata and health endpoints
//! - Submission of background tasks to the shared queue
//! - Queue statistics

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;

use axum::Router;

pub use error::ApiError;
pub use server::HttpServer;
pub use state::AppState;

pub fn create_app(state: AppState) -> Router {
    routes::create_router(state)
}

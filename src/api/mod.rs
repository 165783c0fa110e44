//! HTTP API Handlers and Routes
//!
//! The REST surface of Wayfinder, built on the Axum web framework.
//!
//! # Module Structure
//!
//! - [`api::handlers`](crate::api::handlers) - Request handlers for each endpoint
//! - [`api::routes`](crate::api::routes) - Route definitions and router configuration
//!
//! # API Endpoints
//!
//! ## Runs (`/api/runs`)
//! - `POST /api/runs` - Advance a run with the full conversation so far
//! - `POST /api/runs/{id}/faq` - Ask a follow-up question about a completed run
//!
//! ## Health (`/api/health`)
//! - `GET /api/health` - Health check endpoint
//!
//! A client that disconnects while a run is in flight cancels that run.

/// Request and response handlers for all API endpoints.
pub mod handlers;
/// Router configuration and route definitions.
pub mod routes;

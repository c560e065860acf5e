//! # Kirana API
//! HTTP control surface for the campaign engine. The dashboard drives
//! campaigns entirely through these endpoints; dispatch itself happens
//! on the orchestrator tick, never inside a request handler.

pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};

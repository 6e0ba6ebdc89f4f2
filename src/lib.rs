//! # session-gateway
//!
//! User service demonstrating read/write replica routing and
//! request-scoped SQL tracing on top of `sqlx`.
//!
//! Every inbound request gets a [`context::RequestContext`] with a fresh
//! trace id. Repository calls route writes to the primary and spread reads
//! across the replicas; each statement is traced with the request's id,
//! the chosen route, elapsed time and row count.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP)
//!     │
//!     ├── REST Handlers (api/)
//!     │
//!     ├── UserRepository (repository/)
//!     │
//!     ├── ReplicaRouter + SqlLogger (db/)
//!     │
//!     └── Database: primary + replica pools (db/pool)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod repository;

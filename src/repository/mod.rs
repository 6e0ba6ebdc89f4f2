//! Repository layer: intent-level operations over persisted entities.
//!
//! Repositories are bound to one [`crate::context::RequestContext`] and a
//! [`crate::db::Database`] handle. Each call takes a [`crate::db::Session`]
//! deciding whether it runs on its own or inside the caller's transaction.

pub mod user;

pub use user::UserRepository;

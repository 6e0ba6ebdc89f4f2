//! Data Transfer Objects for REST response serialization.

pub mod user_dto;

pub use user_dto::*;

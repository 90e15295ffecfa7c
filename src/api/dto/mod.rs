//! Data Transfer Objects for REST request/response serialization.

pub mod pool_dto;

pub use pool_dto::*;

//! HTTP middleware: request ID and upstream credential resolution.

pub mod auth;
pub mod request_id;

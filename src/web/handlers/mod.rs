//! # Request Handlers
//!
//! - [`health`] - liveness and readiness probes
//! - [`pages`] - server-rendered pages

pub mod health;
pub mod pages;

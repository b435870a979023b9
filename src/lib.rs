//! GitHub Responder - temporary GitHub webhook endpoints
//!
//! This crate registers a webhook on a repository, serves the deliveries it
//! sends (over TLS with certificates obtained automatically via ACME),
//! verifies their signatures, and hands them to a caller-supplied handler.
//! The webhook is deleted again when the session is cleaned up.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

//! paywatch - follow a payment over a resilient Server-Sent Events stream
//!
//! This library exposes modules for use by the binary and integration tests.

pub mod adapters;
pub mod api;
pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod models;
pub mod session;
pub mod sse;
pub mod traits;

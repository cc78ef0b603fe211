//! Trait abstractions for dependency injection and testability.
//!
//! # Traits
//!
//! - [`HttpClient`] - HTTP operations (GET, POST, streaming GET)
//! - [`StreamConsumer`] - Receiver of classified stream events

pub mod consumer;
pub mod http;

pub use consumer::StreamConsumer;
pub use http::{ByteStream, Headers, HttpClient, HttpError, Response};

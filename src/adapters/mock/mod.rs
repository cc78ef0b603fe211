//! Mock implementations for testing.
//!
//! # Available Mocks
//!
//! - [`MockHttpClient`] - HTTP client with canned responses and scripted
//!   event streams

pub mod http;

pub use http::{MockHttpClient, MockResponse, MockStreamHandle, RecordedRequest};

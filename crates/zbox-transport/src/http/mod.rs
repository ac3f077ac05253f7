//! HTTP transport module
//!
//! reqwest-backed implementation of [`HttpGet`](crate::HttpGet).

pub mod client;

pub use client::{HttpClient, HttpClientConfig};

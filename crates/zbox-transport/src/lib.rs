//! # zbox-transport
//!
//! The HTTP GET capability the quorum reader is built on.
//!
//! [`HttpGet`] is the seam: the reader only ever asks for a URL and gets back
//! a status line and a body. [`http::HttpClient`] is the reqwest-backed
//! implementation; tests substitute in-memory mocks.

pub mod error;
pub mod types;

#[cfg(feature = "http")]
pub mod http;

pub use error::{TransportError, TransportResult};
pub use types::{GetResponse, HttpGet};

#[cfg(feature = "http")]
pub use http::{HttpClient, HttpClientConfig};

//! Request/response types shared by every GET implementation

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TransportResult;

/// A completed GET: whatever status the replica answered with, and its body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResponse {
    pub url: String,
    pub status_code: u16,
    /// Status line, e.g. "200 OK"
    pub status: String,
    pub body: String,
}

impl GetResponse {
    pub fn new(url: impl Into<String>, status_code: u16, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status_code,
            status: status_code.to_string(),
            body: body.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status_code == 200
    }
}

/// Basic HTTP GET capability.
///
/// Non-2xx answers are not errors here: they come back as a [`GetResponse`]
/// so callers can count them. Only failures to get any answer are errors.
#[async_trait]
pub trait HttpGet: Send + Sync {
    async fn get(&self, url: &str) -> TransportResult<GetResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_response_ok_only_for_200() {
        assert!(GetResponse::new("http://a", 200, "{}").is_ok());
        assert!(!GetResponse::new("http://a", 204, "").is_ok());
        assert!(!GetResponse::new("http://a", 500, "boom").is_ok());
        assert_eq!(GetResponse::new("http://a", 404, "").status, "404");
    }
}

//! The search-node collaborator boundary.
//!
//! The coordinator never talks to an index directly; it goes through a
//! [`SearchBackend`], which turns a `(locator, query, limit, offset)` tuple
//! into a [`SearchReply`] or a [`NodeError`]. The locator string is opaque to
//! the coordinator — only the backend interprets it.
//!
//! One production implementation ships here: [`HttpBackend`], which treats
//! the locator as a base URL and speaks JSON over HTTP. Tests supply scripted
//! in-memory backends instead.

use std::future::Future;

use crate::error::NodeError;
use crate::model::SearchReply;

/// Pluggable client for one node's search engine.
///
/// Implementations must be cheap to share (`&self` methods, `Send + Sync`)
/// because one instance serves every node and every concurrent search. The
/// per-attempt timeout is enforced by the coordinator around the returned
/// future, so implementations do not need their own deadline handling.
pub trait SearchBackend: Send + Sync + 'static {
    /// Execute `query` against the node at `locator`.
    fn search(
        &self,
        locator: &str,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> impl Future<Output = Result<SearchReply, NodeError>> + Send;
}

/// HTTP/JSON implementation of [`SearchBackend`].
///
/// Interprets the locator as a base URL and issues
/// `GET {locator}/search?q=...&limit=...&offset=...`, expecting a
/// [`SearchReply`] JSON body. All failures — including client-level timeouts
/// — surface as [`NodeError::Transport`]; the attempt budget belongs to the
/// coordinator.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
        })
    }

    /// Build on an existing client (connection pool reuse).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl SearchBackend for HttpBackend {
    async fn search(
        &self,
        locator: &str,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<SearchReply, NodeError> {
        let url = format!("{}/search", locator.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", query.to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ])
            .send()
            .await
            .map_err(|e| NodeError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| NodeError::Transport(e.to_string()))?;

        response
            .json::<SearchReply>()
            .await
            .map_err(|e| NodeError::Transport(format!("invalid reply: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn http_backend_reports_bad_locator_as_transport() {
        let backend = HttpBackend::new().unwrap();
        let err = backend
            .search("not a base url", "q", 10, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Transport(_)));
    }

    #[tokio::test]
    async fn http_backend_reports_unreachable_as_transport() {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_millis(100))
            .build()
            .unwrap();
        let backend = HttpBackend::with_client(client);
        // Reserved TEST-NET address; nothing listens there.
        let err = backend
            .search("http://192.0.2.1:9", "q", 10, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Transport(_)));
    }
}

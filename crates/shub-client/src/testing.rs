//! Fake Scrapinghub API for tests
//!
//! [`TestServer`] serves an axum router on an ephemeral local port under
//! `/api`, the path the real API lives at, and hands out a [`ShubClient`]
//! already pointed at it and authenticated with [`TEST_API_KEY`]. Handlers
//! receive the same `offset`/`count` parameters and basic-auth header the
//! real endpoints see.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use url::Url;

use crate::streaming::StreamConfig;
use crate::{Result, ShubClient};

/// API key the test client authenticates with
pub const TEST_API_KEY: &str = "test-apikey";

/// `Authorization` header the server sees for [`TEST_API_KEY`]
pub const TEST_AUTHORIZATION: &str = "Basic dGVzdC1hcGlrZXk6";

/// Retry pause used by test clients, so retry paths finish quickly
pub const TEST_RETRY_INTERVAL: Duration = Duration::from_millis(10);

const TEST_TIMEOUT: Duration = Duration::from_secs(5);
const TEST_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Stream settings of a fresh test client
pub fn test_stream_config() -> StreamConfig {
    StreamConfig {
        retry_interval: TEST_RETRY_INTERVAL,
        ..StreamConfig::default()
    }
}

/// A fake API server that shuts down when dropped
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: ShubClient,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Serve `router` as the API root
    ///
    /// Routes are named after API resources (`/items.jl`, `/jobs/list.json`);
    /// the client uses [`test_stream_config`].
    ///
    /// # Example
    ///
    /// ```ignore
    /// use axum::{routing::get, Router};
    /// use shub_client::testing::TestServer;
    ///
    /// let router = Router::new().route("/log.txt", get(|| async { "line 1\nline 2\n" }));
    /// let server = TestServer::start(router).await?;
    ///
    /// let log = server.client.log_lines("1/2/3", StreamWindow::unbounded())?;
    /// ```
    pub async fn start<S>(router: axum::Router<S>) -> Result<Self>
    where
        S: Clone + Send + Sync + 'static,
        axum::Router<S>: Into<axum::Router>,
    {
        Self::start_with_stream_config(router, test_stream_config()).await
    }

    /// Serve `router` with a client using `config` for its streams
    pub async fn start_with_stream_config<S>(
        router: axum::Router<S>,
        config: StreamConfig,
    ) -> Result<Self>
    where
        S: Clone + Send + Sync + 'static,
        axum::Router<S>: Into<axum::Router>,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let api: axum::Router = axum::Router::new().nest("/api", router.into());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            axum::serve(listener, api)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        let client = ShubClient::with_config(
            &api_root(addr),
            TEST_API_KEY,
            TEST_TIMEOUT,
            TEST_CONNECT_TIMEOUT,
        )?
        .with_stream_config(config);

        Ok(Self {
            addr,
            client,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// API root the client talks to
    pub fn base_url(&self) -> String {
        api_root(self.addr)
    }

    /// Full URL of `resource` on this server
    pub fn resource_url(&self, resource: &str) -> Result<Url> {
        self.client.endpoint(resource)
    }

    /// Replace the stream settings of the server's client
    pub fn set_stream_config(&mut self, config: StreamConfig) {
        self.client = self.client.clone().with_stream_config(config);
    }

    pub fn client(&self) -> &ShubClient {
        &self.client
    }

    /// Stop accepting requests and wait for the server task
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

fn api_root(addr: SocketAddr) -> String {
    format!("http://{}/api/", addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StreamWindow;

    use axum::http::HeaderMap;
    use axum::routing::get;

    #[test]
    fn test_api_root_format() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        assert_eq!(api_root(addr), "http://127.0.0.1:8080/api/");
    }

    #[tokio::test]
    async fn test_client_reaches_routes_under_api() {
        async fn log(headers: HeaderMap) -> String {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            format!("{}\nsecond\n", auth)
        }

        let server = TestServer::start(axum::Router::new().route("/log.txt", get(log)))
            .await
            .unwrap();
        assert_eq!(
            server.resource_url("log.txt").unwrap().as_str(),
            format!("{}log.txt", server.base_url())
        );
        assert_eq!(server.client().stream_config(), &test_stream_config());

        let (lines, progress) = server
            .client
            .log_lines("1/2/3", StreamWindow::unbounded())
            .unwrap()
            .read_all()
            .await
            .unwrap();
        assert_eq!(lines, vec![TEST_AUTHORIZATION.to_string(), "second".to_string()]);
        assert_eq!(progress.offset, 2);

        server.shutdown().await;
    }
}

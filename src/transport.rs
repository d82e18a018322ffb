//! The network seam.
//!
//! The engine never opens sockets itself: every request of a funnel goes
//! through a [`Transport`]. [`HttpTransport`] is the reqwest-backed
//! implementation used by the binary; tests script their own.

use std::{fmt, future::Future, time::Duration};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Failure, Result};

/// HTTP methods the storefront funnels use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

impl From<Method> for reqwest::Method {
    fn from(value: Method) -> Self {
        match value {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// What came back over the wire, before any validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Issues one request and hands back status and body.
///
/// Implementations are owned by a single session, so any per-visitor state
/// (cookies, auth headers) belongs inside the implementation.
pub trait Transport: Send + Sync {
    /// Send `method path` with an optional JSON body.
    ///
    /// Only connection-level problems are errors; any HTTP status is a
    /// successful transport round trip.
    fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> impl Future<Output = std::result::Result<RawResponse, Failure>> + Send;
}

/// reqwest-backed transport with its own cookie jar.
///
/// Build one per session: the login side effect of the storefront is a
/// session cookie, and sharing a jar would leak authentication between
/// simulated visitors.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Transport for HttpTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> std::result::Result<RawResponse, Failure> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method.into(), url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Failure::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| Failure::Transport(e.to_string()))?;

        Ok(RawResponse::new(status, body.to_vec()))
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! A scripted in-memory transport for engine tests.

    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct Sent {
        pub method: Method,
        pub path: String,
        pub body: Option<Value>,
    }

    enum Reply {
        Respond(RawResponse),
        Drop,
    }

    struct Route {
        method: Method,
        /// Exact path, or a prefix when it ends with `*`.
        path: String,
        reply: Reply,
    }

    impl Route {
        fn matches(&self, method: Method, path: &str) -> bool {
            if self.method != method {
                return false;
            }
            match self.path.strip_suffix('*') {
                Some(prefix) => path.starts_with(prefix),
                None => self.path == path,
            }
        }
    }

    /// Unrouted requests get `200` with an empty body.
    #[derive(Default)]
    pub(crate) struct MockTransport {
        routes: Vec<Route>,
        sent: Mutex<Vec<Sent>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on(mut self, method: Method, path: &str, status: u16, body: &str) -> Self {
            self.routes.push(Route {
                method,
                path: path.to_string(),
                reply: Reply::Respond(RawResponse::new(status, body.as_bytes().to_vec())),
            });
            self
        }

        pub fn json(self, method: Method, path: &str, status: u16, body: Value) -> Self {
            let body = body.to_string();
            self.on(method, path, status, &body)
        }

        pub fn unreachable(mut self, method: Method, path: &str) -> Self {
            self.routes.push(Route {
                method,
                path: path.to_string(),
                reply: Reply::Drop,
            });
            self
        }

        pub fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        pub fn paths(&self) -> Vec<String> {
            self.sent().into_iter().map(|s| s.path).collect()
        }
    }

    impl Transport for MockTransport {
        async fn request(
            &self,
            method: Method,
            path: &str,
            body: Option<&Value>,
        ) -> std::result::Result<RawResponse, Failure> {
            self.sent.lock().unwrap().push(Sent {
                method,
                path: path.to_string(),
                body: body.cloned(),
            });

            match self.routes.iter().find(|r| r.matches(method, path)) {
                Some(Route {
                    reply: Reply::Respond(response),
                    ..
                }) => Ok(response.clone()),
                Some(Route {
                    reply: Reply::Drop, ..
                }) => Err(Failure::Transport("connection refused".to_string())),
                None => Ok(RawResponse::new(200, Vec::new())),
            }
        }
    }
}

//! HTTP plumbing for the smart protocol: the transport contract the
//! host supplies, request/response descriptors, authentication header
//! injection, and deadline handling.
//!
//! The engine never opens sockets; it emits request descriptors and
//! consumes response bodies through [`HttpTransport`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::errors::GitError;

/// Body stream produced by a transport.
pub type BodyStream =
    std::pin::Pin<Box<dyn futures::Stream<Item = Result<Bytes, GitError>> + Send>>;

/// Request descriptor handed to the host transport.
pub struct HttpRequest {
    pub method: &'static str,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

/// Response surface consumed by the engine.
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: BodyStream,
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl HttpResponse {
    /// Header lookup, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Drain the body stream into one buffer.
    pub async fn collect_body(self) -> Result<Bytes, GitError> {
        let mut out = BytesMut::new();
        let mut body = self.body;
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out.freeze())
    }
}

/// A single-chunk body, for transports and tests that buffer.
pub fn body_from_bytes(bytes: Bytes) -> BodyStream {
    Box::pin(futures::stream::once(async move { Ok(bytes) }))
}

/// The host's HTTP primitive. Implementations surface cross-origin
/// rejections as `Cors` and transport failures as `NetworkError`.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, GitError>;
}

/// How requests authenticate.
#[derive(Clone, Default)]
pub enum AuthScheme {
    #[default]
    None,
    /// `Authorization: Basic <b64(user:pass)>`.
    Basic { username: String, password: String },
    /// `Authorization: Bearer <token>`.
    Bearer { token: String },
    /// Caller-provided header set, passed through verbatim.
    Headers(Vec<(String, String)>),
}

/// Host-supplied credential callback invoked on 401 before one retry.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<AuthScheme, GitError>;
}

const B64_ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Standard base64 for the Basic credential pair.
fn base64_encode(input: &[u8]) -> String {
    let mut out = String::with_capacity(input.len().div_ceil(3) * 4);
    for chunk in input.chunks(3) {
        let b = [
            chunk[0],
            chunk.get(1).copied().unwrap_or(0),
            chunk.get(2).copied().unwrap_or(0),
        ];
        let n = ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | b[2] as u32;
        out.push(B64_ALPHABET[(n >> 18) as usize & 63] as char);
        out.push(B64_ALPHABET[(n >> 12) as usize & 63] as char);
        out.push(if chunk.len() > 1 {
            B64_ALPHABET[(n >> 6) as usize & 63] as char
        } else {
            '='
        });
        out.push(if chunk.len() > 2 {
            B64_ALPHABET[n as usize & 63] as char
        } else {
            '='
        });
    }
    out
}

impl AuthScheme {
    /// Headers this scheme contributes to a request.
    pub fn headers(&self) -> Vec<(String, String)> {
        match self {
            AuthScheme::None => Vec::new(),
            AuthScheme::Basic { username, password } => {
                let encoded = base64_encode(format!("{username}:{password}").as_bytes());
                vec![("Authorization".to_string(), format!("Basic {encoded}"))]
            }
            AuthScheme::Bearer { token } => {
                vec![("Authorization".to_string(), format!("Bearer {token}"))]
            }
            AuthScheme::Headers(headers) => headers.clone(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, AuthScheme::None)
    }
}

/// Transport wrapper that injects auth headers, enforces the
/// per-request deadline, observes cancellation, and performs the single
/// 401 → credential-callback → retry round.
pub struct AuthedTransport {
    transport: Arc<dyn HttpTransport>,
    auth: AuthScheme,
    resolver: Option<Arc<dyn CredentialResolver>>,
    request_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl AuthedTransport {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        auth: AuthScheme,
        resolver: Option<Arc<dyn CredentialResolver>>,
        request_timeout: Option<Duration>,
        cancel: CancellationToken,
    ) -> AuthedTransport {
        AuthedTransport {
            transport,
            auth,
            resolver,
            request_timeout,
            cancel,
        }
    }

    async fn send_once(
        &self,
        method: &'static str,
        url: &str,
        headers: &[(String, String)],
        body: Option<Bytes>,
        auth: &AuthScheme,
    ) -> Result<HttpResponse, GitError> {
        if self.cancel.is_cancelled() {
            return Err(GitError::Cancelled);
        }
        let mut all_headers = headers.to_vec();
        all_headers.extend(auth.headers());
        let request = HttpRequest {
            method,
            url: url.to_string(),
            headers: all_headers,
            body,
        };

        let send = self.transport.send(request);
        let response = match self.request_timeout {
            Some(deadline) => tokio::time::timeout(deadline, send)
                .await
                .map_err(|_| GitError::NetworkTimeout(format!("{method} {url}")))??,
            None => send.await?,
        };
        Ok(response)
    }

    /// Send with the 401 retry contract: an unauthorized response
    /// triggers the credential resolver once; a second 401 is
    /// `AuthFailed`; 401 without a resolver or credentials is
    /// `AuthRequired`.
    pub async fn send(
        &self,
        method: &'static str,
        url: &str,
        headers: &[(String, String)],
        body: Option<Bytes>,
    ) -> Result<HttpResponse, GitError> {
        let response = self
            .send_once(method, url, headers, body.clone(), &self.auth)
            .await?;
        if response.status != 401 {
            return check_status(response, url);
        }

        let Some(resolver) = &self.resolver else {
            return if self.auth.is_none() {
                Err(GitError::AuthRequired(url.to_string()))
            } else {
                Err(GitError::AuthFailed(url.to_string()))
            };
        };

        tracing::debug!(url, "retrying request with resolved credentials");
        let refreshed = resolver.resolve(url).await?;
        let response = self
            .send_once(method, url, headers, body, &refreshed)
            .await?;
        if response.status == 401 {
            return Err(GitError::AuthFailed(url.to_string()));
        }
        check_status(response, url)
    }
}

fn check_status(response: HttpResponse, url: &str) -> Result<HttpResponse, GitError> {
    match response.status {
        200 => Ok(response),
        403 => Err(GitError::AuthFailed(format!("{url}: forbidden"))),
        404 => Err(GitError::NotFound(format!("remote repository at {url}"))),
        status => Err(GitError::ProtocolError(format!(
            "{url} answered HTTP {status}"
        ))),
    }
}

// Forwarding engine
//
// Rebuilds an inbound request against a backend URL and relays the backend's
// answer. Bodies are never materialized: both directions run through a
// bounded copy loop, so memory per call stays at a few copy buffers however
// large the payload is.

use std::fmt::Display;
use std::io;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Response};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, warn};
use url::Url;

use crate::error::{AppError, AppResult};

/// Largest chunk handed to the peer in one write
pub const STREAM_COPY_BUFFER_SIZE: usize = 81920;

/// Chunks allowed in flight between the reader and the writer
const STREAM_COPY_DEPTH: usize = 2;

type Chunk = Result<Bytes, io::Error>;

/// Fires when the client connection that issued a request goes away.
#[derive(Debug, Clone, Default)]
pub struct ClientGone {
    rx: Option<watch::Receiver<bool>>,
}

impl ClientGone {
    /// Signal plus the sender that fires it. Dropping the sender fires it too.
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx: Some(rx) })
    }

    /// A signal that never fires
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_gone(&self) -> bool {
        match &self.rx {
            Some(rx) => *rx.borrow() || rx.has_changed().is_err(),
            None => false,
        }
    }

    /// Resolves once the client is gone
    pub async fn wait(&mut self) {
        match &mut self.rx {
            Some(rx) => {
                // Err means the sender was dropped with the connection
                let _ = rx.wait_for(|gone| *gone).await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

/// How a body copy loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    Completed { bytes: u64 },
    /// The receiving side or the client went away first
    Cancelled { bytes: u64 },
    /// The sending side failed mid-body
    Failed { bytes: u64, error: String },
}

/// A relayed response whose body is still being copied
pub struct Forwarded {
    pub response: Response<Body>,
    /// Completes when the response body copy loop ends
    pub copy: JoinHandle<CopyOutcome>,
}

/// Methods whose requests never carry a body
pub fn is_bodiless(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::DELETE | Method::TRACE
    )
}

/// Headers that describe the body rather than the message
pub fn is_body_header(name: &HeaderName) -> bool {
    name == header::TRANSFER_ENCODING || name.as_str().starts_with("content-")
}

/// `host[:port]` of a URL, port omitted when it is the scheme default
pub fn authority_of(url: &Url) -> AppResult<String> {
    let host = url
        .host_str()
        .ok_or_else(|| AppError::Config(format!("Destination has no host: {}", url)))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Copy inbound headers for the outbound call and point `Host` at the backend.
pub fn outbound_headers(
    inbound: &HeaderMap,
    with_body: bool,
    destination: &Url,
) -> AppResult<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound.iter() {
        // body headers ride along with the body; without one they have nothing to describe
        if !with_body && is_body_header(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    let authority = authority_of(destination)?;
    let host = HeaderValue::from_str(&authority)
        .map_err(|e| AppError::Config(format!("Invalid destination authority {}: {}", authority, e)))?;
    headers.insert(header::HOST, host);
    Ok(headers)
}

/// Backend headers as the client will see them.
pub fn client_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = upstream.clone();
    // The transport already undid the chunked framing
    headers.remove(header::TRANSFER_ENCODING);
    headers
}

/// Forward `inbound` to `destination` through `client`.
///
/// Returns once the backend's status line and headers have arrived; the body
/// keeps streaming through the returned response.
pub async fn forward(
    client: &reqwest::Client,
    inbound: Request,
    destination: &Url,
    mut gone: ClientGone,
) -> AppResult<Forwarded> {
    let (parts, body) = inbound.into_parts();
    let with_body = !is_bodiless(&parts.method);
    let headers = outbound_headers(&parts.headers, with_body, destination)?;

    let mut outbound = client
        .request(parts.method.clone(), destination.clone())
        .headers(headers);
    if with_body {
        let (tx, rx) = mpsc::channel::<Chunk>(STREAM_COPY_DEPTH);
        tokio::spawn(copy_body(body.into_data_stream(), tx, gone.clone()));
        outbound = outbound.body(reqwest::Body::wrap_stream(ReceiverStream::new(rx)));
    }

    debug!("Forwarding {} to {}", parts.method, destination);

    let upstream = tokio::select! {
        biased;
        _ = gone.wait() => {
            debug!("Client left before {} answered", destination);
            return Err(AppError::Cancelled);
        }
        result = outbound.send() => result,
    };

    let upstream = match upstream {
        Ok(response) => response,
        Err(_) if gone.is_gone() => return Err(AppError::Cancelled),
        Err(e) => {
            error!("Failed to reach {}: {}", destination, e);
            return Err(AppError::UpstreamUnreachable(e.to_string()));
        }
    };

    let status = upstream.status();
    let headers = client_headers(upstream.headers());

    let (tx, rx) = mpsc::channel::<Chunk>(STREAM_COPY_DEPTH);
    let target = destination.to_string();
    let copy = tokio::spawn(async move {
        let outcome = copy_body(upstream.bytes_stream(), tx, gone).await;
        match &outcome {
            CopyOutcome::Completed { bytes } => debug!("Relayed {} bytes from {}", bytes, target),
            CopyOutcome::Cancelled { bytes } => {
                debug!("Client left after {} bytes from {}", bytes, target)
            }
            CopyOutcome::Failed { bytes, error } => {
                warn!("Body from {} broke after {} bytes: {}", target, bytes, error)
            }
        }
        outcome
    });

    let mut response = Response::new(Body::from_stream(ReceiverStream::new(rx)));
    *response.status_mut() = status;
    *response.headers_mut() = headers;

    Ok(Forwarded { response, copy })
}

/// Copy `source` into `sink` one bounded chunk at a time until EOF, failure,
/// or until the receiver or the client goes away.
pub async fn copy_body<S, E>(
    source: S,
    sink: mpsc::Sender<Chunk>,
    mut gone: ClientGone,
) -> CopyOutcome
where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: Display,
{
    let mut source = Box::pin(source);
    let mut copied: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            _ = gone.wait() => return CopyOutcome::Cancelled { bytes: copied },
            _ = sink.closed() => return CopyOutcome::Cancelled { bytes: copied },
            next = source.next() => next,
        };

        let mut chunk = match next {
            None => return CopyOutcome::Completed { bytes: copied },
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => {
                let error = e.to_string();
                // Surface the break so the peer sees a truncated body, not a clean end
                let _ = sink
                    .send(Err(io::Error::new(io::ErrorKind::Other, error.clone())))
                    .await;
                return CopyOutcome::Failed {
                    bytes: copied,
                    error,
                };
            }
        };

        while !chunk.is_empty() {
            let piece = chunk.split_to(chunk.len().min(STREAM_COPY_BUFFER_SIZE));
            let len = piece.len() as u64;
            let sent = tokio::select! {
                biased;
                _ = gone.wait() => false,
                result = sink.send(Ok(piece)) => result.is_ok(),
            };
            if !sent {
                return CopyOutcome::Cancelled { bytes: copied };
            }
            copied += len;
        }
    }
}

use bytes::Bytes;
use http::uri::Uri;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper::header;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::TransportError;

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// Host, port and path prefix of the backend, parsed from the base URL once
/// at session setup.
#[derive(Debug, Clone)]
pub(crate) struct Endpoint {
    host: String,
    port: u16,
    path_prefix: String,
}

impl Endpoint {
    pub(crate) fn from_base_url(base_url: &str) -> Result<Self, TransportError> {
        let uri: Uri = base_url
            .parse()
            .map_err(|_| TransportError::InvalidBaseUrl(base_url.to_string()))?;

        if uri.scheme_str() != Some("http") {
            return Err(TransportError::InvalidBaseUrl(base_url.to_string()));
        }

        let host = uri
            .host()
            .ok_or_else(|| TransportError::InvalidBaseUrl(base_url.to_string()))?
            .to_string();
        let port = uri.port_u16().unwrap_or(80);
        let path_prefix = uri.path().trim_end_matches('/').to_string();

        Ok(Self {
            host,
            port,
            path_prefix,
        })
    }

    /// Value for the `Host` header.
    fn authority(&self) -> String {
        if self.port == 80 {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Request path with the base URL's path prefix applied.
    pub(crate) fn request_path(&self, path: &str) -> String {
        format!("{}{}", self.path_prefix, path)
    }
}

// ---------------------------------------------------------------------------
// One-connection-per-request HTTP/1 client
// ---------------------------------------------------------------------------

async fn dial(endpoint: &Endpoint) -> Result<TokioIo<TcpStream>, TransportError> {
    let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
        .await
        .map_err(TransportError::Connect)?;
    Ok(TokioIo::new(stream))
}

/// POST a JSON body and collect the whole response.
pub(crate) async fn post_json(
    endpoint: &Endpoint,
    path: &str,
    body: String,
) -> Result<(StatusCode, Bytes), TransportError> {
    let io = dial(endpoint).await?;
    let (mut sender, conn) = http1::handshake(io)
        .await
        .map_err(TransportError::Handshake)?;

    tokio::task::spawn(async move {
        if let Err(err) = conn.await {
            debug!("client connection ended: {}", err);
        }
    });

    let request = Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(header::HOST, endpoint.authority())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))?;

    let response = sender
        .send_request(request)
        .await
        .map_err(TransportError::Http)?;
    let status = response.status();

    let collected = response
        .into_body()
        .collect()
        .await
        .map_err(TransportError::Http)?;

    Ok((status, collected.to_bytes()))
}

/// Open a GET request and hand the streaming response back to the caller.
/// The connection stays alive for as long as the returned body does.
pub(crate) async fn open_event_stream(
    endpoint: &Endpoint,
    path: &str,
) -> Result<Response<Incoming>, TransportError> {
    let io = dial(endpoint).await?;
    let (mut sender, conn) = http1::handshake(io)
        .await
        .map_err(TransportError::Handshake)?;

    tokio::task::spawn(async move {
        if let Err(err) = conn.await {
            debug!("event stream connection ended: {}", err);
        }
    });

    let request = Request::builder()
        .method(Method::GET)
        .uri(path)
        .header(header::HOST, endpoint.authority())
        .header(header::ACCEPT, "text/event-stream")
        .body(Empty::<Bytes>::new())?;

    sender
        .send_request(request)
        .await
        .map_err(TransportError::Http)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

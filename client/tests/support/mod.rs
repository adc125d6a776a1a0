//! Scripted in-process backend for the live-session tests.
//!
//! One hyper server answering `POST /submit` and `GET /events/{token}` from
//! a fixed [`BackendPlan`], while recording what the client actually did:
//! submit bodies, event-stream connections and their timestamps.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use async_stream::stream;
use bytes::Bytes;
use futures_util::StreamExt;
use http_body_util::{BodyExt, Full, StreamBody, combinators::BoxBody};
use hyper::body::{Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// What the backend does, fixed for the whole test.
pub struct BackendPlan {
    /// Raw SSE text blocks written, in order, on every events connection.
    pub frames: Vec<String>,
    /// Keep the stream open after the frames; `false` ends it, which the
    /// client sees as a dropped connection.
    pub hold_open: bool,
    /// Status answered on `POST /submit`.
    pub submit_status: StatusCode,
    /// Body answered on `POST /submit`.
    pub submit_body: String,
}

impl Default for BackendPlan {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            hold_open: true,
            submit_status: StatusCode::OK,
            submit_body: r#"{"success": true, "tokens": ["t1", "t2", "t3"]}"#.to_string(),
        }
    }
}

/// One SSE `data:` frame carrying a JSON payload.
pub fn data_frame(json: &str) -> String {
    format!("data: {}\n\n", json)
}

/// Route library logs into the test harness, honouring `RUST_LOG`.
/// Repeated calls are no-ops.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

struct Recorded {
    plan: BackendPlan,
    submits: AtomicUsize,
    submit_bodies: Mutex<Vec<String>>,
    event_connections: AtomicUsize,
    event_paths: Mutex<Vec<String>>,
    connection_times: Mutex<Vec<Instant>>,
}

pub struct ScriptedBackend {
    base_url: String,
    recorded: Arc<Recorded>,
    accept_task: JoinHandle<()>,
}

impl ScriptedBackend {
    pub async fn spawn(plan: BackendPlan) -> Self {
        init_tracing();

        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .expect("bind fixture listener");
        let addr = listener.local_addr().expect("fixture listener addr");

        let recorded = Arc::new(Recorded {
            plan,
            submits: AtomicUsize::new(0),
            submit_bodies: Mutex::new(Vec::new()),
            event_connections: AtomicUsize::new(0),
            event_paths: Mutex::new(Vec::new()),
            connection_times: Mutex::new(Vec::new()),
        });

        let accept_recorded = Arc::clone(&recorded);
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let io = TokioIo::new(stream);
                let conn_recorded = Arc::clone(&accept_recorded);
                tokio::spawn(async move {
                    let service =
                        service_fn(move |req| handle(req, Arc::clone(&conn_recorded)));
                    let _ = http1::Builder::new().serve_connection(io, service).await;
                });
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            recorded,
            accept_task,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// How many `POST /submit` calls arrived.
    pub fn submit_calls(&self) -> usize {
        self.recorded.submits.load(Ordering::SeqCst)
    }

    /// Raw request bodies of every submit call, in order.
    pub fn submit_bodies(&self) -> Vec<String> {
        self.recorded.submit_bodies.lock().unwrap().clone()
    }

    /// How many events connections were opened.
    pub fn event_connections(&self) -> usize {
        self.recorded.event_connections.load(Ordering::SeqCst)
    }

    /// Request paths of every events connection, in order.
    pub fn event_paths(&self) -> Vec<String> {
        self.recorded.event_paths.lock().unwrap().clone()
    }

    /// When each events connection arrived.
    pub fn connection_times(&self) -> Vec<Instant> {
        self.recorded.connection_times.lock().unwrap().clone()
    }
}

impl Drop for ScriptedBackend {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn handle(
    req: Request<Incoming>,
    recorded: Arc<Recorded>,
) -> Result<Response<BoxBody<Bytes, Infallible>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    if method == Method::POST && path == "/submit" {
        let bytes = req
            .into_body()
            .collect()
            .await
            .expect("read submit body")
            .to_bytes();
        recorded
            .submit_bodies
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(&bytes).into_owned());
        recorded.submits.fetch_add(1, Ordering::SeqCst);

        let response = Response::builder()
            .status(recorded.plan.submit_status)
            .header("content-type", "application/json")
            .body(full_body(recorded.plan.submit_body.clone()))
            .expect("submit response");
        return Ok(response);
    }

    if method == Method::GET && path.starts_with("/events/") {
        recorded.connection_times.lock().unwrap().push(Instant::now());
        recorded.event_paths.lock().unwrap().push(path);
        recorded.event_connections.fetch_add(1, Ordering::SeqCst);

        return Ok(events_response(&recorded));
    }

    let not_found = Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(full_body(String::new()))
        .expect("not-found response");
    Ok(not_found)
}

fn full_body(body: String) -> BoxBody<Bytes, Infallible> {
    BodyExt::boxed(Full::new(Bytes::from(body)))
}

fn events_response(recorded: &Arc<Recorded>) -> Response<BoxBody<Bytes, Infallible>> {
    let frames = recorded.plan.frames.clone();
    let hold_open = recorded.plan.hold_open;

    let stream = stream! {
        for frame in frames {
            yield Ok::<Bytes, Infallible>(Bytes::from(frame));
        }
        if hold_open {
            std::future::pending::<()>().await;
        }
    };

    let body = BodyExt::boxed(StreamBody::new(
        stream.map(|result| result.map(Frame::data)),
    ));

    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .header("connection", "keep-alive")
        .body(body)
        .expect("events response")
}

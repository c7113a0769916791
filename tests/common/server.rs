//! Local HTTP server standing in for a model host.
//!
//! Routes are registered per path. File routes can honor or ignore `Range`,
//! be paced, or drop the connection mid-body; every request is counted and
//! its `Range` header recorded.

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

/// A file served from memory.
#[derive(Debug, Clone)]
pub struct FileRoute {
    pub content: Vec<u8>,
    pub ranges: bool,
    pub chunk_size: usize,
    pub delay: Option<Duration>,
    /// The first `drops` responses break off after `cut_at` body bytes.
    pub drops: usize,
    pub cut_at: usize,
}

impl FileRoute {
    pub fn new(content: Vec<u8>) -> Self {
        Self {
            content,
            ranges: true,
            chunk_size: 64 * 1024,
            delay: None,
            drops: 0,
            cut_at: 0,
        }
    }

    /// Answer every request with the whole file and `200`.
    pub fn without_ranges(mut self) -> Self {
        self.ranges = false;
        self
    }

    /// Send `chunk_size` bytes every `delay`.
    pub fn paced(mut self, chunk_size: usize, delay: Duration) -> Self {
        self.chunk_size = chunk_size;
        self.delay = Some(delay);
        self
    }

    /// Break the connection after `cut_at` bytes for the first `times` requests.
    pub fn dropping(mut self, times: usize, cut_at: usize) -> Self {
        self.drops = times;
        self.cut_at = cut_at;
        self
    }
}

#[derive(Debug, Clone)]
pub enum Route {
    File(FileRoute),
    Redirect(String),
    Status(StatusCode),
}

#[derive(Debug, Default)]
struct ServerState {
    routes: Mutex<HashMap<String, Route>>,
    hits: Mutex<HashMap<String, usize>>,
    ranges: Mutex<HashMap<String, Vec<Option<String>>>>,
}

/// Handle on a running server; it lives as long as the test runtime.
#[derive(Debug, Clone)]
pub struct TestServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ServerState::default());
        let app = Router::new().fallback(handle).with_state(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, state }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn route(&self, path: &str, route: Route) {
        self.state
            .routes
            .lock()
            .unwrap()
            .insert(path.to_string(), route);
    }

    pub fn file(&self, path: &str, route: FileRoute) {
        self.route(path, Route::File(route));
    }

    pub fn hits(&self, path: &str) -> usize {
        self.state
            .hits
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    /// `Range` headers received on `path`, in order.
    pub fn ranges(&self, path: &str) -> Vec<Option<String>> {
        self.state
            .ranges
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_default()
    }
}

async fn handle(State(state): State<Arc<ServerState>>, uri: Uri, headers: HeaderMap) -> Response {
    let path = uri.path().to_string();
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let hit = {
        let mut hits = state.hits.lock().unwrap();
        let count = hits.entry(path.clone()).or_insert(0);
        *count += 1;
        *count
    };
    state
        .ranges
        .lock()
        .unwrap()
        .entry(path.clone())
        .or_default()
        .push(range.clone());

    let route = state.routes.lock().unwrap().get(&path).cloned();
    match route {
        None => StatusCode::NOT_FOUND.into_response(),
        Some(Route::Status(status)) => status.into_response(),
        Some(Route::Redirect(location)) => {
            (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
        }
        Some(Route::File(file)) => serve(file, range.as_deref(), hit),
    }
}

fn range_start(range: Option<&str>) -> Option<usize> {
    range?
        .strip_prefix("bytes=")?
        .strip_suffix('-')?
        .parse()
        .ok()
}

fn serve(file: FileRoute, range: Option<&str>, hit: usize) -> Response {
    let total = file.content.len();
    let start = match range_start(range).filter(|_| file.ranges) {
        Some(start) if start >= total => {
            return Response::builder()
                .status(StatusCode::RANGE_NOT_SATISFIABLE)
                .header(header::CONTENT_RANGE, format!("bytes */{}", total))
                .body(Body::empty())
                .unwrap();
        }
        other => other,
    };

    let mut builder = Response::builder();
    if file.ranges {
        builder = builder.header(header::ACCEPT_RANGES, "bytes");
    }
    let offset = match start {
        Some(start) => {
            builder = builder.status(StatusCode::PARTIAL_CONTENT).header(
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", start, total - 1, total),
            );
            start
        }
        None => {
            builder = builder.status(StatusCode::OK);
            0
        }
    };
    let body = &file.content[offset..];
    builder = builder.header(header::CONTENT_LENGTH, body.len().to_string());

    let dropping = hit <= file.drops;
    let sent = if dropping {
        &body[..file.cut_at.min(body.len())]
    } else {
        body
    };
    let pieces: Vec<Bytes> = sent
        .chunks(file.chunk_size.max(1))
        .map(Bytes::copy_from_slice)
        .collect();
    let delay = file.delay;
    let data = stream::iter(pieces).then(move |piece| async move {
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok::<_, io::Error>(piece)
    });

    let stream: BoxStream<'static, Result<Bytes, io::Error>> = if dropping {
        data.chain(stream::once(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "dropped"))
        }))
        .boxed()
    } else {
        data.boxed()
    };

    builder.body(Body::from_stream(stream)).unwrap()
}

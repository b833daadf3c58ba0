//! In-process fakes for the pipeline collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::analysis::AnalysisDispatcher;
use crate::config::{HttpConfig, RetryConfig};
use crate::error::ErrorKind;
use crate::github::fetch::ManifestFetcher;
use crate::github::tree::TreeResolver;
use crate::image::ImageInspector;
use crate::models::{
    AnalysisOutcome, ImageFacts, ManifestContent, ManifestDescriptor, RepositoryRef, TreeEntry,
};
use crate::transport::HttpTransport;

pub fn blob(path: &str) -> TreeEntry {
    TreeEntry {
        path: path.to_string(),
        sha: format!("sha-{path}"),
        kind: Some("blob".to_string()),
    }
}

/// Returns a fixed tree (or error) and records which repositories it saw.
pub struct FakeResolver {
    result: Result<Vec<TreeEntry>, ErrorKind>,
    pub seen: Mutex<Vec<RepositoryRef>>,
}

impl FakeResolver {
    pub fn with_tree(paths: &[&str]) -> Self {
        FakeResolver {
            result: Ok(paths.iter().map(|p| blob(p)).collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: ErrorKind) -> Self {
        FakeResolver {
            result: Err(reason),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl TreeResolver for FakeResolver {
    async fn resolve(&self, repo: &RepositoryRef) -> Result<Vec<TreeEntry>, ErrorKind> {
        self.seen.lock().unwrap().push(repo.clone());
        self.result.clone()
    }
}

/// Never answers; used to observe cancellation.
pub struct PendingResolver;

#[async_trait]
impl TreeResolver for PendingResolver {
    async fn resolve(&self, _repo: &RepositoryRef) -> Result<Vec<TreeEntry>, ErrorKind> {
        std::future::pending().await
    }
}

/// Serves the path as content; paths listed in `failures` fail instead.
#[derive(Default)]
pub struct FakeFetcher {
    failures: HashMap<String, ErrorKind>,
}

impl FakeFetcher {
    pub fn failing_on(mut self, filename_or_path: &str, reason: ErrorKind) -> Self {
        self.failures.insert(filename_or_path.to_string(), reason);
        self
    }
}

#[async_trait]
impl ManifestFetcher for FakeFetcher {
    async fn fetch(&self, descriptor: &ManifestDescriptor) -> Result<ManifestContent, ErrorKind> {
        let key = path_of(descriptor);
        if let Some(reason) = self.failures.get(&key) {
            return Err(reason.clone());
        }
        Ok(ManifestContent {
            descriptor: descriptor.clone(),
            bytes: key.into_bytes(),
        })
    }
}

fn path_of(descriptor: &ManifestDescriptor) -> String {
    if descriptor.dirpath.is_empty() {
        descriptor.filename.clone()
    } else {
        format!("{}/{}", descriptor.dirpath, descriptor.filename)
    }
}

/// Answers per manifest path with a status, tracking concurrency and tokens.
#[derive(Default)]
pub struct FakeDispatcher {
    statuses: HashMap<String, u16>,
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    hang: bool,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub calls: AtomicUsize,
    pub tokens: Mutex<Vec<Option<String>>>,
}

impl FakeDispatcher {
    pub fn with_status(mut self, path: &str, status: u16) -> Self {
        self.statuses.insert(path.to_string(), status);
        self
    }

    pub fn with_delay(mut self, path: &str, delay: Duration) -> Self {
        self.delays.insert(path.to_string(), delay);
        self
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn hanging() -> Self {
        FakeDispatcher {
            hang: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl AnalysisDispatcher for FakeDispatcher {
    async fn dispatch(&self, content: ManifestContent, auth_token: Option<&str>) -> AnalysisOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens
            .lock()
            .unwrap()
            .push(auth_token.map(str::to_string));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.hang {
            std::future::pending::<()>().await;
        }

        let path = path_of(&content.descriptor);
        let delay = self.delays.get(&path).copied().unwrap_or(self.default_delay);
        tokio::time::sleep(delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.statuses.get(&path).copied().unwrap_or(200) {
            status @ 200..=299 => AnalysisOutcome::Success {
                descriptor: content.descriptor,
                response: serde_json::json!({"manifest": path, "status": status}),
            },
            status => AnalysisOutcome::Failure {
                descriptor: content.descriptor,
                reason: ErrorKind::AnalysisRejected(status),
            },
        }
    }
}

/// Never answers; used to observe cancellation during inspection.
pub struct PendingInspector;

#[async_trait]
impl ImageInspector for PendingInspector {
    async fn inspect(&self, _image: &str) -> Result<ImageFacts, ErrorKind> {
        std::future::pending().await
    }
}

/// Returns fixed image facts or an error.
pub struct FakeInspector {
    result: Result<ImageFacts, ErrorKind>,
    pub calls: AtomicUsize,
}

impl FakeInspector {
    pub fn with_facts(base_os: Option<&str>, origin: Option<&str>) -> Self {
        FakeInspector {
            result: Ok(ImageFacts {
                base_os: base_os.map(str::to_string),
                origin_repo_url: origin.map(str::to_string),
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(reason: ErrorKind) -> Self {
        FakeInspector {
            result: Err(reason),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ImageInspector for FakeInspector {
    async fn inspect(&self, _image: &str) -> Result<ImageFacts, ErrorKind> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// Transport with a short timeout and a 1ms backoff base.
pub fn fast_transport(max_retries: u32) -> HttpTransport {
    let config = HttpConfig {
        timeout_secs: 5,
        retry: RetryConfig {
            max_retries,
            backoff_base_ms: 1,
            ..RetryConfig::default()
        },
    };
    HttpTransport::new(&config).unwrap()
}

/// One request as it arrived at a [`StubServer`].
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    /// Request line and headers.
    pub head: String,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Local HTTP/1.1 server answering with canned `(status, body)` pairs in
/// order; the last pair repeats once the list runs out.
pub struct StubServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl StubServer {
    pub async fn start(responses: Vec<(u16, &'static str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let captured = requests.clone();

        tokio::spawn(async move {
            let mut served = 0usize;
            while let Ok((mut stream, _)) = listener.accept().await {
                let request = read_request(&mut stream).await;
                captured.lock().unwrap().push(request);

                let (status, body) = responses[served.min(responses.len() - 1)];
                served += 1;
                let reply = format!(
                    "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(reply.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        StubServer {
            base_url: format!("http://{addr}"),
            requests,
        }
    }

    pub fn hits(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, index: usize) -> CapturedRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

/// A base URL nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

async fn read_request(stream: &mut TcpStream) -> CapturedRequest {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break buf.len();
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let request = CapturedRequest {
        head,
        body: Vec::new(),
    };
    let chunked = request
        .header("transfer-encoding")
        .is_some_and(|v| v.eq_ignore_ascii_case("chunked"));
    let length = request
        .header("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);

    loop {
        let complete = if chunked {
            buf.ends_with(b"0\r\n\r\n")
        } else {
            buf.len() >= head_end + length
        };
        if complete {
            break;
        }
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    CapturedRequest {
        body: buf[head_end..].to_vec(),
        ..request
    }
}

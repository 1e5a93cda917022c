//! Scripted HTTP/1.1 server: answers each request with the next canned
//! response (repeating the last) and records when every request arrived.

use discord_rest::{Config, RetryPolicy};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub struct Canned {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    /// Pause before any byte of the response is written.
    pub head_delay: Duration,
    /// Pause between the response head and its body.
    pub body_delay: Duration,
}

impl Canned {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.to_string(),
            head_delay: Duration::ZERO,
            body_delay: Duration::ZERO,
        }
    }

    pub fn delay_head(mut self, by: Duration) -> Self {
        self.head_delay = by;
        self
    }

    pub fn delay_body(mut self, by: Duration) -> Self {
        self.body_delay = by;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// A bucket-quota header set.
    pub fn quota(self, limit: u32, remaining: u32, reset_after: &str) -> Self {
        self.header("x-ratelimit-limit", &limit.to_string())
            .header("x-ratelimit-remaining", &remaining.to_string())
            .header("x-ratelimit-reset-after", reset_after)
            .header("x-ratelimit-bucket", "test-bucket")
    }

    pub fn too_many_requests(retry_after_secs: f64) -> Self {
        Self::json(
            429,
            serde_json::json!({
                "message": "You are being rate limited.",
                "retry_after": retry_after_secs,
                "global": false
            }),
        )
        .header("x-ratelimit-scope", "user")
    }
}

#[derive(Debug, Clone)]
pub struct Hit {
    pub at: Instant,
    pub request_line: String,
    pub head: String,
    pub body: String,
}

pub struct Scripted {
    pub addr: SocketAddr,
    hits: Arc<Mutex<Vec<Hit>>>,
}

impl Scripted {
    pub async fn start(responses: Vec<Canned>) -> Self {
        assert!(!responses.is_empty());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let responses = Arc::new(responses);
        let next = Arc::new(AtomicUsize::new(0));
        let recorded = Arc::clone(&hits);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let responses = Arc::clone(&responses);
                let next = Arc::clone(&next);
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    let _ = serve(stream, responses, next, recorded).await;
                });
            }
        });
        Self { addr, hits }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.hits.lock().unwrap().clone()
    }
}

async fn serve(
    mut stream: TcpStream,
    responses: Arc<Vec<Canned>>,
    next: Arc<AtomicUsize>,
    recorded: Arc<Mutex<Vec<Hit>>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < head_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[head_end..]).to_string();
    let request_line = head.lines().next().unwrap_or_default().to_string();
    recorded.lock().unwrap().push(Hit {
        at: Instant::now(),
        request_line,
        head,
        body,
    });

    let idx = next.fetch_add(1, Ordering::SeqCst).min(responses.len() - 1);
    let canned = &responses[idx];
    tokio::time::sleep(canned.head_delay).await;
    let mut out = format!(
        "HTTP/1.1 {} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\n",
        canned.status,
        canned.body.len()
    );
    out.push_str("connection: close\r\n");
    for (k, v) in &canned.headers {
        out.push_str(&format!("{k}: {v}\r\n"));
    }
    out.push_str("\r\n");
    stream.write_all(out.as_bytes()).await?;
    stream.flush().await?;
    tokio::time::sleep(canned.body_delay).await;
    stream.write_all(canned.body.as_bytes()).await?;
    stream.shutdown().await
}

/// Client configuration with fast, deterministic retries.
pub fn config(base_url: &str) -> Config {
    Config::new("tok")
        .with_api_url(base_url)
        .with_global_limit(None)
        .with_retry(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            jitter: Duration::ZERO,
            max_rate_limit_wait: None,
        })
}

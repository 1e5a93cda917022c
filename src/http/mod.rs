//! Request dispatcher.
//!
//! Every call runs through one state machine:
//!
//! ```text
//! Send ──granted──▶ (I/O) ──▶ Decode ──2xx──▶ Done
//!  ▲  └─no quota─▶ WaitRateLimit     ├─429──▶ WaitRateLimit ─▶ Send
//!  │                                 ├─5xx / network ─▶ WaitBackoff ─▶ Send
//!  └─────────────────────────────────┴─other ─▶ Failed
//! ```
//!
//! Rate-limit waits do not consume the transient retry budget. Every wait and
//! the I/O itself are raced against the caller's [`Context`].

pub mod route;

pub use route::{Request, Route};

use crate::config::Config;
use crate::context::Context;
use crate::error::{classify_status, Error, Result};
use crate::ratelimit::{BucketKey, BucketTable, RateLimitHeaders, Reservation, Ticket};
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

pub const AUDIT_LOG_REASON: &str = "x-audit-log-reason";

pub fn build_client(cfg: &Config) -> Result<reqwest::Client> {
    let mut default_headers = HeaderMap::new();
    let ua = HeaderValue::from_str(&cfg.user_agent)
        .map_err(|e| Error::Config(format!("invalid user agent: {e}")))?;
    default_headers.insert(USER_AGENT, ua);
    reqwest::Client::builder()
        .default_headers(default_headers)
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .use_rustls_tls()
        .build()
        .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))
}

fn auth_header(token: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bot {}", token))
        .map_err(|_| Error::Config("token contains invalid header characters".into()))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Raw outcome of a successful exchange.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl Reply {
    /// Decode the body; an empty body decodes as JSON `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let body: &[u8] = if self.body.iter().all(u8::is_ascii_whitespace) {
            b"null"
        } else {
            &self.body
        };
        Ok(serde_json::from_slice(body)?)
    }
}

/// One in-flight logical call.
#[derive(Debug)]
struct PendingExchange {
    id: Uuid,
    request: Request,
    key: BucketKey,
    url: String,
    /// Requests actually sent.
    attempts: u32,
    /// Transient failures so far (network or 5xx).
    failures: u32,
    /// Time spent suspended on rate limits.
    rate_limited: Duration,
}

enum State {
    Send,
    WaitRateLimit(Instant),
    WaitBackoff(Duration),
    Decode(reqwest::Response, Ticket),
    Done(Reply),
    Failed(Error),
}

#[derive(Debug)]
struct Inner {
    http: reqwest::Client,
    cfg: Config,
    auth: HeaderValue,
    buckets: Arc<BucketTable>,
}

/// Authenticated, rate-limited REST client. Clones share one bucket table.
#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    pub fn new(cfg: Config) -> Result<Self> {
        let buckets = Arc::new(BucketTable::new(cfg.global_limit));
        Self::with_buckets(cfg, buckets)
    }

    /// Use an existing table, e.g. one driven by a manual clock.
    pub fn with_buckets(cfg: Config, buckets: Arc<BucketTable>) -> Result<Self> {
        let http = build_client(&cfg)?;
        let auth = auth_header(&cfg.token)?;
        Ok(Self {
            inner: Arc::new(Inner {
                http,
                cfg,
                auth,
                buckets,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.cfg
    }

    pub fn buckets(&self) -> &Arc<BucketTable> {
        &self.inner.buckets
    }

    /// Execute and decode the response body as `T`.
    pub async fn call<T: DeserializeOwned>(&self, ctx: &Context, request: Request) -> Result<T> {
        self.execute(ctx, request).await?.json()
    }

    /// Execute and discard the response body.
    pub async fn call_unit(&self, ctx: &Context, request: Request) -> Result<()> {
        self.execute(ctx, request).await.map(|_| ())
    }

    /// Run one logical call to completion.
    pub async fn execute(&self, ctx: &Context, request: Request) -> Result<Reply> {
        let path = request.route.path()?;
        let mut ex = PendingExchange {
            id: Uuid::new_v4(),
            key: request.route.bucket_key(),
            url: format!("{}{}", self.inner.cfg.api_url, path),
            request,
            attempts: 0,
            failures: 0,
            rate_limited: Duration::ZERO,
        };
        let mut state = State::Send;
        loop {
            state = match state {
                State::Send => self.send(ctx, &mut ex).await,
                State::WaitRateLimit(until) => self.wait_rate_limit(ctx, &mut ex, until).await,
                State::WaitBackoff(delay) => match ctx.sleep(delay).await {
                    Ok(()) => State::Send,
                    Err(e) => State::Failed(e),
                },
                State::Decode(resp, ticket) => self.decode(ctx, &mut ex, resp, ticket).await,
                State::Done(reply) => {
                    debug!(
                        "[{}] {} {} -> {} after {} attempt(s)",
                        ex.id,
                        ex.request.route.method(),
                        ex.url,
                        reply.status,
                        ex.attempts
                    );
                    return Ok(reply);
                }
                State::Failed(err) => {
                    debug!(
                        "[{}] {} {} failed ({}): {}",
                        ex.id,
                        ex.request.route.method(),
                        ex.url,
                        err.kind(),
                        err
                    );
                    return Err(err);
                }
            };
        }
    }

    async fn send(&self, ctx: &Context, ex: &mut PendingExchange) -> State {
        if let Err(e) = ctx.check() {
            return State::Failed(e);
        }
        let ticket = match self.inner.buckets.reserve(&ex.key) {
            Reservation::Granted(ticket) => ticket,
            Reservation::WaitUntil(until) => return State::WaitRateLimit(until),
        };
        ex.attempts += 1;

        let mut req = self
            .inner
            .http
            .request(ex.request.route.method().clone(), &ex.url)
            .header(AUTHORIZATION, self.inner.auth.clone());
        if let Some(body) = &ex.request.body {
            req = req
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(body.clone());
        }
        if let Some(reason) = &ex.request.reason {
            req = req.header(AUDIT_LOG_REASON, urlencoding::encode(reason).into_owned());
        }
        debug!(
            "[{}] {} {} attempt {}",
            ex.id,
            ex.request.route.method(),
            ex.url,
            ex.attempts
        );

        match ctx.run(req.send()).await {
            Err(cancelled) => State::Failed(cancelled),
            Ok(Ok(resp)) => State::Decode(resp, ticket),
            Ok(Err(e)) if e.is_builder() => State::Failed(Error::Config(e.to_string())),
            Ok(Err(e)) => {
                drop(ticket);
                warn!("[{}] {} error sending request: {}", ex.id, ex.url, e);
                let err = Error::Network {
                    attempts: ex.attempts,
                    source: e,
                };
                self.retry_transient(ex, err)
            }
        }
    }

    async fn wait_rate_limit(
        &self,
        ctx: &Context,
        ex: &mut PendingExchange,
        until: Instant,
    ) -> State {
        let wait = until.saturating_duration_since(self.inner.buckets.now());
        if let Some(max) = self.inner.cfg.retry.max_rate_limit_wait {
            if ex.rate_limited + wait > max {
                return State::Failed(Error::RateLimitExhausted {
                    waited: ex.rate_limited,
                    retry_after: wait,
                });
            }
        }
        ex.rate_limited += wait;
        if wait >= Duration::from_secs(1) {
            warn!(
                "[{}] {} waiting {:?} on rate limit ({})",
                ex.id, ex.url, wait, ex.key
            );
        }
        match ctx.sleep(wait).await {
            Ok(()) => State::Send,
            Err(e) => State::Failed(e),
        }
    }

    async fn decode(
        &self,
        ctx: &Context,
        ex: &mut PendingExchange,
        resp: reqwest::Response,
        ticket: Ticket,
    ) -> State {
        let status = resp.status();
        let mut rate = RateLimitHeaders::from_headers(resp.headers());
        let body = match ctx.run(resp.bytes()).await {
            Ok(Ok(bytes)) => bytes.to_vec(),
            Ok(Err(e)) => {
                self.inner.buckets.observe(&ticket, &rate, status);
                drop(ticket);
                warn!("[{}] {} error reading response: {}", ex.id, ex.url, e);
                let err = Error::Network {
                    attempts: ex.attempts,
                    source: e,
                };
                return self.retry_transient(ex, err);
            }
            Err(cancelled) => {
                self.inner.buckets.observe(&ticket, &rate, status);
                return State::Failed(cancelled);
            }
        };
        if status == StatusCode::TOO_MANY_REQUESTS {
            rate.merge_rate_limit_body(&body);
        }
        self.inner.buckets.observe(&ticket, &rate, status);
        drop(ticket);

        if status.is_success() {
            return State::Done(Reply { status, body });
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let wait = rate.wait_hint();
            warn!(
                "[{}] {} rate limited (global: {}), retrying in {:?}",
                ex.id, ex.url, rate.global, wait
            );
            return State::WaitRateLimit(self.inner.buckets.now() + wait);
        }
        let err = classify_status(status, &body, ex.attempts);
        if status.is_server_error() {
            return self.retry_transient(ex, err);
        }
        State::Failed(err)
    }

    fn retry_transient(&self, ex: &mut PendingExchange, err: Error) -> State {
        let policy = &self.inner.cfg.retry;
        ex.failures += 1;
        if ex.failures >= policy.max_attempts {
            return State::Failed(err);
        }
        let backoff = policy.backoff(ex.failures);
        warn!(
            "[{}] {} retrying ({}), backoff {:?}",
            ex.id,
            ex.url,
            err.kind(),
            backoff
        );
        State::WaitBackoff(backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_reply_decodes_as_null() {
        let reply = Reply {
            status: StatusCode::NO_CONTENT,
            body: Vec::new(),
        };
        reply.json::<()>().unwrap();
        assert_eq!(reply.json::<Option<u32>>().unwrap(), None);
    }

    #[test]
    fn rejects_token_with_newline() {
        let cfg = Config::new("abc\ndef");
        assert!(matches!(Client::new(cfg), Err(Error::Config(_))));
    }

    #[test]
    fn auth_header_is_bot_scheme() {
        let h = auth_header("tok").unwrap();
        assert_eq!(h.to_str().unwrap(), "Bot tok");
        assert!(h.is_sensitive());
    }
}

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Used when a 429 carries no usable retry hint.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Re-check interval while a bucket's ceiling is still unknown, or while all
/// of its permits are in flight and no reset time is known.
pub const PENDING_RECHECK: Duration = Duration::from_millis(50);

const GLOBAL_WINDOW: Duration = Duration::from_secs(1);

pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

/// Reads tokio's clock, so paused test time applies.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock(&self.now);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *lock(&self.now)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // Bucket state stays consistent across a panic in another holder.
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Route signature: HTTP method plus path template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey(String);

impl BucketKey {
    /// Key for a route template such as `/guilds/{guild_id}/roles/{role_id}`.
    pub fn new(method: &Method, template: &str) -> Self {
        Self(format!("{} {}", method.as_str(), template))
    }

    /// Key for an already-substituted path: all-digit segments become `{id}`.
    pub fn from_path(method: &Method, path: &str) -> Self {
        let path = path.split('?').next().unwrap_or_default();
        let normalized = path
            .split('/')
            .map(|seg| {
                if !seg.is_empty() && seg.bytes().all(|b| b.is_ascii_digit()) {
                    "{id}"
                } else {
                    seg
                }
            })
            .collect::<Vec<_>>()
            .join("/");
        Self::new(method, &normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rate-limit information carried by one response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitHeaders {
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    pub reset_after: Option<Duration>,
    pub bucket: Option<String>,
    pub retry_after: Option<Duration>,
    pub global: bool,
    pub scope: Option<String>,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

fn parse_seconds(s: &str) -> Option<Duration> {
    let secs = s.parse::<f64>().ok()?;
    if !secs.is_finite() {
        return None;
    }
    Duration::try_from_secs_f64(secs.max(0.0)).ok()
}

impl RateLimitHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let limit = header_str(headers, "x-ratelimit-limit").and_then(|s| s.parse::<u32>().ok());
        // Clamp: a negative count is reported as zero.
        let remaining = header_str(headers, "x-ratelimit-remaining")
            .and_then(|s| s.parse::<i64>().ok())
            .map(|n| u32::try_from(n.max(0)).unwrap_or(u32::MAX));
        let reset_after = header_str(headers, "x-ratelimit-reset-after").and_then(parse_seconds);
        let bucket = header_str(headers, "x-ratelimit-bucket")
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| parse_seconds(s.trim()));
        let global = header_str(headers, "x-ratelimit-global")
            .is_some_and(|s| s.eq_ignore_ascii_case("true"));
        let scope = header_str(headers, "x-ratelimit-scope").map(str::to_string);
        Self {
            limit,
            remaining,
            reset_after,
            bucket,
            retry_after,
            global: global || scope.as_deref() == Some("global"),
            scope,
        }
    }

    /// Fill gaps from a 429 JSON body (`retry_after` in float seconds, `global`).
    pub fn merge_rate_limit_body(&mut self, body: &[u8]) {
        #[derive(serde::Deserialize)]
        struct Body {
            retry_after: Option<f64>,
            #[serde(default)]
            global: bool,
        }
        let Ok(parsed) = serde_json::from_slice::<Body>(body) else {
            return;
        };
        if self.retry_after.is_none() {
            self.retry_after = parsed
                .retry_after
                .filter(|s| s.is_finite())
                .and_then(|s| Duration::try_from_secs_f64(s.max(0.0)).ok());
        }
        self.global |= parsed.global;
    }

    fn has_quota_info(&self) -> bool {
        self.limit.is_some() || self.remaining.is_some() || self.reset_after.is_some()
    }

    /// Wait implied by a 429 carrying these headers.
    pub fn wait_hint(&self) -> Duration {
        self.retry_after
            .or(self.reset_after)
            .unwrap_or(DEFAULT_RETRY_AFTER)
    }
}

#[derive(Debug, Default)]
struct Bucket {
    limit: Option<u32>,
    remaining: u32,
    reset_at: Option<Instant>,
    /// Longest reset interval the server has reported; used to guess the end
    /// of a window refilled locally.
    window: Option<Duration>,
    /// Set by a 429. Nothing observed before it may reopen the bucket.
    blocked_until: Option<Instant>,
    in_flight: u32,
    hash: Option<String>,
}

impl Bucket {
    /// `None` when a request may go now, otherwise when to look again.
    fn poll(&mut self, now: Instant) -> Option<Instant> {
        if let Some(until) = self.blocked_until {
            if until > now {
                return Some(until);
            }
            self.blocked_until = None;
        }
        let Some(limit) = self.limit else {
            // Ceiling unknown: one request at a time until a response reports it.
            return (self.in_flight > 0).then_some(now + PENDING_RECHECK);
        };
        let window_over = self.reset_at.is_some_and(|reset| now >= reset);
        let idle_without_reset =
            self.reset_at.is_none() && self.remaining == 0 && self.in_flight == 0;
        if window_over || idle_without_reset {
            self.remaining = limit;
            self.reset_at = self.window.map(|w| now + w);
        }
        if self.remaining > 0 {
            return None;
        }
        Some(self.reset_at.unwrap_or(now + PENDING_RECHECK))
    }

    fn take(&mut self) {
        if self.limit.is_some() {
            self.remaining = self.remaining.saturating_sub(1);
        }
        self.in_flight += 1;
    }

    /// Fold in a response's quota. `others` is the number of requests still
    /// in flight on this bucket besides the one being observed.
    fn update(&mut self, now: Instant, h: &RateLimitHeaders, others: u32) {
        if let Some(limit) = h.limit {
            self.limit = Some(limit);
        }
        if let Some(hash) = &h.bucket {
            self.hash = Some(hash.clone());
        }
        if self.blocked_until.is_some_and(|until| until > now) {
            return;
        }
        if let Some(remaining) = h.remaining {
            self.remaining = remaining.saturating_sub(others);
        }
        if let Some(after) = h.reset_after {
            self.window = Some(self.window.map_or(after, |w| w.max(after)));
            let reset = now + after;
            self.reset_at = match self.reset_at {
                Some(current) if current > now && current > reset => Some(current),
                _ => Some(reset),
            };
        }
    }

    fn exhaust_until(&mut self, until: Instant, h: &RateLimitHeaders) {
        if let Some(limit) = h.limit {
            self.limit = Some(limit);
        }
        let until = match self.blocked_until {
            Some(current) if current > until => current,
            _ => until,
        };
        self.blocked_until = Some(until);
        self.remaining = 0;
        self.reset_at = Some(until);
    }

    fn snapshot(&self, now: Instant) -> BucketSnapshot {
        BucketSnapshot {
            limit: self.limit,
            remaining: self.remaining,
            reset_after: self.reset_at.map(|r| r.saturating_duration_since(now)),
            in_flight: self.in_flight,
            hash: self.hash.clone(),
        }
    }
}

#[derive(Debug)]
struct GlobalBucket {
    limit: Option<u32>,
    remaining: u32,
    window_reset: Option<Instant>,
    blocked_until: Option<Instant>,
}

impl GlobalBucket {
    fn poll(&mut self, now: Instant) -> Option<Instant> {
        if let Some(until) = self.blocked_until {
            if until > now {
                return Some(until);
            }
            self.blocked_until = None;
        }
        let limit = self.limit?;
        if self.window_reset.is_none_or(|r| now >= r) {
            self.remaining = limit;
            self.window_reset = Some(now + GLOBAL_WINDOW);
        }
        if self.remaining == 0 {
            return self.window_reset;
        }
        None
    }

    fn take(&mut self) {
        if self.limit.is_some() {
            self.remaining = self.remaining.saturating_sub(1);
        }
    }
}

/// Read-only view of one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSnapshot {
    pub limit: Option<u32>,
    pub remaining: u32,
    pub reset_after: Option<Duration>,
    pub in_flight: u32,
    pub hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalSnapshot {
    pub limit: Option<u32>,
    pub remaining: u32,
    pub blocked_for: Option<Duration>,
}

/// Permission to send one request. Holds the request as in flight on its
/// bucket until dropped.
#[derive(Debug)]
pub struct Ticket {
    key: BucketKey,
    bucket: Arc<Mutex<Bucket>>,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        let mut bucket = lock(&self.bucket);
        bucket.in_flight = bucket.in_flight.saturating_sub(1);
    }
}

#[derive(Debug)]
pub enum Reservation {
    Granted(Ticket),
    WaitUntil(Instant),
}

#[derive(Debug, Default)]
struct Routes {
    by_key: HashMap<BucketKey, Arc<Mutex<Bucket>>>,
    by_hash: HashMap<String, Arc<Mutex<Bucket>>>,
}

/// Rate-limit state shared by every clone of a client. Each route signature
/// maps to a bucket behind its own mutex; the global bucket is the only lock
/// every reservation takes. Quota is taken when permission is granted.
#[derive(Debug)]
pub struct BucketTable {
    clock: Arc<dyn Clock>,
    routes: Mutex<Routes>,
    global: Mutex<GlobalBucket>,
}

impl BucketTable {
    /// `global_limit` is the per-second ceiling across all routes; `None`
    /// only honours global 429s.
    pub fn new(global_limit: Option<u32>) -> Self {
        Self::with_clock(global_limit, Arc::new(TokioClock))
    }

    pub fn with_clock(global_limit: Option<u32>, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            routes: Mutex::new(Routes::default()),
            global: Mutex::new(GlobalBucket {
                limit: global_limit.filter(|l| *l > 0),
                remaining: 0,
                window_reset: None,
                blocked_until: None,
            }),
        }
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    fn bucket(&self, key: &BucketKey) -> Arc<Mutex<Bucket>> {
        let mut routes = lock(&self.routes);
        Arc::clone(routes.by_key.entry(key.clone()).or_default())
    }

    /// Bucket for `key`, aliased onto any bucket the server already reported
    /// under the same hash.
    fn resolve(&self, key: &BucketKey, hash: Option<&str>) -> Arc<Mutex<Bucket>> {
        let mut routes = lock(&self.routes);
        let current = Arc::clone(routes.by_key.entry(key.clone()).or_default());
        let Some(hash) = hash else {
            return current;
        };
        match routes.by_hash.get(hash) {
            Some(shared) if !Arc::ptr_eq(shared, &current) => {
                let shared = Arc::clone(shared);
                routes.by_key.insert(key.clone(), Arc::clone(&shared));
                shared
            }
            Some(_) => current,
            None => {
                routes.by_hash.insert(hash.to_string(), Arc::clone(&current));
                current
            }
        }
    }

    /// Check-and-decrement against the route bucket and the global bucket.
    pub fn reserve(&self, key: &BucketKey) -> Reservation {
        let now = self.clock.now();
        let bucket = self.bucket(key);
        let mut route = lock(&bucket);
        let mut global = lock(&self.global);
        match (route.poll(now), global.poll(now)) {
            (None, None) => {
                route.take();
                global.take();
                drop(global);
                drop(route);
                Reservation::Granted(Ticket {
                    key: key.clone(),
                    bucket,
                })
            }
            (Some(a), Some(b)) => Reservation::WaitUntil(a.max(b)),
            (Some(a), None) | (None, Some(a)) => Reservation::WaitUntil(a),
        }
    }

    /// Fold the rate-limit headers of the response to `ticket`'s request
    /// into the table.
    pub fn observe(&self, ticket: &Ticket, headers: &RateLimitHeaders, status: StatusCode) {
        let now = self.clock.now();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let until = now + headers.wait_hint();
            if headers.global {
                let mut global = lock(&self.global);
                global.blocked_until = Some(match global.blocked_until {
                    Some(current) if current > until => current,
                    _ => until,
                });
            } else {
                let bucket = self.resolve(&ticket.key, headers.bucket.as_deref());
                lock(&bucket).exhaust_until(until, headers);
            }
            return;
        }
        if !headers.has_quota_info() {
            return;
        }
        let target = self.resolve(&ticket.key, headers.bucket.as_deref());
        let mut bucket = lock(&target);
        // The observed request counts against the bucket that granted it; after
        // aliasing that may not be the one being updated.
        let others = if Arc::ptr_eq(&target, &ticket.bucket) {
            bucket.in_flight.saturating_sub(1)
        } else {
            bucket.in_flight
        };
        bucket.update(now, headers, others);
    }

    pub fn snapshot(&self, key: &BucketKey) -> Option<BucketSnapshot> {
        let bucket = lock(&self.routes).by_key.get(key).cloned()?;
        let snapshot = lock(&bucket).snapshot(self.clock.now());
        Some(snapshot)
    }

    pub fn global_snapshot(&self) -> GlobalSnapshot {
        let now = self.clock.now();
        let global = lock(&self.global);
        GlobalSnapshot {
            limit: global.limit,
            remaining: global.remaining,
            blocked_for: global
                .blocked_until
                .filter(|u| *u > now)
                .map(|u| u - now),
        }
    }

    /// Number of route signatures seen so far.
    pub fn len(&self) -> usize {
        lock(&self.routes).by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BucketTable {
    fn default() -> Self {
        Self::new(None)
    }
}

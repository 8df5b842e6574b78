//! The read-through response cache.
//!
//! Idempotent read endpoints memoize their JSON bodies under a key derived
//! from the request URI and the caller's identity. Every entry is registered
//! under one or more [CacheTag]s; mutations invalidate whole tags instead of
//! pattern-matching on keys, so a stale aggregate never outlives the
//! mutation that made it stale.
//!
//! The cache is strictly best-effort: any backend failure or timeout is
//! logged and treated as a miss, and must never fail the request that hit
//! it.

use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use axum::{
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use redis::{AsyncCommands, aio::ConnectionManager};
use serde::Serialize;
use tokio::time::timeout;

use crate::{Error, database_id::UserID};

/// How long to wait on the cache backend before treating the operation as
/// failed and falling back to direct computation.
const OP_TIMEOUT: Duration = Duration::from_millis(500);

/// How long a tag's key registry lives without being refreshed. Longer than
/// the longest entry TTL, so a registry never disappears while entries it
/// tracks are still live; deleting an already-expired member is a no-op.
const TAG_TTL_SECS: i64 = 7200;

/// The time-to-live classes for cached responses, one per route family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlClass {
    /// Transaction listings and the recent-transactions feed: 5 minutes.
    Transactions,
    /// The category list: 60 minutes.
    Categories,
    /// Analytics aggregates: 15 minutes.
    Analytics,
    /// User profile data (served by the identity service, reserved here so
    /// the TTL contract lives in one place): 30 minutes.
    Profile,
}

impl TtlClass {
    /// The time-to-live for entries of this class.
    pub fn ttl(self) -> Duration {
        match self {
            TtlClass::Transactions => Duration::from_secs(300),
            TtlClass::Categories => Duration::from_secs(3600),
            TtlClass::Analytics => Duration::from_secs(900),
            TtlClass::Profile => Duration::from_secs(1800),
        }
    }
}

/// The key a response is cached under: the full request URI (path and query
/// string) plus the caller's user ID, so no two users ever share an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(uri: &Uri, user_id: UserID) -> Self {
        Self(format!("cache:{uri}:{user_id}"))
    }

    fn as_str(&self) -> &str {
        &self.0
    }
}

/// The invalidation namespaces an entry may be registered under.
///
/// A transaction mutation for user `U` invalidates `UserTransactions(U)` and
/// `UserAnalytics(U)`. A category mutation invalidates `Categories` and
/// `Analytics` (categories are global, and every user's aggregates and
/// listings embed them).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTag {
    /// A user's transaction listings and details.
    UserTransactions(UserID),
    /// A user's analytics aggregates.
    UserAnalytics(UserID),
    /// Every analytics aggregate, any user.
    Analytics,
    /// Category listings and details.
    Categories,
}

impl Display for CacheTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheTag::UserTransactions(user_id) => {
                write!(f, "tag:user:{user_id}:transactions")
            }
            CacheTag::UserAnalytics(user_id) => write!(f, "tag:user:{user_id}:analytics"),
            CacheTag::Analytics => write!(f, "tag:analytics"),
            CacheTag::Categories => write!(f, "tag:categories"),
        }
    }
}

/// A handle to the response cache.
///
/// Cloning is cheap; all clones share the same backend.
#[derive(Clone)]
pub struct Cache {
    backend: Backend,
}

#[derive(Clone)]
enum Backend {
    Redis(RedisStore),
    Memory(MemoryStore),
}

impl Cache {
    /// Connect to a Redis backend, e.g. `redis://127.0.0.1:6379`.
    ///
    /// # Errors
    /// Returns the underlying error if the URL is invalid or the initial
    /// connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            backend: Backend::Redis(RedisStore { connection }),
        })
    }

    /// A process-local cache backend.
    ///
    /// Used by tests, and as a degraded fallback when Redis is not
    /// reachable at startup.
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(MemoryStore::default()),
        }
    }

    /// Look up a live entry. Backend failures are logged and reported as a
    /// miss.
    pub async fn get(&self, key: &CacheKey) -> Option<String> {
        match &self.backend {
            Backend::Redis(store) => store.get(key).await,
            Backend::Memory(store) => store.get(key),
        }
    }

    /// Store an entry under `key` with its class TTL and register it under
    /// `tags`. Backend failures are logged and ignored; the entry is simply
    /// not cached.
    pub async fn put(&self, key: &CacheKey, body: &str, class: TtlClass, tags: &[CacheTag]) {
        match &self.backend {
            Backend::Redis(store) => store.put(key, body, class.ttl(), tags).await,
            Backend::Memory(store) => store.put(key, body, class.ttl(), tags),
        }
    }

    /// Remove every entry registered under any of `tags`.
    ///
    /// Failures here mean readers may see stale data until the TTL expires,
    /// so they are logged loudly, but they still must not fail the mutation
    /// that requested the invalidation.
    pub async fn invalidate(&self, tags: &[CacheTag]) {
        match &self.backend {
            Backend::Redis(store) => store.invalidate(tags).await,
            Backend::Memory(store) => store.invalidate(tags),
        }
    }

    #[cfg(test)]
    pub(crate) fn backdate_entry(&self, key: &CacheKey, age: Duration) {
        if let Backend::Memory(store) = &self.backend {
            store.backdate_entry(key, age);
        }
    }
}

/// Serve a read request through the cache: return the live entry if there is
/// one, otherwise run `compute`, store its JSON under `key`, and return it.
///
/// Both paths return the same serialized bytes, so a response is
/// byte-identical whether it was cached or freshly computed.
///
/// # Errors
/// Returns the error from `compute` or from serializing its result. Cache
/// failures never surface here.
pub async fn read_through<T, F>(
    cache: &Cache,
    key: CacheKey,
    class: TtlClass,
    tags: &[CacheTag],
    compute: F,
) -> Result<Response, Error>
where
    T: Serialize,
    F: FnOnce() -> Result<T, Error>,
{
    if let Some(body) = cache.get(&key).await {
        tracing::debug!("cache hit for key {}", key.as_str());
        return Ok(json_body_response(body));
    }

    let value = compute()?;
    let body = serde_json::to_string(&value)
        .map_err(|error| Error::JsonSerializationError(error.to_string()))?;

    cache.put(&key, &body, class, tags).await;

    Ok(json_body_response(body))
}

fn json_body_response(body: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

/// The Redis backend. All operations are bounded by [OP_TIMEOUT] and absorb
/// their own errors.
#[derive(Clone)]
struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    async fn get(&self, key: &CacheKey) -> Option<String> {
        let mut connection = self.connection.clone();

        let result = timeout(OP_TIMEOUT, connection.get::<_, Option<String>>(key.as_str())).await;

        match result {
            Ok(Ok(entry)) => entry,
            Ok(Err(error)) => {
                tracing::warn!("cache read failed for key {}: {error}", key.as_str());
                None
            }
            Err(_) => {
                tracing::warn!("cache read timed out for key {}", key.as_str());
                None
            }
        }
    }

    async fn put(&self, key: &CacheKey, body: &str, ttl: Duration, tags: &[CacheTag]) {
        let mut connection = self.connection.clone();

        let mut pipeline = redis::pipe();
        pipeline.set_ex(key.as_str(), body, ttl.as_secs()).ignore();
        for tag in tags {
            let tag = tag.to_string();
            pipeline.sadd(&tag, key.as_str()).ignore();
            pipeline.expire(&tag, TAG_TTL_SECS).ignore();
        }

        let result = timeout(OP_TIMEOUT, pipeline.query_async::<()>(&mut connection)).await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                tracing::warn!("cache write failed for key {}: {error}", key.as_str());
            }
            Err(_) => tracing::warn!("cache write timed out for key {}", key.as_str()),
        }
    }

    async fn invalidate(&self, tags: &[CacheTag]) {
        let mut connection = self.connection.clone();

        for tag in tags {
            let tag = tag.to_string();

            let keys =
                match timeout(OP_TIMEOUT, connection.smembers::<_, Vec<String>>(&tag)).await {
                    Ok(Ok(keys)) => keys,
                    Ok(Err(error)) => {
                        tracing::error!(
                            "cache invalidation failed reading tag {tag}: {error}; \
                             entries remain until their TTL expires"
                        );
                        continue;
                    }
                    Err(_) => {
                        tracing::error!(
                            "cache invalidation timed out reading tag {tag}; \
                             entries remain until their TTL expires"
                        );
                        continue;
                    }
                };

            let mut pipeline = redis::pipe();
            if !keys.is_empty() {
                pipeline.del(&keys).ignore();
            }
            pipeline.del(&tag).ignore();

            match timeout(OP_TIMEOUT, pipeline.query_async::<()>(&mut connection)).await {
                Ok(Ok(())) => {
                    tracing::debug!("invalidated {} cache entries under {tag}", keys.len());
                }
                Ok(Err(error)) => {
                    tracing::error!(
                        "cache invalidation failed deleting tag {tag}: {error}; \
                         entries remain until their TTL expires"
                    );
                }
                Err(_) => {
                    tracing::error!(
                        "cache invalidation timed out deleting tag {tag}; \
                         entries remain until their TTL expires"
                    );
                }
            }
        }
    }
}

struct MemoryEntry {
    body: String,
    expires_at: Instant,
}

#[derive(Default)]
struct MemoryInner {
    entries: HashMap<String, MemoryEntry>,
    tags: HashMap<String, HashSet<String>>,
}

/// A process-local backend with the same observable behavior as the Redis
/// one.
#[derive(Clone, Default)]
struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    fn get(&self, key: &CacheKey) -> Option<String> {
        let mut inner = self.inner.lock().expect("Could not acquire cache lock");

        match inner.entries.get(key.as_str()) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.body.clone()),
            Some(_) => {
                inner.entries.remove(key.as_str());
                None
            }
            None => None,
        }
    }

    fn put(&self, key: &CacheKey, body: &str, ttl: Duration, tags: &[CacheTag]) {
        let mut inner = self.inner.lock().expect("Could not acquire cache lock");

        inner.entries.insert(
            key.as_str().to_owned(),
            MemoryEntry {
                body: body.to_owned(),
                expires_at: Instant::now() + ttl,
            },
        );

        for tag in tags {
            inner
                .tags
                .entry(tag.to_string())
                .or_default()
                .insert(key.as_str().to_owned());
        }
    }

    fn invalidate(&self, tags: &[CacheTag]) {
        let mut inner = self.inner.lock().expect("Could not acquire cache lock");

        for tag in tags {
            let Some(keys) = inner.tags.remove(&tag.to_string()) else {
                continue;
            };

            for key in keys {
                inner.entries.remove(&key);
            }
        }
    }

    #[cfg(test)]
    fn backdate_entry(&self, key: &CacheKey, age: Duration) {
        let mut inner = self.inner.lock().expect("Could not acquire cache lock");

        if let Some(entry) = inner.entries.get_mut(key.as_str()) {
            entry.expires_at = Instant::now() - age;
        }
    }
}

#[cfg(test)]
mod cache_tests {
    use std::time::Duration;

    use axum::http::Uri;

    use super::{Cache, CacheKey, CacheTag, TtlClass, read_through};

    fn key_for(path: &str, user_id: i64) -> CacheKey {
        let uri: Uri = path.parse().unwrap();
        CacheKey::new(&uri, user_id)
    }

    #[tokio::test]
    async fn get_returns_what_put_stored() {
        let cache = Cache::in_memory();
        let key = key_for("/analytics/overview?start_date=2026-01-01", 1);

        cache
            .put(&key, "{\"a\":1}", TtlClass::Analytics, &[CacheTag::Analytics])
            .await;

        assert_eq!(cache.get(&key).await.as_deref(), Some("{\"a\":1}"));
    }

    #[tokio::test]
    async fn keys_are_scoped_per_user() {
        let cache = Cache::in_memory();
        let key_user_1 = key_for("/analytics/overview", 1);
        let key_user_2 = key_for("/analytics/overview", 2);

        cache
            .put(
                &key_user_1,
                "user one's data",
                TtlClass::Analytics,
                &[CacheTag::UserAnalytics(1)],
            )
            .await;

        assert!(cache.get(&key_user_2).await.is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let cache = Cache::in_memory();
        let key = key_for("/transactions", 1);

        cache
            .put(
                &key,
                "stale",
                TtlClass::Transactions,
                &[CacheTag::UserTransactions(1)],
            )
            .await;
        cache.backdate_entry(&key, Duration::from_secs(1));

        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn invalidate_removes_only_tagged_entries() {
        let cache = Cache::in_memory();
        let user_1_overview = key_for("/analytics/overview", 1);
        let user_2_overview = key_for("/analytics/overview", 2);
        let categories = key_for("/categories", 1);

        cache
            .put(
                &user_1_overview,
                "one",
                TtlClass::Analytics,
                &[CacheTag::UserAnalytics(1), CacheTag::Analytics],
            )
            .await;
        cache
            .put(
                &user_2_overview,
                "two",
                TtlClass::Analytics,
                &[CacheTag::UserAnalytics(2), CacheTag::Analytics],
            )
            .await;
        cache
            .put(
                &categories,
                "cats",
                TtlClass::Categories,
                &[CacheTag::Categories],
            )
            .await;

        cache.invalidate(&[CacheTag::UserAnalytics(1)]).await;

        assert!(cache.get(&user_1_overview).await.is_none());
        assert!(cache.get(&user_2_overview).await.is_some());
        assert!(cache.get(&categories).await.is_some());
    }

    #[tokio::test]
    async fn invalidating_a_shared_tag_removes_entries_for_all_users() {
        let cache = Cache::in_memory();
        let user_1_overview = key_for("/analytics/overview", 1);
        let user_2_overview = key_for("/analytics/overview", 2);

        for (key, user_id) in [(&user_1_overview, 1), (&user_2_overview, 2)] {
            cache
                .put(
                    key,
                    "data",
                    TtlClass::Analytics,
                    &[CacheTag::UserAnalytics(user_id), CacheTag::Analytics],
                )
                .await;
        }

        cache.invalidate(&[CacheTag::Analytics]).await;

        assert!(cache.get(&user_1_overview).await.is_none());
        assert!(cache.get(&user_2_overview).await.is_none());
    }

    #[tokio::test]
    async fn read_through_computes_once_and_serves_identical_bytes() {
        use axum::body::to_bytes;
        use serde::Serialize;

        #[derive(Serialize)]
        struct Payload {
            answer: i32,
        }

        let cache = Cache::in_memory();
        let mut compute_calls = 0;

        let first = read_through(
            &cache,
            key_for("/analytics/overview", 1),
            TtlClass::Analytics,
            &[CacheTag::UserAnalytics(1)],
            || {
                compute_calls += 1;
                Ok(Payload { answer: 42 })
            },
        )
        .await
        .unwrap();

        let second = read_through(
            &cache,
            key_for("/analytics/overview", 1),
            TtlClass::Analytics,
            &[CacheTag::UserAnalytics(1)],
            || {
                compute_calls += 1;
                Ok(Payload { answer: 0 })
            },
        )
        .await
        .unwrap();

        assert_eq!(compute_calls, 1, "second read should be served from cache");

        let first_bytes = to_bytes(first.into_body(), usize::MAX).await.unwrap();
        let second_bytes = to_bytes(second.into_body(), usize::MAX).await.unwrap();
        assert_eq!(first_bytes, second_bytes);
        assert_eq!(first_bytes.as_ref(), b"{\"answer\":42}");
    }
}

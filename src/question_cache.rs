use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::models::Candidate;

/// Source of "now" for cache freshness checks.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests and replays.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassCacheKey {
    pub class_id: String,
    pub topic: String,
    pub grade: u8,
    pub app_id: Option<String>,
}

impl ClassCacheKey {
    pub fn new(class_id: &str, topic: &str, grade: u8, app_id: Option<&str>) -> Self {
        Self {
            class_id: class_id.to_string(),
            topic: topic.to_string(),
            grade,
            app_id: app_id.map(str::to_string),
        }
    }
}

impl fmt::Display for ClassCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.class_id,
            self.topic,
            self.grade,
            self.app_id.as_deref().unwrap_or("-")
        )
    }
}

#[derive(Debug, Clone)]
struct CachedClassQuestions {
    questions: Vec<Candidate>,
    fetched_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Unfiltered class-bank results keyed by (class, topic, grade, app).
///
/// Shared across quiz-start requests; concurrent writers for the same key
/// simply overwrite each other.
#[derive(Debug, Clone)]
pub struct ClassQuestionCache {
    cache: Arc<RwLock<HashMap<ClassCacheKey, CachedClassQuestions>>>,
    clock: Arc<dyn Clock>,
    max_size: usize,
    ttl: Duration,
}

impl ClassQuestionCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self::with_clock(max_size, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(max_size: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            clock,
            max_size: max_size.max(1),
            ttl,
        }
    }

    /// Store a class question list with automatic expiration
    pub async fn insert(&self, key: ClassCacheKey, questions: Vec<Candidate>) {
        let now = self.clock.now();
        let entry = CachedClassQuestions {
            questions,
            fetched_at: now,
            expires_at: now + self.ttl,
        };

        let mut cache = self.cache.write().await;

        Self::cleanup_expired_entries(&mut cache, now);

        if !cache.contains_key(&key) && cache.len() >= self.max_size {
            Self::evict_oldest(&mut cache);
        }

        debug!(key = %key, count = entry.questions.len(), "Cached class questions");
        cache.insert(key, entry);
    }

    /// Cached questions if present and still fresh
    pub async fn get(&self, key: &ClassCacheKey) -> Option<Vec<Candidate>> {
        let now = self.clock.now();
        {
            let cache = self.cache.read().await;
            match cache.get(key) {
                Some(cached) if cached.expires_at > now => return Some(cached.questions.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut cache = self.cache.write().await;
        if cache.get(key).is_some_and(|cached| cached.expires_at <= now) {
            cache.remove(key);
            debug!(key = %key, "Class question cache entry expired");
        }
        None
    }

    pub async fn invalidate(&self, key: &ClassCacheKey) -> bool {
        self.cache.write().await.remove(key).is_some()
    }

    /// Get cache statistics for monitoring
    pub async fn stats(&self) -> CacheStats {
        let cache = self.cache.read().await;
        let now = self.clock.now();

        let total_entries = cache.len();
        let expired_entries = cache.values().filter(|cached| cached.expires_at <= now).count();

        CacheStats {
            total_entries,
            expired_entries,
            active_entries: total_entries - expired_entries,
            max_size: self.max_size,
        }
    }

    /// Manual cache cleanup - removes expired entries
    pub async fn cleanup(&self) {
        let now = self.clock.now();
        let mut cache = self.cache.write().await;
        Self::cleanup_expired_entries(&mut cache, now);
    }

    pub async fn clear(&self) {
        self.cache.write().await.clear();
        info!("Class question cache cleared");
    }

    fn cleanup_expired_entries(cache: &mut HashMap<ClassCacheKey, CachedClassQuestions>, now: DateTime<Utc>) {
        cache.retain(|_, cached| cached.expires_at > now);
    }

    fn evict_oldest(cache: &mut HashMap<ClassCacheKey, CachedClassQuestions>) {
        if let Some(oldest_key) = cache
            .iter()
            .min_by_key(|(_, cached)| cached.fetched_at)
            .map(|(key, _)| key.clone())
        {
            cache.remove(&oldest_key);
            debug!(key = %oldest_key, "Evicted oldest class question cache entry");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
    pub max_size: usize,
}

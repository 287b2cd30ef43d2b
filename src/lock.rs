// src/lock.rs

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::ExamError;

/// TTL'd key/value store used for mutual exclusion and short-lived
/// markers. The session entry it holds is the single source of truth
/// for "an attempt is in flight", not the attempt rows.
///
/// `set_nx` must be atomic set-if-absent-with-TTL so that two
/// concurrent `start()` calls for the same (learner, course) cannot
/// both succeed. A Redis `SET NX EX` maps onto it directly; the
/// in-process implementation below serves tests and single-node
/// deployments.
#[async_trait]
pub trait SessionLockStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, ExamError>;

    /// Returns true iff the key was newly set.
    async fn set_nx(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, ExamError>;

    async fn del(&self, key: &str) -> Result<(), ExamError>;
}

/// Key of the session entry mapping (learner, course) to the live
/// attempt id. Set on start, checked on submit, deleted on submit or
/// lazy expiry.
pub fn session_key(user_id: i64, course_id: i64) -> String {
    format!("exam_session:{}:{}", user_id, course_id)
}

/// Key of the guard closing the check-then-set race between two
/// concurrent starts. Held until submit or expiry clears it; the TTL
/// is the crash backstop.
pub fn start_guard_key(user_id: i64, course_id: i64) -> String {
    format!("exam_lock:{}:{}", user_id, course_id)
}

/// Key of the audit marker the monitor writes for suspicious pairs.
pub fn flag_marker_key(user_id: i64, course_id: i64) -> String {
    format!("exam_flag:{}:{}", user_id, course_id)
}

/// In-process lock store. Expired entries are pruned on access, under
/// the same mutex that guards insertion, so `set_nx` keeps its
/// atomicity guarantee.
#[derive(Default)]
pub struct MemoryLockStore {
    entries: Mutex<HashMap<String, Entry>>,
}

struct Entry {
    value: String,
    expires_at: Instant,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionLockStore for MemoryLockStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ExamError> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_nx(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, ExamError> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        let now = Instant::now();
        if let Some(entry) = entries.get(key) {
            if entry.expires_at > now {
                return Ok(false);
            }
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + Duration::from_secs(ttl_secs),
            },
        );
        Ok(true)
    }

    async fn del(&self, key: &str) -> Result<(), ExamError> {
        let mut entries = self.entries.lock().map_err(poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> ExamError {
    ExamError::TransientIo("lock store mutex poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_nx_is_exclusive_until_deleted() {
        let store = MemoryLockStore::new();
        assert!(store.set_nx("k", "1", 60).await.unwrap());
        assert!(!store.set_nx("k", "2", 60).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("1"));

        store.del("k").await.unwrap();
        assert!(store.set_nx("k", "2", 60).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn expired_entries_are_pruned() {
        let store = MemoryLockStore::new();
        assert!(store.set_nx("k", "1", 0).await.unwrap());
        // TTL of zero expires immediately.
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.set_nx("k", "2", 60).await.unwrap());
    }
}

//! Upload session registry
//!
//! Each session sits behind its own mutex, so a correction waiting on the
//! catalog only holds up requests for that session. The registry lock is held
//! for map lookups and inserts only.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::ingest::FileReport;
use crate::validation::ValidationSession;

pub const DEFAULT_TTL_MINUTES: i64 = 60;
pub const DEFAULT_MAX_PER_ORG: usize = 20;

/// Staged orders of one upload, held until they are saved or discarded.
pub struct UploadSession {
    pub organization_id: Uuid,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub files: Vec<FileReport>,
    pub validation: ValidationSession,
    /// Set once the orders were saved; a closed session accepts no further work.
    pub closed: bool,
}

pub type SharedSession = Arc<Mutex<UploadSession>>;

struct Entry {
    organization_id: Uuid,
    created_at: DateTime<Utc>,
    session: SharedSession,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool { now - self.created_at > ttl }
}

pub struct SessionStore {
    entries: RwLock<HashMap<Uuid, Entry>>,
    ttl: Duration,
    max_per_org: usize,
}

impl Default for SessionStore {
    fn default() -> Self { Self::new(Duration::minutes(DEFAULT_TTL_MINUTES), DEFAULT_MAX_PER_ORG) }
}

impl SessionStore {
    pub fn new(ttl: Duration, max_per_org: usize) -> Self {
        Self { entries: RwLock::default(), ttl, max_per_org: max_per_org.max(1) }
    }

    /// Registers a session under `id`. Expired sessions are dropped first; an
    /// organization at its limit loses its oldest session.
    pub async fn insert(&self, id: Uuid, session: UploadSession, now: DateTime<Utc>) {
        let organization_id = session.organization_id;
        let mut entries = self.entries.write().await;

        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now, self.ttl));
        let expired = before - entries.len();

        let mut owned: Vec<(Uuid, DateTime<Utc>)> = entries.iter()
            .filter(|(_, e)| e.organization_id == organization_id)
            .map(|(id, e)| (*id, e.created_at))
            .collect();
        owned.sort_by_key(|(_, at)| *at);
        let excess = (owned.len() + 1).saturating_sub(self.max_per_org);
        for (old, _) in owned.into_iter().take(excess) {
            entries.remove(&old);
        }
        if expired > 0 || excess > 0 {
            tracing::info!(expired, displaced = excess, %organization_id, "upload sessions evicted");
        }

        let created_at = session.created_at;
        entries.insert(id, Entry { organization_id, created_at, session: Arc::new(Mutex::new(session)) });
    }

    /// The live session `id` if it belongs to `organization_id`.
    pub async fn get(&self, id: Uuid, organization_id: Uuid, now: DateTime<Utc>) -> Option<SharedSession> {
        self.entries.read().await.get(&id)
            .filter(|e| e.organization_id == organization_id && !e.is_expired(now, self.ttl))
            .map(|e| e.session.clone())
    }

    /// Drops session `id` of `organization_id`; false when there was none.
    pub async fn remove(&self, id: Uuid, organization_id: Uuid) -> bool {
        let mut entries = self.entries.write().await;
        if !entries.get(&id).is_some_and(|e| e.organization_id == organization_id) {
            return false;
        }
        entries.remove(&id).is_some()
    }

    pub async fn len(&self) -> usize { self.entries.read().await.len() }
}

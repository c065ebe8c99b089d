//! Live token records.
//!
//! A record pairs one access token with one refresh token. Either half can be
//! used to find or revoke the record, and revoking removes both halves. The
//! access half is replaced in place on refresh; the refresh half never changes.
//!
//! Records whose refresh token has expired are dead for good and are dropped
//! the next time a lookup touches them.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::codec::ExternalSubject;
use crate::credentials::digest_token;
use crate::scope::Scopes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId(Uuid);

impl RecordId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct TokenRecord {
    pub id: RecordId,
    pub access_token: String,
    pub refresh_token: String,
    pub client_id: String,
    pub user_id: String,
    pub scopes: Scopes,
    /// Absolute access-token expiry.
    pub expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    /// Set when the record was minted for a federated identity.
    pub external: Option<ExternalSubject>,
}

impl TokenRecord {
    /// Whether the access half is still usable at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Everything needed to create a record; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewTokenRecord {
    pub access_token: String,
    pub refresh_token: String,
    pub client_id: String,
    pub user_id: String,
    pub scopes: Scopes,
    pub expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub external: Option<ExternalSubject>,
}

#[derive(Default)]
struct Inner {
    records: HashMap<RecordId, TokenRecord>,
    /// access-token digest -> record
    by_access: HashMap<String, RecordId>,
    /// refresh-token digest -> record
    by_refresh: HashMap<String, RecordId>,
}

impl Inner {
    fn remove(&mut self, id: RecordId) -> Option<TokenRecord> {
        let record = self.records.remove(&id)?;
        self.by_access.remove(&digest_token(&record.access_token));
        self.by_refresh.remove(&digest_token(&record.refresh_token));
        Some(record)
    }
}

pub struct TokenStore {
    inner: RwLock<Inner>,
    clock: SharedClock,
}

impl TokenStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            clock,
        }
    }

    /// Store a fresh record and return its id.
    pub fn put(&self, new: NewTokenRecord) -> RecordId {
        let id = RecordId::generate();
        let access_key = digest_token(&new.access_token);
        let refresh_key = digest_token(&new.refresh_token);
        let record = TokenRecord {
            id,
            access_token: new.access_token,
            refresh_token: new.refresh_token,
            client_id: new.client_id,
            user_id: new.user_id,
            scopes: new.scopes,
            expires_at: new.expires_at,
            refresh_expires_at: new.refresh_expires_at,
            external: new.external,
        };

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        // One record per token: anything already holding either half goes.
        let stale: Vec<RecordId> = [
            inner.by_access.get(&access_key).copied(),
            inner.by_refresh.get(&refresh_key).copied(),
        ]
        .into_iter()
        .flatten()
        .collect();
        for stale_id in stale {
            inner.remove(stale_id);
        }
        inner.by_access.insert(access_key, id);
        inner.by_refresh.insert(refresh_key, id);
        inner.records.insert(id, record);
        id
    }

    pub fn find_by_access_token(&self, token: &str) -> Option<TokenRecord> {
        self.find(|inner| inner.by_access.get(&digest_token(token)).copied())
    }

    pub fn find_by_refresh_token(&self, token: &str) -> Option<TokenRecord> {
        self.find(|inner| inner.by_refresh.get(&digest_token(token)).copied())
    }

    fn find(&self, locate: impl Fn(&Inner) -> Option<RecordId>) -> Option<TokenRecord> {
        let now = self.clock.now();
        {
            let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            let record = inner.records.get(&locate(&*inner)?)?;
            if record.refresh_expires_at > now {
                return Some(record.clone());
            }
        }

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = locate(&*inner) {
            if inner
                .records
                .get(&id)
                .is_some_and(|r| r.refresh_expires_at <= now)
            {
                inner.remove(id);
                tracing::debug!(record_id = %id, "Reaped fully expired token record");
            }
        }
        None
    }

    /// Delete the record holding `token` as either its access or refresh half.
    pub fn revoke(&self, token: &str) -> bool {
        let key = digest_token(token);
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let id = inner
            .by_access
            .get(&key)
            .or_else(|| inner.by_refresh.get(&key))
            .copied();
        match id {
            Some(id) => inner.remove(id).is_some(),
            None => false,
        }
    }

    /// Replace the access half of a record in place.
    ///
    /// Returns false if the record no longer exists (revoked in the meantime).
    pub fn touch(&self, id: RecordId, new_access_token: String, new_expiry: DateTime<Utc>) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let Some(record) = inner.records.get_mut(&id) else {
            return false;
        };
        let old_key = digest_token(&record.access_token);
        let new_key = digest_token(&new_access_token);
        record.access_token = new_access_token;
        record.expires_at = new_expiry;

        inner.by_access.remove(&old_key);
        inner.by_access.insert(new_key, id);
        true
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use chrono::Duration;
    use std::sync::Arc;

    fn store() -> (TokenStore, ManualClock) {
        let clock = ManualClock::default();
        (TokenStore::new(Arc::new(clock.clone())), clock)
    }

    fn new_record(clock: &ManualClock, access: &str, refresh: &str) -> NewTokenRecord {
        NewTokenRecord {
            access_token: access.into(),
            refresh_token: refresh.into(),
            client_id: "c1".into(),
            user_id: "user-1".into(),
            scopes: Scopes::parse("read"),
            expires_at: clock.now() + Duration::seconds(900),
            refresh_expires_at: clock.now() + Duration::days(7),
            external: None,
        }
    }

    #[test]
    fn test_put_and_find_by_either_half() {
        let (store, clock) = store();
        let id = store.put(new_record(&clock, "at-1", "rt-1"));

        assert_eq!(store.find_by_access_token("at-1").unwrap().id, id);
        assert_eq!(store.find_by_refresh_token("rt-1").unwrap().id, id);
        assert!(store.find_by_access_token("rt-1").is_none());
        assert!(store.find_by_refresh_token("at-1").is_none());
    }

    #[test]
    fn test_revoke_either_half_removes_both() {
        let (store, clock) = store();
        store.put(new_record(&clock, "at-1", "rt-1"));
        store.put(new_record(&clock, "at-2", "rt-2"));

        assert!(store.revoke("at-1"));
        assert!(store.find_by_refresh_token("rt-1").is_none());
        assert!(!store.revoke("rt-1"));

        assert!(store.revoke("rt-2"));
        assert!(store.find_by_access_token("at-2").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_revoke_unknown_token() {
        let (store, _) = store();
        assert!(!store.revoke("never-issued"));
    }

    #[test]
    fn test_touch_replaces_access_half_only() {
        let (store, clock) = store();
        let id = store.put(new_record(&clock, "at-1", "rt-1"));
        let new_expiry = clock.now() + Duration::seconds(1800);

        assert!(store.touch(id, "at-2".into(), new_expiry));

        assert!(store.find_by_access_token("at-1").is_none());
        let record = store.find_by_access_token("at-2").unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.refresh_token, "rt-1");
        assert_eq!(record.expires_at, new_expiry);
        assert_eq!(store.find_by_refresh_token("rt-1").unwrap().access_token, "at-2");
    }

    #[test]
    fn test_touch_after_revoke_fails() {
        let (store, clock) = store();
        let id = store.put(new_record(&clock, "at-1", "rt-1"));
        store.revoke("rt-1");

        assert!(!store.touch(id, "at-2".into(), clock.now()));
        assert!(store.find_by_access_token("at-2").is_none());
    }

    #[test]
    fn test_liveness_follows_access_expiry() {
        let (store, clock) = store();
        store.put(new_record(&clock, "at-1", "rt-1"));

        clock.advance(Duration::seconds(901));
        let record = store.find_by_access_token("at-1").unwrap();
        assert!(!record.is_live(clock.now()));
        // Still refreshable.
        assert!(store.find_by_refresh_token("rt-1").is_some());
    }

    #[test]
    fn test_records_past_refresh_expiry_are_reaped_on_lookup() {
        let (store, clock) = store();
        store.put(new_record(&clock, "at-1", "rt-1"));

        clock.advance(Duration::days(7) + Duration::seconds(1));
        assert!(store.find_by_refresh_token("rt-1").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_put_replaces_record_sharing_a_token() {
        let (store, clock) = store();
        store.put(new_record(&clock, "at-1", "rt-1"));
        let id = store.put(new_record(&clock, "at-2", "rt-1"));

        assert_eq!(store.len(), 1);
        assert!(store.find_by_access_token("at-1").is_none());
        assert_eq!(store.find_by_refresh_token("rt-1").unwrap().id, id);
    }
}

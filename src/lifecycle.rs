//! Poll lifecycle: when a poll accepts votes, and lazy archival of expired polls

use chrono::NaiveDate;
use std::sync::Arc;

use crate::store::Store;
use crate::types::{Poll, PollId};
use crate::{Error, Result};

/// True iff the poll is active and scheduled for exactly `today`
pub fn is_open_for_voting(poll: &Poll, today: NaiveDate) -> bool {
    poll.is_open_for_voting(today)
}

/// True iff the poll's date is strictly before `today`
pub fn is_past_election(poll: &Poll, today: NaiveDate) -> bool {
    poll.is_past_election(today)
}

/// Lifecycle operations over a store
pub struct PollLifecycle<S> {
    store: Arc<S>,
}

impl<S> Clone for PollLifecycle<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> PollLifecycle<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Archive every active poll dated before `today`
    ///
    /// Safe to call on every listing request and from concurrent callers:
    /// the store applies it as one conditional update, so a repeat call
    /// with the same date archives nothing.
    pub async fn reconcile_expired(&self, today: NaiveDate) -> Result<u64> {
        let archived = self.store.reconcile_expired(today).await?;
        if archived > 0 {
            tracing::info!("📦 Archived {} expired election(s) before {}", archived, today);
        } else {
            tracing::debug!("No expired elections to archive before {}", today);
        }
        Ok(archived)
    }

    /// Current polls: active and dated today or later, soonest first
    ///
    /// Expired polls are archived first, the same way the index listing of
    /// elections does it.
    pub async fn list_open_polls(&self, today: NaiveDate) -> Result<Vec<Poll>> {
        self.reconcile_expired(today).await?;
        self.store.list_open_polls(today).await
    }

    /// Past polls: dated before today *or* archived, most recent first
    ///
    /// A manually archived poll with a future date is listed here even
    /// though it never opened.
    pub async fn list_past_polls(&self, today: NaiveDate) -> Result<Vec<Poll>> {
        self.store.list_past_polls(today).await
    }

    /// Whether the poll accepts votes on `today`
    pub async fn is_open_for_voting(&self, poll_id: PollId, today: NaiveDate) -> Result<bool> {
        let poll = self
            .store
            .get_poll(poll_id)
            .await?
            .ok_or_else(|| Error::not_found("poll", poll_id))?;
        Ok(is_open_for_voting(&poll, today))
    }

    /// Manually archive a poll, whatever its date
    pub async fn archive(&self, poll_id: PollId) -> Result<()> {
        if !self.store.set_poll_active(poll_id, false).await? {
            return Err(Error::not_found("poll", poll_id));
        }
        tracing::info!("📦 Election {} archived by administrator", poll_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{Choice, ChoiceId, Department};
    use chrono::{Duration, TimeZone, Utc};

    async fn insert_poll(store: &MemoryStore, offset_days: i64) -> Poll {
        let base = Utc.with_ymd_and_hms(2024, 9, 15, 12, 0, 0).unwrap();
        let poll = Poll {
            id: PollId::new(),
            question: None,
            publication_date: base + Duration::days(offset_days),
            is_active: true,
            department: Some(Department::President),
            created_at: base,
        };
        let choice = Choice {
            id: ChoiceId::new(),
            poll_id: poll.id,
            candidate_id: None,
            vote_count: 0,
        };
        store.insert_poll(poll, vec![choice]).await.unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 15).unwrap()
    }

    #[tokio::test]
    async fn test_open_predicate_boundaries() {
        let store = Arc::new(MemoryStore::new());
        let yesterday = insert_poll(&store, -1).await;
        let current = insert_poll(&store, 0).await;
        let tomorrow = insert_poll(&store, 1).await;
        let lifecycle = PollLifecycle::new(store);

        assert!(!lifecycle.is_open_for_voting(yesterday.id, today()).await.unwrap());
        assert!(lifecycle.is_open_for_voting(current.id, today()).await.unwrap());
        assert!(!lifecycle.is_open_for_voting(tomorrow.id, today()).await.unwrap());

        lifecycle.archive(current.id).await.unwrap();
        assert!(!lifecycle.is_open_for_voting(current.id, today()).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_poll_is_not_found() {
        let lifecycle = PollLifecycle::new(Arc::new(MemoryStore::new()));
        assert!(matches!(
            lifecycle.is_open_for_voting(PollId::new(), today()).await,
            Err(Error::NotFound { entity: "poll", .. })
        ));
        assert!(matches!(
            lifecycle.archive(PollId::new()).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        insert_poll(&store, -3).await;
        insert_poll(&store, -1).await;
        insert_poll(&store, 0).await;
        let lifecycle = PollLifecycle::new(store);

        assert_eq!(lifecycle.reconcile_expired(today()).await.unwrap(), 2);
        assert_eq!(lifecycle.reconcile_expired(today()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_past_listing_is_union_of_date_and_flag() {
        let store = Arc::new(MemoryStore::new());
        let old = insert_poll(&store, -2).await;
        let current = insert_poll(&store, 0).await;
        let future = insert_poll(&store, 5).await;
        let lifecycle = PollLifecycle::new(store);

        lifecycle.archive(future.id).await.unwrap();

        let open: Vec<PollId> = lifecycle
            .list_open_polls(today())
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(open, vec![current.id]);

        let past: Vec<PollId> = lifecycle
            .list_past_polls(today())
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(past, vec![future.id, old.id]);
    }

    #[test]
    fn test_free_predicates() {
        let poll = Poll {
            id: PollId::new(),
            question: None,
            publication_date: Utc.with_ymd_and_hms(2024, 9, 15, 23, 59, 59).unwrap(),
            is_active: true,
            department: None,
            created_at: Utc::now(),
        };
        assert!(is_open_for_voting(&poll, today()));
        assert!(!is_past_election(&poll, today()));
        assert!(is_past_election(&poll, today() + Duration::days(1)));
    }
}

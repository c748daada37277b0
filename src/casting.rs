//! Vote casting transaction
//!
//! Flow for one request:
//! 1. The poll must exist and the voter must be registered
//! 2. The poll must be open on the date of `now`
//! 3. Advisory check that the voter has not voted in this poll
//! 4. The choice must belong to the poll
//! 5. The store's ballot transaction re-checks (3), increments the tally
//!    and writes the ballot, bounded by the configured timeout
//!
//! Step 3 only produces a friendly early answer. Step 5 is what actually
//! prevents a double vote when requests race.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::lifecycle;
use crate::store::Store;
use crate::types::{ChoiceId, NewBallot, PollId, VoteReceipt, VoterId};
use crate::{Error, Result};

/// Executes vote-casting transactions against a store
pub struct VoteCaster<S> {
    store: Arc<S>,
    transaction_timeout: Duration,
}

impl<S> Clone for VoteCaster<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            transaction_timeout: self.transaction_timeout,
        }
    }
}

impl<S: Store> VoteCaster<S> {
    pub fn new(store: Arc<S>, transaction_timeout: Duration) -> Self {
        Self {
            store,
            transaction_timeout,
        }
    }

    /// Cast one ballot for `voter_id` in `poll_id`
    ///
    /// On success the chosen choice's tally has grown by exactly one and
    /// exactly one new ballot exists for the pair. On any error nothing has
    /// changed. Retrying is only meaningful after
    /// [`Error::TransientStoreFailure`], and the retry re-runs every check.
    pub async fn cast_vote(
        &self,
        voter_id: VoterId,
        poll_id: PollId,
        choice_id: ChoiceId,
        now: DateTime<Utc>,
    ) -> Result<VoteReceipt> {
        let poll = self
            .store
            .get_poll(poll_id)
            .await?
            .ok_or_else(|| Error::not_found("poll", poll_id))?;

        if self.store.get_voter(voter_id).await?.is_none() {
            return Err(Error::not_found("voter", voter_id));
        }

        let today = now.date_naive();
        if !lifecycle::is_open_for_voting(&poll, today) {
            tracing::debug!(
                "Vote rejected: election {} is not open on {} (scheduled {}, active={})",
                poll_id,
                today,
                poll.date(),
                poll.is_active
            );
            return Err(Error::ElectionClosed { poll_id });
        }

        if self.store.find_ballot(voter_id, poll_id).await?.is_some() {
            tracing::debug!("Vote rejected: voter {} already voted in {}", voter_id, poll_id);
            return Err(Error::AlreadyVoted { voter_id, poll_id });
        }

        let choice = self
            .store
            .get_choice(choice_id)
            .await?
            .ok_or_else(|| Error::not_found("choice", choice_id))?;
        if choice.poll_id != poll_id {
            tracing::warn!(
                "Vote rejected: choice {} belongs to {}, not {}",
                choice_id,
                choice.poll_id,
                poll_id
            );
            return Err(Error::InvalidChoice { choice_id, poll_id });
        }

        let ballot = NewBallot {
            voter_id,
            poll_id,
            choice_id,
            cast_at: now,
        };

        let recorded = tokio::time::timeout(self.transaction_timeout, self.store.record_ballot(ballot))
            .await
            .map_err(|_| {
                tracing::error!(
                    "Ballot transaction for election {} exceeded {:?}",
                    poll_id,
                    self.transaction_timeout
                );
                Error::transient(format!(
                    "ballot transaction exceeded {:?}",
                    self.transaction_timeout
                ))
            })?;

        match recorded {
            Ok(ballot) => {
                tracing::info!(
                    "🗳️ Vote recorded: ballot={}, election={}, choice={}",
                    ballot.id,
                    ballot.poll_id,
                    ballot.choice_id
                );
                Ok(VoteReceipt::from(ballot))
            }
            Err(err @ Error::AlreadyVoted { .. }) => {
                tracing::warn!(
                    "Concurrent duplicate vote blocked: voter={}, election={}",
                    voter_id,
                    poll_id
                );
                Err(err)
            }
            Err(err) => {
                if err.is_retryable() {
                    tracing::warn!("Ballot transaction failed transiently: {}", err);
                } else {
                    tracing::error!("Ballot transaction failed: {}", err);
                }
                Err(err)
            }
        }
    }

    /// Whether the voter already holds a ballot for the poll
    pub async fn has_voted(&self, voter_id: VoterId, poll_id: PollId) -> Result<bool> {
        Ok(self.store.find_ballot(voter_id, poll_id).await?.is_some())
    }
}

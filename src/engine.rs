//! Election engine: the interface offered to request handlers and tools
//!
//! Web handlers, CLIs and seeders resolve identities and parse forms on
//! their side, then call into the engine. The engine composes the vote
//! caster, the lifecycle manager and the statistics aggregator over a single
//! shared [`Store`].

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

use crate::casting::VoteCaster;
use crate::config::VotingConfig;
use crate::lifecycle::PollLifecycle;
use crate::stats::{ElectionOverview, PollStats, StatsAggregator, TallyAudit};
use crate::store::Store;
use crate::types::{
    Ballot, Candidate, CandidateId, Choice, ChoiceId, NewCandidate, NewPoll, NewVoter, Poll,
    PollId, Voter, VoterId, VoteReceipt,
};
use crate::{Error, Result, validation_error};

/// Default position label for candidates
pub const DEFAULT_POSITION: &str = "Candidate";

/// Facade over the voting core
pub struct ElectionEngine<S> {
    store: Arc<S>,
    caster: VoteCaster<S>,
    lifecycle: PollLifecycle<S>,
    stats: StatsAggregator<S>,
    config: VotingConfig,
}

impl<S> Clone for ElectionEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            caster: self.caster.clone(),
            lifecycle: self.lifecycle.clone(),
            stats: self.stats.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: Store> ElectionEngine<S> {
    /// Create an engine over a store
    pub fn new(store: S, config: VotingConfig) -> Self {
        Self::from_shared(Arc::new(store), config)
    }

    /// Create an engine over a store shared with other components
    pub fn from_shared(store: Arc<S>, config: VotingConfig) -> Self {
        Self {
            caster: VoteCaster::new(Arc::clone(&store), config.transaction_timeout()),
            lifecycle: PollLifecycle::new(Arc::clone(&store)),
            stats: StatsAggregator::new(Arc::clone(&store)),
            store,
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &VotingConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Voting
    // ------------------------------------------------------------------

    /// Cast a ballot; see [`VoteCaster::cast_vote`]
    pub async fn cast_vote(
        &self,
        voter_id: VoterId,
        poll_id: PollId,
        choice_id: ChoiceId,
        now: DateTime<Utc>,
    ) -> Result<VoteReceipt> {
        self.caster.cast_vote(voter_id, poll_id, choice_id, now).await
    }

    pub async fn has_voted(&self, voter_id: VoterId, poll_id: PollId) -> Result<bool> {
        self.caster.has_voted(voter_id, poll_id).await
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub async fn is_open_for_voting(&self, poll_id: PollId, date: NaiveDate) -> Result<bool> {
        self.lifecycle.is_open_for_voting(poll_id, date).await
    }

    /// Archive expired polls; returns how many were archived
    pub async fn reconcile_expired(&self, date: NaiveDate) -> Result<u64> {
        self.lifecycle.reconcile_expired(date).await
    }

    pub async fn list_open_polls(&self, date: NaiveDate) -> Result<Vec<Poll>> {
        self.lifecycle.list_open_polls(date).await
    }

    pub async fn list_past_polls(&self, date: NaiveDate) -> Result<Vec<Poll>> {
        self.lifecycle.list_past_polls(date).await
    }

    pub async fn get_poll(&self, poll_id: PollId) -> Result<Poll> {
        self.store
            .get_poll(poll_id)
            .await?
            .ok_or_else(|| Error::not_found("poll", poll_id))
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    pub async fn get_poll_stats(&self, poll_id: PollId) -> Result<PollStats> {
        self.stats.poll_stats(poll_id).await
    }

    pub async fn get_department_stats(&self) -> Result<ElectionOverview> {
        self.stats.department_stats().await
    }

    pub async fn vote_timeline(&self, poll_id: PollId, limit: usize) -> Result<Vec<Ballot>> {
        self.stats.vote_timeline(poll_id, limit).await
    }

    pub async fn audit_poll(&self, poll_id: PollId) -> Result<TallyAudit> {
        self.stats.audit_poll(poll_id).await
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    /// Register the voter profile of a user
    pub async fn register_voter(&self, input: NewVoter) -> Result<Voter> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(validation_error!("name"));
        }
        let srn = input
            .srn
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let voter = Voter {
            id: VoterId::new(),
            user_id: input.user_id,
            name: name.to_string(),
            age: input.age,
            sex: input.sex,
            srn,
            branch: input.branch,
            created_at: Utc::now(),
        };
        let voter = self.store.insert_voter(voter).await?;
        tracing::info!("👤 Voter registered: {} ({})", voter.id, voter.name);
        Ok(voter)
    }

    pub async fn add_candidate(&self, input: NewCandidate) -> Result<Candidate> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(validation_error!("name"));
        }

        let candidate = Candidate {
            id: CandidateId::new(),
            name: name.to_string(),
            age: input.age,
            sex: input.sex,
            branch: input.branch,
            department: input.department,
            position: input
                .position
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_POSITION.to_string()),
        };
        let candidate = self.store.insert_candidate(candidate).await?;
        tracing::info!("Candidate added: {}", candidate);
        Ok(candidate)
    }

    /// Create an active poll with one choice per known candidate
    ///
    /// At least one candidate must be selected. Ids that do not resolve to a
    /// candidate are skipped.
    pub async fn create_poll(&self, input: NewPoll) -> Result<Poll> {
        if input.candidate_ids.is_empty() {
            return Err(validation_error!("candidate_ids: select at least one candidate"));
        }

        let poll = Poll {
            id: PollId::new(),
            question: input.question.filter(|q| !q.trim().is_empty()),
            publication_date: input.publication_date,
            is_active: true,
            department: input.department,
            created_at: Utc::now(),
        };

        let mut choices = Vec::with_capacity(input.candidate_ids.len());
        for candidate_id in input.candidate_ids {
            if self.store.get_candidate(candidate_id).await?.is_none() {
                tracing::warn!("Skipping unknown candidate {} for new election", candidate_id);
                continue;
            }
            choices.push(Choice {
                id: ChoiceId::new(),
                poll_id: poll.id,
                candidate_id: Some(candidate_id),
                vote_count: 0,
            });
        }

        let choice_count = choices.len();
        let poll = self.store.insert_poll(poll, choices).await?;
        tracing::info!(
            "🗓️ Election created: {} on {} with {} candidate(s)",
            poll.title(),
            poll.date(),
            choice_count
        );
        Ok(poll)
    }

    /// Manually archive a poll
    pub async fn archive_poll(&self, poll_id: PollId) -> Result<()> {
        self.lifecycle.archive(poll_id).await
    }

    /// Delete a poll with its choices and ballots
    pub async fn delete_poll(&self, poll_id: PollId) -> Result<()> {
        let poll = self.get_poll(poll_id).await?;
        if !self.store.delete_poll(poll_id).await? {
            return Err(Error::not_found("poll", poll_id));
        }
        tracing::info!("Election \"{}\" deleted", poll.title());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{Department, Sex, UserId};
    use chrono::TimeZone;

    fn engine() -> ElectionEngine<MemoryStore> {
        ElectionEngine::new(MemoryStore::new(), VotingConfig::default())
    }

    fn new_candidate(name: &str) -> NewCandidate {
        NewCandidate {
            name: name.to_string(),
            age: 22,
            sex: Sex::Female,
            branch: None,
            department: None,
            position: None,
        }
    }

    #[tokio::test]
    async fn test_register_voter_validates() {
        let engine = engine();
        let input = NewVoter {
            user_id: UserId::new(),
            name: "  ".to_string(),
            age: None,
            sex: Sex::Other,
            srn: None,
            branch: None,
        };
        assert!(matches!(
            engine.register_voter(input.clone()).await,
            Err(Error::Validation { .. })
        ));

        let voter = engine
            .register_voter(NewVoter {
                name: " Dev Patel ".to_string(),
                srn: Some(" ".to_string()),
                ..input
            })
            .await
            .unwrap();
        assert_eq!(voter.name, "Dev Patel");
        assert_eq!(voter.srn, None);
    }

    #[tokio::test]
    async fn test_candidate_default_position() {
        let engine = engine();
        let candidate = engine.add_candidate(new_candidate("Lena")).await.unwrap();
        assert_eq!(candidate.position, DEFAULT_POSITION);
    }

    #[tokio::test]
    async fn test_create_poll_requires_candidates() {
        let engine = engine();
        let result = engine
            .create_poll(NewPoll {
                question: None,
                department: Some(Department::Social),
                publication_date: Utc::now(),
                candidate_ids: Vec::new(),
            })
            .await;
        match result {
            Err(Error::Validation { field }) => assert!(field.starts_with("candidate_ids")),
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_poll_skips_unknown_candidates() {
        let engine = engine();
        let known = engine.add_candidate(new_candidate("Omar")).await.unwrap();

        let poll = engine
            .create_poll(NewPoll {
                question: Some("".to_string()),
                department: Some(Department::Cultural),
                publication_date: Utc.with_ymd_and_hms(2024, 4, 2, 10, 0, 0).unwrap(),
                candidate_ids: vec![known.id, CandidateId::new()],
            })
            .await
            .unwrap();

        assert!(poll.is_active);
        assert_eq!(poll.question, None);
        let stats = engine.get_poll_stats(poll.id).await.unwrap();
        assert_eq!(stats.choices.len(), 1);
        assert_eq!(stats.choices[0].label, "Omar");
    }

    #[tokio::test]
    async fn test_delete_poll() {
        let engine = engine();
        let candidate = engine.add_candidate(new_candidate("Ada")).await.unwrap();
        let poll = engine
            .create_poll(NewPoll {
                question: None,
                department: None,
                publication_date: Utc::now(),
                candidate_ids: vec![candidate.id],
            })
            .await
            .unwrap();

        engine.delete_poll(poll.id).await.unwrap();
        assert!(matches!(
            engine.get_poll(poll.id).await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            engine.delete_poll(poll.id).await,
            Err(Error::NotFound { .. })
        ));
    }
}

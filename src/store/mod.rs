//! Storage engine seam
//!
//! The store is the only shared mutable resource of the engine. Its
//! transaction discipline (a uniqueness constraint on `(voter, poll)` for
//! ballots plus an atomic increment of the choice counter) is the sole
//! concurrency control: callers never add locks of their own, since several
//! engine instances may share one store.

pub mod memory;
pub mod postgres;

use chrono::NaiveDate;
use std::future::Future;

use crate::Result;
use crate::types::{
    Ballot, Candidate, CandidateId, Choice, ChoiceId, ChoiceTally, NewBallot, Poll, PollId, Voter,
    VoterId,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Persistence operations required by the engine
pub trait Store: Send + Sync {
    /// Insert a voter profile; `user_id` and `srn` must be unique
    fn insert_voter(&self, voter: Voter) -> impl Future<Output = Result<Voter>> + Send;

    fn insert_candidate(
        &self,
        candidate: Candidate,
    ) -> impl Future<Output = Result<Candidate>> + Send;

    /// Insert a poll together with its choices, atomically
    fn insert_poll(
        &self,
        poll: Poll,
        choices: Vec<Choice>,
    ) -> impl Future<Output = Result<Poll>> + Send;

    /// Delete a poll with its choices and ballots; false if it did not exist
    fn delete_poll(&self, poll_id: PollId) -> impl Future<Output = Result<bool>> + Send;

    /// Set the activity flag; false if the poll does not exist
    fn set_poll_active(
        &self,
        poll_id: PollId,
        is_active: bool,
    ) -> impl Future<Output = Result<bool>> + Send;

    fn get_poll(&self, poll_id: PollId) -> impl Future<Output = Result<Option<Poll>>> + Send;

    fn get_choice(&self, choice_id: ChoiceId)
    -> impl Future<Output = Result<Option<Choice>>> + Send;

    fn get_voter(&self, voter_id: VoterId) -> impl Future<Output = Result<Option<Voter>>> + Send;

    fn get_candidate(
        &self,
        candidate_id: CandidateId,
    ) -> impl Future<Output = Result<Option<Candidate>>> + Send;

    /// Choices of a poll with candidate names, in creation order
    fn poll_tally(&self, poll_id: PollId) -> impl Future<Output = Result<Vec<ChoiceTally>>> + Send;

    /// All polls, ordered by publication date ascending
    fn list_polls(&self) -> impl Future<Output = Result<Vec<Poll>>> + Send;

    fn list_voters(&self) -> impl Future<Output = Result<Vec<Voter>>> + Send;

    fn list_candidates(&self) -> impl Future<Output = Result<Vec<Candidate>>> + Send;

    fn count_voters(&self) -> impl Future<Output = Result<u64>> + Send;

    fn count_candidates(&self) -> impl Future<Output = Result<u64>> + Send;

    fn count_polls(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Ballot count for one poll, or for all polls when `None`
    fn count_ballots(&self, poll_id: Option<PollId>)
    -> impl Future<Output = Result<u64>> + Send;

    fn find_ballot(
        &self,
        voter_id: VoterId,
        poll_id: PollId,
    ) -> impl Future<Output = Result<Option<Ballot>>> + Send;

    /// Most recent ballots of a poll, newest first
    fn recent_ballots(
        &self,
        poll_id: PollId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Ballot>>> + Send;

    /// Archive every active poll dated strictly before `today`
    ///
    /// A single bulk conditional update. Returns the number of polls
    /// archived; a second call with the same date returns zero.
    fn reconcile_expired(&self, today: NaiveDate) -> impl Future<Output = Result<u64>> + Send;

    /// Active polls dated `today` or later, date ascending
    fn list_open_polls(&self, today: NaiveDate)
    -> impl Future<Output = Result<Vec<Poll>>> + Send;

    /// Polls dated before `today` or archived, date descending
    fn list_past_polls(&self, today: NaiveDate)
    -> impl Future<Output = Result<Vec<Poll>>> + Send;

    /// Write a ballot and increment its choice as one unit of work
    ///
    /// Inside the unit of work the store re-checks that no ballot exists
    /// for `(voter, poll)` and that the choice belongs to the poll, then
    /// increments the choice counter by exactly one and inserts the
    /// ballot. Either both effects commit or neither does. A duplicate
    /// surfaces as [`crate::Error::AlreadyVoted`], including when the
    /// duplicate is only detected at commit time.
    fn record_ballot(&self, ballot: NewBallot) -> impl Future<Output = Result<Ballot>> + Send;
}

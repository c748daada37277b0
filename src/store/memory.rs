//! In-process storage engine
//!
//! All tables live behind one `RwLock`. Reads share the lock; every write,
//! including the whole ballot transaction, holds it exclusively, which makes
//! each unit of work serializable. The `(voter, poll)` ballot index plays the
//! part of the unique constraint a relational store would enforce.

use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::Store;
use crate::types::{
    Ballot, BallotId, Candidate, CandidateId, Choice, ChoiceId, ChoiceTally, NewBallot, Poll,
    PollId, UserId, Voter, VoterId,
};
use crate::{Error, Result, store_error};

#[derive(Debug, Default)]
struct Tables {
    polls: HashMap<PollId, Poll>,
    choices: HashMap<ChoiceId, Choice>,
    /// Choice ids per poll in creation order
    poll_choices: HashMap<PollId, Vec<ChoiceId>>,
    voters: HashMap<VoterId, Voter>,
    voters_by_user: HashMap<UserId, VoterId>,
    voters_by_srn: HashMap<String, VoterId>,
    candidates: HashMap<CandidateId, Candidate>,
    ballots: HashMap<BallotId, Ballot>,
    /// Unique index on (voter, poll)
    ballot_index: HashMap<(VoterId, PollId), BallotId>,
}

/// Storage engine kept entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| store_error!("Memory store read error"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| store_error!("Memory store write error"))
    }
}

fn sorted_by_date(mut polls: Vec<Poll>, descending: bool) -> Vec<Poll> {
    polls.sort_by(|a, b| {
        let order = a.publication_date.cmp(&b.publication_date);
        if descending { order.reverse() } else { order }
    });
    polls
}

impl Store for MemoryStore {
    async fn insert_voter(&self, voter: Voter) -> Result<Voter> {
        let mut tables = self.write()?;

        if tables.voters.contains_key(&voter.id) {
            return Err(Error::conflict(format!("voter {} already exists", voter.id)));
        }
        if tables.voters_by_user.contains_key(&voter.user_id) {
            return Err(Error::conflict(format!(
                "user {} is already registered as a voter",
                voter.user_id
            )));
        }
        if let Some(srn) = &voter.srn {
            if tables.voters_by_srn.contains_key(srn) {
                return Err(Error::conflict(format!("registration number {srn} is taken")));
            }
            tables.voters_by_srn.insert(srn.clone(), voter.id);
        }

        tables.voters_by_user.insert(voter.user_id, voter.id);
        tables.voters.insert(voter.id, voter.clone());
        Ok(voter)
    }

    async fn insert_candidate(&self, candidate: Candidate) -> Result<Candidate> {
        let mut tables = self.write()?;
        if tables.candidates.contains_key(&candidate.id) {
            return Err(Error::conflict(format!(
                "candidate {} already exists",
                candidate.id
            )));
        }
        tables.candidates.insert(candidate.id, candidate.clone());
        Ok(candidate)
    }

    async fn insert_poll(&self, poll: Poll, choices: Vec<Choice>) -> Result<Poll> {
        let mut tables = self.write()?;

        if tables.polls.contains_key(&poll.id) {
            return Err(Error::conflict(format!("poll {} already exists", poll.id)));
        }
        let mut batch = HashSet::with_capacity(choices.len());
        for choice in &choices {
            if tables.choices.contains_key(&choice.id) || !batch.insert(choice.id) {
                return Err(Error::conflict(format!("choice {} already exists", choice.id)));
            }
            if choice.poll_id != poll.id {
                return Err(Error::internal(format!(
                    "choice {} does not reference poll {}",
                    choice.id, poll.id
                )));
            }
            if let Some(candidate_id) = choice.candidate_id {
                if !tables.candidates.contains_key(&candidate_id) {
                    return Err(Error::not_found("candidate", candidate_id));
                }
            }
        }

        let order = choices.iter().map(|c| c.id).collect();
        // Tallies start at zero; only record_ballot moves them.
        for choice in choices {
            tables.choices.insert(choice.id, Choice { vote_count: 0, ..choice });
        }
        tables.poll_choices.insert(poll.id, order);
        tables.polls.insert(poll.id, poll.clone());
        Ok(poll)
    }

    async fn delete_poll(&self, poll_id: PollId) -> Result<bool> {
        let mut tables = self.write()?;

        if tables.polls.remove(&poll_id).is_none() {
            return Ok(false);
        }
        for choice_id in tables.poll_choices.remove(&poll_id).unwrap_or_default() {
            tables.choices.remove(&choice_id);
        }
        tables.ballots.retain(|_, ballot| ballot.poll_id != poll_id);
        tables.ballot_index.retain(|(_, poll), _| *poll != poll_id);
        Ok(true)
    }

    async fn set_poll_active(&self, poll_id: PollId, is_active: bool) -> Result<bool> {
        let mut tables = self.write()?;
        match tables.polls.get_mut(&poll_id) {
            Some(poll) => {
                poll.is_active = is_active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_poll(&self, poll_id: PollId) -> Result<Option<Poll>> {
        Ok(self.read()?.polls.get(&poll_id).cloned())
    }

    async fn get_choice(&self, choice_id: ChoiceId) -> Result<Option<Choice>> {
        Ok(self.read()?.choices.get(&choice_id).cloned())
    }

    async fn get_voter(&self, voter_id: VoterId) -> Result<Option<Voter>> {
        Ok(self.read()?.voters.get(&voter_id).cloned())
    }

    async fn get_candidate(&self, candidate_id: CandidateId) -> Result<Option<Candidate>> {
        Ok(self.read()?.candidates.get(&candidate_id).cloned())
    }

    async fn poll_tally(&self, poll_id: PollId) -> Result<Vec<ChoiceTally>> {
        let tables = self.read()?;
        let Some(order) = tables.poll_choices.get(&poll_id) else {
            return Ok(Vec::new());
        };

        order
            .iter()
            .map(|choice_id| -> Result<ChoiceTally> {
                let choice = tables
                    .choices
                    .get(choice_id)
                    .ok_or_else(|| store_error!("dangling choice {}", choice_id))?;
                let candidate_name = choice
                    .candidate_id
                    .and_then(|id| tables.candidates.get(&id))
                    .map(|c| c.name.clone());
                Ok(ChoiceTally {
                    choice_id: choice.id,
                    candidate_name,
                    vote_count: choice.vote_count,
                })
            })
            .collect()
    }

    async fn list_polls(&self) -> Result<Vec<Poll>> {
        let polls = self.read()?.polls.values().cloned().collect();
        Ok(sorted_by_date(polls, false))
    }

    async fn list_voters(&self) -> Result<Vec<Voter>> {
        let mut voters: Vec<Voter> = self.read()?.voters.values().cloned().collect();
        voters.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(voters)
    }

    async fn list_candidates(&self) -> Result<Vec<Candidate>> {
        let mut candidates: Vec<Candidate> =
            self.read()?.candidates.values().cloned().collect();
        candidates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(candidates)
    }

    async fn count_voters(&self) -> Result<u64> {
        Ok(self.read()?.voters.len() as u64)
    }

    async fn count_candidates(&self) -> Result<u64> {
        Ok(self.read()?.candidates.len() as u64)
    }

    async fn count_polls(&self) -> Result<u64> {
        Ok(self.read()?.polls.len() as u64)
    }

    async fn count_ballots(&self, poll_id: Option<PollId>) -> Result<u64> {
        let tables = self.read()?;
        let count = match poll_id {
            Some(poll_id) => tables
                .ballots
                .values()
                .filter(|b| b.poll_id == poll_id)
                .count(),
            None => tables.ballots.len(),
        };
        Ok(count as u64)
    }

    async fn find_ballot(&self, voter_id: VoterId, poll_id: PollId) -> Result<Option<Ballot>> {
        let tables = self.read()?;
        Ok(tables
            .ballot_index
            .get(&(voter_id, poll_id))
            .and_then(|id| tables.ballots.get(id))
            .cloned())
    }

    async fn recent_ballots(&self, poll_id: PollId, limit: usize) -> Result<Vec<Ballot>> {
        let mut ballots: Vec<Ballot> = self
            .read()?
            .ballots
            .values()
            .filter(|b| b.poll_id == poll_id)
            .cloned()
            .collect();
        ballots.sort_by(|a, b| b.cast_at.cmp(&a.cast_at));
        ballots.truncate(limit);
        Ok(ballots)
    }

    async fn reconcile_expired(&self, today: NaiveDate) -> Result<u64> {
        let mut tables = self.write()?;
        let mut archived = 0;
        for poll in tables.polls.values_mut() {
            if poll.is_active && poll.date() < today {
                poll.is_active = false;
                archived += 1;
            }
        }
        Ok(archived)
    }

    async fn list_open_polls(&self, today: NaiveDate) -> Result<Vec<Poll>> {
        let polls = self
            .read()?
            .polls
            .values()
            .filter(|p| p.is_active && p.date() >= today)
            .cloned()
            .collect();
        Ok(sorted_by_date(polls, false))
    }

    async fn list_past_polls(&self, today: NaiveDate) -> Result<Vec<Poll>> {
        let polls = self
            .read()?
            .polls
            .values()
            .filter(|p| p.date() < today || !p.is_active)
            .cloned()
            .collect();
        Ok(sorted_by_date(polls, true))
    }

    async fn record_ballot(&self, ballot: NewBallot) -> Result<Ballot> {
        let mut tables = self.write()?;

        // Authoritative duplicate check, under the same exclusive lock as the writes.
        let key = (ballot.voter_id, ballot.poll_id);
        if tables.ballot_index.contains_key(&key) {
            return Err(Error::AlreadyVoted {
                voter_id: ballot.voter_id,
                poll_id: ballot.poll_id,
            });
        }
        if !tables.polls.contains_key(&ballot.poll_id) {
            return Err(Error::not_found("poll", ballot.poll_id));
        }
        if !tables.voters.contains_key(&ballot.voter_id) {
            return Err(Error::not_found("voter", ballot.voter_id));
        }

        let choice = tables
            .choices
            .get_mut(&ballot.choice_id)
            .ok_or_else(|| Error::not_found("choice", ballot.choice_id))?;
        if choice.poll_id != ballot.poll_id {
            return Err(Error::InvalidChoice {
                choice_id: ballot.choice_id,
                poll_id: ballot.poll_id,
            });
        }
        choice.vote_count += 1;

        let record = Ballot {
            id: BallotId::new(),
            voter_id: ballot.voter_id,
            poll_id: ballot.poll_id,
            choice_id: ballot.choice_id,
            cast_at: ballot.cast_at,
        };
        tables.ballot_index.insert(key, record.id);
        tables.ballots.insert(record.id, record.clone());
        Ok(record)
    }
}

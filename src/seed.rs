//! Synthetic election data for demos and tests
//!
//! Votes are drawn from a skewed weight vector (a leading first choice and a
//! trailing last one) and cast through [`ElectionEngine::cast_vote`], so
//! generated data obeys the same invariants as real ballots. A [`Seeder`]
//! can only be built when the operator has enabled
//! `VOTE_ALLOW_SYNTHETIC_DATA`.

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::engine::ElectionEngine;
use crate::store::Store;
use crate::types::{
    Candidate, Department, NewCandidate, NewPoll, NewVoter, PollId, Sex, UserId, Voter,
};
use crate::{Error, Result};

const POSITIONS: [&str; 5] = ["President", "Vice President", "Secretary", "Treasurer", "Member"];
const SEXES: [Sex; 3] = [Sex::Male, Sex::Female, Sex::Other];

/// Skewed weights for `n` choices, conceptually summing to 100
///
/// The first choice gets 1.5x to 2.5x the even share and the last 0.5x to
/// 0.8x. Middle choices split the residual with random perturbation, the
/// final middle choice taking what is left. Weights are never negative:
/// a residual exhausted by the first and last choices leaves the middle at
/// zero. `n <= 1` yields `[1.0]`.
pub fn realistic_weights<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<f64> {
    if n <= 1 {
        return vec![1.0];
    }

    let base = 100.0 / n as f64;
    let first = base * rng.gen_range(1.5..2.5);
    let last = base * rng.gen_range(0.5..0.8);
    let mut remaining = 100.0 - first - last;

    let middle_count = n - 2;
    let mut weights = Vec::with_capacity(n);
    weights.push(first);
    for i in 0..middle_count {
        let weight = if i == middle_count - 1 {
            remaining
        } else {
            remaining * rng.gen_range(0.3..0.7) / middle_count as f64
        };
        let weight = weight.max(0.0);
        remaining -= weight;
        weights.push(weight);
    }
    weights.push(last);
    weights
}

/// Draw an index according to `weights`
pub fn pick_weighted<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Result<usize> {
    let dist = WeightedIndex::new(weights)
        .map_err(|e| Error::internal(format!("invalid vote weights: {e}")))?;
    Ok(dist.sample(rng))
}

/// Outcome of a seeding run
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeedReport {
    pub polls_created: usize,
    pub votes_created: usize,
    pub votes_skipped: usize,
}

/// Generates fixture voters, candidates, polls and votes
pub struct Seeder<S> {
    engine: ElectionEngine<S>,
}

impl<S: Store> Seeder<S> {
    /// Refuses to build unless synthetic data is explicitly allowed
    pub fn new(engine: ElectionEngine<S>) -> Result<Self> {
        if !engine.config().allow_synthetic_data {
            return Err(Error::config(
                "synthetic data generation is disabled; set VOTE_ALLOW_SYNTHETIC_DATA=true",
            ));
        }
        tracing::warn!("⚠️ Synthetic data generation enabled");
        Ok(Self { engine })
    }

    /// Return `n` voters, registering `Voter <i>` profiles as needed
    pub async fn ensure_voters<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Result<Vec<Voter>> {
        let mut voters = self.engine.store().list_voters().await?;
        if voters.len() >= n {
            voters.truncate(n);
            return Ok(voters);
        }

        tracing::info!("Creating {} additional voter(s)", n - voters.len());
        for i in voters.len()..n {
            let voter = self
                .engine
                .register_voter(NewVoter {
                    user_id: UserId::new(),
                    name: format!("Voter {}", i + 1),
                    age: Some(rng.gen_range(18..=70)),
                    sex: SEXES[rng.gen_range(0..SEXES.len())],
                    srn: Some(format!("SRN-{:05}", i + 1)),
                    branch: None,
                })
                .await?;
            voters.push(voter);
        }
        Ok(voters)
    }

    /// Return `n` candidates, adding `Candidate <i>` profiles as needed
    pub async fn ensure_candidates<R: Rng + ?Sized>(
        &self,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<Candidate>> {
        let mut candidates = self.engine.store().list_candidates().await?;
        if candidates.len() >= n {
            candidates.truncate(n);
            return Ok(candidates);
        }

        tracing::info!("Creating {} additional candidate(s)", n - candidates.len());
        for i in candidates.len()..n {
            let candidate = self
                .engine
                .add_candidate(NewCandidate {
                    name: format!("Candidate {}", i + 1),
                    age: rng.gen_range(21..=60),
                    sex: SEXES[rng.gen_range(0..SEXES.len())],
                    branch: None,
                    department: None,
                    position: Some(POSITIONS[rng.gen_range(0..POSITIONS.len())].to_string()),
                })
                .await?;
            candidates.push(candidate);
        }
        Ok(candidates)
    }

    /// Cast up to `max_votes` weighted-random ballots across `polls`
    ///
    /// Voters who already voted in a poll are skipped. Polls without choices
    /// or not open at `now` are passed over.
    pub async fn populate_votes<R: Rng + ?Sized>(
        &self,
        polls: &[PollId],
        voters: &[Voter],
        max_votes: usize,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<SeedReport> {
        let mut report = SeedReport::default();

        'polls: for &poll_id in polls {
            let tally = self.engine.store().poll_tally(poll_id).await?;
            if tally.is_empty() {
                tracing::warn!("No choices found for election {}, skipping", poll_id);
                continue;
            }
            let weights = realistic_weights(tally.len(), rng);

            for voter in voters {
                if report.votes_created >= max_votes {
                    break 'polls;
                }
                let choice = &tally[pick_weighted(&weights, rng)?];
                match self
                    .engine
                    .cast_vote(voter.id, poll_id, choice.choice_id, now)
                    .await
                {
                    Ok(_) => report.votes_created += 1,
                    Err(Error::AlreadyVoted { .. }) => report.votes_skipped += 1,
                    Err(Error::ElectionClosed { .. }) => {
                        tracing::warn!("Election {} is not open at {}, skipping", poll_id, now);
                        continue 'polls;
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        tracing::info!(
            "Synthetic votes: {} created, {} skipped",
            report.votes_created,
            report.votes_skipped
        );
        Ok(report)
    }

    /// Create one election per department dated `now` and fill it with votes
    ///
    /// Departments that already hold an election are left alone.
    pub async fn seed_departments<R: Rng + ?Sized>(
        &self,
        votes_per_dept: usize,
        candidates_per_dept: usize,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<SeedReport> {
        let departments = Department::ALL.len();
        let candidates = self
            .ensure_candidates(departments * candidates_per_dept, rng)
            .await?;
        let voters = self.ensure_voters(departments * votes_per_dept, rng).await?;
        let existing = self.engine.store().list_polls().await?;

        let mut report = SeedReport::default();
        for department in Department::ALL {
            if existing.iter().any(|p| p.department == Some(department)) {
                tracing::warn!("Election for {} already exists, skipping", department);
                continue;
            }

            let candidate_ids = candidates
                .choose_multiple(rng, candidates_per_dept.min(candidates.len()))
                .map(|c| c.id)
                .collect();
            let poll = self
                .engine
                .create_poll(NewPoll {
                    question: Some(format!("{department} Department Election")),
                    department: Some(department),
                    publication_date: now,
                    candidate_ids,
                })
                .await?;
            report.polls_created += 1;

            let voter_count = votes_per_dept.min(voters.len());
            let filled = self
                .populate_votes(&[poll.id], &voters[..voter_count], votes_per_dept, now, rng)
                .await?;
            report.votes_created += filled.votes_created;
            report.votes_skipped += filled.votes_skipped;
        }
        Ok(report)
    }
}

//! Read-only statistics over tallies and ballots
//!
//! Nothing here takes a lock or writes: a report may trail a concurrent
//! vote by at most that vote's transaction.
//!
//! ## Rounding
//!
//! Every percentage is reported to one decimal place, rounded half-up
//! (ties away from zero). The rounding is done in integer arithmetic on
//! tenths of a percent, so `1/16` is `6.3` and `1/3` is `33.3` on every
//! platform. A zero denominator yields `0.0`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::store::Store;
use crate::types::{Ballot, ChoiceId, ChoiceTally, Department, Poll, PollId};
use crate::{Error, Result};

/// Upper bound for any reported participation value
pub const MAX_PARTICIPATION: f64 = 100.0;

/// Default number of ballots in a vote timeline
pub const DEFAULT_TIMELINE_LIMIT: usize = 50;

/// `100 * numerator / denominator`, rounded half-up to one decimal
pub fn percentage(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    let num = u128::from(numerator);
    let den = u128::from(denominator);
    let tenths = (num * 2000 + den) / (2 * den);
    tenths as f64 / 10.0
}

/// Result line for one choice
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChoiceStats {
    pub choice_id: ChoiceId,
    /// Candidate name, or "Unknown" for choices without a candidate
    pub label: String,
    pub votes: u64,
    pub percentage: f64,
}

/// Per-poll statistics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollStats {
    pub poll_id: PollId,
    pub title: String,
    pub department: Option<Department>,
    pub publication_date: DateTime<Utc>,
    pub total_votes: u64,
    pub choices: Vec<ChoiceStats>,
    /// Share of registered voters who voted in this poll
    pub participation_rate: f64,
}

/// Rollup for one department
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DepartmentStats {
    pub department: Department,
    /// Polls of this department that have at least one choice
    pub polls: Vec<PollStats>,
    pub total_votes: u64,
    /// Estimated participation, capped at 100
    ///
    /// `100 * votes / (voters * polls)`. Voters are not tracked per
    /// department, so someone voting in two polls of the same department
    /// counts twice; this is an approximation, not a per-voter metric.
    pub participation: f64,
}

/// Election-wide overview with the per-department rollup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElectionOverview {
    pub total_elections: u64,
    pub total_votes: u64,
    pub total_candidates: u64,
    pub total_voters: u64,
    /// Departments with at least one qualifying poll, in [`Department::ALL`] order
    pub departments: Vec<DepartmentStats>,
}

impl ElectionOverview {
    pub fn department(&self, department: Department) -> Option<&DepartmentStats> {
        self.departments.iter().find(|d| d.department == department)
    }

    /// Participation per department, every department listed
    ///
    /// Departments without a qualifying poll report `0.0`.
    pub fn participation_chart(&self) -> ParticipationChart {
        let (departments, participation): (Vec<String>, Vec<f64>) = Department::ALL
            .into_iter()
            .map(|dept| {
                let rate = self.department(dept).map_or(0.0, |d| d.participation);
                (dept.as_str().to_string(), rate)
            })
            .unzip();
        ParticipationChart {
            departments,
            participation,
        }
    }

    /// [`Self::participation_chart`] encoded for chart front ends
    pub fn participation_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.participation_chart())?)
    }
}

/// Parallel label and value series of one poll, as charting widgets take them
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub votes: Vec<u64>,
    pub percentages: Vec<f64>,
}

/// Department participation series
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParticipationChart {
    pub departments: Vec<String>,
    pub participation: Vec<f64>,
}

impl PollStats {
    pub fn chart_data(&self) -> ChartData {
        ChartData {
            labels: self.choices.iter().map(|c| c.label.clone()).collect(),
            votes: self.choices.iter().map(|c| c.votes).collect(),
            percentages: self.choices.iter().map(|c| c.percentage).collect(),
        }
    }

    /// [`Self::chart_data`] encoded for chart front ends
    pub fn chart_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.chart_data())?)
    }
}

/// Comparison of a poll's tally against its ballot ledger
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TallyAudit {
    pub poll_id: PollId,
    pub tally_sum: u64,
    pub ballot_count: u64,
}

impl TallyAudit {
    /// True when every counted vote has exactly one ballot behind it
    pub fn is_consistent(&self) -> bool {
        self.tally_sum == self.ballot_count
    }
}

/// Build the statistics of one poll from its tally
pub fn poll_stats(poll: &Poll, tally: &[ChoiceTally], total_voters: u64) -> PollStats {
    let total_votes: u64 = tally.iter().map(|c| c.vote_count).sum();

    let choices = tally
        .iter()
        .map(|c| ChoiceStats {
            choice_id: c.choice_id,
            label: c
                .candidate_name
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
            votes: c.vote_count,
            percentage: percentage(c.vote_count, total_votes),
        })
        .collect();

    PollStats {
        poll_id: poll.id,
        title: poll.title(),
        department: poll.department,
        publication_date: poll.publication_date,
        total_votes,
        choices,
        participation_rate: percentage(total_votes, total_voters),
    }
}

/// Roll the given poll statistics up per department
///
/// Polls without a department or without choices are ignored. Departments
/// left with no poll are omitted rather than reported as zero.
pub fn department_rollup(polls: Vec<PollStats>, total_voters: u64) -> Vec<DepartmentStats> {
    Department::ALL
        .into_iter()
        .filter_map(|department| {
            let dept_polls: Vec<PollStats> = polls
                .iter()
                .filter(|p| p.department == Some(department) && !p.choices.is_empty())
                .cloned()
                .collect();
            if dept_polls.is_empty() {
                return None;
            }

            let total_votes = dept_polls.iter().map(|p| p.total_votes).sum();
            let capacity = total_voters.saturating_mul(dept_polls.len() as u64);
            let participation = percentage(total_votes, capacity).min(MAX_PARTICIPATION);

            Some(DepartmentStats {
                department,
                polls: dept_polls,
                total_votes,
                participation,
            })
        })
        .collect()
}

/// Statistics aggregator over a store
pub struct StatsAggregator<S> {
    store: Arc<S>,
}

impl<S> Clone for StatsAggregator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> StatsAggregator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Totals, per-choice percentages and participation for one poll
    ///
    /// A poll without choices reports zero votes and no choice lines.
    pub async fn poll_stats(&self, poll_id: PollId) -> Result<PollStats> {
        let poll = self
            .store
            .get_poll(poll_id)
            .await?
            .ok_or_else(|| Error::not_found("poll", poll_id))?;
        let tally = self.store.poll_tally(poll_id).await?;
        let total_voters = self.store.count_voters().await?;
        Ok(poll_stats(&poll, &tally, total_voters))
    }

    /// Election-wide totals and the per-department rollup
    pub async fn department_stats(&self) -> Result<ElectionOverview> {
        let total_voters = self.store.count_voters().await?;
        let polls = self.store.list_polls().await?;

        let mut stats = Vec::new();
        for poll in polls.iter().filter(|p| p.department.is_some()) {
            let tally = self.store.poll_tally(poll.id).await?;
            if tally.is_empty() {
                continue;
            }
            stats.push(poll_stats(poll, &tally, total_voters));
        }

        let overview = ElectionOverview {
            total_elections: polls.len() as u64,
            total_votes: self.store.count_ballots(None).await?,
            total_candidates: self.store.count_candidates().await?,
            total_voters,
            departments: department_rollup(stats, total_voters),
        };

        tracing::debug!(
            "Computed department statistics: {} departments, {} votes",
            overview.departments.len(),
            overview.total_votes
        );
        Ok(overview)
    }

    /// Most recent ballots of a poll, newest first
    pub async fn vote_timeline(&self, poll_id: PollId, limit: usize) -> Result<Vec<Ballot>> {
        if self.store.get_poll(poll_id).await?.is_none() {
            return Err(Error::not_found("poll", poll_id));
        }
        self.store.recent_ballots(poll_id, limit).await
    }

    /// Check that a poll's tally matches its ballot ledger
    pub async fn audit_poll(&self, poll_id: PollId) -> Result<TallyAudit> {
        if self.store.get_poll(poll_id).await?.is_none() {
            return Err(Error::not_found("poll", poll_id));
        }
        let tally_sum = self
            .store
            .poll_tally(poll_id)
            .await?
            .iter()
            .map(|c| c.vote_count)
            .sum();
        let ballot_count = self.store.count_ballots(Some(poll_id)).await?;

        let audit = TallyAudit {
            poll_id,
            tally_sum,
            ballot_count,
        };
        if !audit.is_consistent() {
            tracing::error!(
                "Tally mismatch in election {}: tally={}, ballots={}",
                poll_id,
                tally_sum,
                ballot_count
            );
        }
        Ok(audit)
    }
}

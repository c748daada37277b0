//! # Core Types for the Election Engine
//!
//! This module defines the data model shared by the store, the vote-casting
//! transaction and the statistics aggregator.
//!
//! ## Entities
//!
//! - [`Poll`]: an election scheduled for one calendar date in one department
//! - [`Choice`]: a selectable option within a poll, usually linked to a [`Candidate`]
//! - [`Ballot`]: the permanent record that a voter selected a choice in a poll
//! - [`Voter`]: a registered end user allowed to cast ballots
//! - [`Candidate`]: a person standing for a position
//!
//! ## Relationships
//!
//! A poll owns its choices. A choice references at most one candidate. A
//! ballot references one voter, one poll and one choice, and at most one
//! ballot exists per (voter, poll) pair.
//!
//! ## Usage Examples
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use election_core::types::{Department, Poll, PollId};
//!
//! let poll = Poll {
//!     id: PollId::new(),
//!     question: None,
//!     publication_date: Utc.with_ymd_and_hms(2024, 3, 14, 9, 0, 0).unwrap(),
//!     is_active: true,
//!     department: Some(Department::Technical),
//!     created_at: Utc::now(),
//! };
//!
//! assert_eq!(poll.title(), "Technical - 14 Mar 2024");
//! assert!(poll.is_open_for_voting(poll.date()));
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

id_type!(
    /// Unique poll identifier
    PollId
);
id_type!(
    /// Unique choice identifier
    ChoiceId
);
id_type!(
    /// Unique voter identifier
    VoterId
);
id_type!(
    /// Unique candidate identifier
    CandidateId
);
id_type!(
    /// Unique ballot identifier
    BallotId
);
id_type!(
    /// Identity of the underlying user account, owned by the authentication layer
    UserId
);

/// Department a poll is held for
///
/// The set is closed: every department-level report iterates
/// [`Department::ALL`] and matches exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Department {
    Cultural,
    Technical,
    President,
    #[serde(rename = "Vice President")]
    VicePresident,
    Social,
}

impl Department {
    /// All departments in reporting order
    pub const ALL: [Department; 5] = [
        Department::Cultural,
        Department::Technical,
        Department::President,
        Department::VicePresident,
        Department::Social,
    ];

    /// Display label, also used as the persisted value
    pub fn as_str(&self) -> &'static str {
        match self {
            Department::Cultural => "Cultural",
            Department::Technical => "Technical",
            Department::President => "President",
            Department::VicePresident => "Vice President",
            Department::Social => "Social",
        }
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Department {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Department::ALL
            .into_iter()
            .find(|dept| dept.as_str() == s)
            .ok_or_else(|| Error::validation(format!("department: unknown value {s:?}")))
    }
}

/// Sex recorded on voter and candidate profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "O")]
    Other,
}

impl Sex {
    /// Single-letter code used for persistence
    pub fn code(&self) -> &'static str {
        match self {
            Sex::Male => "M",
            Sex::Female => "F",
            Sex::Other => "O",
        }
    }
}

impl FromStr for Sex {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "M" => Ok(Sex::Male),
            "F" => Ok(Sex::Female),
            "O" => Ok(Sex::Other),
            other => Err(Error::validation(format!("sex: unknown value {other:?}"))),
        }
    }
}

/// An election instance scoped to a date and department
///
/// # Lifecycle
///
/// Polls are created active. A poll accepts votes only while it is active
/// *and* the current date equals the date of `publication_date`. Once that
/// date is in the past the poll is archived (`is_active = false`) by
/// [`crate::lifecycle::PollLifecycle::reconcile_expired`]. Administrators may
/// also archive a poll manually at any time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Poll {
    /// Unique poll identifier
    pub id: PollId,

    /// Optional display text
    pub question: Option<String>,

    /// Date and time the election is scheduled for
    ///
    /// Only the UTC calendar date matters for voting eligibility.
    pub publication_date: DateTime<Utc>,

    /// Administrative or system-controlled activity flag
    pub is_active: bool,

    /// Department tag, if any
    pub department: Option<Department>,

    /// When this poll record was created
    pub created_at: DateTime<Utc>,
}

impl Poll {
    /// Calendar date (UTC) the election is held on
    pub fn date(&self) -> NaiveDate {
        self.publication_date.date_naive()
    }

    /// Human-readable title
    ///
    /// Falls back to `"<department> - <DD Mon YYYY>"` when no question was
    /// given, using `Election` for polls without a department.
    pub fn title(&self) -> String {
        match &self.question {
            Some(question) if !question.is_empty() => question.clone(),
            _ => format!(
                "{} - {}",
                self.department.map_or("Election", |d| d.as_str()),
                self.publication_date.format("%d %b %Y")
            ),
        }
    }

    /// Check if the poll accepts votes on `today`
    ///
    /// True only when the poll is active and scheduled for exactly `today`.
    /// A poll dated in the past never opens, even if it was never archived.
    pub fn is_open_for_voting(&self, today: NaiveDate) -> bool {
        self.is_active && self.date() == today
    }

    /// Check if the election date has passed, regardless of the active flag
    pub fn is_past_election(&self, today: NaiveDate) -> bool {
        self.date() < today
    }
}

/// A selectable option within a poll
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Choice {
    pub id: ChoiceId,

    /// Owning poll, fixed at creation
    pub poll_id: PollId,

    /// Candidate this choice stands for, if any
    pub candidate_id: Option<CandidateId>,

    /// Running tally
    ///
    /// Equals the number of ballots referencing this choice. Only the
    /// vote-casting transaction changes it.
    pub vote_count: u64,
}

/// A choice joined with the display name of its candidate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChoiceTally {
    pub choice_id: ChoiceId,
    pub candidate_name: Option<String>,
    pub vote_count: u64,
}

/// Permanent record that a voter selected a choice in a poll
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ballot {
    pub id: BallotId,
    pub voter_id: VoterId,
    pub poll_id: PollId,
    pub choice_id: ChoiceId,
    pub cast_at: DateTime<Utc>,
}

/// Ballot to be written by the vote-casting transaction
#[derive(Debug, Clone, PartialEq)]
pub struct NewBallot {
    pub voter_id: VoterId,
    pub poll_id: PollId,
    pub choice_id: ChoiceId,
    pub cast_at: DateTime<Utc>,
}

/// Acknowledgement returned for a successfully cast vote
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoteReceipt {
    pub ballot_id: BallotId,
    pub voter_id: VoterId,
    pub poll_id: PollId,
    pub choice_id: ChoiceId,
    pub cast_at: DateTime<Utc>,
}

impl From<Ballot> for VoteReceipt {
    fn from(ballot: Ballot) -> Self {
        Self {
            ballot_id: ballot.id,
            voter_id: ballot.voter_id,
            poll_id: ballot.poll_id,
            choice_id: ballot.choice_id,
            cast_at: ballot.cast_at,
        }
    }
}

/// Registered voter profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Voter {
    pub id: VoterId,

    /// Underlying user identity (one-to-one)
    pub user_id: UserId,

    pub name: String,
    pub age: Option<u32>,
    pub sex: Sex,

    /// Unique registration number
    pub srn: Option<String>,

    pub branch: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Candidate profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub id: CandidateId,
    pub name: String,
    pub age: u32,
    pub sex: Sex,
    pub branch: Option<String>,
    pub department: Option<String>,

    /// Position label, e.g. "President"
    pub position: String,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.position.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{} - {}", self.name, self.position)
        }
    }
}

/// Input for registering a voter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVoter {
    pub user_id: UserId,
    pub name: String,
    pub age: Option<u32>,
    pub sex: Sex,
    pub srn: Option<String>,
    pub branch: Option<String>,
}

/// Input for adding a candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCandidate {
    pub name: String,
    pub age: u32,
    pub sex: Sex,
    pub branch: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
}

/// Input for creating a poll
///
/// One choice is created per listed candidate, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPoll {
    pub question: Option<String>,
    pub department: Option<Department>,
    pub publication_date: DateTime<Utc>,
    pub candidate_ids: Vec<CandidateId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn poll_on(date: DateTime<Utc>, is_active: bool) -> Poll {
        Poll {
            id: PollId::new(),
            question: None,
            publication_date: date,
            is_active,
            department: Some(Department::Cultural),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_poll_open_only_on_its_date() {
        let scheduled = Utc.with_ymd_and_hms(2024, 5, 10, 18, 30, 0).unwrap();
        let today = scheduled.date_naive();

        let active = poll_on(scheduled, true);
        assert!(active.is_open_for_voting(today));
        assert!(!active.is_open_for_voting(today - Duration::days(1)));
        assert!(!active.is_open_for_voting(today + Duration::days(1)));

        let archived = poll_on(scheduled, false);
        assert!(!archived.is_open_for_voting(today));
    }

    #[test]
    fn test_past_election_ignores_active_flag() {
        let scheduled = Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap();
        let today = scheduled.date_naive();

        let poll = poll_on(scheduled, true);
        assert!(!poll.is_past_election(today));
        assert!(poll.is_past_election(today + Duration::days(1)));
        assert!(poll_on(scheduled, false).is_past_election(today + Duration::days(3)));
    }

    #[test]
    fn test_poll_title() {
        let scheduled = Utc.with_ymd_and_hms(2024, 1, 5, 8, 0, 0).unwrap();
        let mut poll = poll_on(scheduled, true);
        assert_eq!(poll.title(), "Cultural - 05 Jan 2024");

        poll.department = None;
        assert_eq!(poll.title(), "Election - 05 Jan 2024");

        poll.question = Some("Who leads the tech club?".to_string());
        assert_eq!(poll.title(), "Who leads the tech club?");
    }

    #[test]
    fn test_department_labels() {
        for dept in Department::ALL {
            assert_eq!(dept.as_str().parse::<Department>().unwrap(), dept);
        }
        assert_eq!(Department::VicePresident.to_string(), "Vice President");
        assert!("Sports".parse::<Department>().is_err());

        let json = serde_json::to_string(&Department::VicePresident).unwrap();
        assert_eq!(json, "\"Vice President\"");
    }

    #[test]
    fn test_sex_codes() {
        for sex in [Sex::Male, Sex::Female, Sex::Other] {
            assert_eq!(sex.code().parse::<Sex>().unwrap(), sex);
        }
        assert!("X".parse::<Sex>().is_err());
    }

    #[test]
    fn test_candidate_display() {
        let candidate = Candidate {
            id: CandidateId::new(),
            name: "Asha Rao".to_string(),
            age: 21,
            sex: Sex::Female,
            branch: None,
            department: None,
            position: "President".to_string(),
        };
        assert_eq!(candidate.to_string(), "Asha Rao - President");
    }
}

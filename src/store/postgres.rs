//! PostgreSQL storage engine
//!
//! The `ballots_voter_poll_key` unique constraint and the in-place
//! `vote_count = vote_count + 1` update carry the concurrency guarantees of
//! [`Store::record_ballot`]. Calendar dates are always taken in UTC.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use super::Store;
use crate::config::DatabaseConfig;
use crate::types::{
    Ballot, BallotId, Candidate, CandidateId, Choice, ChoiceId, ChoiceTally, NewBallot, Poll,
    PollId, Voter, VoterId,
};
use crate::{Error, Result};

const POLL_COLUMNS: &str = "id, question, publication_date, is_active, department, created_at";
const VOTER_COLUMNS: &str = "id, user_id, name, age, sex, srn, branch, created_at";
const CANDIDATE_COLUMNS: &str = "id, name, age, sex, branch, department, position";
const BALLOT_COLUMNS: &str = "id, voter_id, poll_id, choice_id, cast_at";

/// Storage engine backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a pool using the given settings
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;

        tracing::info!(
            "🐘 Connected to PostgreSQL (max_connections={})",
            config.max_connections
        );
        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct PollRow {
    id: Uuid,
    question: Option<String>,
    publication_date: DateTime<Utc>,
    is_active: bool,
    department: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PollRow> for Poll {
    type Error = Error;

    fn try_from(row: PollRow) -> Result<Self> {
        Ok(Poll {
            id: PollId(row.id),
            question: row.question,
            publication_date: row.publication_date,
            is_active: row.is_active,
            department: row.department.map(|d| d.parse()).transpose()?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ChoiceRow {
    id: Uuid,
    poll_id: Uuid,
    candidate_id: Option<Uuid>,
    vote_count: i64,
}

impl From<ChoiceRow> for Choice {
    fn from(row: ChoiceRow) -> Self {
        Choice {
            id: ChoiceId(row.id),
            poll_id: PollId(row.poll_id),
            candidate_id: row.candidate_id.map(CandidateId),
            vote_count: row.vote_count.max(0) as u64,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TallyRow {
    choice_id: Uuid,
    candidate_name: Option<String>,
    vote_count: i64,
}

#[derive(sqlx::FromRow)]
struct VoterRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    age: Option<i32>,
    sex: String,
    srn: Option<String>,
    branch: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<VoterRow> for Voter {
    type Error = Error;

    fn try_from(row: VoterRow) -> Result<Self> {
        Ok(Voter {
            id: VoterId(row.id),
            user_id: row.user_id.into(),
            name: row.name,
            age: row.age.map(|a| a.max(0) as u32),
            sex: row.sex.trim().parse()?,
            srn: row.srn,
            branch: row.branch,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CandidateRow {
    id: Uuid,
    name: String,
    age: i32,
    sex: String,
    branch: Option<String>,
    department: Option<String>,
    position: String,
}

impl TryFrom<CandidateRow> for Candidate {
    type Error = Error;

    fn try_from(row: CandidateRow) -> Result<Self> {
        Ok(Candidate {
            id: CandidateId(row.id),
            name: row.name,
            age: row.age.max(0) as u32,
            sex: row.sex.trim().parse()?,
            branch: row.branch,
            department: row.department,
            position: row.position,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BallotRow {
    id: Uuid,
    voter_id: Uuid,
    poll_id: Uuid,
    choice_id: Uuid,
    cast_at: DateTime<Utc>,
}

impl From<BallotRow> for Ballot {
    fn from(row: BallotRow) -> Self {
        Ballot {
            id: BallotId(row.id),
            voter_id: VoterId(row.voter_id),
            poll_id: PollId(row.poll_id),
            choice_id: ChoiceId(row.choice_id),
            cast_at: row.cast_at,
        }
    }
}

fn polls_from_rows(rows: Vec<PollRow>) -> Result<Vec<Poll>> {
    rows.into_iter().map(Poll::try_from).collect()
}

fn to_i32(value: u32, field: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::validation(format!("{field}: out of range")))
}

/// Map a unique violation to a conflict on `what`
fn conflict_or(err: sqlx::Error, what: &str) -> Error {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return Error::conflict(format!(
                "{what} violates {}",
                db.constraint().unwrap_or("a unique constraint")
            ));
        }
    }
    Error::from(err)
}

/// Classify failures of the ballot insert and commit
fn ballot_error(err: sqlx::Error, ballot: &NewBallot) -> Error {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return Error::AlreadyVoted {
                voter_id: ballot.voter_id,
                poll_id: ballot.poll_id,
            };
        }
        if db.is_foreign_key_violation() {
            return match db.constraint() {
                Some(name) if name.contains("voter") => Error::not_found("voter", ballot.voter_id),
                _ => Error::not_found("poll", ballot.poll_id),
            };
        }
    }
    Error::from(err)
}

impl Store for PgStore {
    async fn insert_voter(&self, voter: Voter) -> Result<Voter> {
        let age = voter.age.map(|a| to_i32(a, "age")).transpose()?;
        sqlx::query(
            "INSERT INTO voters (id, user_id, name, age, sex, srn, branch, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(voter.id.0)
        .bind(voter.user_id.0)
        .bind(&voter.name)
        .bind(age)
        .bind(voter.sex.code())
        .bind(&voter.srn)
        .bind(&voter.branch)
        .bind(voter.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or(e, "voter"))?;
        Ok(voter)
    }

    async fn insert_candidate(&self, candidate: Candidate) -> Result<Candidate> {
        sqlx::query(
            "INSERT INTO candidates (id, name, age, sex, branch, department, position)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(candidate.id.0)
        .bind(&candidate.name)
        .bind(to_i32(candidate.age, "age")?)
        .bind(candidate.sex.code())
        .bind(&candidate.branch)
        .bind(&candidate.department)
        .bind(&candidate.position)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or(e, "candidate"))?;
        Ok(candidate)
    }

    async fn insert_poll(&self, poll: Poll, choices: Vec<Choice>) -> Result<Poll> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO polls (id, question, publication_date, is_active, department, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(poll.id.0)
        .bind(&poll.question)
        .bind(poll.publication_date)
        .bind(poll.is_active)
        .bind(poll.department.map(|d| d.as_str()))
        .bind(poll.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_or(e, "poll"))?;

        for (ordinal, choice) in choices.iter().enumerate() {
            if choice.poll_id != poll.id {
                return Err(Error::internal(format!(
                    "choice {} does not reference poll {}",
                    choice.id, poll.id
                )));
            }
            sqlx::query(
                "INSERT INTO choices (id, poll_id, candidate_id, ordinal, vote_count)
                 VALUES ($1, $2, $3, $4, 0)",
            )
            .bind(choice.id.0)
            .bind(poll.id.0)
            .bind(choice.candidate_id.map(|c| c.0))
            .bind(ordinal as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(poll)
    }

    async fn delete_poll(&self, poll_id: PollId) -> Result<bool> {
        // Choices and ballots go with it via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM polls WHERE id = $1")
            .bind(poll_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_poll_active(&self, poll_id: PollId, is_active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE polls SET is_active = $2 WHERE id = $1")
            .bind(poll_id.0)
            .bind(is_active)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_poll(&self, poll_id: PollId) -> Result<Option<Poll>> {
        let row: Option<PollRow> =
            sqlx::query_as(&format!("SELECT {POLL_COLUMNS} FROM polls WHERE id = $1"))
                .bind(poll_id.0)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Poll::try_from).transpose()
    }

    async fn get_choice(&self, choice_id: ChoiceId) -> Result<Option<Choice>> {
        let row: Option<ChoiceRow> = sqlx::query_as(
            "SELECT id, poll_id, candidate_id, vote_count FROM choices WHERE id = $1",
        )
        .bind(choice_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Choice::from))
    }

    async fn get_voter(&self, voter_id: VoterId) -> Result<Option<Voter>> {
        let row: Option<VoterRow> =
            sqlx::query_as(&format!("SELECT {VOTER_COLUMNS} FROM voters WHERE id = $1"))
                .bind(voter_id.0)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Voter::try_from).transpose()
    }

    async fn get_candidate(&self, candidate_id: CandidateId) -> Result<Option<Candidate>> {
        let row: Option<CandidateRow> = sqlx::query_as(&format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE id = $1"
        ))
        .bind(candidate_id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Candidate::try_from).transpose()
    }

    async fn poll_tally(&self, poll_id: PollId) -> Result<Vec<ChoiceTally>> {
        let rows: Vec<TallyRow> = sqlx::query_as(
            "SELECT c.id AS choice_id, cand.name AS candidate_name, c.vote_count
             FROM choices c
             LEFT JOIN candidates cand ON cand.id = c.candidate_id
             WHERE c.poll_id = $1
             ORDER BY c.ordinal",
        )
        .bind(poll_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ChoiceTally {
                choice_id: ChoiceId(row.choice_id),
                candidate_name: row.candidate_name,
                vote_count: row.vote_count.max(0) as u64,
            })
            .collect())
    }

    async fn list_polls(&self) -> Result<Vec<Poll>> {
        let rows: Vec<PollRow> = sqlx::query_as(&format!(
            "SELECT {POLL_COLUMNS} FROM polls ORDER BY publication_date ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        polls_from_rows(rows)
    }

    async fn list_voters(&self) -> Result<Vec<Voter>> {
        let rows: Vec<VoterRow> = sqlx::query_as(&format!(
            "SELECT {VOTER_COLUMNS} FROM voters ORDER BY created_at, name"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Voter::try_from).collect()
    }

    async fn list_candidates(&self) -> Result<Vec<Candidate>> {
        let rows: Vec<CandidateRow> = sqlx::query_as(&format!(
            "SELECT {CANDIDATE_COLUMNS} FROM candidates ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Candidate::try_from).collect()
    }

    async fn count_voters(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM voters")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn count_candidates(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM candidates")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn count_polls(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM polls")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn count_ballots(&self, poll_id: Option<PollId>) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM ballots WHERE $1::uuid IS NULL OR poll_id = $1")
                .bind(poll_id.map(|p| p.0))
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }

    async fn find_ballot(&self, voter_id: VoterId, poll_id: PollId) -> Result<Option<Ballot>> {
        let row: Option<BallotRow> = sqlx::query_as(&format!(
            "SELECT {BALLOT_COLUMNS} FROM ballots WHERE voter_id = $1 AND poll_id = $2"
        ))
        .bind(voter_id.0)
        .bind(poll_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Ballot::from))
    }

    async fn recent_ballots(&self, poll_id: PollId, limit: usize) -> Result<Vec<Ballot>> {
        let rows: Vec<BallotRow> = sqlx::query_as(&format!(
            "SELECT {BALLOT_COLUMNS} FROM ballots WHERE poll_id = $1 ORDER BY cast_at DESC LIMIT $2"
        ))
        .bind(poll_id.0)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Ballot::from).collect())
    }

    async fn reconcile_expired(&self, today: NaiveDate) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE polls SET is_active = FALSE
             WHERE is_active AND (publication_date AT TIME ZONE 'UTC')::date < $1",
        )
        .bind(today)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_open_polls(&self, today: NaiveDate) -> Result<Vec<Poll>> {
        let rows: Vec<PollRow> = sqlx::query_as(&format!(
            "SELECT {POLL_COLUMNS} FROM polls
             WHERE is_active AND (publication_date AT TIME ZONE 'UTC')::date >= $1
             ORDER BY publication_date ASC"
        ))
        .bind(today)
        .fetch_all(&self.pool)
        .await?;
        polls_from_rows(rows)
    }

    async fn list_past_polls(&self, today: NaiveDate) -> Result<Vec<Poll>> {
        let rows: Vec<PollRow> = sqlx::query_as(&format!(
            "SELECT {POLL_COLUMNS} FROM polls
             WHERE (publication_date AT TIME ZONE 'UTC')::date < $1 OR NOT is_active
             ORDER BY publication_date DESC"
        ))
        .bind(today)
        .fetch_all(&self.pool)
        .await?;
        polls_from_rows(rows)
    }

    async fn record_ballot(&self, ballot: NewBallot) -> Result<Ballot> {
        // Dropping `tx` on any early return rolls the whole unit back.
        let mut tx = self.pool.begin().await?;

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM ballots WHERE voter_id = $1 AND poll_id = $2)",
        )
        .bind(ballot.voter_id.0)
        .bind(ballot.poll_id.0)
        .fetch_one(&mut *tx)
        .await?;
        if exists {
            return Err(Error::AlreadyVoted {
                voter_id: ballot.voter_id,
                poll_id: ballot.poll_id,
            });
        }

        let updated = sqlx::query(
            "UPDATE choices SET vote_count = vote_count + 1 WHERE id = $1 AND poll_id = $2",
        )
        .bind(ballot.choice_id.0)
        .bind(ballot.poll_id.0)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            let owner: Option<Uuid> =
                sqlx::query_scalar("SELECT poll_id FROM choices WHERE id = $1")
                    .bind(ballot.choice_id.0)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match owner {
                Some(_) => Error::InvalidChoice {
                    choice_id: ballot.choice_id,
                    poll_id: ballot.poll_id,
                },
                None => Error::not_found("choice", ballot.choice_id),
            });
        }

        let record = Ballot {
            id: BallotId::new(),
            voter_id: ballot.voter_id,
            poll_id: ballot.poll_id,
            choice_id: ballot.choice_id,
            cast_at: ballot.cast_at,
        };

        // A concurrent insert for the same pair blocks here until the other
        // transaction finishes, then fails the unique constraint.
        sqlx::query(
            "INSERT INTO ballots (id, voter_id, poll_id, choice_id, cast_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(record.id.0)
        .bind(record.voter_id.0)
        .bind(record.poll_id.0)
        .bind(record.choice_id.0)
        .bind(record.cast_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| ballot_error(e, &ballot))?;

        tx.commit().await.map_err(|e| ballot_error(e, &ballot))?;
        Ok(record)
    }
}

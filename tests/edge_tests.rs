//! Edge case tests for ballot integrity under concurrency and at boundaries
//!
//! - Concurrent duplicate votes by one voter
//! - Many voters racing on one poll
//! - Lazy archival repeated by concurrent listings
//! - Date boundaries of the open window
//! - Statistics with zero votes and zero voters

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use election_core::{
    ElectionEngine, Error, MemoryStore, Result,
    config::VotingConfig,
    stats::{self, MAX_PARTICIPATION},
    types::{ChoiceId, Department, NewCandidate, NewPoll, NewVoter, Poll, Sex, UserId, Voter},
};
use std::sync::{Arc, Mutex};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 14, 12, 0, 0).unwrap()
}

async fn voters(engine: &ElectionEngine<MemoryStore>, n: usize) -> Result<Vec<Voter>> {
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        out.push(
            engine
                .register_voter(NewVoter {
                    user_id: UserId::new(),
                    name: format!("Voter {i}"),
                    age: None,
                    sex: Sex::Other,
                    srn: None,
                    branch: None,
                })
                .await?,
        );
    }
    Ok(out)
}

/// Poll with `n` candidate choices, returned with its choice ids in order
async fn poll_with_choices(
    engine: &ElectionEngine<MemoryStore>,
    department: Option<Department>,
    date: DateTime<Utc>,
    n: usize,
) -> Result<(Poll, Vec<ChoiceId>)> {
    let mut candidate_ids = Vec::new();
    for i in 0..n {
        let candidate = engine
            .add_candidate(NewCandidate {
                name: format!("Candidate {i}"),
                age: 30,
                sex: Sex::Male,
                branch: None,
                department: None,
                position: None,
            })
            .await?;
        candidate_ids.push(candidate.id);
    }
    let poll = engine
        .create_poll(NewPoll {
            question: Some("Who should lead?".to_string()),
            department,
            publication_date: date,
            candidate_ids,
        })
        .await?;
    let choices = engine
        .get_poll_stats(poll.id)
        .await?
        .choices
        .iter()
        .map(|c| c.choice_id)
        .collect();
    Ok((poll, choices))
}

// =============================================================================
// CONCURRENT OPERATIONS TESTS
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_votes() -> Result<()> {
    println!("🔒 Testing concurrent duplicate votes by one voter...");

    let engine = ElectionEngine::new(MemoryStore::new(), VotingConfig::default());
    let voter_id = voters(&engine, 1).await?.remove(0).id;
    let (poll, choices) = poll_with_choices(&engine, Some(Department::President), now(), 2).await?;
    let poll_id = poll.id;

    let accepted = Arc::new(Mutex::new(0));
    let duplicates = Arc::new(Mutex::new(0));
    let mut handles = Vec::new();

    for i in 0..50 {
        let engine = engine.clone();
        let accepted = accepted.clone();
        let duplicates = duplicates.clone();
        let choice = choices[i % choices.len()];

        handles.push(tokio::spawn(async move {
            match engine.cast_vote(voter_id, poll_id, choice, now()).await {
                Ok(_) => *accepted.lock().unwrap() += 1,
                Err(Error::AlreadyVoted { .. }) => *duplicates.lock().unwrap() += 1,
                Err(e) => panic!("Unexpected cast failure: {e}"),
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let accepted = *accepted.lock().unwrap();
    let duplicates = *duplicates.lock().unwrap();
    println!("✅ Accepted: {accepted}, duplicates: {duplicates}");

    assert_eq!(accepted, 1, "exactly one concurrent vote must win");
    assert_eq!(duplicates, 49);

    let audit = engine.audit_poll(poll.id).await?;
    assert_eq!(audit.tally_sum, 1);
    assert_eq!(audit.ballot_count, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_different_voters() -> Result<()> {
    println!("👥 Testing concurrent votes by different voters...");

    let engine = ElectionEngine::new(MemoryStore::new(), VotingConfig::default());
    let all = voters(&engine, 40).await?;
    let (poll, choices) = poll_with_choices(&engine, Some(Department::Technical), now(), 3).await?;
    let poll_id = poll.id;

    let mut handles = Vec::new();
    for (i, voter) in all.into_iter().enumerate() {
        let engine = engine.clone();
        let choice = choices[i % choices.len()];
        handles.push(tokio::spawn(async move {
            engine.cast_vote(voter.id, poll_id, choice, now()).await
        }));
    }
    for handle in handles {
        handle.await.unwrap()?;
    }

    let stats = engine.get_poll_stats(poll.id).await?;
    assert_eq!(stats.total_votes, 40);
    assert_eq!(
        stats.choices.iter().map(|c| c.votes).collect::<Vec<_>>(),
        vec![14, 13, 13]
    );
    assert!(engine.audit_poll(poll.id).await?.is_consistent());
    println!("✅ Tally matches ledger: {}", stats.total_votes);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reconcile_archives_once() -> Result<()> {
    let engine = ElectionEngine::new(MemoryStore::new(), VotingConfig::default());
    for days in 1..=5 {
        poll_with_choices(&engine, None, now() - Duration::days(days), 1).await?;
    }
    poll_with_choices(&engine, None, now(), 1).await?;

    let today = now().date_naive();
    let mut handles = Vec::new();
    for _ in 0..10 {
        let engine = engine.clone();
        handles.push(tokio::spawn(
            async move { engine.reconcile_expired(today).await },
        ));
    }

    let mut archived = 0;
    for handle in handles {
        archived += handle.await.unwrap()?;
    }
    assert_eq!(archived, 5, "each expired poll is archived exactly once");
    assert_eq!(engine.list_open_polls(today).await?.len(), 1);
    Ok(())
}

// =============================================================================
// BOUNDARY TESTS
// =============================================================================

#[tokio::test]
async fn test_open_window_boundaries() -> Result<()> {
    let engine = ElectionEngine::new(MemoryStore::new(), VotingConfig::default());
    let start_of_day = Utc.with_ymd_and_hms(2025, 2, 14, 0, 0, 0).unwrap();
    let (poll, _) = poll_with_choices(&engine, Some(Department::Social), start_of_day, 1).await?;

    let day = |d| NaiveDate::from_ymd_opt(2025, 2, d).unwrap();
    assert!(!engine.is_open_for_voting(poll.id, day(13)).await?);
    assert!(engine.is_open_for_voting(poll.id, day(14)).await?);
    assert!(!engine.is_open_for_voting(poll.id, day(15)).await?);

    // Reconciling on election day leaves the poll active.
    assert_eq!(engine.reconcile_expired(day(14)).await?, 0);
    assert_eq!(engine.reconcile_expired(day(15)).await?, 1);
    assert!(!engine.is_open_for_voting(poll.id, day(14)).await?);
    Ok(())
}

#[tokio::test]
async fn test_archived_poll_rejects_votes_on_its_day() -> Result<()> {
    let engine = ElectionEngine::new(MemoryStore::new(), VotingConfig::default());
    let voter = voters(&engine, 1).await?.remove(0);
    let (poll, choices) = poll_with_choices(&engine, None, now(), 1).await?;

    engine.archive_poll(poll.id).await?;
    let result = engine.cast_vote(voter.id, poll.id, choices[0], now()).await;
    assert!(matches!(result, Err(Error::ElectionClosed { .. })));
    assert_eq!(engine.audit_poll(poll.id).await?.ballot_count, 0);
    Ok(())
}

// =============================================================================
// STATISTICS EDGE CASES
// =============================================================================

#[tokio::test]
async fn test_zero_vote_statistics() -> Result<()> {
    let engine = ElectionEngine::new(MemoryStore::new(), VotingConfig::default());
    let (poll, _) = poll_with_choices(&engine, Some(Department::Cultural), now(), 3).await?;

    let stats = engine.get_poll_stats(poll.id).await?;
    assert_eq!(stats.total_votes, 0);
    assert!(stats.choices.iter().all(|c| c.percentage == 0.0));
    assert_eq!(stats.participation_rate, 0.0);

    let overview = engine.get_department_stats().await?;
    let cultural = overview.department(Department::Cultural).unwrap();
    assert_eq!(cultural.participation, 0.0);
    Ok(())
}

#[tokio::test]
async fn test_department_rollup_omits_unassigned_polls() -> Result<()> {
    let engine = ElectionEngine::new(MemoryStore::new(), VotingConfig::default());
    let voter = voters(&engine, 1).await?.remove(0);
    let (general, choices) = poll_with_choices(&engine, None, now(), 1).await?;
    engine.cast_vote(voter.id, general.id, choices[0], now()).await?;

    let overview = engine.get_department_stats().await?;
    assert_eq!(overview.total_elections, 1);
    assert_eq!(overview.total_votes, 1);
    assert!(overview.departments.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_department_participation_is_capped() -> Result<()> {
    let engine = ElectionEngine::new(MemoryStore::new(), VotingConfig::default());
    let all = voters(&engine, 2).await?;
    let (poll, choices) = poll_with_choices(&engine, Some(Department::President), now(), 1).await?;
    for voter in &all {
        engine.cast_vote(voter.id, poll.id, choices[0], now()).await?;
    }

    // Per-poll ratios are exact; the rollup never exceeds the cap even when
    // the estimate would.
    let full = stats::department_rollup(vec![engine.get_poll_stats(poll.id).await?], 1);
    assert_eq!(full[0].participation, MAX_PARTICIPATION);

    let overview = engine.get_department_stats().await?;
    assert_eq!(
        overview.department(Department::President).unwrap().participation,
        100.0
    );
    Ok(())
}

#[test]
fn test_percentage_rounding() {
    assert_eq!(stats::percentage(0, 0), 0.0);
    assert_eq!(stats::percentage(1, 3), 33.3);
    assert_eq!(stats::percentage(2, 3), 66.7);
    assert_eq!(stats::percentage(1, 8), 12.5);
    assert_eq!(stats::percentage(1, 16), 6.3);
}

//! PostgreSQL store tests
//!
//! Skipped unless `TEST_DATABASE_URL` points at a scratch database. Each test
//! works on its own freshly created rows, so runs can share a database.

use chrono::Utc;
use election_core::{
    ElectionEngine, Error, PgStore, Result,
    config::{DatabaseConfig, VotingConfig},
    types::{Department, NewCandidate, NewPoll, NewVoter, Sex, UserId},
};
use std::sync::Arc;

async fn connect() -> Result<Option<Arc<PgStore>>> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        println!("⏭️  TEST_DATABASE_URL not set, skipping");
        return Ok(None);
    };
    let store = PgStore::connect(&DatabaseConfig {
        url,
        max_connections: 10,
    })
    .await?;
    store.migrate().await?;
    Ok(Some(Arc::new(store)))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_postgres_voting_workflow() -> Result<()> {
    let Some(store) = connect().await? else {
        return Ok(());
    };
    let engine = ElectionEngine::from_shared(store, VotingConfig::default());
    let now = Utc::now();

    let mut voters = Vec::new();
    for i in 0..10 {
        voters.push(
            engine
                .register_voter(NewVoter {
                    user_id: UserId::new(),
                    name: format!("Pg Voter {i}"),
                    age: Some(25),
                    sex: Sex::Female,
                    srn: None,
                    branch: None,
                })
                .await?,
        );
    }
    let candidate = engine
        .add_candidate(NewCandidate {
            name: "Pg Candidate".to_string(),
            age: 40,
            sex: Sex::Male,
            branch: None,
            department: None,
            position: None,
        })
        .await?;
    let poll = engine
        .create_poll(NewPoll {
            question: None,
            department: Some(Department::Technical),
            publication_date: now,
            candidate_ids: vec![candidate.id],
        })
        .await?;
    let choice = engine.get_poll_stats(poll.id).await?.choices[0].choice_id;
    println!("✅ Fixtures created in PostgreSQL");

    // The same voter racing against itself.
    let mut handles = Vec::new();
    for _ in 0..20 {
        let engine = engine.clone();
        let (voter_id, poll_id) = (voters[0].id, poll.id);
        handles.push(tokio::spawn(async move {
            engine.cast_vote(voter_id, poll_id, choice, now).await
        }));
    }
    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(Error::AlreadyVoted { .. }) => {}
            Err(e) => panic!("Unexpected cast failure: {e}"),
        }
    }
    assert_eq!(accepted, 1);
    println!("✅ Unique ballot constraint held under concurrency");

    for voter in &voters[1..] {
        engine.cast_vote(voter.id, poll.id, choice, now).await?;
    }

    let audit = engine.audit_poll(poll.id).await?;
    assert_eq!(audit.tally_sum, 10);
    assert!(audit.is_consistent());

    let timeline = engine.vote_timeline(poll.id, 3).await?;
    assert_eq!(timeline.len(), 3);

    engine.delete_poll(poll.id).await?;
    assert!(!engine.has_voted(voters[0].id, poll.id).await?);
    Ok(())
}

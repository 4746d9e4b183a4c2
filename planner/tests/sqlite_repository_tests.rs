//! SQLite store behaviour on a temporary database file.
#![cfg(feature = "sqlite-repo")]

mod support;

use std::sync::Arc;

use neo_planner::db::{
    CandidateQuery, CandidateRepository, DatabaseSettings, RepositoryError, RepositoryFactory,
    SqliteConfig, SqliteRepository,
};
use neo_planner::models::{
    ApproachColor, Candidate, CandidateField, CandidateUpdate, RejectedReason, MPC_NEO,
};

use support::*;

fn open(dir: &tempfile::TempDir) -> SqliteRepository {
    SqliteRepository::new(SqliteConfig::with_path(dir.path().join("candidates.db"))).unwrap()
}

fn sample(name: &str) -> Candidate {
    let mut c = ready_candidate(name, 3.0, 10.0, night());
    c.approach_color = Some(ApproachColor::Orange);
    c.notes = Some("2 nights".to_string());
    c
}

#[tokio::test]
async fn test_insert_get_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open(&dir);
    assert!(repo.health_check().await.unwrap());

    let c = sample("P21sql1");
    let id = repo.insert(&c).await.unwrap();
    let stored = repo.get(&id).await.unwrap().unwrap();

    assert_eq!(stored.name, c.name);
    assert_eq!(stored.candidate_type, MPC_NEO);
    assert_eq!(stored.ra, c.ra);
    assert_eq!(stored.approach_color, Some(ApproachColor::Orange));
    assert_eq!(stored.start_observability, c.start_observability);
    assert!(stored.date_last_edited.is_some());
}

#[tokio::test]
async fn test_duplicate_insert_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open(&dir);
    let c = sample("P21sql2");
    repo.insert(&c).await.unwrap();
    let err = repo.insert(&c).await.unwrap_err();
    assert!(matches!(err, RepositoryError::AlreadyExists { .. }));
    assert_eq!(repo.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_update_merges_and_set_null_clears() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open(&dir);
    let id = repo.insert(&sample("P21sql3")).await.unwrap();

    let update = CandidateUpdate {
        rmse_ra: Some(12.5),
        rejected_reason: Some(RejectedReason::VMag),
        ..CandidateUpdate::default()
    };
    let merged = repo.update(&id, &update).await.unwrap();
    assert_eq!(merged.rmse_ra, Some(12.5));
    assert_eq!(merged.rmse_dec, Some(5.0));
    assert_eq!(merged.rejected_reason, Some(RejectedReason::VMag));

    let cleared = repo
        .set_null(&id, CandidateField::RejectedReason)
        .await
        .unwrap();
    assert_eq!(cleared.rejected_reason, None);
    assert_eq!(repo.get(&id).await.unwrap().unwrap().rejected_reason, None);
}

#[tokio::test]
async fn test_invalid_update_leaves_record_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open(&dir);
    let c = sample("P21sql4");
    let id = repo.insert(&c).await.unwrap();
    let before = repo.get(&id).await.unwrap().unwrap();

    let update = CandidateUpdate {
        start_observability: c.end_observability,
        ..CandidateUpdate::default()
    };
    let err = repo.update(&id, &update).await.unwrap_err();
    assert!(matches!(err, RepositoryError::ValidationError { .. }));
    assert_eq!(repo.get(&id).await.unwrap().unwrap(), before);
}

#[tokio::test]
async fn test_remove_keeps_first_reason_and_filters() {
    let dir = tempfile::tempdir().unwrap();
    let repo = open(&dir);
    let keep = repo.insert(&sample("P21sqlk")).await.unwrap();
    let gone = repo.insert(&sample("P21sqlg")).await.unwrap();

    let removed = repo.remove(&gone, "first").await.unwrap();
    assert_eq!(removed.removed_reason.as_deref(), Some("first"));
    let again = repo.remove(&gone, "second").await.unwrap();
    assert_eq!(again.removed_reason.as_deref(), Some("first"));

    let live = repo
        .query(&CandidateQuery::new().of_type(MPC_NEO).not_removed())
        .await
        .unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id, keep);
    assert_eq!(repo.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let id = {
        let repo = open(&dir);
        repo.insert(&sample("P21sqlr")).await.unwrap()
    };
    let repo = open(&dir);
    assert!(repo.get(&id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_factory_builds_sqlite_store() {
    let dir = tempfile::tempdir().unwrap();
    let settings = DatabaseSettings {
        repository: "sqlite".to_string(),
        candidate_db_path: dir.path().join("factory.db"),
        ..DatabaseSettings::default()
    };
    let repo: Arc<dyn CandidateRepository> = RepositoryFactory::create(&settings).unwrap();
    repo.insert(&sample("P21sqlf")).await.unwrap();
    assert_eq!(repo.count().await.unwrap(), 1);
}

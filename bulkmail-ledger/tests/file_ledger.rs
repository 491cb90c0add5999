use bulkmail_common::{EmailComposition, SendStatus, UserId, Validator};
use bulkmail_ledger::{FileLogStore, LedgerError, LogQuery, LogStore};
use chrono::Utc;
use pretty_assertions::assert_eq;

fn batch(recipients: &[&str]) -> bulkmail_common::Batch {
    Validator::default()
        .prepare(
            UserId::new("alice"),
            EmailComposition {
                subject: "Launch".to_string(),
                body: "We are live.\n\nThanks!".to_string(),
                recipients: recipients.iter().map(ToString::to_string).collect(),
                ..Default::default()
            },
        )
        .expect("valid composition")
}

fn store(dir: &tempfile::TempDir) -> FileLogStore {
    let store = FileLogStore::new(dir.path().join("ledger")).expect("valid path");
    store.init().expect("init");
    store
}

#[tokio::test]
async fn test_rows_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let batch = batch(&["a@example.com", "b@example.com"]);

    let mut sent = bulkmail_common::SendAttempt::queued(&batch, "a@example.com", Utc::now());
    let mut failed = bulkmail_common::SendAttempt::queued(&batch, "b@example.com", Utc::now());

    {
        let store = store(&dir);
        store.insert(&sent).await.expect("insert");
        store.insert(&failed).await.expect("insert");

        sent.mark_sent("re_1", Utc::now()).expect("transition");
        failed.mark_failed("Invalid recipient").expect("transition");
        store.update(&sent).await.expect("update");
        store.update(&failed).await.expect("update");
    }

    let reopened = store(&dir);
    let rows = reopened
        .attempts_for_batch(batch.id())
        .await
        .expect("batch rows");

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], sent);
    assert_eq!(rows[1], failed);
    assert_eq!(rows[1].error_message(), Some("Invalid recipient"));
}

#[tokio::test]
async fn test_terminal_row_not_overwritten_on_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store(&dir);
    let batch = batch(&["a@example.com"]);

    let queued = bulkmail_common::SendAttempt::queued(&batch, "a@example.com", Utc::now());
    store.insert(&queued).await.expect("insert");

    let mut sent = queued.clone();
    sent.mark_sent("re_1", Utc::now()).expect("transition");
    store.update(&sent).await.expect("update");

    let mut failed = queued.clone();
    failed.mark_failed("late failure").expect("transition");
    assert!(matches!(
        store.update(&failed).await,
        Err(LedgerError::TerminalOverwrite(_))
    ));

    assert_eq!(
        store.get(&queued.id).await.expect("get").status(),
        SendStatus::Sent
    );
    assert!(matches!(
        store.insert(&queued).await,
        Err(LedgerError::AlreadyExists(_))
    ));
}

#[tokio::test]
async fn test_init_removes_interrupted_writes_and_ignores_junk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ledger");
    std::fs::create_dir_all(&path).expect("mkdir");
    std::fs::write(path.join(".tmp_01ARZ3NDEKTSV4RRFFQ69G5FAV.bin"), b"partial").expect("write");
    std::fs::write(path.join("notes.txt"), b"hello").expect("write");

    let store = store(&dir);
    assert!(!path.join(".tmp_01ARZ3NDEKTSV4RRFFQ69G5FAV.bin").exists());

    let page = store
        .query(&UserId::new("alice"), &LogQuery::default())
        .await
        .expect("query");
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn test_concurrent_appends() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store(&dir);
    let batch = batch(&["a@example.com"]);

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let store = store.clone();
            let attempt = bulkmail_common::SendAttempt::queued(
                &batch,
                &format!("user{i}@example.com"),
                Utc::now(),
            );
            tokio::spawn(async move { store.insert(&attempt).await })
        })
        .collect();

    for handle in handles {
        handle.await.expect("task").expect("insert");
    }

    let stats = store.stats(&UserId::new("alice")).await.expect("stats");
    assert_eq!(stats.total, 20);
    assert_eq!(stats.queued, 20);
    assert!(stats.success_rate.abs() < f64::EPSILON);
}

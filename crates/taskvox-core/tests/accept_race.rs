//! Integration test: concurrent acceptance against the sled store.
//!
//! ## Scenarios
//! 1. Two users race for one open task: exactly one wins, the other sees AlreadyTaken.
//! 2. Many users race: still exactly one winner and one progress record for it.
//! 3. The creator racing other users never succeeds.
//! 4. An on-disk store behaves like the in-memory one.
//! 5. Interleaved creates on a single-threaded runtime all land with their progress records.

use std::sync::Arc;
use taskvox_core::{
    Category, ProgressEvent, RepositoryError, SledTaskStore, TaskDraft, TaskRepository, TaskStatus,
    UserId,
};

fn coffee_task() -> taskvox_core::NewTask {
    TaskDraft {
        title: "Coffee from Starbucks".to_string(),
        category: Category::CoffeeRun,
        location: "Marston Library".to_string(),
        ..TaskDraft::default()
    }
    .finalize()
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_acceptors_one_winner() {
    let store = Arc::new(SledTaskStore::temporary().unwrap());
    let id = store
        .create_task(coffee_task(), &UserId::from("creator"))
        .await
        .unwrap();

    let (a, b) = {
        let s1 = Arc::clone(&store);
        let s2 = Arc::clone(&store);
        let id1 = id.clone();
        let id2 = id.clone();
        let h1 = tokio::spawn(async move { s1.accept_task(&id1, &UserId::from("bob")).await });
        let h2 = tokio::spawn(async move { s2.accept_task(&id2, &UserId::from("carol")).await });
        (h1.await.unwrap(), h2.await.unwrap())
    };

    let outcomes = [a, b];
    let wins = outcomes.iter().filter(|r| r.is_ok()).count();
    let taken = outcomes
        .iter()
        .filter(|r| matches!(r, Err(RepositoryError::AlreadyTaken(_))))
        .count();
    assert_eq!(wins, 1);
    assert_eq!(taken, 1);

    let task = store.get_task(&id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Accepted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn many_acceptors_one_winner() {
    let store = Arc::new(SledTaskStore::temporary().unwrap());
    let id = store
        .create_task(coffee_task(), &UserId::from("creator"))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for n in 0..16 {
        let store = Arc::clone(&store);
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            store.accept_task(&id, &UserId::new(format!("runner-{n}"))).await
        }));
    }

    let mut wins = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(()) => wins += 1,
            Err(RepositoryError::AlreadyTaken(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(wins, 1);

    let accepted: Vec<_> = store
        .progress(&id)
        .unwrap()
        .into_iter()
        .filter(|r| r.event == ProgressEvent::Accepted)
        .collect();
    assert_eq!(accepted.len(), 1);

    let task = store.get_task(&id).await.unwrap();
    assert_eq!(task.accepted_by.as_ref(), Some(&accepted[0].actor_id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn creator_never_wins_the_race() {
    let store = Arc::new(SledTaskStore::temporary().unwrap());
    let creator = UserId::from("creator");
    let id = store.create_task(coffee_task(), &creator).await.unwrap();

    let s1 = Arc::clone(&store);
    let id1 = id.clone();
    let c = creator.clone();
    let self_attempt = tokio::spawn(async move { s1.accept_task(&id1, &c).await });
    let s2 = Arc::clone(&store);
    let id2 = id.clone();
    let other = tokio::spawn(async move { s2.accept_task(&id2, &UserId::from("bob")).await });

    assert!(matches!(
        self_attempt.await.unwrap(),
        Err(RepositoryError::SelfAccept { .. })
    ));
    assert!(other.await.unwrap().is_ok());
}

#[tokio::test]
async fn on_disk_store_accepts_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = SledTaskStore::open(dir.path().join("tasks")).unwrap();
    let id = store
        .create_task(coffee_task(), &UserId::from("creator"))
        .await
        .unwrap();
    store.accept_task(&id, &UserId::from("bob")).await.unwrap();
    store.flush().unwrap();

    let task = store.get_task(&id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Accepted);
    assert!(store
        .list_open_tasks(&UserId::from("someone"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn interleaved_creates_on_one_thread_all_land() {
    let store = SledTaskStore::temporary().unwrap();
    let mut posting = tokio::task::JoinSet::new();
    for n in 0..24 {
        let store = store.clone();
        posting.spawn(async move {
            store
                .create_task(coffee_task(), &UserId::new(format!("poster-{n}")))
                .await
        });
    }

    let mut ids = Vec::new();
    while let Some(joined) = posting.join_next().await {
        ids.push(joined.unwrap().unwrap());
    }

    assert_eq!(store.len(), 24);
    let visible = store.list_open_tasks(&UserId::from("reader")).await.unwrap();
    assert_eq!(visible.len(), 24);
    for id in &ids {
        let log = store.progress(id).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].event, ProgressEvent::Created);
    }
}

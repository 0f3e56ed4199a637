//! The directory behind a mutex, hammered from many tasks at once.

use std::sync::Arc;

use parley_directory::{DeleteScope, Directory, DirectoryError, MessageId};
use tokio::sync::Mutex;

fn shared(users: &[&str]) -> Arc<Mutex<Directory>> {
    let mut dir = Directory::new();
    for user in users {
        dir.create_account(user, "pw").unwrap();
    }
    Arc::new(Mutex::new(dir))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_senders_to_offline_recipient_keep_order() {
    let dir = shared(&["alice", "bob", "carol"]);

    let a = {
        let dir = Arc::clone(&dir);
        tokio::spawn(async move { dir.lock().await.send("alice", "carol", "from alice") })
    };
    let b = {
        let dir = Arc::clone(&dir);
        tokio::spawn(async move { dir.lock().await.send("bob", "carol", "from bob") })
    };
    let sent_a = a.await.unwrap().unwrap();
    let sent_b = b.await.unwrap().unwrap();
    assert_ne!(sent_a.id, sent_b.id);

    let queued = dir.lock().await.pop_undelivered("carol", 0).unwrap();
    assert_eq!(queued.len(), 2);
    assert!(queued[0].id < queued[1].id);

    // Queue order follows id order.
    let mut expected = [sent_a.id, sent_b.id];
    expected.sort();
    assert_eq!([queued[0].id, queued[1].id], expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_senders_allocate_unique_ids() {
    let users: Vec<String> = (0..16).map(|i| format!("user{i}")).collect();
    let mut names: Vec<&str> = users.iter().map(String::as_str).collect();
    names.push("sink");
    let dir = shared(&names);

    let mut handles = Vec::new();
    for user in users.clone() {
        let dir = Arc::clone(&dir);
        handles.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            for n in 0..25 {
                let sent = dir.lock().await.send(&user, "sink", &n.to_string()).unwrap();
                ids.push(sent.id);
            }
            ids
        }));
    }

    let mut all: Vec<MessageId> = Vec::new();
    for handle in handles {
        let ids = handle.await.unwrap();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        all.extend(ids);
    }
    all.sort();
    all.dedup();
    assert_eq!(all.len(), 16 * 25);
    assert_eq!(all.first(), Some(&MessageId(1)));
    assert_eq!(all.last(), Some(&MessageId(400)));

    let queued = dir.lock().await.pop_undelivered("sink", 0).unwrap();
    assert_eq!(queued.len(), 400);
    assert!(queued.windows(2).all(|w| w[0].id < w[1].id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_never_return_a_message_twice() {
    let dir = shared(&["alice", "bob"]);
    for n in 0..100 {
        dir.lock().await.send("alice", "bob", &n.to_string()).unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..8 {
        let dir = Arc::clone(&dir);
        handles.push(tokio::spawn(async move {
            let mut got = Vec::new();
            loop {
                let batch = dir.lock().await.pop_undelivered("bob", 3).unwrap();
                if batch.is_empty() {
                    break got;
                }
                got.extend(batch.into_iter().map(|m| m.id));
            }
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    all.sort();
    all.dedup();
    assert_eq!(all.len(), 100);
}

#[tokio::test]
async fn test_delete_account_blocked_until_queue_drained() {
    let dir = shared(&["alice", "carol"]);
    let mut guard = dir.lock().await;
    guard.send("alice", "carol", "m1").unwrap();

    assert!(matches!(
        guard.delete_account("carol"),
        Err(DirectoryError::PendingMessages { count: 1, .. })
    ));
    assert!(guard.find_account("carol").is_some());

    guard.delete_messages("carol", DeleteScope::Queued(&[0])).unwrap();
    guard.delete_account("carol").unwrap();
    assert!(guard.find_account("carol").is_none());
}

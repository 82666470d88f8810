//! Consumer-group semantics of the in-process stream. The worker tests lean on
//! these, so they are pinned here.

use std::collections::HashMap;

use pulse_stream::{MemoryStream, MessageSource, BACKLOG_START};

fn record(n: usize) -> HashMap<String, String> {
    HashMap::from([("event_name".to_string(), format!("event_{n}"))])
}

#[tokio::test]
async fn new_entries_go_to_exactly_one_consumer() {
    let a = MemoryStream::new("worker-a").with_batch_size(2);
    let b = a.consumer("worker-b");
    for n in 0..3 {
        a.publish(record(n));
    }

    let first = a.read_new().await.unwrap();
    let second = b.read_new().await.unwrap();
    let third = a.read_new().await.unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 1);
    assert!(third.is_empty());
    assert_eq!(a.pending_for("worker-a"), vec!["1-0", "2-0"]);
    assert_eq!(a.pending_for("worker-b"), vec!["3-0"]);
}

#[tokio::test]
async fn backlog_is_scoped_to_the_consumer() {
    let a = MemoryStream::new("worker-a").with_batch_size(1);
    let b = a.consumer("worker-b");
    a.publish(record(1));
    a.publish(record(2));
    a.read_new().await.unwrap();
    b.read_new().await.unwrap();

    let a_backlog = a.read_backlog(BACKLOG_START).await.unwrap();
    assert_eq!(a_backlog.len(), 1);
    assert_eq!(a_backlog[0].stream_id, "1-0");

    // A restarted worker-a sees the same backlog.
    let restarted = a.consumer("worker-a");
    let again = restarted.read_backlog(BACKLOG_START).await.unwrap();
    assert_eq!(again[0].stream_id, "1-0");
}

#[tokio::test]
async fn backlog_cursor_pages_forward() {
    let a = MemoryStream::new("worker-a").with_batch_size(2);
    for n in 0..3 {
        a.publish(record(n));
    }
    a.read_new().await.unwrap();
    a.read_new().await.unwrap();

    let page = a.read_backlog(BACKLOG_START).await.unwrap();
    assert_eq!(page.len(), 2);
    let next = a.read_backlog(&page[1].stream_id).await.unwrap();
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].stream_id, "3-0");
    assert!(a.read_backlog("3-0").await.unwrap().is_empty());
}

#[tokio::test]
async fn ack_removes_from_pending() {
    let a = MemoryStream::new("worker-a");
    let id = a.publish(record(1));
    a.read_new().await.unwrap();

    a.ack(&id).await.unwrap();

    assert!(a.pending_for("worker-a").is_empty());
    assert_eq!(a.acked(), vec![id]);
    assert!(a.read_backlog(BACKLOG_START).await.unwrap().is_empty());
}

#[tokio::test]
async fn injected_failures_surface_as_errors() {
    let a = MemoryStream::new("worker-a");
    let id = a.publish(record(1));
    a.fail_next_reads(1);
    assert!(a.read_new().await.is_err());
    assert_eq!(a.read_new().await.unwrap().len(), 1);

    a.fail_acks_for(id.clone());
    assert!(a.ack(&id).await.is_err());
    assert_eq!(a.pending_for("worker-a"), vec![id]);
}

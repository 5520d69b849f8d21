// tests/engine_failures.rs
//
// Fatal vs non-fatal failures of a run.

use std::sync::Arc;
use std::time::Duration;

use airing_notifier::catalog::{AiringItem, FixturePages, PagedCatalog};
use airing_notifier::error::{CatalogFetchError, NotifyError, RunError};
use airing_notifier::ledger::MemoryLedger;
use airing_notifier::notify::{Notifier, RecordingNotifier};
use airing_notifier::subscribers::{MemorySubscriberStore, Subscriber};
use airing_notifier::FanOutEngine;
use async_trait::async_trait;

fn pages() -> FixturePages {
    FixturePages::new(vec![
        vec![AiringItem::new(1, "Foo"), AiringItem::new(2, "Bar")],
        vec![AiringItem::new(3, "Baz")],
    ])
}

fn two_subscribers() -> MemorySubscriberStore {
    MemorySubscriberStore::new(vec![
        Subscriber::new("a@example.com", vec![1]),
        Subscriber::new("b@example.com", vec![3]),
    ])
}

#[tokio::test]
async fn one_failed_dispatch_does_not_stop_the_other_or_the_commit() {
    let ledger = Arc::new(MemoryLedger::new());
    let notifier = Arc::new(RecordingNotifier::failing_for(["a@example.com"]));
    let e = FanOutEngine::new(
        Arc::new(PagedCatalog::new(pages())),
        ledger.clone(),
        Arc::new(two_subscribers()),
        notifier.clone(),
    );

    let report = e.run().await.expect("dispatch failures are not fatal");

    assert_eq!(report.sent_count, 1);
    assert_eq!(report.failed_count, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].recipient, "a@example.com");
    assert_eq!(report.failures[0].item_ids, vec![1]);

    // matched ids are committed, delivered or not
    assert_eq!(ledger.commit_count(), 1);
    assert_eq!(ledger.snapshot().to_vec(), vec![1, 3]);
    assert_eq!(notifier.messages()[0].recipient, "b@example.com");
}

#[tokio::test]
async fn missing_sender_fails_each_dispatch_but_run_completes() {
    let ledger = Arc::new(MemoryLedger::new());
    let e = FanOutEngine::new(
        Arc::new(PagedCatalog::new(pages())),
        ledger.clone(),
        Arc::new(two_subscribers()),
        Arc::new(RecordingNotifier::without_sender()),
    );

    let report = e.run().await.expect("configuration errors are per dispatch");

    assert_eq!(report.sent_count, 0);
    assert_eq!(report.failed_count, 2);
    assert!(report.failures.iter().all(|f| f.kind == "configuration"));
    assert_eq!(ledger.commit_count(), 1);
}

#[tokio::test]
async fn ledger_read_failure_is_fatal_and_sends_nothing() {
    let ledger = Arc::new(MemoryLedger::new().failing_reads());
    let notifier = Arc::new(RecordingNotifier::new());
    let e = FanOutEngine::new(
        Arc::new(PagedCatalog::new(pages())),
        ledger.clone(),
        Arc::new(two_subscribers()),
        notifier.clone(),
    );

    let err = e.run().await.unwrap_err();

    assert!(matches!(err, RunError::LedgerRead(_)), "{err:?}");
    assert_eq!(err.stage(), "ledger_read");
    assert!(notifier.messages().is_empty());
    assert_eq!(ledger.commit_count(), 0);
}

#[tokio::test]
async fn catalog_failure_is_fatal_and_leaves_ledger_untouched() {
    let ledger = Arc::new(MemoryLedger::with_ids([7]));
    let notifier = Arc::new(RecordingNotifier::new());
    let e = FanOutEngine::new(
        Arc::new(PagedCatalog::new(pages().failing_on(2))),
        ledger.clone(),
        Arc::new(two_subscribers()),
        notifier.clone(),
    );

    let err = e.run().await.unwrap_err();

    assert!(
        matches!(err, RunError::Catalog(CatalogFetchError::Status { page: 2, .. })),
        "{err:?}"
    );
    assert!(notifier.messages().is_empty());
    assert_eq!(ledger.commit_count(), 0);
    assert_eq!(ledger.snapshot().to_vec(), vec![7]);
}

#[tokio::test]
async fn subscriber_store_failure_is_fatal() {
    let ledger = Arc::new(MemoryLedger::new());
    let e = FanOutEngine::new(
        Arc::new(PagedCatalog::new(pages())),
        ledger.clone(),
        Arc::new(MemorySubscriberStore::failing()),
        Arc::new(RecordingNotifier::new()),
    );

    let err = e.run().await.unwrap_err();

    assert_eq!(err.stage(), "subscriber_read");
    assert_eq!(ledger.commit_count(), 0);
}

#[tokio::test]
async fn ledger_write_failure_is_reported_with_dispatch_counts() {
    let ledger = Arc::new(MemoryLedger::with_ids([2]).failing_writes());
    let notifier = Arc::new(RecordingNotifier::new());
    let e = FanOutEngine::new(
        Arc::new(PagedCatalog::new(pages())),
        ledger.clone(),
        Arc::new(two_subscribers()),
        notifier.clone(),
    );

    let err = e.run().await.unwrap_err();

    assert_eq!(err.stage(), "ledger_write");
    assert!(!err.is_fatal_before_dispatch());
    let report = err.report().expect("report survives a failed commit");
    assert_eq!(report.sent_count, 2);
    assert_eq!(notifier.messages().len(), 2);

    // the commit was attempted exactly once, with the full union
    let attempts = ledger.commits.lock().unwrap().clone();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].to_vec(), vec![1, 2, 3]);
}

/// Yields for a while before finishing, and checks the ledger is still untouched.
/// Panics for `panics@example.com`.
struct SlowNotifier {
    ledger: Arc<MemoryLedger>,
    delay: Duration,
}

#[async_trait]
impl Notifier for SlowNotifier {
    async fn send(&self, recipient: &str, _subject: &str, _body: &str) -> Result<(), NotifyError> {
        tokio::time::sleep(self.delay).await;
        assert_eq!(
            self.ledger.commit_count(),
            0,
            "ledger committed while {recipient} was still sending"
        );
        if recipient == "panics@example.com" {
            panic!("transport blew up");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "slow"
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn commit_waits_for_slow_and_panicking_dispatches() {
    let ledger = Arc::new(MemoryLedger::new());
    let e = FanOutEngine::new(
        Arc::new(PagedCatalog::new(FixturePages::new(vec![vec![
            AiringItem::new(1, "Foo"),
            AiringItem::new(2, "Bar"),
        ]]))),
        ledger.clone(),
        Arc::new(MemorySubscriberStore::new(vec![
            Subscriber::new("ok@example.com", vec![1]),
            Subscriber::new("panics@example.com", vec![2]),
        ])),
        Arc::new(SlowNotifier {
            ledger: ledger.clone(),
            delay: Duration::from_millis(50),
        }),
    );

    let report = e.run().await.expect("a panicking dispatch is not fatal");

    assert_eq!(report.sent_count, 1);
    assert_eq!(report.failed_count, 1);
    assert_eq!(report.failures[0].recipient, "panics@example.com");
    assert_eq!(report.failures[0].kind, "aborted");
    assert_eq!(ledger.commit_count(), 1);
    assert_eq!(ledger.snapshot().to_vec(), vec![1, 2]);
}

//! # Fan-out Engine
//! Joins subscribers × airing today × not yet notified, sends one digest per
//! subscriber, then commits the grown notified set exactly once.
//!
//! Policy: best-effort fan-out. A failed dispatch never stops the others and
//! never stops the commit. The commit records *matched* ids, not *delivered*
//! ones, so a failed send is not retried on the next run.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;

use crate::catalog::{AiringItem, CatalogFetcher};
use crate::error::{NotifyError, RunError};
use crate::ledger::{NotificationLedger, NotifiedSet};
use crate::notify::{Digest, Notifier};
use crate::subscribers::{Subscriber, SubscriberStore};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("fanout_runs_total", "Fan-out runs started.");
        describe_counter!(
            "fanout_run_failures_total",
            "Runs that ended in an error, labelled by stage."
        );
        describe_gauge!(
            "fanout_candidates",
            "Items airing today and not yet notified, last run."
        );
        describe_counter!("fanout_dispatch_sent_total", "Digests sent successfully.");
        describe_counter!("fanout_dispatch_failed_total", "Digests that failed to send.");
        describe_counter!("fanout_ledger_commits_total", "Successful ledger commits.");
        describe_gauge!("fanout_last_run_ts", "Unix ts when the fan-out last finished.");
        describe_counter!("catalog_pages_fetched_total", "Catalog pages fetched.");
        describe_histogram!("catalog_fetch_ms", "Full catalog drain time in milliseconds.");
    });
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DispatchFailure {
    pub recipient: String,
    pub item_ids: Vec<u64>,
    pub kind: &'static str,
    pub message: String,
}

/// Summary handed back to whoever invoked the run.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub sent_count: usize,
    pub failed_count: usize,
    pub candidate_count: usize,
    pub skipped_subscribers: usize,
    /// Ids matched this run and absent from the ledger before it.
    pub newly_notified_ids: Vec<u64>,
    /// Size of the set written to the ledger.
    pub committed_count: usize,
    pub failures: Vec<DispatchFailure>,
}

/// Items airing today that are not in `already`. Duplicate ids collapse, first wins.
pub fn candidate_items(airing: &[AiringItem], already: &NotifiedSet) -> Vec<AiringItem> {
    let mut seen = HashSet::with_capacity(airing.len());
    airing
        .iter()
        .filter(|item| !already.contains(item.id) && seen.insert(item.id))
        .cloned()
        .collect()
}

/// Digest for one subscriber, or `None` when nothing they track is a candidate.
/// Names follow the subscriber's tracked order.
pub fn build_digest(
    subscriber: &Subscriber,
    candidates: &HashMap<u64, &AiringItem>,
) -> Option<Digest> {
    let mut seen = HashSet::new();
    let mut matched_ids = Vec::new();
    let mut show_names = Vec::new();

    for id in subscriber.tracked() {
        let Some(item) = candidates.get(id) else {
            continue;
        };
        if !seen.insert(*id) {
            continue;
        }
        matched_ids.push(*id);
        show_names.push(item.name.to_uppercase());
    }

    if matched_ids.is_empty() {
        return None;
    }
    Some(Digest {
        email_address: subscriber.email_address.clone(),
        show_names,
        matched_ids,
    })
}

/// Every digest to send this run, plus the union of their matched ids.
pub fn plan_digests(
    subscribers: &[Subscriber],
    candidates: &[AiringItem],
) -> (Vec<Digest>, NotifiedSet) {
    let by_id: HashMap<u64, &AiringItem> = candidates.iter().map(|c| (c.id, c)).collect();
    let mut matched = NotifiedSet::empty();
    let mut digests = Vec::new();

    for sub in subscribers {
        if sub.tracked().is_empty() {
            continue;
        }
        if let Some(d) = build_digest(sub, &by_id) {
            matched.extend(d.matched_ids.iter().copied());
            digests.push(d);
        }
    }
    (digests, matched)
}

pub struct FanOutEngine {
    catalog: Arc<dyn CatalogFetcher>,
    ledger: Arc<dyn NotificationLedger>,
    subscribers: Arc<dyn SubscriberStore>,
    notifier: Arc<dyn Notifier>,
    max_concurrent: usize,
    // one run at a time: ledger read and commit are not atomic
    run_lock: Mutex<()>,
}

impl FanOutEngine {
    pub fn new(
        catalog: Arc<dyn CatalogFetcher>,
        ledger: Arc<dyn NotificationLedger>,
        subscribers: Arc<dyn SubscriberStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            subscribers,
            notifier,
            max_concurrent: 0,
            run_lock: Mutex::new(()),
        }
    }

    /// Cap on in-flight dispatches; 0 means no cap.
    pub fn with_max_concurrent_dispatches(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    /// Execute one run. Concurrent callers are serialized.
    pub async fn run(&self) -> Result<RunReport, RunError> {
        let _guard = self.run_lock.lock().await;
        ensure_metrics_described();
        counter!("fanout_runs_total").increment(1);

        let result = self.run_inner().await;
        gauge!("fanout_last_run_ts").set(chrono::Utc::now().timestamp() as f64);

        if let Err(e) = &result {
            counter!("fanout_run_failures_total", "stage" => e.stage()).increment(1);
            tracing::error!(stage = e.stage(), error = %e, "fan-out run failed");
        }
        result
    }

    async fn run_inner(&self) -> Result<RunReport, RunError> {
        let (subscribers, already, airing) = tokio::try_join!(
            async {
                self.subscribers
                    .subscribers_with_tracked_items()
                    .await
                    .map_err(RunError::from)
            },
            async {
                self.ledger
                    .already_notified_ids()
                    .await
                    .map_err(RunError::from)
            },
            async {
                self.catalog
                    .fetch_airing_today()
                    .await
                    .map_err(RunError::from)
            },
        )?;

        let candidates = candidate_items(&airing, &already);
        gauge!("fanout_candidates").set(candidates.len() as f64);
        tracing::info!(
            subscribers = subscribers.len(),
            airing = airing.len(),
            already_notified = already.len(),
            candidates = candidates.len(),
            "fan-out inputs loaded"
        );

        let (digests, matched) = plan_digests(&subscribers, &candidates);
        let mut report = RunReport {
            candidate_count: candidates.len(),
            skipped_subscribers: subscribers.len() - digests.len(),
            newly_notified_ids: matched.to_vec(),
            ..RunReport::default()
        };

        self.dispatch_all(digests, &mut report).await;

        // Runs whether or not anything was sent, and after every dispatch settled.
        let committed = already.union(&matched);
        report.committed_count = committed.len();
        match self.ledger.commit_notified_ids(&committed).await {
            Ok(()) => {
                counter!("fanout_ledger_commits_total").increment(1);
                tracing::info!(
                    sent = report.sent_count,
                    failed = report.failed_count,
                    committed = report.committed_count,
                    "fan-out run complete"
                );
                Ok(report)
            }
            Err(source) => Err(RunError::LedgerWrite { report, source }),
        }
    }

    /// Spawn one task per digest, then wait for all of them to settle.
    async fn dispatch_all(&self, digests: Vec<Digest>, report: &mut RunReport) {
        let semaphore = match self.max_concurrent {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };

        let mut handles: Vec<(Digest, JoinHandle<Result<(), NotifyError>>)> =
            Vec::with_capacity(digests.len());
        for digest in digests {
            tracing::debug!(
                recipient = %digest.email_address,
                shows = %digest.names_line(),
                "queueing digest"
            );
            let notifier = Arc::clone(&self.notifier);
            let permit_source = semaphore.clone();
            let recipient = digest.email_address.clone();
            let subject = digest.subject();
            let body = digest.body();
            let handle = tokio::spawn(async move {
                let _permit = match permit_source {
                    Some(sem) => Some(
                        sem.acquire_owned()
                            .await
                            .map_err(|e| NotifyError::Aborted(e.to_string()))?,
                    ),
                    None => None,
                };
                notifier.send(&recipient, &subject, &body).await
            });
            handles.push((digest, handle));
        }

        for (digest, handle) in handles {
            let outcome = match handle.await {
                Ok(res) => res,
                Err(e) => Err(NotifyError::Aborted(e.to_string())),
            };
            match outcome {
                Ok(()) => {
                    report.sent_count += 1;
                    counter!("fanout_dispatch_sent_total").increment(1);
                }
                Err(e) => {
                    report.failed_count += 1;
                    counter!("fanout_dispatch_failed_total", "kind" => e.as_label()).increment(1);
                    tracing::warn!(
                        recipient = %digest.email_address,
                        item_ids = ?digest.matched_ids,
                        kind = e.as_label(),
                        error = %e,
                        "dispatch failed"
                    );
                    report.failures.push(DispatchFailure {
                        recipient: digest.email_address,
                        item_ids: digest.matched_ids,
                        kind: e.as_label(),
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> Vec<AiringItem> {
        vec![
            AiringItem::new(1, "Foo"),
            AiringItem::new(2, "Bar"),
            AiringItem::new(3, "Baz"),
        ]
    }

    #[test]
    fn candidates_exclude_already_notified() {
        let already: NotifiedSet = [2].into_iter().collect();
        let c = candidate_items(&items(), &already);
        let ids: Vec<u64> = c.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn candidates_collapse_duplicate_ids() {
        let mut airing = items();
        airing.push(AiringItem::new(1, "Foo (repeat)"));
        let c = candidate_items(&airing, &NotifiedSet::empty());
        assert_eq!(c.len(), 3);
        assert_eq!(c[0].name, "Foo");
    }

    #[test]
    fn digest_follows_tracked_order_not_catalog_order() {
        let all = items();
        let by_id: HashMap<u64, &AiringItem> = all.iter().map(|c| (c.id, c)).collect();
        let sub = Subscriber::new("a@x.io", vec![3, 9, 1, 3]);
        let d = build_digest(&sub, &by_id).unwrap();
        assert_eq!(d.matched_ids, vec![3, 1]);
        assert_eq!(d.names_line(), "BAZ, FOO");
    }

    #[test]
    fn no_match_means_no_digest() {
        let all = items();
        let by_id: HashMap<u64, &AiringItem> = all.iter().map(|c| (c.id, c)).collect();
        assert!(build_digest(&Subscriber::new("a@x.io", vec![7]), &by_id).is_none());
        assert!(build_digest(&Subscriber::untracked("b@x.io"), &by_id).is_none());
    }

    #[test]
    fn plan_unions_matched_ids_across_subscribers() {
        let subs = vec![
            Subscriber::new("a@x.io", vec![1, 2]),
            Subscriber::new("b@x.io", vec![2, 3]),
            Subscriber::new("c@x.io", vec![]),
        ];
        let (digests, matched) = plan_digests(&subs, &items());
        assert_eq!(digests.len(), 2);
        assert_eq!(matched.to_vec(), vec![1, 2, 3]);
    }
}

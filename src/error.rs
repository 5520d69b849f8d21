//! Error taxonomy for the fan-out job.
//!
//! Fatal errors ([`RunError::Catalog`], [`RunError::LedgerRead`],
//! [`RunError::Subscribers`]) abort a run before anything is sent or written.
//! [`RunError::LedgerWrite`] happens after dispatch, so it carries the report of
//! what already went out. [`NotifyError`] is per-dispatch and never aborts a run.

use std::error::Error as StdError;

use thiserror::Error;

use crate::engine::RunReport;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Any page request of the airing-today query failed.
#[derive(Error, Debug)]
pub enum CatalogFetchError {
    #[error("catalog request for page {page} failed")]
    Request {
        page: u32,
        #[source]
        source: BoxError,
    },

    #[error("catalog page {page} returned HTTP {status}")]
    Status { page: u32, status: u16 },

    #[error("catalog page {page} could not be decoded")]
    Decode {
        page: u32,
        #[source]
        source: BoxError,
    },

    #[error("catalog page task aborted: {0}")]
    Join(String),
}

impl CatalogFetchError {
    pub fn request(page: u32, source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Request {
            page,
            source: Box::new(source),
        }
    }

    pub fn decode(page: u32, source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Decode {
            page,
            source: Box::new(source),
        }
    }
}

/// The notified-ids record exists but could not be read.
///
/// A record that does not exist yet is not an error; it reads as an empty set.
#[derive(Error, Debug)]
pub enum LedgerReadError {
    #[error("reading ledger at {location}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger at {location} is corrupt")]
    Corrupt {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("ledger backend error: {0}")]
    Backend(String),
}

/// Persisting the notified-ids record failed.
#[derive(Error, Debug)]
pub enum LedgerWriteError {
    #[error("writing ledger at {location}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serializing ledger record")]
    Encode(#[from] serde_json::Error),

    #[error("ledger backend error: {0}")]
    Backend(String),
}

/// The subscriber listing could not be produced.
#[derive(Error, Debug)]
pub enum SubscriberReadError {
    #[error("reading subscribers from {location}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("subscribers at {location} are malformed")]
    Malformed {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("subscriber backend error: {0}")]
    Backend(String),
}

/// A single dispatch failed. Counted, logged, never fatal to the run.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// Missing or unusable notifier settings, e.g. no sender address.
    #[error("notifier misconfigured: {0}")]
    Configuration(String),

    #[error("invalid recipient address {recipient:?}")]
    InvalidRecipient { recipient: String },

    #[error("building message failed: {0}")]
    Build(String),

    #[error("transport error")]
    Transport(#[source] BoxError),

    #[error("dispatch task aborted: {0}")]
    Aborted(String),
}

impl NotifyError {
    pub fn transport(source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Transport(Box::new(source))
    }

    /// Short stable label (snake_case) for logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            NotifyError::Configuration(_) => "configuration",
            NotifyError::InvalidRecipient { .. } => "invalid_recipient",
            NotifyError::Build(_) => "build",
            NotifyError::Transport(_) => "transport",
            NotifyError::Aborted(_) => "aborted",
        }
    }
}

/// Outcome of a whole run that did not complete successfully.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("fetching today's catalog failed: {0}")]
    Catalog(#[from] CatalogFetchError),

    #[error("reading the notification ledger failed: {0}")]
    LedgerRead(#[from] LedgerReadError),

    #[error("listing subscribers failed: {0}")]
    Subscribers(#[from] SubscriberReadError),

    /// Dispatches already happened; the dedup record did not persist, so the
    /// next run may notify the same items again.
    #[error("committing notified ids failed after {} sent / {} failed dispatches: {}", .report.sent_count, .report.failed_count, .source)]
    LedgerWrite {
        report: RunReport,
        #[source]
        source: LedgerWriteError,
    },
}

impl RunError {
    /// Short stable label (snake_case) naming the stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            RunError::Catalog(_) => "catalog_fetch",
            RunError::LedgerRead(_) => "ledger_read",
            RunError::Subscribers(_) => "subscriber_read",
            RunError::LedgerWrite { .. } => "ledger_write",
        }
    }

    /// True when the run aborted before any message was sent.
    pub fn is_fatal_before_dispatch(&self) -> bool {
        !matches!(self, RunError::LedgerWrite { .. })
    }

    /// Report of dispatches that happened before the failure, if any.
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunError::LedgerWrite { report, .. } => Some(report),
            _ => None,
        }
    }
}

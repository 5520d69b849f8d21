// src/subscribers/mod.rs
pub mod file;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SubscriberReadError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    pub email_address: String,
    /// `None` when the profile never tracked anything.
    #[serde(default)]
    pub tracked_item_ids: Option<Vec<u64>>,
}

impl Subscriber {
    pub fn new(email_address: impl Into<String>, tracked: Vec<u64>) -> Self {
        Self {
            email_address: email_address.into(),
            tracked_item_ids: Some(tracked),
        }
    }

    pub fn untracked(email_address: impl Into<String>) -> Self {
        Self {
            email_address: email_address.into(),
            tracked_item_ids: None,
        }
    }

    /// Tracked ids in the subscriber's own order; empty when absent.
    pub fn tracked(&self) -> &[u64] {
        self.tracked_item_ids.as_deref().unwrap_or_default()
    }
}

/// Read-only listing of subscribers and the items they track.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    async fn subscribers_with_tracked_items(&self) -> Result<Vec<Subscriber>, SubscriberReadError>;
    fn name(&self) -> &'static str;
}

// --- Test helper ---
#[derive(Debug, Default)]
pub struct MemorySubscriberStore {
    subscribers: Vec<Subscriber>,
    fail: bool,
}

impl MemorySubscriberStore {
    pub fn new(subscribers: Vec<Subscriber>) -> Self {
        Self {
            subscribers,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            subscribers: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl SubscriberStore for MemorySubscriberStore {
    async fn subscribers_with_tracked_items(&self) -> Result<Vec<Subscriber>, SubscriberReadError> {
        if self.fail {
            return Err(SubscriberReadError::Backend("memory store disabled".into()));
        }
        Ok(self.subscribers.clone())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_tracked_list_reads_as_empty() {
        let s: Subscriber =
            serde_json::from_str(r#"{"emailAddress":"a@b.c","trackedItemIds":null}"#).unwrap();
        assert!(s.tracked().is_empty());

        let s: Subscriber = serde_json::from_str(r#"{"emailAddress":"a@b.c"}"#).unwrap();
        assert!(s.tracked_item_ids.is_none());
    }
}

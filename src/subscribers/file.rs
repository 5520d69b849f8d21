use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs;

use super::{Subscriber, SubscriberStore};
use crate::error::SubscriberReadError;

pub const DEFAULT_SUBSCRIBERS_PATH: &str = "config/subscribers.json";

fn default_true() -> bool {
    true
}

// Shape of the user-settings records maintained by account management.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRecord {
    #[serde(default)]
    email_address: String,
    #[serde(default)]
    settings: Option<UserSettings>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserSettings {
    #[serde(default = "default_true")]
    wants_email_notifications: bool,
    #[serde(default, rename = "trackedTVShows")]
    tracked_tv_shows: Option<Vec<TrackedShow>>,
}

#[derive(Debug, Deserialize)]
struct TrackedShow {
    id: u64,
}

/// Subscribers read from a JSON array of user records.
/// Users who opted out of email notifications are not listed.
#[derive(Debug, Clone)]
pub struct FileSubscriberStore {
    path: PathBuf,
}

impl FileSubscriberStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

fn into_subscribers(records: Vec<UserRecord>) -> Vec<Subscriber> {
    records
        .into_iter()
        .filter_map(|rec| {
            let email = rec.email_address.trim().to_string();
            if email.is_empty() {
                tracing::warn!("user record without email address skipped");
                return None;
            }
            match rec.settings {
                Some(s) if !s.wants_email_notifications => None,
                Some(s) => Some(Subscriber {
                    email_address: email,
                    tracked_item_ids: s
                        .tracked_tv_shows
                        .map(|shows| shows.into_iter().map(|t| t.id).collect()),
                }),
                None => Some(Subscriber::untracked(email)),
            }
        })
        .collect()
}

#[async_trait]
impl SubscriberStore for FileSubscriberStore {
    async fn subscribers_with_tracked_items(&self) -> Result<Vec<Subscriber>, SubscriberReadError> {
        let raw = fs::read_to_string(&self.path)
            .await
            .map_err(|source| SubscriberReadError::Io {
                location: self.location(),
                source,
            })?;
        let records: Vec<UserRecord> =
            serde_json::from_str(&raw).map_err(|source| SubscriberReadError::Malformed {
                location: self.location(),
                source,
            })?;
        Ok(into_subscribers(records))
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

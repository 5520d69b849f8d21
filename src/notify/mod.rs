pub mod email;

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::NotifyError;

/// Per-subscriber summary of matched shows airing today.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub email_address: String,
    /// Upper-cased names, in the subscriber's tracked order.
    pub show_names: Vec<String>,
    /// Ids behind `show_names`, same order, no duplicates.
    pub matched_ids: Vec<u64>,
}

impl Digest {
    /// `"FOO, BAZ"`
    pub fn names_line(&self) -> String {
        self.show_names.join(", ")
    }

    pub fn subject(&self) -> String {
        format!("Airing today: {}", self.names_line())
    }

    pub fn body(&self) -> String {
        let mut out = format!("Airing today: {}\n\n", self.names_line());
        for name in &self.show_names {
            out.push_str("- ");
            out.push_str(name);
            out.push('\n');
        }
        out
    }
}

/// Sends one message to one recipient.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
    fn name(&self) -> &'static str;
}

/// Dry-run notifier: logs instead of sending.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, recipient: &str, subject: &str, _body: &str) -> Result<(), NotifyError> {
        tracing::info!(recipient, subject, "dry run: notification not sent");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

// --- Test helper ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Records every send; recipients in `failing` get a transport-style error.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<SentMessage>>,
    failing: HashSet<String>,
    missing_sender: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for<I, S>(recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            failing: recipients.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Behave like a notifier with no sender address configured.
    pub fn without_sender() -> Self {
        Self {
            missing_sender: true,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<SentMessage> {
        match self.sent.lock() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        if self.missing_sender {
            return Err(NotifyError::Configuration("sender address is not set".into()));
        }
        if self.failing.contains(recipient) {
            return Err(NotifyError::Build(format!("refused recipient {recipient}")));
        }
        let msg = SentMessage {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        };
        match self.sent.lock() {
            Ok(mut g) => g.push(msg),
            Err(poison) => poison.into_inner().push(msg),
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest() -> Digest {
        Digest {
            email_address: "a@x.io".into(),
            show_names: vec!["FOO".into(), "BAZ".into()],
            matched_ids: vec![1, 3],
        }
    }

    #[test]
    fn subject_and_body_carry_the_names() {
        let d = digest();
        assert_eq!(d.names_line(), "FOO, BAZ");
        assert_eq!(d.subject(), "Airing today: FOO, BAZ");
        assert!(d.body().starts_with("Airing today: FOO, BAZ\n"));
        assert!(d.body().contains("- BAZ\n"));
    }

    #[tokio::test]
    async fn recording_notifier_fails_selected_recipients() {
        let n = RecordingNotifier::failing_for(["bad@x.io"]);
        assert!(n.send("bad@x.io", "s", "b").await.is_err());
        assert!(n.send("ok@x.io", "s", "b").await.is_ok());
        assert_eq!(n.messages().len(), 1);
    }
}

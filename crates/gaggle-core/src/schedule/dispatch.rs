//! Dispatcher for due scheduled emails
//!
//! Turns pending, due records into sent or errored ones, one send at a time.
//! Sends are deliberately sequential: parallel sends would scramble the
//! user-visible ordering and make remote rate limits unpredictable. Re-running
//! the dispatcher is safe — records that are already sent or carry an error
//! are excluded by the pending predicate, so nothing is sent twice and failed
//! records are not retried until an operator re-schedules them.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::gmail::GmailClient;
use crate::models::ScheduledEmail;
use crate::token_store::TokenStore;

use super::ScheduleStore;

/// The capability to send an existing remote draft for an account
///
/// The production implementation resolves credentials and authenticates per
/// call; tests substitute a mock so dispatch logic is exercised without the
/// network.
#[async_trait]
pub trait DraftSender: Send + Sync {
    /// Send the draft, returning the remote message id
    async fn send_draft(&self, account: &str, draft_id: &str) -> Result<String>;
}

/// Sends drafts through the Gmail adapter for configured accounts
pub struct AccountDraftSender {
    config: Config,
    tokens: Arc<dyn TokenStore>,
}

impl AccountDraftSender {
    pub fn new(config: Config, tokens: Arc<dyn TokenStore>) -> Self {
        Self { config, tokens }
    }
}

#[async_trait]
impl DraftSender for AccountDraftSender {
    async fn send_draft(&self, account: &str, draft_id: &str) -> Result<String> {
        let (name, account_config) = self.config.get_account(Some(account))?;
        let client = GmailClient::connect(&name, &account_config, self.tokens.clone()).await?;
        client.send_draft(draft_id).await
    }
}

/// Outcome of one dispatch attempt
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub email: ScheduledEmail,
    /// Remote message id on success, error text on failure
    pub result: std::result::Result<String, String>,
}

/// Result of one dispatcher run
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub dry_run: bool,
    /// The due records, in store order
    pub due: Vec<ScheduledEmail>,
    /// Per-record outcomes (empty for dry runs)
    pub outcomes: Vec<DispatchOutcome>,
    pub sent: usize,
    pub failed: usize,
}

impl DispatchReport {
    /// Nothing was due
    pub fn is_noop(&self) -> bool {
        self.due.is_empty()
    }
}

/// Replays due store entries through a [`DraftSender`]
pub struct Dispatcher<'a> {
    store: &'a ScheduleStore,
    sender: Arc<dyn DraftSender>,
}

impl<'a> Dispatcher<'a> {
    pub fn new(store: &'a ScheduleStore, sender: Arc<dyn DraftSender>) -> Self {
        Self { store, sender }
    }

    /// Run one dispatch pass over records due at `now`
    ///
    /// A failed send marks that record errored and moves on; only store I/O
    /// failures abort the pass. Partial failure is a normal outcome and is
    /// reflected in the report counts, never as an error.
    pub async fn run(
        &self,
        account: Option<&str>,
        dry_run: bool,
        now: DateTime<Utc>,
    ) -> Result<DispatchReport> {
        let due = self.store.list_pending(account, now)?;

        let mut report = DispatchReport {
            dry_run,
            due: due.clone(),
            outcomes: Vec::new(),
            sent: 0,
            failed: 0,
        };

        if due.is_empty() {
            info!("No scheduled emails ready to send");
            return Ok(report);
        }

        if dry_run {
            info!("Dry run: {} email(s) would be sent", due.len());
            return Ok(report);
        }

        for email in due {
            match self.sender.send_draft(&email.account, &email.draft_id).await {
                Ok(message_id) => {
                    self.store.mark_sent(&email.id, &message_id)?;
                    info!("Sent scheduled email '{}' as {}", email.subject, message_id);
                    report.sent += 1;
                    report.outcomes.push(DispatchOutcome {
                        email,
                        result: Ok(message_id),
                    });
                }
                Err(e) => {
                    let message = e.to_string();
                    self.store.mark_error(&email.id, &message)?;
                    warn!(
                        "Failed to send scheduled email '{}': {}",
                        email.subject, message
                    );
                    report.failed += 1;
                    report.outcomes.push(DispatchOutcome {
                        email,
                        result: Err(message),
                    });
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::ScheduleRequest;
    use chrono::Duration;
    use parking_lot::Mutex;

    /// Mock sender that records calls and fails for configured draft ids
    struct MockSender {
        calls: Mutex<Vec<String>>,
        failing: Vec<String>,
    }

    impl MockSender {
        fn new(failing: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                failing: failing.iter().map(|s| s.to_string()).collect(),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl DraftSender for MockSender {
        async fn send_draft(&self, _account: &str, draft_id: &str) -> Result<String> {
            self.calls.lock().push(draft_id.to_string());
            if self.failing.iter().any(|f| f == draft_id) {
                Err(Error::Gmail(format!("rejected {}", draft_id)))
            } else {
                Ok(format!("msg-{}", draft_id))
            }
        }
    }

    fn store() -> (tempfile::TempDir, ScheduleStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ScheduleStore::with_path(dir.path().join("scheduled.json"));
        (dir, store)
    }

    fn schedule(store: &ScheduleStore, account: &str, draft_id: &str) -> ScheduledEmail {
        store
            .add(ScheduleRequest {
                account: account.to_string(),
                draft_id: draft_id.to_string(),
                to: vec!["to@example.com".to_string()],
                cc: vec![],
                bcc: vec![],
                subject: format!("subject {}", draft_id),
                body: "body".to_string(),
                is_html: false,
                scheduled_at: Utc::now() - Duration::hours(1),
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_successful_dispatch_marks_sent() {
        let (_dir, store) = store();
        schedule(&store, "work", "d1");
        schedule(&store, "work", "d2");

        let sender = MockSender::new(&[]);
        let dispatcher = Dispatcher::new(&store, sender.clone());
        let report = dispatcher.run(None, false, Utc::now()).await.unwrap();

        assert_eq!(report.sent, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(sender.calls(), vec!["d1", "d2"]);

        let all = store.list_by_account(None).unwrap();
        assert!(all.iter().all(|e| e.sent));
        assert_eq!(all[0].message_id.as_deref(), Some("msg-d1"));
    }

    #[tokio::test]
    async fn test_failure_is_isolated_per_record() {
        let (_dir, store) = store();
        schedule(&store, "work", "d1");
        schedule(&store, "work", "d2");
        schedule(&store, "work", "d3");

        let sender = MockSender::new(&["d2"]);
        let dispatcher = Dispatcher::new(&store, sender.clone());
        let report = dispatcher.run(None, false, Utc::now()).await.unwrap();

        // The middle failure does not stop the others
        assert_eq!(report.sent, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(sender.calls(), vec!["d1", "d2", "d3"]);

        let all = store.list_by_account(None).unwrap();
        assert!(all[0].sent);
        assert!(!all[1].sent);
        assert!(all[1].error.as_deref().unwrap().contains("rejected d2"));
        assert!(all[2].sent);
    }

    #[tokio::test]
    async fn test_dispatch_is_idempotent() {
        let (_dir, store) = store();
        schedule(&store, "work", "d1");
        schedule(&store, "work", "d2");

        let sender = MockSender::new(&["d2"]);
        let dispatcher = Dispatcher::new(&store, sender.clone());

        let first = dispatcher.run(None, false, Utc::now()).await.unwrap();
        assert_eq!((first.sent, first.failed), (1, 1));

        // Second pass with no clock advance and no new schedules: the sent
        // record is not re-sent, the errored record is not retried
        let second = dispatcher.run(None, false, Utc::now()).await.unwrap();
        assert!(second.is_noop());
        assert_eq!((second.sent, second.failed), (0, 0));
        assert_eq!(sender.calls(), vec!["d1", "d2"]);
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let (_dir, store) = store();
        let email = schedule(&store, "work", "d1");
        let before = std::fs::read(store.path()).unwrap();

        let sender = MockSender::new(&[]);
        let dispatcher = Dispatcher::new(&store, sender.clone());
        let report = dispatcher.run(None, true, Utc::now()).await.unwrap();

        assert!(report.dry_run);
        assert_eq!(report.due.len(), 1);
        assert_eq!(report.due[0].id, email.id);
        assert_eq!((report.sent, report.failed), (0, 0));
        assert!(sender.calls().is_empty());
        assert_eq!(std::fs::read(store.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn test_account_filter_limits_dispatch() {
        let (_dir, store) = store();
        schedule(&store, "work", "d1");
        schedule(&store, "personal", "d2");

        let sender = MockSender::new(&[]);
        let dispatcher = Dispatcher::new(&store, sender.clone());
        let report = dispatcher.run(Some("work"), false, Utc::now()).await.unwrap();

        assert_eq!(report.sent, 1);
        assert_eq!(sender.calls(), vec!["d1"]);

        let personal = store.list_by_account(Some("personal")).unwrap();
        assert!(!personal[0].sent);
    }

    #[tokio::test]
    async fn test_nothing_due_is_a_noop() {
        let (_dir, store) = store();
        let sender = MockSender::new(&[]);
        let dispatcher = Dispatcher::new(&store, sender.clone());

        let report = dispatcher.run(None, false, Utc::now()).await.unwrap();
        assert!(report.is_noop());
        assert!(sender.calls().is_empty());
    }
}

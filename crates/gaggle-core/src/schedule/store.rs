//! Durable store for scheduled emails
//!
//! The whole collection is one JSON array on disk, rewritten on every
//! mutation. Each read-modify-write runs under a single in-process mutex and
//! lands atomically (temp file + rename), so a mutation either fully applies
//! or leaves the previous contents untouched. There is no cross-process file
//! locking: concurrent gaggle invocations mutating the store can race. In
//! practice the store is driven by one human at one terminal.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{ScheduleRequest, ScheduledEmail};

/// Flat-file store of scheduled emails
pub struct ScheduleStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ScheduleStore {
    /// Store at the default location (`~/.config/gaggle/scheduled.json`)
    pub fn new() -> Self {
        Self::with_path(crate::config::scheduled_path())
    }

    /// Store backed by a specific file
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the full collection; a missing file is an empty collection
    fn load(&self) -> Result<Vec<ScheduledEmail>> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let emails: Vec<ScheduledEmail> = serde_json::from_str(&data)?;
        Ok(emails)
    }

    /// Rewrite the full collection atomically
    fn save(&self, emails: &[ScheduledEmail]) -> Result<()> {
        let parent = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&parent)?;

        let data = serde_json::to_vec_pretty(emails)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
        tmp.write_all(&data)?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        debug!("Wrote {} scheduled email(s) to {:?}", emails.len(), self.path);
        Ok(())
    }

    /// Schedule a new email
    ///
    /// Assigns the id and creation time and forces the record into the
    /// pending state regardless of the request contents.
    pub fn add(&self, request: ScheduleRequest) -> Result<ScheduledEmail> {
        let _guard = self.lock.lock();

        let email = ScheduledEmail {
            id: uuid::Uuid::new_v4().to_string(),
            account: request.account,
            draft_id: request.draft_id,
            to: request.to,
            cc: request.cc,
            bcc: request.bcc,
            subject: request.subject,
            body: request.body,
            is_html: request.is_html,
            scheduled_at: request.scheduled_at,
            created_at: Utc::now(),
            sent: false,
            sent_at: None,
            message_id: None,
            error: None,
        };

        let mut emails = self.load()?;
        emails.push(email.clone());
        self.save(&emails)?;

        info!(
            "Scheduled email '{}' for {} ({})",
            email.subject, email.scheduled_at, email.account
        );
        Ok(email)
    }

    /// All records for an account, or every record if no filter is given;
    /// insertion order is preserved
    pub fn list_by_account(&self, account: Option<&str>) -> Result<Vec<ScheduledEmail>> {
        let _guard = self.lock.lock();
        let emails = self.load()?;
        Ok(emails
            .into_iter()
            .filter(|e| account.map(|a| e.account == a).unwrap_or(true))
            .collect())
    }

    /// Records eligible for dispatch: not sent, no error, and strictly past
    /// their scheduled time
    pub fn list_pending(
        &self,
        account: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledEmail>> {
        let _guard = self.lock.lock();
        let emails = self.load()?;
        Ok(emails
            .into_iter()
            .filter(|e| e.is_due(now) && account.map(|a| e.account == a).unwrap_or(true))
            .collect())
    }

    /// Mark a record as sent, recording the remote message id
    pub fn mark_sent(&self, id: &str, message_id: &str) -> Result<()> {
        self.update(id, |e| {
            e.sent = true;
            e.sent_at = Some(Utc::now());
            e.message_id = Some(message_id.to_string());
        })
    }

    /// Record a dispatch error; the record keeps its unsent state but is no
    /// longer eligible for automatic attempts
    pub fn mark_error(&self, id: &str, message: &str) -> Result<()> {
        self.update(id, |e| {
            e.error = Some(message.to_string());
        })
    }

    /// Read-modify-write of a single record under the store mutex
    fn update(&self, id: &str, apply: impl FnOnce(&mut ScheduledEmail)) -> Result<()> {
        let _guard = self.lock.lock();

        let mut emails = self.load()?;
        let email = emails
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| Error::ScheduledNotFound(id.to_string()))?;
        apply(email);

        self.save(&emails)
    }

    /// Remove sent records: all of them with no filter, or only the given
    /// account's with a filter (other accounts' sent records are kept)
    pub fn clear_sent(&self, account: Option<&str>) -> Result<()> {
        let _guard = self.lock.lock();

        let mut emails = self.load()?;
        emails.retain(|e| !e.sent || account.map(|a| e.account != a).unwrap_or(false));
        self.save(&emails)
    }

    /// Remove every record, or every record for one account
    pub fn clear_all(&self, account: Option<&str>) -> Result<()> {
        let _guard = self.lock.lock();

        match account {
            None => self.save(&[]),
            Some(a) => {
                let mut emails = self.load()?;
                emails.retain(|e| e.account != a);
                self.save(&emails)
            }
        }
    }
}

impl Default for ScheduleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store() -> (tempfile::TempDir, ScheduleStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ScheduleStore::with_path(dir.path().join("scheduled.json"));
        (dir, store)
    }

    fn request(account: &str, scheduled_at: DateTime<Utc>) -> ScheduleRequest {
        ScheduleRequest {
            account: account.to_string(),
            draft_id: format!("draft-{}", account),
            to: vec!["someone@example.com".to_string()],
            cc: vec![],
            bcc: vec![],
            subject: "hello".to_string(),
            body: "body".to_string(),
            is_html: false,
            scheduled_at,
        }
    }

    #[test]
    fn test_add_assigns_distinct_ids_and_pending_state() {
        let (_dir, store) = store();
        let now = Utc::now();

        let mut ids = Vec::new();
        for _ in 0..20 {
            let email = store.add(request("work", now)).unwrap();
            assert!(!email.sent);
            assert!(email.error.is_none());
            assert!(email.sent_at.is_none());
            ids.push(email.id);
        }

        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn test_missing_file_reads_as_empty() {
        let (_dir, store) = store();
        assert!(store.list_by_account(None).unwrap().is_empty());
        assert!(store.list_pending(None, Utc::now()).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let (_dir, store) = store();
        fs::write(store.path(), "not json at all").unwrap();
        assert!(store.list_by_account(None).is_err());
    }

    #[test]
    fn test_list_pending_predicate_is_strict() {
        let (_dir, store) = store();
        let now = Utc::now();

        let due = store.add(request("work", now - Duration::hours(1))).unwrap();
        store.add(request("work", now + Duration::hours(1))).unwrap();
        // Scheduled for exactly `now`: excluded until time strictly advances
        let exact = store.add(request("work", now)).unwrap();

        let pending = store.list_pending(None, now).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, due.id);

        let later = store
            .list_pending(None, now + Duration::seconds(1))
            .unwrap();
        assert!(later.iter().any(|e| e.id == exact.id));
    }

    #[test]
    fn test_list_pending_excludes_sent_and_errored() {
        let (_dir, store) = store();
        let now = Utc::now();
        let past = now - Duration::hours(1);

        let sent = store.add(request("work", past)).unwrap();
        let errored = store.add(request("work", past)).unwrap();
        let open = store.add(request("work", past)).unwrap();

        store.mark_sent(&sent.id, "msg-1").unwrap();
        store.mark_error(&errored.id, "boom").unwrap();

        let pending = store.list_pending(None, now).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, open.id);
    }

    #[test]
    fn test_list_pending_account_filter() {
        let (_dir, store) = store();
        let past = Utc::now() - Duration::hours(1);

        store.add(request("work", past)).unwrap();
        store.add(request("personal", past)).unwrap();

        let work = store.list_pending(Some("work"), Utc::now()).unwrap();
        assert_eq!(work.len(), 1);
        assert_eq!(work[0].account, "work");

        let all = store.list_pending(None, Utc::now()).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_list_by_account_preserves_insertion_order() {
        let (_dir, store) = store();
        let now = Utc::now();

        let first = store.add(request("work", now)).unwrap();
        let second = store.add(request("personal", now)).unwrap();
        let third = store.add(request("work", now)).unwrap();

        let all = store.list_by_account(None).unwrap();
        assert_eq!(
            all.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            vec![first.id.as_str(), second.id.as_str(), third.id.as_str()]
        );

        let work = store.list_by_account(Some("work")).unwrap();
        assert_eq!(
            work.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            vec![first.id.as_str(), third.id.as_str()]
        );
    }

    #[test]
    fn test_mark_sent_records_message_id() {
        let (_dir, store) = store();
        let email = store.add(request("work", Utc::now())).unwrap();

        store.mark_sent(&email.id, "remote-123").unwrap();

        let all = store.list_by_account(None).unwrap();
        assert!(all[0].sent);
        assert!(all[0].sent_at.is_some());
        assert_eq!(all[0].message_id.as_deref(), Some("remote-123"));
        assert!(all[0].error.is_none());
    }

    #[test]
    fn test_mark_error_leaves_sent_untouched() {
        let (_dir, store) = store();
        let email = store.add(request("work", Utc::now())).unwrap();

        store.mark_error(&email.id, "send failed").unwrap();

        let all = store.list_by_account(None).unwrap();
        assert!(!all[0].sent);
        assert_eq!(all[0].error.as_deref(), Some("send failed"));
    }

    #[test]
    fn test_update_unknown_id_leaves_file_untouched() {
        let (_dir, store) = store();
        store.add(request("work", Utc::now())).unwrap();
        let before = fs::read(store.path()).unwrap();

        let err = store.mark_error("no-such-id", "boom").unwrap_err();
        assert!(matches!(err, Error::ScheduledNotFound(_)));

        let after = fs::read(store.path()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_clear_sent_filter_semantics() {
        // One sent "work", one unsent "work", one sent "personal"
        let (_dir, store) = store();
        let now = Utc::now();

        let sent_work = store.add(request("work", now)).unwrap();
        let unsent_work = store.add(request("work", now)).unwrap();
        let sent_personal = store.add(request("personal", now)).unwrap();
        store.mark_sent(&sent_work.id, "m1").unwrap();
        store.mark_sent(&sent_personal.id, "m2").unwrap();

        store.clear_sent(Some("work")).unwrap();

        let remaining = store.list_by_account(None).unwrap();
        let ids: Vec<&str> = remaining.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec![unsent_work.id.as_str(), sent_personal.id.as_str()]);
    }

    #[test]
    fn test_clear_sent_unfiltered_removes_all_sent() {
        let (_dir, store) = store();
        let now = Utc::now();

        let sent_work = store.add(request("work", now)).unwrap();
        let sent_personal = store.add(request("personal", now)).unwrap();
        let unsent = store.add(request("work", now)).unwrap();
        store.mark_sent(&sent_work.id, "m1").unwrap();
        store.mark_sent(&sent_personal.id, "m2").unwrap();

        store.clear_sent(None).unwrap();

        let remaining = store.list_by_account(None).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, unsent.id);
    }

    #[test]
    fn test_clear_all_semantics() {
        let (_dir, store) = store();
        let now = Utc::now();

        store.add(request("work", now)).unwrap();
        store.add(request("personal", now)).unwrap();

        store.clear_all(Some("work")).unwrap();
        let remaining = store.list_by_account(None).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].account, "personal");

        store.clear_all(None).unwrap();
        assert!(store.list_by_account(None).unwrap().is_empty());
    }
}

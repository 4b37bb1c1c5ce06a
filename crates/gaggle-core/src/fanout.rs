//! Concurrent multi-account fan-out
//!
//! Runs the same read query against every selected account in parallel — one
//! task per account — and merges the results behind a fan-in barrier. One
//! account's failure never hides the others' results: failures become tagged
//! entries in a separate error list. There is no per-account timeout; a
//! hanging account stalls the whole call until the process is killed.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::Result;

/// A failure from one account's task, tagged with the account name
#[derive(Debug, Clone)]
pub struct AccountError {
    pub account: String,
    pub message: String,
}

impl std::fmt::Display for AccountError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.account, self.message)
    }
}

/// Merged results plus per-account errors from one fan-out call
#[derive(Debug)]
pub struct FanOutResult<T> {
    pub items: Vec<T>,
    pub errors: Vec<AccountError>,
}

impl<T> FanOutResult<T> {
    /// Sort merged items by their chronological key, ascending
    pub fn sort_by_key<K: Ord>(&mut self, key: impl FnMut(&T) -> K) {
        self.items.sort_by_key(key);
    }
}

/// Run `query` once per account, concurrently, and merge the results
///
/// Each account contributes either its items or one tagged error. The call
/// returns only after every task has finished; an empty merged result is a
/// valid, successful outcome even if all accounts failed.
pub async fn query_accounts<T, F, Fut>(accounts: Vec<String>, query: F) -> FanOutResult<T>
where
    T: Send + 'static,
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
{
    let items = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::with_capacity(accounts.len());
    for account in accounts {
        let fut = query(account.clone());
        let items = items.clone();
        let errors = errors.clone();

        handles.push(tokio::spawn(async move {
            match fut.await {
                Ok(mut batch) => {
                    debug!("Account {} returned {} item(s)", account, batch.len());
                    items.lock().append(&mut batch);
                }
                Err(e) => {
                    errors.lock().push(AccountError {
                        account,
                        message: e.to_string(),
                    });
                }
            }
        }));
    }

    // Fan-in barrier: wait for the slowest account
    futures::future::join_all(handles).await;

    let items = std::mem::take(&mut *items.lock());
    let errors = std::mem::take(&mut *errors.lock());
    FanOutResult { items, errors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn test_merges_all_successful_accounts() {
        let accounts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let result = query_accounts(accounts, |name| async move {
            Ok(vec![format!("{}-1", name), format!("{}-2", name)])
        })
        .await;

        assert_eq!(result.items.len(), 6);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_one_failure_does_not_hide_other_results() {
        let accounts = vec!["work".to_string(), "personal".to_string()];
        let result = query_accounts(accounts, |name| async move {
            if name == "work" {
                Err(Error::TokenMissing { account: name })
            } else {
                Ok(vec![1, 2, 3])
            }
        })
        .await;

        assert_eq!(result.items, vec![1, 2, 3]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].account, "work");
        assert!(result.errors[0].to_string().starts_with("[work] "));
    }

    #[tokio::test]
    async fn test_all_accounts_failing_is_empty_not_fatal() {
        let accounts = vec!["a".to_string(), "b".to_string()];
        let result = query_accounts(accounts, |name| async move {
            Err::<Vec<i64>, _>(Error::Gmail(format!("down for {}", name)))
        })
        .await;

        assert!(result.items.is_empty());
        assert_eq!(result.errors.len(), 2);
    }

    #[tokio::test]
    async fn test_merge_sorts_chronologically_regardless_of_account_order() {
        // Each account returns out-of-order keys; the slower account finishes
        // last so its items land at the end of the unmerged vector
        let accounts = vec!["late".to_string(), "early".to_string()];
        let mut result = query_accounts(accounts, |name| async move {
            if name == "late" {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                Ok(vec![1, 5])
            } else {
                Ok(vec![4, 2])
            }
        })
        .await;

        result.sort_by_key(|v| *v);
        assert_eq!(result.items, vec![1, 2, 4, 5]);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_no_accounts_yields_empty_result() {
        let result = query_accounts(vec![], |_name| async move { Ok(vec![0u8]) }).await;
        assert!(result.items.is_empty());
        assert!(result.errors.is_empty());
    }
}

use std::future::Future;
use std::sync::Arc;

use tracing::error;

use super::context::{RepositoryContext, TransactionContext, TransactionError};

/// Entry point for running a unit of work against a fresh transaction.
///
/// `run` builds a [`TransactionContext`], hands it to the closure through a
/// [`RepositoryContext`], and drives the outcome: commit on success, rollback
/// on failure, dispose either way. Stores that receive the context enroll
/// themselves on their first mutation, so a closure that never writes commits
/// an empty participant set.
pub struct Transaction;

impl Transaction {
    /// Runs `work` inside a new transaction.
    ///
    /// When the closure succeeds the transaction is committed; a commit
    /// failure rolls every participant back and surfaces the commit error.
    /// When the closure fails the transaction is rolled back and the
    /// closure's error is returned. A rollback failure takes precedence over
    /// the error that triggered it.
    pub async fn run<F, Fut, T, E>(work: F) -> Result<T, E>
    where
        F: FnOnce(RepositoryContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<TransactionError>,
    {
        let transaction = Arc::new(TransactionContext::new());
        let ctx = RepositoryContext::with_transaction(Arc::clone(&transaction));

        let outcome = match work(ctx).await {
            Ok(value) => match transaction.commit().await {
                Ok(()) => Ok(value),
                Err(commit_err) => {
                    error!(
                        transaction = %transaction.id(),
                        error = %commit_err,
                        "commit failed, rolling back"
                    );
                    match transaction.rollback().await {
                        Ok(()) => Err(E::from(commit_err)),
                        Err(rollback_err) => Err(E::from(rollback_err)),
                    }
                }
            },
            Err(work_err) => match transaction.rollback().await {
                Ok(()) => Err(work_err),
                Err(rollback_err) => {
                    error!(
                        transaction = %transaction.id(),
                        error = %rollback_err,
                        "rollback failed"
                    );
                    Err(E::from(rollback_err))
                }
            },
        };

        transaction.dispose().await;
        outcome
    }
}

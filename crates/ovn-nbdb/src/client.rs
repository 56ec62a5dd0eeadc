//! The transaction executor seam.

use async_trait::async_trait;

use crate::error::{NbError, NbResult};
use crate::ops::{OpResult, TransactResultsExt, Transaction};

/// Executes atomic batches against a Northbound database.
///
/// Implementations return one [`OpResult`] per executed operation (possibly
/// followed by a commit-level error entry). `Err` is reserved for failures to
/// talk to the database at all.
#[async_trait]
pub trait NbClient: Send + Sync {
    async fn transact(&self, txn: Transaction) -> NbResult<Vec<OpResult>>;
}

/// Submits a batch and fails on the first reported error.
///
/// A result list shorter than the batch is also a failure: the server stopped
/// early without saying why.
pub async fn transact_checked(client: &dyn NbClient, txn: Transaction) -> NbResult<Vec<OpResult>> {
    let expected = txn.len();
    let results = client.transact(txn).await?;
    results.check()?;
    if results.len() < expected {
        return Err(NbError::Transaction(format!(
            "expected {} results, got {}",
            expected,
            results.len()
        )));
    }
    Ok(results)
}

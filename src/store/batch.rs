use anyhow::Result;

use super::{DocumentStore, Write};

/// Commit `writes` in consecutive batches no larger than the store's limit.
///
/// Each batch is atomic on its own. A failure stops the sequence and leaves
/// earlier batches applied. Returns the number of batches committed.
pub async fn commit_chunked(store: &dyn DocumentStore, writes: Vec<Write>) -> Result<usize> {
    let limit = store.batch_limit().max(1);
    let total = writes.len();
    let mut committed = 0;
    let mut pending = writes.into_iter().peekable();

    while pending.peek().is_some() {
        let chunk: Vec<Write> = pending.by_ref().take(limit).collect();
        let size = chunk.len();
        store.commit(chunk).await?;
        committed += 1;
        tracing::debug!(batch = committed, size, total, "Committed write batch");
    }

    Ok(committed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn splits_writes_at_the_batch_limit() {
        let store = MemoryStore::new().with_batch_limit(2);
        let writes = (0..5)
            .map(|i| Write::Set {
                path: format!("cuentas/{i}"),
                fields: fields! { "id" => i },
            })
            .collect();

        let batches = commit_chunked(&store, writes).await.unwrap();

        assert_eq!(batches, 3);
        assert_eq!(store.commit_count(), 3);
        assert_eq!(store.list("cuentas").await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn no_writes_means_no_batches() {
        let store = MemoryStore::new();
        assert_eq!(commit_chunked(&store, Vec::new()).await.unwrap(), 0);
        assert_eq!(store.commit_count(), 0);
    }
}

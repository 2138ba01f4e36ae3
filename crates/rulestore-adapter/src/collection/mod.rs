use crate::codec::{DecodeError, StoredDocument};
use crate::selector::Selector;
use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type CollectionResult<T> = Result<T, CollectionError>;

/// Lazily consumed result set of a `find`.
pub type DocumentStream<'a> = BoxStream<'a, CollectionResult<StoredDocument>>;

/// Storage collaborator holding rule documents.
///
/// Implementations only need equality selectors over the seven document keys.
/// None of the operations retry; failures surface to the caller as-is.
#[async_trait]
pub trait RuleCollection: Send + Sync {
    /// Documents matching `selector`, in insertion order.
    async fn find<'a>(&'a self, selector: &Selector) -> CollectionResult<DocumentStream<'a>>;
    async fn insert_one(&self, doc: StoredDocument) -> CollectionResult<()>;
    /// Insert every document in one round trip.
    async fn insert_many(&self, docs: Vec<StoredDocument>) -> CollectionResult<u64>;
    /// Delete at most one matching document. Returns whether one was deleted.
    async fn delete_one(&self, selector: &Selector) -> CollectionResult<bool>;
    async fn delete_many(&self, selector: &Selector) -> CollectionResult<u64>;
    /// Remove every document.
    async fn drop_all(&self) -> CollectionResult<()>;

    /// Replace the whole collection with `docs`.
    ///
    /// The default drops and then bulk-inserts. It is not atomic: if the insert
    /// fails the collection is left empty. Backends with transactions or a
    /// single lock over their contents should override this.
    async fn replace_all(&self, docs: Vec<StoredDocument>) -> CollectionResult<u64> {
        self.drop_all().await?;
        if docs.is_empty() {
            return Ok(0);
        }
        self.insert_many(docs).await
    }

    async fn health_check(&self) -> CollectionResult<()>;
    /// Release the underlying session. Further calls may fail.
    async fn close(&self);
    fn backend_name(&self) -> &'static str;
}

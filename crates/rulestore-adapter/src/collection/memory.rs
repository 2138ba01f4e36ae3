//! In-memory rule collection.
//!
//! # Purpose
//! Keeps rule documents in a `Vec` guarded by `tokio::sync::RwLock`. It exists for
//! tests and embedded use where durability is not required.
//!
//! # Durability and consistency
//! - **Not durable**: all documents are lost when the last clone is dropped.
//! - Clones share the same contents, so a test can hand one clone to an adapter
//!   and inspect storage through another.
//! - `find` snapshots matching documents under a read lock; writes that land
//!   after the snapshot are not observed by that stream.
//! - `replace_all` swaps the contents under a single write lock, so readers see
//!   either the old or the new rule set, never an empty collection.
use super::{CollectionResult, DocumentStream, RuleCollection};
use crate::codec::StoredDocument;
use crate::selector::Selector;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
pub struct InMemoryCollection {
    docs: Arc<RwLock<Vec<StoredDocument>>>,
}

impl InMemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collection pre-populated with `docs`, in order.
    pub fn with_documents(docs: Vec<StoredDocument>) -> Self {
        Self {
            docs: Arc::new(RwLock::new(docs)),
        }
    }

    /// Copy of every stored document, in insertion order.
    pub async fn documents(&self) -> Vec<StoredDocument> {
        self.docs.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }
}

#[async_trait]
impl RuleCollection for InMemoryCollection {
    async fn find<'a>(&'a self, selector: &Selector) -> CollectionResult<DocumentStream<'a>> {
        let matched: Vec<StoredDocument> = self
            .docs
            .read()
            .await
            .iter()
            .filter(|doc| selector.matches(doc))
            .cloned()
            .collect();
        Ok(futures::stream::iter(matched.into_iter().map(Ok)).boxed())
    }

    async fn insert_one(&self, doc: StoredDocument) -> CollectionResult<()> {
        let mut docs = self.docs.write().await;
        docs.push(doc);
        metrics::gauge!("rulestore_memory_documents").set(docs.len() as f64);
        Ok(())
    }

    async fn insert_many(&self, new_docs: Vec<StoredDocument>) -> CollectionResult<u64> {
        let inserted = new_docs.len() as u64;
        let mut docs = self.docs.write().await;
        docs.extend(new_docs);
        metrics::gauge!("rulestore_memory_documents").set(docs.len() as f64);
        Ok(inserted)
    }

    async fn delete_one(&self, selector: &Selector) -> CollectionResult<bool> {
        let mut docs = self.docs.write().await;
        let Some(position) = docs.iter().position(|doc| selector.matches(doc)) else {
            return Ok(false);
        };
        docs.remove(position);
        metrics::gauge!("rulestore_memory_documents").set(docs.len() as f64);
        Ok(true)
    }

    async fn delete_many(&self, selector: &Selector) -> CollectionResult<u64> {
        let mut docs = self.docs.write().await;
        let before = docs.len();
        docs.retain(|doc| !selector.matches(doc));
        metrics::gauge!("rulestore_memory_documents").set(docs.len() as f64);
        Ok((before - docs.len()) as u64)
    }

    async fn drop_all(&self) -> CollectionResult<()> {
        self.docs.write().await.clear();
        metrics::gauge!("rulestore_memory_documents").set(0.0);
        Ok(())
    }

    async fn replace_all(&self, new_docs: Vec<StoredDocument>) -> CollectionResult<u64> {
        let inserted = new_docs.len() as u64;
        let mut docs = self.docs.write().await;
        *docs = new_docs;
        metrics::gauge!("rulestore_memory_documents").set(docs.len() as f64);
        Ok(inserted)
    }

    async fn health_check(&self) -> CollectionResult<()> {
        Ok(())
    }

    async fn close(&self) {}

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

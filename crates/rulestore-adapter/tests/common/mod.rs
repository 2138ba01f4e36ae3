#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use rulestore_adapter::{
    AdapterConfig, CollectionError, CollectionResult, DocumentStream, InMemoryCollection,
    RuleAdapter, RuleCollection, Selector, StoredDocument, encode,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub fn rule(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

pub fn doc(ptype: &str, values: &[&str]) -> StoredDocument {
    encode(ptype, &rule(values))
}

pub async fn open_adapter<C: RuleCollection>(collection: C) -> RuleAdapter<C> {
    open_adapter_with_timeout(collection, AdapterConfig::default().op_timeout).await
}

pub async fn open_adapter_with_timeout<C: RuleCollection>(
    collection: C,
    op_timeout: Duration,
) -> RuleAdapter<C> {
    rulestore_adapter::observability::init_tracing();
    let config = AdapterConfig {
        op_timeout,
        ..AdapterConfig::default()
    };
    RuleAdapter::open(collection, &config).await.expect("open adapter")
}

/// Collection wrapper that injects failures and delays into an in-memory
/// collection. It keeps the default (non-atomic) `replace_all`.
pub struct FaultyCollection {
    pub inner: InMemoryCollection,
    fail_insert_many: AtomicBool,
    /// Number of documents a `find` yields before its cursor fails; `usize::MAX` disables.
    fail_find_after: AtomicUsize,
    find_delay_ms: AtomicUsize,
}

impl FaultyCollection {
    pub fn new(inner: InMemoryCollection) -> Self {
        Self {
            inner,
            fail_insert_many: AtomicBool::new(false),
            fail_find_after: AtomicUsize::new(usize::MAX),
            find_delay_ms: AtomicUsize::new(0),
        }
    }

    pub fn fail_insert_many(&self) {
        self.fail_insert_many.store(true, Ordering::SeqCst);
    }

    pub fn fail_find_after(&self, docs: usize) {
        self.fail_find_after.store(docs, Ordering::SeqCst);
    }

    pub fn delay_find(&self, delay: Duration) {
        self.find_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }
}

#[async_trait]
impl RuleCollection for FaultyCollection {
    async fn find<'a>(&'a self, selector: &Selector) -> CollectionResult<DocumentStream<'a>> {
        let delay = self.find_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        let limit = self.fail_find_after.load(Ordering::SeqCst);
        let docs: Vec<StoredDocument> = self.inner.find(selector).await?.try_collect().await?;
        let mut items: Vec<CollectionResult<StoredDocument>> =
            docs.into_iter().take(limit).map(Ok).collect();
        if limit != usize::MAX {
            items.push(Err(CollectionError::Unexpected(anyhow!("cursor lost"))));
        }
        Ok(futures::stream::iter(items).boxed())
    }

    async fn insert_one(&self, doc: StoredDocument) -> CollectionResult<()> {
        self.inner.insert_one(doc).await
    }

    async fn insert_many(&self, docs: Vec<StoredDocument>) -> CollectionResult<u64> {
        if self.fail_insert_many.load(Ordering::SeqCst) {
            return Err(CollectionError::Unexpected(anyhow!("bulk insert rejected")));
        }
        self.inner.insert_many(docs).await
    }

    async fn delete_one(&self, selector: &Selector) -> CollectionResult<bool> {
        self.inner.delete_one(selector).await
    }

    async fn delete_many(&self, selector: &Selector) -> CollectionResult<u64> {
        self.inner.delete_many(selector).await
    }

    async fn drop_all(&self) -> CollectionResult<()> {
        self.inner.drop_all().await
    }

    async fn health_check(&self) -> CollectionResult<()> {
        Ok(())
    }

    async fn close(&self) {}

    fn backend_name(&self) -> &'static str {
        "faulty-memory"
    }
}

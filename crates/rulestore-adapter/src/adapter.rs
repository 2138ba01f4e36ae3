//! Policy adapter over a rule document collection.
//!
//! # Purpose and responsibility
//! Implements the load / save / incremental-update contract an enforcement
//! engine expects from its policy storage, on top of any [`RuleCollection`].
//!
//! # Key invariants and assumptions
//! - Loads append in storage order and never deduplicate or sort.
//! - Every load overwrites the filtered flag; a full save is refused while it
//!   is set.
//! - Failures are passed through immediately. Nothing is retried and a load
//!   that fails halfway leaves the rules it already appended in the model.
//! - Every storage call runs under `op_timeout`. For a load the deadline
//!   covers the whole cursor walk.
//!
//! # Concurrency
//! `load` takes `&mut self` because it writes the filtered flag, so the borrow
//! checker keeps a load from overlapping a save on the same adapter. Sharing an
//! adapter between tasks needs an outer lock.
//!
//! # Save semantics
//! `save` hands the encoded model to [`RuleCollection::replace_all`]. Backends
//! with a transaction or a single lock make that atomic. The default strategy is
//! drop followed by one bulk insert; if the insert fails the collection stays
//! empty until the next successful save.
use crate::codec::{self, StoredDocument};
use crate::collection::{CollectionResult, RuleCollection};
use crate::config::AdapterConfig;
use crate::errors::{AdapterError, AdapterResult};
use crate::filter_state::FilterState;
use crate::model::{PERSISTED_SECTIONS, PolicyModel};
use crate::selector::Selector;
use futures::StreamExt;
use std::future::Future;
use std::time::Duration;

pub struct RuleAdapter<C> {
    collection: C,
    op_timeout: Duration,
    filter_state: FilterState,
}

impl<C: RuleCollection> RuleAdapter<C> {
    /// Take ownership of an opened collection and verify it answers.
    pub async fn open(collection: C, config: &AdapterConfig) -> AdapterResult<Self> {
        match tokio::time::timeout(config.op_timeout, collection.health_check()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(AdapterError::Connection(err)),
            Err(_) => {
                return Err(AdapterError::DeadlineExceeded {
                    op: "health_check",
                    timeout: config.op_timeout,
                });
            }
        }
        tracing::info!(backend = collection.backend_name(), "policy adapter opened");
        Ok(Self {
            collection,
            op_timeout: config.op_timeout,
            filter_state: FilterState::default(),
        })
    }

    /// Release the collection's session.
    pub async fn close(self) {
        self.collection.close().await;
        tracing::info!(backend = self.collection.backend_name(), "policy adapter closed");
    }

    pub fn collection(&self) -> &C {
        &self.collection
    }

    pub fn op_timeout(&self) -> Duration {
        self.op_timeout
    }

    pub fn is_filtered(&self) -> bool {
        self.filter_state.is_filtered()
    }

    /// Load every stored rule into `model`.
    pub async fn load(&mut self, model: &mut dyn PolicyModel) -> AdapterResult<()> {
        self.load_filtered(model, &Selector::all()).await
    }

    /// Load the rules matching `filter` into `model`.
    ///
    /// A non-empty `filter` marks the adapter as filtered until the next load.
    pub async fn load_filtered(
        &mut self,
        model: &mut dyn PolicyModel,
        filter: &Selector,
    ) -> AdapterResult<()> {
        self.filter_state.record_load(filter);

        let timeout = self.op_timeout;
        let deadline = tokio::time::Instant::now() + timeout;
        let expired = || AdapterError::DeadlineExceeded { op: "find", timeout };

        let mut docs = tokio::time::timeout_at(deadline, self.collection.find(filter))
            .await
            .map_err(|_| expired())?
            .map_err(|err| AdapterError::storage("find", err))?;

        let mut loaded = 0u64;
        while let Some(item) = tokio::time::timeout_at(deadline, docs.next())
            .await
            .map_err(|_| expired())?
        {
            let doc = item.map_err(|err| AdapterError::storage("find", err))?;
            let rule = codec::decode(doc)?;
            model.append_rule(&rule.section, &rule.ptype, rule.fields);
            loaded += 1;
        }

        metrics::counter!("rulestore_rules_loaded_total").increment(loaded);
        tracing::debug!(
            loaded,
            filtered = self.filter_state.is_filtered(),
            "loaded policy rules"
        );
        Ok(())
    }

    /// Replace everything in storage with the `p` and `g` rules of `model`.
    pub async fn save(&self, model: &dyn PolicyModel) -> AdapterResult<()> {
        self.filter_state.ensure_savable()?;

        let docs: Vec<StoredDocument> = PERSISTED_SECTIONS
            .iter()
            .flat_map(|section| model.section_rules(section))
            .map(|(ptype, rule)| codec::encode(ptype, rule))
            .collect();

        let saved = self
            .within("replace_all", self.collection.replace_all(docs))
            .await
            .inspect_err(|err| {
                tracing::warn!(
                    error = %err,
                    backend = self.collection.backend_name(),
                    "policy save failed; stored rules may be incomplete"
                );
            })?;

        metrics::counter!("rulestore_rules_saved_total").increment(saved);
        tracing::debug!(saved, "saved policy rules");
        Ok(())
    }

    pub async fn add_policy(&self, sec: &str, ptype: &str, rule: &[String]) -> AdapterResult<()> {
        let doc = codec::encode(ptype, rule);
        self.within("insert_one", self.collection.insert_one(doc))
            .await?;
        metrics::counter!("rulestore_rules_added_total").increment(1);
        tracing::debug!(sec, ptype, "added policy rule");
        Ok(())
    }

    /// Insert `rules` with a single bulk insert. Returns the inserted count.
    pub async fn add_policies(
        &self,
        sec: &str,
        ptype: &str,
        rules: &[Vec<String>],
    ) -> AdapterResult<u64> {
        if rules.is_empty() {
            return Ok(0);
        }
        let docs: Vec<StoredDocument> = rules
            .iter()
            .map(|rule| codec::encode(ptype, rule))
            .collect();
        let inserted = self
            .within("insert_many", self.collection.insert_many(docs))
            .await?;
        metrics::counter!("rulestore_rules_added_total").increment(inserted);
        tracing::debug!(sec, ptype, inserted, "added policy rules");
        Ok(inserted)
    }

    /// Delete one document equal to the encoded rule.
    ///
    /// Returns whether a document was deleted. When several identical
    /// documents exist only one of them goes.
    pub async fn remove_policy(
        &self,
        sec: &str,
        ptype: &str,
        rule: &[String],
    ) -> AdapterResult<bool> {
        let selector = Selector::exact(&codec::encode(ptype, rule));
        let deleted = self
            .within("delete_one", self.collection.delete_one(&selector))
            .await?;
        if deleted {
            metrics::counter!("rulestore_rules_removed_total").increment(1);
        }
        tracing::debug!(sec, ptype, deleted, "removed policy rule");
        Ok(deleted)
    }

    /// Delete one stored document per rule. Returns how many were deleted.
    ///
    /// Each rule is its own delete; a failure part-way leaves the earlier
    /// deletions in place.
    pub async fn remove_policies(
        &self,
        sec: &str,
        ptype: &str,
        rules: &[Vec<String>],
    ) -> AdapterResult<u64> {
        let mut deleted = 0u64;
        for rule in rules {
            if self.remove_policy(sec, ptype, rule).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Delete every `ptype` document whose fields starting at `field_index`
    /// equal `field_values`. Empty values match anything.
    ///
    /// Returns the number of deleted documents.
    pub async fn remove_filtered_policy(
        &self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> AdapterResult<u64> {
        let selector = Selector::field_range(ptype, field_index, field_values);
        let deleted = self
            .within("delete_many", self.collection.delete_many(&selector))
            .await?;
        metrics::counter!("rulestore_rules_removed_total").increment(deleted);
        tracing::debug!(sec, ptype, field_index, deleted, "removed filtered policy rules");
        Ok(deleted)
    }

    /// Delete every stored rule.
    pub async fn clear_policy(&self) -> AdapterResult<()> {
        self.within("drop", self.collection.drop_all()).await?;
        tracing::debug!("cleared stored policy rules");
        Ok(())
    }

    async fn within<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = CollectionResult<T>>,
    ) -> AdapterResult<T> {
        match tokio::time::timeout(self.op_timeout, call).await {
            Ok(result) => result.map_err(|err| AdapterError::storage(op, err)),
            Err(_) => Err(AdapterError::DeadlineExceeded {
                op,
                timeout: self.op_timeout,
            }),
        }
    }
}

#[cfg(feature = "postgres")]
impl RuleAdapter<crate::collection::postgres::PostgresCollection> {
    /// Connect to the Postgres collection named by `config` and open an adapter on it.
    pub async fn connect(config: &AdapterConfig) -> AdapterResult<Self> {
        let pg = config
            .postgres
            .as_ref()
            .ok_or_else(|| AdapterError::Config("RULESTORE_POSTGRES_URL is not set".to_string()))?;
        let collection = crate::collection::postgres::PostgresCollection::connect(pg)
            .await
            .map_err(AdapterError::Connection)?;
        Self::open(collection, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::memory::InMemoryCollection;
    use crate::model::RuleModel;

    fn rule(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    async fn adapter_with(docs: Vec<StoredDocument>) -> RuleAdapter<InMemoryCollection> {
        RuleAdapter::open(
            InMemoryCollection::with_documents(docs),
            &AdapterConfig::default(),
        )
        .await
        .expect("open")
    }

    #[tokio::test]
    async fn load_then_save_round_trips_storage() {
        let mut adapter = adapter_with(vec![
            codec::encode("p", &rule(&["alice", "data1", "read"])),
            codec::encode("g", &rule(&["alice", "admin"])),
        ])
        .await;
        let mut model = RuleModel::new();
        adapter.load(&mut model).await.expect("load");
        assert_eq!(model.rules("p", "p"), &[rule(&["alice", "data1", "read"])]);
        assert_eq!(model.rules("g", "g"), &[rule(&["alice", "admin"])]);
        assert!(!adapter.is_filtered());

        adapter.save(&model).await.expect("save");
        let mut stored = adapter.collection().documents().await;
        stored.sort_by(|a, b| a.ptype.cmp(&b.ptype));
        assert_eq!(
            stored,
            vec![
                codec::encode("g", &rule(&["alice", "admin"])),
                codec::encode("p", &rule(&["alice", "data1", "read"])),
            ]
        );
    }

    #[tokio::test]
    async fn save_ignores_sections_other_than_policy_and_grouping() {
        let adapter = adapter_with(Vec::new()).await;
        let mut model = RuleModel::new();
        model.append_rule("p", "p", rule(&["alice", "data1", "read"]));
        model.append_rule("e", "e", rule(&["some(where (p.eft == allow))"]));
        adapter.save(&model).await.expect("save");
        assert_eq!(
            adapter.collection().documents().await,
            vec![codec::encode("p", &rule(&["alice", "data1", "read"]))]
        );
    }

    #[tokio::test]
    async fn add_and_remove_policies_in_bulk() {
        let adapter = adapter_with(Vec::new()).await;
        let rules = vec![rule(&["alice", "data1", "read"]), rule(&["bob", "data2", "write"])];
        let inserted = adapter.add_policies("p", "p", &rules).await.expect("add");
        assert_eq!(inserted, 2);
        assert_eq!(adapter.add_policies("p", "p", &[]).await.expect("add"), 0);

        let deleted = adapter
            .remove_policies("p", "p", &[rule(&["bob", "data2", "write"]), rule(&["carol"])])
            .await
            .expect("remove");
        assert_eq!(deleted, 1);
        assert_eq!(
            adapter.collection().documents().await,
            vec![codec::encode("p", &rule(&["alice", "data1", "read"]))]
        );

        adapter.clear_policy().await.expect("clear");
        assert!(adapter.collection().is_empty().await);
    }

    #[tokio::test]
    async fn close_releases_the_collection() {
        let adapter = adapter_with(Vec::new()).await;
        assert_eq!(adapter.op_timeout(), Duration::from_secs(10));
        adapter.close().await;
    }
}
